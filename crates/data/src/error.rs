//! Error types for the market-data boundary.
//!
//! `ProviderError` is what upstream sources report; `CacheError` is what the
//! cache store reports; `ResilienceError` wraps either once retry and the
//! circuit breaker have had their say.

use std::time::Duration;

use thiserror::Error;

/// Failures reported by a market-data provider or moves repository.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// Upstream does not know the symbol.
    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    /// Data older than the provider's freshness bound.
    #[error("stale data for {symbol}: {age_secs}s old")]
    StaleData { symbol: String, age_secs: u64 },

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout: {0}")]
    Timeout(String),

    /// Upstream answered with an error status.
    #[error("API error: {status_code} - {message}")]
    Api { status_code: u16, message: String },

    /// Payload did not match the expected schema.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl ProviderError {
    pub fn symbol_not_found(symbol: impl Into<String>) -> Self {
        Self::SymbolNotFound {
            symbol: symbol.into(),
        }
    }

    pub fn stale(symbol: impl Into<String>, age_secs: u64) -> Self {
        Self::StaleData {
            symbol: symbol.into(),
            age_secs,
        }
    }

    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Returns true if repeating the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } | Self::StaleData { .. } => {
                true
            }
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Returns true if the failure says something about upstream health
    /// rather than about the request.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Suggested wait before retrying, if upstream gave one or the class implies one.
    #[must_use]
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(Duration::from_secs(*retry_after_secs)),
            Self::Network(_) | Self::Timeout(_) => Some(Duration::from_secs(1)),
            Self::Api { status_code, .. } if *status_code >= 500 => Some(Duration::from_secs(2)),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidData(err.to_string())
    }
}

/// Failures of the persistent cache tier.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store stayed busy through every retry.
    #[error("cache store busy after {attempts} attempts")]
    Busy { attempts: u32 },

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of a call made through retry and/or a circuit breaker.
#[derive(Debug, Error, PartialEq)]
pub enum ResilienceError<E> {
    /// The breaker for `source_name` is open; the call was not attempted.
    #[error("circuit open for {source_name}, retry in {retry_in_ms}ms")]
    CircuitOpen { source_name: String, retry_in_ms: u64 },

    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: E },

    /// A non-retryable error; returned on first occurrence.
    #[error(transparent)]
    Failed(E),
}

impl<E> ResilienceError<E> {
    /// The upstream error, if the call was attempted.
    pub fn inner(&self) -> Option<&E> {
        match self {
            Self::CircuitOpen { .. } => None,
            Self::RetriesExhausted { last, .. } => Some(last),
            Self::Failed(e) => Some(e),
        }
    }

    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}
