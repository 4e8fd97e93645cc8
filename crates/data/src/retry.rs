//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ResilienceError};

/// Errors that know whether a retry can help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Upstream's own hint for how long to wait.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        ProviderError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { .. } => self.retry_delay(),
            _ => None,
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Random spread applied to each delay, as a fraction (0.2 = ±20%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Backoff before attempt `retry + 1`, without jitter. `retry` starts at 0.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = self.multiplier.max(1.0).powi(i32::try_from(retry).unwrap_or(i32::MAX));
        let ms = (self.base_delay_ms as f64 * exp).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }

    /// Backoff with jitter applied.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.backoff(retry);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        base.mul_f64(factor)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempts run out.
///
/// # Errors
/// `ResilienceError::Failed` for a non-retryable error,
/// `ResilienceError::RetriesExhausted` after the last retryable failure.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, ResilienceError<E>>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(ResilienceError::Failed(e)),
            Err(e) if attempt >= attempts => {
                tracing::warn!(operation, attempts, error = %e, "Retries exhausted");
                return Err(ResilienceError::RetriesExhausted { attempts, last: e });
            }
            Err(e) => {
                let delay = policy
                    .delay_for(attempt - 1)
                    .max(e.retry_after().unwrap_or(Duration::ZERO))
                    .min(Duration::from_millis(policy.max_delay_ms));
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
