//! One analysis session: market-data collaborators constructed once and
//! handed out by reference.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use ivcrush_analysis::{analyze, AnalysisResult};
use ivcrush_core::config::ScoringConfig;
use ivcrush_core::error::AnalysisError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::cache::{SqliteStore, TwoTierCache};
use crate::circuit_breaker::{BreakerConfig, BreakerRegistry};
use crate::error::{CacheError, ProviderError, ResilienceError};
use crate::gateway::MarketDataGateway;
use crate::provider::{HistoricalMovesRepository, MarketDataProvider};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Persistent cache location, e.g. `sqlite://data/cache.db`. Memory-only when unset.
    pub cache_url: Option<String>,
    pub memory_capacity: usize,
    pub memory_ttl_cap_secs: u64,
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_url: None,
            memory_capacity: 1024,
            memory_ttl_cap_secs: 300,
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("market data unavailable: {0}")]
    Upstream(#[from] ResilienceError<ProviderError>),

    #[error("cache unavailable: {0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Holds the gateway for the lifetime of one session.
///
/// The gateway, its cache and breakers are built on first use and reused
/// by every later call; concurrent first calls build it once.
pub struct AnalysisSession {
    config: SessionConfig,
    provider: Arc<dyn MarketDataProvider>,
    moves: Arc<dyn HistoricalMovesRepository>,
    gateway: OnceCell<MarketDataGateway>,
}

impl std::fmt::Debug for AnalysisSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisSession")
            .field("config", &self.config)
            .field("initialized", &self.gateway.initialized())
            .finish_non_exhaustive()
    }
}

impl AnalysisSession {
    #[must_use]
    pub fn new(
        config: SessionConfig,
        provider: Arc<dyn MarketDataProvider>,
        moves: Arc<dyn HistoricalMovesRepository>,
    ) -> Self {
        Self {
            config,
            provider,
            moves,
            gateway: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The session's gateway, constructing it on first call.
    ///
    /// # Errors
    /// `CacheError` if the persistent cache cannot be opened. A failed
    /// construction is retried on the next call.
    pub async fn gateway(&self) -> Result<&MarketDataGateway, CacheError> {
        self.gateway.get_or_try_init(|| self.build_gateway()).await
    }

    async fn build_gateway(&self) -> Result<MarketDataGateway, CacheError> {
        let mut cache = TwoTierCache::new(self.config.memory_capacity)
            .with_memory_ttl_cap(Duration::from_secs(self.config.memory_ttl_cap_secs));
        if let Some(url) = &self.config.cache_url {
            let store = SqliteStore::connect(url).await?;
            cache = cache.with_store(Arc::new(store));
        }

        tracing::info!(
            provider = self.provider.name(),
            moves = self.moves.name(),
            persistent_cache = self.config.cache_url.is_some(),
            "Market data gateway initialized"
        );

        Ok(MarketDataGateway::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.moves),
            Arc::new(cache),
        )
        .with_retry_policy(self.config.retry.clone())
        .with_breakers(Arc::new(BreakerRegistry::new(self.config.breaker.clone()))))
    }

    /// Fetches chain and history for `ticker` and runs the full analysis.
    ///
    /// # Errors
    /// Upstream, cache or analysis failure, each kept distinct.
    pub async fn analyze(
        &self,
        ticker: &str,
        earnings_date: NaiveDate,
        config: &ScoringConfig,
    ) -> Result<AnalysisResult, SessionError> {
        let gateway = self.gateway().await?;
        let chain = gateway.option_chain(ticker, None).await?;
        let history = gateway.historical_moves(ticker).await?;
        Ok(analyze(ticker, earnings_date, &chain, &history, config)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryMoveRepository;
    use async_trait::async_trait;
    use ivcrush_core::types::OptionChainSnapshot;
    use rust_decimal::Decimal;

    struct NoData;

    #[async_trait]
    impl MarketDataProvider for NoData {
        fn name(&self) -> &str {
            "none"
        }

        async fn option_chain(
            &self,
            symbol: &str,
            _expiration: Option<NaiveDate>,
        ) -> Result<OptionChainSnapshot, ProviderError> {
            Err(ProviderError::symbol_not_found(symbol))
        }

        async fn spot_price(&self, symbol: &str) -> Result<Decimal, ProviderError> {
            Err(ProviderError::symbol_not_found(symbol))
        }
    }

    fn session(config: SessionConfig) -> AnalysisSession {
        AnalysisSession::new(config, Arc::new(NoData), Arc::new(InMemoryMoveRepository::new()))
    }

    #[tokio::test]
    async fn gateway_is_built_once() {
        let session = session(SessionConfig::default());
        let first: *const MarketDataGateway = session.gateway().await.unwrap();
        let second: *const MarketDataGateway = session.gateway().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn persistent_cache_is_opened_from_url() {
        let session = session(SessionConfig {
            cache_url: Some("sqlite::memory:".into()),
            ..SessionConfig::default()
        });
        let gateway = session.gateway().await.unwrap();
        assert_eq!(gateway.cache().purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upstream_failure_is_typed() {
        let session = session(SessionConfig::default());
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let err = session
            .analyze("ZZZZ", date, &ScoringConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Upstream(ResilienceError::Failed(ProviderError::SymbolNotFound { .. }))
        ));
    }
}
