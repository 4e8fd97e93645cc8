//! Cached, resilient access to market data.
//!
//! Every read goes cache → circuit breaker → retry → provider. A cache
//! failure is logged and treated as a miss; it never fails the read.

use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use ivcrush_core::types::{HistoricalMove, OptionChainSnapshot};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{CacheKind, TwoTierCache};
use crate::circuit_breaker::BreakerRegistry;
use crate::error::{ProviderError, ResilienceError};
use crate::provider::{HistoricalMovesRepository, MarketDataProvider};
use crate::retry::{retry, RetryPolicy};

pub type GatewayResult<T> = Result<T, ResilienceError<ProviderError>>;

pub struct MarketDataGateway {
    provider: Arc<dyn MarketDataProvider>,
    moves: Arc<dyn HistoricalMovesRepository>,
    cache: Arc<TwoTierCache>,
    breakers: Arc<BreakerRegistry>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for MarketDataGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataGateway")
            .field("provider", &self.provider.name())
            .field("moves", &self.moves.name())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl MarketDataGateway {
    #[must_use]
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        moves: Arc<dyn HistoricalMovesRepository>,
        cache: Arc<TwoTierCache>,
    ) -> Self {
        Self {
            provider,
            moves,
            cache,
            breakers: Arc::new(BreakerRegistry::default()),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_breakers(mut self, breakers: Arc<BreakerRegistry>) -> Self {
        self.breakers = breakers;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &TwoTierCache {
        &self.cache
    }

    #[must_use]
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Option chain for `symbol`, all expirations when `expiration` is `None`.
    ///
    /// # Errors
    /// `ResilienceError` once retries are exhausted, on a non-retryable
    /// provider error, or while the provider's breaker is open.
    pub async fn option_chain(
        &self,
        symbol: &str,
        expiration: Option<NaiveDate>,
    ) -> GatewayResult<OptionChainSnapshot> {
        let id = match expiration {
            Some(exp) => format!("{symbol}:{exp}"),
            None => format!("{symbol}:all"),
        };
        let provider = &self.provider;
        self.cached_fetch(CacheKind::OptionChain, &id, provider.name(), "option_chain", move || {
            provider.option_chain(symbol, expiration)
        })
        .await
    }

    /// Latest spot price for `symbol`.
    ///
    /// # Errors
    /// As [`Self::option_chain`].
    pub async fn spot_price(&self, symbol: &str) -> GatewayResult<Decimal> {
        let provider = &self.provider;
        self.cached_fetch(CacheKind::IntradayQuote, symbol, provider.name(), "spot_price", move || {
            provider.spot_price(symbol)
        })
        .await
    }

    /// Recorded moves for `ticker`, most recent first.
    ///
    /// # Errors
    /// As [`Self::option_chain`].
    pub async fn historical_moves(&self, ticker: &str) -> GatewayResult<Vec<HistoricalMove>> {
        let moves = &self.moves;
        self.cached_fetch(CacheKind::HistoricalMoves, ticker, moves.name(), "historical_moves", move || {
            moves.moves(ticker)
        })
        .await
    }

    async fn cached_fetch<T, F, Fut>(
        &self,
        kind: CacheKind,
        id: &str,
        source: &str,
        operation: &str,
        op: F,
    ) -> GatewayResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        if let Some(hit) = self.cache_get(kind, id).await {
            return Ok(hit);
        }

        let breaker = self.breakers.get(source);
        let value = breaker.call(|| retry(&self.retry, operation, op)).await?;

        if let Err(e) = self.cache.set(kind, id, &value).await {
            tracing::warn!(kind = %kind, id, error = %e, "Cache write failed");
        }
        Ok(value)
    }

    async fn cache_get<T: DeserializeOwned>(&self, kind: CacheKind, id: &str) -> Option<T> {
        match self.cache.get(kind, id).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(kind = %kind, id, error = %e, "Cache read failed, fetching upstream");
                None
            }
        }
    }
}
