//! Upstream collaborators the analysis pipeline reads from.

use async_trait::async_trait;
use chrono::NaiveDate;
use ivcrush_core::types::{HistoricalMove, OptionChainSnapshot};
use rust_decimal::Decimal;

use crate::error::ProviderError;

/// Source of option chains and spot prices.
///
/// Failures come back as `ProviderError`; retry and circuit breaking are
/// applied by the caller, never by the provider.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Source name; one circuit breaker is kept per name.
    fn name(&self) -> &str;

    /// Chain for `symbol`, restricted to `expiration` when given.
    async fn option_chain(
        &self,
        symbol: &str,
        expiration: Option<NaiveDate>,
    ) -> Result<OptionChainSnapshot, ProviderError>;

    async fn spot_price(&self, symbol: &str) -> Result<Decimal, ProviderError>;
}

/// Read-only source of a ticker's past earnings moves.
#[async_trait]
pub trait HistoricalMovesRepository: Send + Sync {
    fn name(&self) -> &str {
        "historical_moves"
    }

    /// Every recorded move for `ticker`, most recent first.
    async fn moves(&self, ticker: &str) -> Result<Vec<HistoricalMove>, ProviderError>;
}
