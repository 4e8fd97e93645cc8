//! Two-tier cache: a bounded in-process tier over an optional persistent
//! store, keyed by logical data type.

mod memory;
mod store;
mod two_tier;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use memory::MemoryCache;
pub use store::{PersistentStore, SqliteStore, StoredEntry};
pub use two_tier::{CacheStats, TwoTierCache};

/// Logical data type of a cached value. Determines TTL and key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    EarningsCalendar,
    IntradayQuote,
    OptionChain,
    Transcript,
    MarketCap,
    HistoricalMoves,
}

impl CacheKind {
    #[must_use]
    pub const fn ttl(self) -> Duration {
        const MINUTE: u64 = 60;
        const HOUR: u64 = 60 * MINUTE;
        match self {
            Self::EarningsCalendar => Duration::from_secs(6 * HOUR),
            Self::IntradayQuote | Self::OptionChain => Duration::from_secs(5 * MINUTE),
            Self::Transcript => Duration::from_secs(7 * 24 * HOUR),
            Self::MarketCap | Self::HistoricalMoves => Duration::from_secs(24 * HOUR),
        }
    }

    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::EarningsCalendar => "earnings",
            Self::IntradayQuote => "quote",
            Self::OptionChain => "chain",
            Self::Transcript => "transcript",
            Self::MarketCap => "mcap",
            Self::HistoricalMoves => "moves",
        }
    }

    /// Store key for `id` under this kind.
    #[must_use]
    pub fn key(self, id: &str) -> String {
        format!("{}:{id}", self.prefix())
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_per_kind() {
        assert_eq!(CacheKind::EarningsCalendar.ttl(), Duration::from_secs(21_600));
        assert_eq!(CacheKind::IntradayQuote.ttl(), Duration::from_secs(300));
        assert_eq!(CacheKind::Transcript.ttl(), Duration::from_secs(604_800));
        assert_eq!(CacheKind::MarketCap.ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(CacheKind::OptionChain.key("AAPL"), "chain:AAPL");
        assert_ne!(CacheKind::MarketCap.key("AAPL"), CacheKind::IntradayQuote.key("AAPL"));
    }
}
