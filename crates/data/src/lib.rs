//! Market-data boundary for the analysis pipeline.
//!
//! Upstream calls are wrapped in [`retry`] and a per-source
//! [`circuit_breaker`]; results are kept in a [`cache::TwoTierCache`].
//! [`gateway::MarketDataGateway`] composes the three, and
//! [`session::AnalysisSession`] owns one gateway for the life of a session.

pub mod cache;
pub mod circuit_breaker;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod repositories;
pub mod retry;
pub mod session;

pub use cache::{CacheKind, CacheStats, MemoryCache, PersistentStore, SqliteStore, TwoTierCache};
pub use circuit_breaker::{BreakerConfig, BreakerRegistry, BreakerState, CircuitBreaker};
pub use error::{CacheError, ProviderError, ResilienceError};
pub use gateway::{GatewayResult, MarketDataGateway};
pub use provider::{HistoricalMovesRepository, MarketDataProvider};
pub use repositories::{CsvMoveRepository, InMemoryMoveRepository};
pub use retry::{retry, RetryPolicy, Retryable};
pub use session::{AnalysisSession, SessionConfig, SessionError};
