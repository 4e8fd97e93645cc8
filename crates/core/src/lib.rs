//! Shared domain types, scoring configuration and math for earnings
//! volatility analysis.

pub mod bias;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod kelly;
pub mod stats;
pub mod traits;
pub mod types;

pub use bias::{BiasFamily, BiasStrength, DirectionalBias, ParseBiasError};
pub use config::{
    ConfigError, ConsistencyConfig, ScoringConfig, ScoringConfigSet, SizingConfig, SkewConfig,
    StrategyConfig, VrpThresholds,
};
pub use config_loader::ConfigLoader;
pub use error::{AnalysisError, ErrorCategory};
pub use kelly::{kelly_estimate, kelly_fraction, KellyEstimate, KellyReason};
pub use traits::{InMemoryMoveHistory, MoveHistory};
pub use types::{
    validate_history, HistoricalMove, MoveDirection, OptionChainSnapshot, OptionQuote, OptionType,
    VrpTier,
};
