//! Historical replay and walk-forward validation of earnings VRP scoring.

pub mod costs;
pub mod engine;
pub mod events;
pub mod metrics;
pub mod trade;
pub mod walk_forward;

pub use costs::{CostModel, PnlBreakdown, TradeCosts};
pub use engine::BacktestEngine;
pub use events::{load_events, read_events, write_trades, EventRecord};
pub use metrics::{BacktestMetrics, BacktestResult};
pub use trade::{
    BacktestEvent, MarketSnapshot, SimulatedTrade, SkipReason, SkippedEvent, TradeOutcome,
};
pub use walk_forward::{
    generate_windows, ConfigRanking, DateRange, OverfittingRisk, PerformanceDegradation,
    WalkForwardError, WalkForwardParams, WalkForwardRunner, WalkForwardSummary, WalkForwardWindow,
    WindowResult,
};
