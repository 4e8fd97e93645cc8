//! Earnings volatility analysis.
//!
//! One ticker/earnings event flows through:
//! implied move + skew + consistency → VRP → strategy → sizing.
//! [`analyze`] runs the whole chain; [`analyze_batch`] fans it out over a
//! bounded pool of tasks.

pub mod batch;
pub mod consistency;
pub mod implied_move;
pub mod pipeline;
pub mod sizing;
pub mod skew;
pub mod strategy;
pub mod vrp;

pub use batch::{analyze_batch, AnalysisRequest, BatchFailure, BatchReport};
pub use consistency::ConsistencyAnalysis;
pub use implied_move::ImpliedMove;
pub use pipeline::{analyze, AnalysisResult};
pub use sizing::{PortfolioAllocation, PositionSize, SizingReason};
pub use skew::SkewAnalysis;
pub use strategy::{OptionLeg, StrategyCandidate, StrategyType};
pub use vrp::VrpResult;
