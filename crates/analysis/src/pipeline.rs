//! Single-event analysis: the one entry point callers use per ticker.

use chrono::NaiveDate;
use ivcrush_core::config::ScoringConfig;
use ivcrush_core::error::{AnalysisError, Result};
use ivcrush_core::types::{HistoricalMove, OptionChainSnapshot};
use serde::{Deserialize, Serialize};

use crate::consistency::{self, ConsistencyAnalysis};
use crate::implied_move::{self, ImpliedMove};
use crate::sizing::{size_position, PositionSize, SizingInputs};
use crate::skew::{self, SkewAnalysis};
use crate::strategy::{self, StrategyCandidate};
use crate::vrp::{self, VrpResult};

/// Everything derived for one ticker/earnings event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub ticker: String,
    pub earnings_date: NaiveDate,
    /// Expiration the event was priced from.
    pub expiration: NaiveDate,
    /// Name of the scoring config used.
    pub config_name: String,
    pub implied_move: ImpliedMove,
    pub skew: SkewAnalysis,
    pub consistency: ConsistencyAnalysis,
    pub vrp: VrpResult,
    /// Candidates, primary first; empty when the tier is `Skip`.
    pub strategies: Vec<StrategyCandidate>,
    /// Sizing of the primary candidate; `None` when there is nothing to trade.
    pub position: Option<PositionSize>,
}

impl AnalysisResult {
    #[must_use]
    pub fn primary_strategy(&self) -> Option<&StrategyCandidate> {
        self.strategies.first()
    }

    /// Whether the result recommends putting capital at risk.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.position.as_ref().is_some_and(|p| !p.is_zero())
    }
}

/// Analyzes one earnings event.
///
/// Only history dated strictly before `earnings_date` is used. The event is
/// priced from the first expiration on or after the earnings date.
///
/// # Errors
/// Any component failure, unchanged: input insufficiency (chain, history,
/// strikes), data defects (duplicate history, non-positive mean), or invalid
/// input (ticker/chain mismatch, non-positive spot).
pub fn analyze(
    ticker: &str,
    earnings_date: NaiveDate,
    chain: &OptionChainSnapshot,
    history: &[HistoricalMove],
    config: &ScoringConfig,
) -> Result<AnalysisResult> {
    if !chain.symbol.eq_ignore_ascii_case(ticker) {
        return Err(AnalysisError::InvalidInput(format!(
            "chain is for {} but analysis requested {ticker}",
            chain.symbol
        )));
    }

    let expiration = chain.nearest_expiration_after(earnings_date).ok_or_else(|| {
        AnalysisError::insufficient_chain(ticker, format!("no expiration on or after {earnings_date}"))
    })?;

    let prior: Vec<HistoricalMove> = history
        .iter()
        .filter(|m| m.earnings_date < earnings_date)
        .cloned()
        .collect();

    let implied_move = implied_move::calculate(chain, expiration, chain.spot)?;
    let skew = skew::analyze(chain, expiration, &config.skew)?;
    let consistency = consistency::analyze(ticker, &prior, &config.consistency)?;
    let vrp = vrp::calculate(
        ticker,
        implied_move.implied_move_pct,
        consistency.weighted_mean_pct,
        &config.vrp,
    )?;
    let strategies = strategy::generate(chain, expiration, vrp.tier, &skew, &config.strategy)?;

    let position = strategies.first().map(|primary| {
        let inputs = SizingInputs::from_analysis(&vrp, &consistency, Some(primary));
        size_position(&inputs, &config.sizing)
    });

    tracing::info!(
        ticker,
        %earnings_date,
        config = %config.name,
        implied_move = implied_move.implied_move_pct,
        ratio = vrp.ratio,
        tier = %vrp.tier,
        bias = %skew.directional_bias,
        strategy = ?strategies.first().map(|s| s.strategy_type),
        size = position.as_ref().map_or(0.0, |p| p.position_size_pct),
        "Analysis complete"
    );

    Ok(AnalysisResult {
        ticker: ticker.to_string(),
        earnings_date,
        expiration,
        config_name: config.name.clone(),
        implied_move,
        skew,
        consistency,
        vrp,
        strategies,
        position,
    })
}
