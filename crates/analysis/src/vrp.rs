//! Volatility risk premium: implied move over historical mean move.

use chrono::{DateTime, Utc};
use ivcrush_core::config::VrpThresholds;
use ivcrush_core::error::{AnalysisError, Result};
use ivcrush_core::types::VrpTier;
use serde::{Deserialize, Serialize};

/// VRP ratio with its tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VrpResult {
    pub ticker: String,
    pub implied_move_pct: f64,
    pub historical_mean_pct: f64,
    /// `implied_move_pct / historical_mean_pct`.
    pub ratio: f64,
    pub tier: VrpTier,
    /// `max(0, 1 - 1/ratio)` in [0, 1): zero at or below parity, strictly
    /// increasing above it. Used for ranking across tickers only.
    pub edge_score: f64,
    pub computed_at: DateTime<Utc>,
}

/// Maps a ratio onto a tier. Cutoffs are inclusive lower bounds.
#[must_use]
pub fn tier_for(ratio: f64, thresholds: &VrpThresholds) -> VrpTier {
    if ratio >= thresholds.excellent {
        VrpTier::Excellent
    } else if ratio >= thresholds.good {
        VrpTier::Good
    } else if ratio >= thresholds.marginal {
        VrpTier::Marginal
    } else {
        VrpTier::Skip
    }
}

/// Bounded monotone transform of the ratio.
#[must_use]
pub fn edge_score(ratio: f64) -> f64 {
    if ratio.is_nan() || ratio <= 1.0 {
        return 0.0;
    }
    1.0 - 1.0 / ratio
}

/// Computes the VRP for one event.
///
/// # Errors
/// - `NonPositiveHistoricalMean` if the historical mean is zero or negative.
/// - `InvalidInput` if the implied move is negative or not finite.
pub fn calculate(
    ticker: &str,
    implied_move_pct: f64,
    historical_mean_pct: f64,
    thresholds: &VrpThresholds,
) -> Result<VrpResult> {
    if historical_mean_pct.is_nan() || historical_mean_pct <= 0.0 {
        tracing::warn!(ticker, historical_mean_pct, "Non-positive historical mean move");
        return Err(AnalysisError::NonPositiveHistoricalMean {
            ticker: ticker.to_string(),
            mean_pct: historical_mean_pct,
        });
    }
    if !implied_move_pct.is_finite() || implied_move_pct < 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "{ticker}: implied move must be a non-negative number, got {implied_move_pct}"
        )));
    }

    let ratio = implied_move_pct / historical_mean_pct;
    let tier = tier_for(ratio, thresholds);

    tracing::info!(ticker, ratio, %tier, "VRP computed");

    Ok(VrpResult {
        ticker: ticker.to_string(),
        implied_move_pct,
        historical_mean_pct,
        ratio,
        tier,
        edge_score: edge_score(ratio),
        computed_at: Utc::now(),
    })
}
