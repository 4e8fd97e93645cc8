//! Fractional-Kelly position sizing with hard risk caps.
//!
//! Sizing takes the Kelly fraction for the trade's win probability and
//! payoff odds, scales it by the fractional multiplier, then applies the
//! position cap and the max-loss cap in that order. A low-confidence setup is
//! sized to zero. At portfolio level, positions are scaled proportionally
//! when their sum exceeds the total exposure cap.

use ivcrush_core::config::SizingConfig;
use ivcrush_core::kelly::{kelly_estimate, KellyReason};
use serde::{Deserialize, Serialize};

use crate::consistency::ConsistencyAnalysis;
use crate::strategy::StrategyCandidate;
use crate::vrp::VrpResult;

/// Why a position ended up at its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizingReason {
    /// Fractional Kelly taken as is.
    Kelly,
    /// Reduced to the per-position cap.
    PositionCap,
    /// Reduced so that the worst case stays within the max-loss cap.
    MaxLossCap,
    /// Confidence below the minimum; not traded.
    LowConfidence,
    /// Kelly fraction is zero or negative.
    NoEdge,
    /// Scaled down with the rest of the portfolio.
    PortfolioScaled,
}

/// Quantities sizing depends on, lifted out of the analysis results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingInputs {
    /// Consistency score; also the sizing confidence.
    pub consistency_score: f64,
    pub edge_score: f64,
    /// Credit over max loss of the chosen candidate.
    pub payoff_odds: Option<f64>,
    /// Max loss as a fraction of committed capital; `None` treats the whole
    /// position as at risk.
    pub max_loss_per_unit: Option<f64>,
    /// Observed win rate, used instead of the model when supplied.
    pub empirical_win_rate: Option<f64>,
}

impl SizingInputs {
    #[must_use]
    pub fn from_analysis(
        vrp: &VrpResult,
        consistency: &ConsistencyAnalysis,
        candidate: Option<&StrategyCandidate>,
    ) -> Self {
        Self {
            consistency_score: consistency.consistency_score,
            edge_score: vrp.edge_score,
            payoff_odds: candidate.and_then(StrategyCandidate::payoff_odds),
            max_loss_per_unit: candidate.and_then(StrategyCandidate::max_loss_per_unit),
            empirical_win_rate: None,
        }
    }

    #[must_use]
    pub fn with_empirical_win_rate(mut self, win_rate: f64) -> Self {
        self.empirical_win_rate = Some(win_rate);
        self
    }
}

/// Sized allocation for one trade. Fractions are of account equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    pub win_probability: f64,
    pub payoff_odds: f64,
    /// Full Kelly fraction (may be negative).
    pub kelly_fraction: f64,
    /// Kelly times the fractional multiplier, floored at zero.
    pub recommended_fraction: f64,
    pub position_size_pct: f64,
    /// Worst-case loss of the position.
    pub max_loss_pct: f64,
    pub confidence: f64,
    /// True when a cap or the confidence floor cut the recommendation.
    pub risk_adjusted: bool,
    pub reason: SizingReason,
}

impl PositionSize {
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.position_size_pct <= 0.0
    }
}

/// Win probability from the model or the empirical rate, capped.
#[must_use]
pub fn win_probability(inputs: &SizingInputs, config: &SizingConfig) -> f64 {
    let modelled = inputs.empirical_win_rate.unwrap_or_else(|| {
        config.base_win_probability
            + config.consistency_weight * inputs.consistency_score.clamp(0.0, 1.0)
            + config.edge_weight * inputs.edge_score.clamp(0.0, 1.0)
    });
    modelled.clamp(0.0, config.max_win_probability)
}

/// Sizes one position.
#[must_use]
pub fn size_position(inputs: &SizingInputs, config: &SizingConfig) -> PositionSize {
    let p = win_probability(inputs, config);
    let b = inputs
        .payoff_odds
        .filter(|b| b.is_finite() && *b > 0.0)
        .unwrap_or(config.default_payoff_odds);
    let kelly = kelly_estimate(p, b, config.fractional_kelly);
    let loss_per_unit = inputs
        .max_loss_per_unit
        .filter(|l| l.is_finite() && *l > 0.0)
        .unwrap_or(1.0)
        .min(1.0);
    let confidence = inputs.consistency_score;

    let zero = |reason: SizingReason, risk_adjusted: bool| PositionSize {
        win_probability: p,
        payoff_odds: b,
        kelly_fraction: kelly.full_fraction,
        recommended_fraction: kelly.fractional,
        position_size_pct: 0.0,
        max_loss_pct: 0.0,
        confidence,
        risk_adjusted,
        reason,
    };

    if confidence < config.min_confidence {
        tracing::debug!(confidence, min = config.min_confidence, "Confidence below floor, not sizing");
        return zero(SizingReason::LowConfidence, true);
    }
    if kelly.reason != KellyReason::PositiveEdge {
        return zero(SizingReason::NoEdge, false);
    }

    let recommended = kelly.fractional;
    let mut size = recommended;
    let mut reason = SizingReason::Kelly;

    if size > config.max_position_pct {
        size = config.max_position_pct;
        reason = SizingReason::PositionCap;
    }
    if size * loss_per_unit > config.max_loss_pct {
        size = config.max_loss_pct / loss_per_unit;
        reason = SizingReason::MaxLossCap;
    }

    let risk_adjusted = size < recommended;
    if risk_adjusted {
        tracing::debug!(recommended, size, ?reason, "Position capped");
    }

    PositionSize {
        win_probability: p,
        payoff_odds: b,
        kelly_fraction: kelly.full_fraction,
        recommended_fraction: recommended,
        position_size_pct: size,
        max_loss_pct: size * loss_per_unit,
        confidence,
        risk_adjusted,
        reason,
    }
}

/// Sizes a set of positions against the total exposure cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAllocation {
    pub positions: Vec<PositionSize>,
    pub total_exposure_pct: f64,
    /// Multiplier applied to every position, 1.0 when nothing was scaled.
    pub scale_factor: f64,
}

impl PortfolioAllocation {
    #[must_use]
    pub fn was_scaled(&self) -> bool {
        self.scale_factor < 1.0
    }
}

/// Scales all positions proportionally if their sum exceeds the exposure cap.
#[must_use]
pub fn allocate_portfolio(mut positions: Vec<PositionSize>, config: &SizingConfig) -> PortfolioAllocation {
    let total: f64 = positions.iter().map(|p| p.position_size_pct).sum();
    if total <= config.max_total_exposure_pct || total <= 0.0 {
        return PortfolioAllocation {
            positions,
            total_exposure_pct: total,
            scale_factor: 1.0,
        };
    }

    let scale_factor = config.max_total_exposure_pct / total;
    for p in positions.iter_mut().filter(|p| !p.is_zero()) {
        p.position_size_pct *= scale_factor;
        p.max_loss_pct *= scale_factor;
        p.risk_adjusted = true;
        p.reason = SizingReason::PortfolioScaled;
    }
    let total_exposure_pct = positions.iter().map(|p| p.position_size_pct).sum();

    tracing::info!(
        positions = positions.len(),
        requested = total,
        cap = config.max_total_exposure_pct,
        scale_factor,
        "Portfolio exposure scaled"
    );

    PortfolioAllocation {
        positions,
        total_exposure_pct,
        scale_factor,
    }
}
