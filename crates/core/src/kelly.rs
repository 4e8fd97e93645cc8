//! Kelly Criterion for premium-selling trades.
//!
//! A credit trade wins a fixed fraction `b` of the capital it risks with
//! probability `p` and loses the risked capital otherwise, so the growth-optimal
//! fraction is:
//! ```text
//! f* = (p*b - (1 - p)) / b
//! ```
//! Fractional Kelly scales `f*` down to trade growth for lower variance.

use serde::{Deserialize, Serialize};

/// Why a Kelly estimate came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KellyReason {
    /// Positive growth-optimal fraction.
    PositiveEdge,
    /// Expected value is zero or negative; do not trade.
    NegativeEv,
    /// Probability outside [0, 1] or non-positive odds.
    InvalidInputs,
}

/// Result of a Kelly calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KellyEstimate {
    /// Full Kelly fraction, may be negative when the edge is negative.
    pub full_fraction: f64,
    /// `max(full_fraction, 0) * multiplier`.
    pub fractional: f64,
    /// Expected value per unit risked: `p*b - (1 - p)`.
    pub expected_value: f64,
    pub reason: KellyReason,
}

/// Full Kelly fraction for win probability `p` and payoff odds `b`.
///
/// Returns `None` for invalid inputs.
///
/// # Examples
/// ```
/// use ivcrush_core::kelly::kelly_fraction;
///
/// // 60% to win even money: f* = 0.2
/// let f = kelly_fraction(0.6, 1.0).unwrap();
/// assert!((f - 0.2).abs() < 1e-12);
/// ```
#[must_use]
pub fn kelly_fraction(win_prob: f64, payoff_odds: f64) -> Option<f64> {
    if !(0.0..=1.0).contains(&win_prob) || !payoff_odds.is_finite() || payoff_odds <= 0.0 {
        return None;
    }
    Some((win_prob * payoff_odds - (1.0 - win_prob)) / payoff_odds)
}

/// Computes full and fractional Kelly.
#[must_use]
pub fn kelly_estimate(win_prob: f64, payoff_odds: f64, multiplier: f64) -> KellyEstimate {
    let Some(full_fraction) = kelly_fraction(win_prob, payoff_odds) else {
        return KellyEstimate {
            full_fraction: 0.0,
            fractional: 0.0,
            expected_value: 0.0,
            reason: KellyReason::InvalidInputs,
        };
    };

    let expected_value = win_prob * payoff_odds - (1.0 - win_prob);
    if expected_value <= 0.0 {
        return KellyEstimate {
            full_fraction,
            fractional: 0.0,
            expected_value,
            reason: KellyReason::NegativeEv,
        };
    }

    KellyEstimate {
        full_fraction,
        fractional: full_fraction * multiplier.max(0.0),
        expected_value,
        reason: KellyReason::PositiveEdge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================
    // Kelly Formula Tests
    // ============================================

    #[test]
    fn even_money_sixty_percent() {
        let f = kelly_fraction(0.6, 1.0).unwrap();
        assert!((f - 0.2).abs() < 1e-12);
    }

    #[test]
    fn credit_spread_odds() {
        // Collect 1.5 to risk 3.5 (b = 0.4286) with 80% win rate:
        // f* = (0.8 * 0.4286 - 0.2) / 0.4286 = 0.3333
        let b = 1.5 / 3.5;
        let f = kelly_fraction(0.8, b).unwrap();
        assert!((f - (0.8 * b - 0.2) / b).abs() < 1e-12);
        assert!(f > 0.33 && f < 0.34);
    }

    #[test]
    fn breakeven_is_zero() {
        // p = 1 / (1 + b) is breakeven
        let b = 0.5;
        let f = kelly_fraction(1.0 / (1.0 + b), b).unwrap();
        assert!(f.abs() < 1e-12);
    }

    #[test]
    fn invalid_inputs_return_none() {
        assert!(kelly_fraction(-0.1, 1.0).is_none());
        assert!(kelly_fraction(1.1, 1.0).is_none());
        assert!(kelly_fraction(0.6, 0.0).is_none());
        assert!(kelly_fraction(0.6, f64::NAN).is_none());
    }

    // ============================================
    // Fractional Kelly Tests
    // ============================================

    #[test]
    fn quarter_kelly_scales_full() {
        let est = kelly_estimate(0.7, 1.0, 0.25);
        assert_eq!(est.reason, KellyReason::PositiveEdge);
        assert!((est.full_fraction - 0.4).abs() < 1e-12);
        assert!((est.fractional - 0.1).abs() < 1e-12);
    }

    #[test]
    fn negative_edge_sizes_zero() {
        let est = kelly_estimate(0.4, 1.0, 0.25);
        assert_eq!(est.reason, KellyReason::NegativeEv);
        assert!(est.full_fraction < 0.0);
        assert_eq!(est.fractional, 0.0);
    }

    #[test]
    fn invalid_estimate_sizes_zero() {
        let est = kelly_estimate(0.6, -1.0, 0.25);
        assert_eq!(est.reason, KellyReason::InvalidInputs);
        assert_eq!(est.fractional, 0.0);
    }

    #[test]
    fn fraction_increases_with_probability() {
        let low = kelly_fraction(0.6, 0.5).unwrap();
        let high = kelly_fraction(0.8, 0.5).unwrap();
        assert!(high > low);
    }
}
