//! Time-weighted statistics of realised earnings moves.
//!
//! Quarter `i` back (0 = most recent) gets weight `decay_base^i`. The score
//! is `1 / (1 + CV)` where CV is the weighted coefficient of variation of
//! `|close_move_pct|`, so a stock that moves by the same amount every quarter
//! scores close to 1.

use ivcrush_core::config::ConsistencyConfig;
use ivcrush_core::error::{AnalysisError, Result};
use ivcrush_core::stats::{mean, weighted_moments};
use ivcrush_core::types::{validate_history, HistoricalMove, MoveDirection};
use serde::{Deserialize, Serialize};

/// Recent quarters versus older quarters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoveTrend {
    /// Recent moves at least 20% larger than older ones.
    Expanding,
    /// Recent moves at least 20% smaller.
    Contracting,
    Stable,
}

/// Weighted historical move statistics for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyAnalysis {
    pub ticker: String,
    pub quarters_used: usize,
    /// Weighted mean of absolute close moves, in percent.
    pub weighted_mean_pct: f64,
    pub weighted_std_pct: f64,
    /// `weighted_std / weighted_mean`, 0 when the mean is not positive.
    pub coefficient_of_variation: f64,
    /// In [0, 1]; higher is more repeatable.
    pub consistency_score: f64,
    pub simple_mean_pct: f64,
    pub max_move_pct: f64,
    /// Fraction of quarters that closed up.
    pub up_ratio: f64,
    pub trend: MoveTrend,
}

/// Analyzes up to `max_quarters` of history.
///
/// Input order does not matter; moves are ranked by date, most recent first.
///
/// # Errors
/// - `DuplicateHistory` if an event appears twice.
/// - `InsufficientHistory` with fewer than `min_quarters` moves.
pub fn analyze(
    ticker: &str,
    moves: &[HistoricalMove],
    config: &ConsistencyConfig,
) -> Result<ConsistencyAnalysis> {
    validate_history(moves)?;

    let mut ordered: Vec<&HistoricalMove> = moves.iter().collect();
    ordered.sort_by(|a, b| b.earnings_date.cmp(&a.earnings_date));
    ordered.truncate(config.max_quarters);

    let required = config.min_quarters.max(1);
    if ordered.len() < required {
        return Err(AnalysisError::insufficient_history(
            ticker,
            required,
            ordered.len(),
        ));
    }

    let magnitudes: Vec<f64> = ordered.iter().map(|m| m.abs_close_move_pct()).collect();
    let weights: Vec<f64> = (0..magnitudes.len())
        .map(|i| config.decay_base.powi(i as i32))
        .collect();

    let (weighted_mean_pct, weighted_std_pct) = weighted_moments(&magnitudes, &weights)
        .ok_or_else(|| AnalysisError::InvalidInput(format!("{ticker}: zero total weight")))?;

    let (coefficient_of_variation, consistency_score) = if weighted_mean_pct > 0.0 {
        let cv = weighted_std_pct / weighted_mean_pct;
        (cv, 1.0 / (1.0 + cv))
    } else {
        (0.0, 0.0)
    };

    let ups = ordered
        .iter()
        .filter(|m| m.direction == MoveDirection::Up)
        .count();

    let analysis = ConsistencyAnalysis {
        ticker: ticker.to_string(),
        quarters_used: magnitudes.len(),
        weighted_mean_pct,
        weighted_std_pct,
        coefficient_of_variation,
        consistency_score,
        simple_mean_pct: mean(&magnitudes),
        max_move_pct: magnitudes.iter().copied().fold(0.0, f64::max),
        up_ratio: ups as f64 / magnitudes.len() as f64,
        trend: trend(&magnitudes),
    };

    tracing::debug!(
        ticker,
        quarters = analysis.quarters_used,
        weighted_mean = analysis.weighted_mean_pct,
        score = analysis.consistency_score,
        "Consistency computed"
    );

    Ok(analysis)
}

fn trend(magnitudes_recent_first: &[f64]) -> MoveTrend {
    if magnitudes_recent_first.len() < 4 {
        return MoveTrend::Stable;
    }
    let half = magnitudes_recent_first.len() / 2;
    let recent = mean(&magnitudes_recent_first[..half]);
    let older = mean(&magnitudes_recent_first[half..]);
    if older <= 0.0 {
        return MoveTrend::Stable;
    }
    match recent / older {
        r if r >= 1.2 => MoveTrend::Expanding,
        r if r <= 0.8 => MoveTrend::Contracting,
        _ => MoveTrend::Stable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{approx, history};

    fn cfg() -> ConsistencyConfig {
        ConsistencyConfig::default()
    }

    #[test]
    fn identical_moves_score_one() {
        let moves = history("AAPL", &[4.0, -4.0, 4.0, -4.0]);
        let a = analyze("AAPL", &moves, &cfg()).unwrap();
        assert!(approx(a.weighted_mean_pct, 4.0, 1e-9));
        assert!(approx(a.weighted_std_pct, 0.0, 1e-9));
        assert!(approx(a.consistency_score, 1.0, 1e-9));
        assert!(approx(a.up_ratio, 0.5, 1e-12));
    }

    #[test]
    fn recent_quarters_weigh_more() {
        // 10% last quarter, 2% before: mean pulled toward 10
        let moves = history("NVDA", &[10.0, 2.0]);
        let a = analyze("NVDA", &moves, &cfg()).unwrap();
        let expected = (10.0 + 0.85 * 2.0) / 1.85;
        assert!(approx(a.weighted_mean_pct, expected, 1e-9));
        assert!(a.weighted_mean_pct > a.simple_mean_pct);
    }

    #[test]
    fn dispersion_lowers_score() {
        let steady = analyze("A", &history("A", &[4.0, 4.5, 3.5, 4.0]), &cfg()).unwrap();
        let erratic = analyze("B", &history("B", &[1.0, 9.0, 0.5, 7.0]), &cfg()).unwrap();
        assert!(steady.consistency_score > erratic.consistency_score);
        assert!(erratic.consistency_score > 0.0 && erratic.consistency_score < 1.0);
    }

    #[test]
    fn input_order_is_irrelevant() {
        let mut moves = history("AAPL", &[5.0, 3.0, 2.0]);
        let forward = analyze("AAPL", &moves, &cfg()).unwrap();
        moves.reverse();
        let reversed = analyze("AAPL", &moves, &cfg()).unwrap();
        assert_eq!(forward, reversed);
    }

    #[test]
    fn lookback_is_capped() {
        let moves = history("AAPL", &[3.0; 16]);
        let a = analyze("AAPL", &moves, &cfg()).unwrap();
        assert_eq!(a.quarters_used, 12);
    }

    #[test]
    fn single_quarter_is_insufficient() {
        let moves = history("AAPL", &[3.0]);
        let err = analyze("AAPL", &moves, &cfg()).unwrap_err();
        assert_eq!(err, AnalysisError::insufficient_history("AAPL", 2, 1));
    }

    #[test]
    fn duplicate_quarter_is_data_defect() {
        let mut moves = history("AAPL", &[3.0, 4.0]);
        moves.push(moves[0].clone());
        let err = analyze("AAPL", &moves, &cfg()).unwrap_err();
        assert!(err.is_data_defect());
    }

    #[test]
    fn flat_history_scores_zero() {
        let moves = history("FLAT", &[0.0, 0.0, 0.0]);
        let a = analyze("FLAT", &moves, &cfg()).unwrap();
        assert_eq!(a.weighted_mean_pct, 0.0);
        assert_eq!(a.consistency_score, 0.0);
    }

    #[test]
    fn trend_reads_recent_against_older() {
        let expanding = analyze("X", &history("X", &[8.0, 7.0, 3.0, 2.0]), &cfg()).unwrap();
        assert_eq!(expanding.trend, MoveTrend::Expanding);
        let contracting = analyze("Y", &history("Y", &[2.0, 2.0, 6.0, 6.0]), &cfg()).unwrap();
        assert_eq!(contracting.trend, MoveTrend::Contracting);
        assert_eq!(contracting.max_move_pct, 6.0);
    }
}
