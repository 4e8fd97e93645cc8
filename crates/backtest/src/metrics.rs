//! Performance metrics over a set of simulated trades.

use ivcrush_core::stats::{mean, sharpe_ratio, wilson_ci};
use serde::{Deserialize, Serialize};

use crate::trade::{SimulatedTrade, SkippedEvent, TradeOutcome};

/// Aggregate statistics for one run. P&L figures are percent of spot per
/// trade, summed or averaged as named; the `equity_` figures weight each
/// trade by its allocated position and are percent of equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    // Counts
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub scratches: usize,

    // Win rate
    /// Wins over wins plus losses.
    pub win_rate: f64,
    /// Wilson 95% interval on the win rate.
    pub wilson_ci_lower: f64,
    pub wilson_ci_upper: f64,

    // P&L
    pub total_pnl: f64,
    pub avg_pnl: f64,
    pub avg_win: f64,
    /// Mean of losing trades, a negative number.
    pub avg_loss: f64,
    /// Gross profit over gross loss; `None` without losses.
    pub profit_factor: Option<f64>,
    /// Per-trade Sharpe ratio, not annualised.
    pub sharpe_ratio: f64,

    // Risk
    /// Largest peak-to-trough fall of cumulative P&L.
    pub max_drawdown: f64,
    pub max_consecutive_losses: usize,

    // Sized
    pub equity_pnl: f64,
    pub equity_sharpe: f64,
    pub equity_max_drawdown: f64,
}

impl BacktestMetrics {
    /// Computes metrics over trades, taken in the order given.
    #[must_use]
    pub fn from_trades(trades: &[SimulatedTrade]) -> Self {
        if trades.is_empty() {
            return Self::empty();
        }

        let count = |o: TradeOutcome| trades.iter().filter(|t| t.outcome == o).count();
        let wins = count(TradeOutcome::Win);
        let losses = count(TradeOutcome::Loss);
        let scratches = count(TradeOutcome::Scratch);

        let decided = wins + losses;
        let win_rate = if decided > 0 {
            wins as f64 / decided as f64
        } else {
            0.0
        };
        let (wilson_ci_lower, wilson_ci_upper) = wilson_ci(wins, decided, 1.96);

        let pnls: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();
        let win_pnls: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
        let loss_pnls: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).collect();

        let equity: Vec<f64> = trades.iter().map(SimulatedTrade::equity_pnl_pct).collect();

        let gross_profit: f64 = win_pnls.iter().sum();
        let gross_loss: f64 = -loss_pnls.iter().sum::<f64>();
        let profit_factor = (gross_loss > 0.0).then(|| gross_profit / gross_loss);

        Self {
            total_trades: trades.len(),
            wins,
            losses,
            scratches,
            win_rate,
            wilson_ci_lower,
            wilson_ci_upper,
            total_pnl: pnls.iter().sum(),
            avg_pnl: mean(&pnls),
            avg_win: mean(&win_pnls),
            avg_loss: mean(&loss_pnls),
            profit_factor,
            sharpe_ratio: sharpe_ratio(&pnls),
            max_drawdown: max_drawdown(&pnls),
            max_consecutive_losses: max_consecutive_losses(trades),
            equity_pnl: equity.iter().sum(),
            equity_sharpe: sharpe_ratio(&equity),
            equity_max_drawdown: max_drawdown(&equity),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            total_trades: 0,
            wins: 0,
            losses: 0,
            scratches: 0,
            win_rate: 0.0,
            wilson_ci_lower: 0.0,
            wilson_ci_upper: 0.0,
            total_pnl: 0.0,
            avg_pnl: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            profit_factor: None,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            max_consecutive_losses: 0,
            equity_pnl: 0.0,
            equity_sharpe: 0.0,
            equity_max_drawdown: 0.0,
        }
    }

    /// True when the lower Wilson bound clears a coin flip.
    #[must_use]
    pub fn has_edge(&self) -> bool {
        self.wilson_ci_lower > 0.5
    }
}

fn max_drawdown(pnls: &[f64]) -> f64 {
    let mut equity = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut worst = 0.0_f64;
    for pnl in pnls {
        equity += pnl;
        peak = peak.max(equity);
        worst = worst.max(peak - equity);
    }
    worst
}

fn max_consecutive_losses(trades: &[SimulatedTrade]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for trade in trades {
        match trade.outcome {
            TradeOutcome::Loss => {
                current += 1;
                longest = longest.max(current);
            }
            TradeOutcome::Win => current = 0,
            TradeOutcome::Scratch => {}
        }
    }
    longest
}

/// One config replayed over one set of events.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub config_name: String,
    /// Trades in chronological order.
    pub trades: Vec<SimulatedTrade>,
    pub skipped: Vec<SkippedEvent>,
    pub metrics: BacktestMetrics,
}

impl BacktestResult {
    #[must_use]
    pub fn new(
        config_name: impl Into<String>,
        trades: Vec<SimulatedTrade>,
        skipped: Vec<SkippedEvent>,
    ) -> Self {
        let metrics = BacktestMetrics::from_trades(&trades);
        Self {
            config_name: config_name.into(),
            trades,
            skipped,
            metrics,
        }
    }

    /// Events dropped for insufficient or defective inputs.
    #[must_use]
    pub fn excluded_count(&self) -> usize {
        self.skipped.iter().filter(|s| s.reason.is_excluded()).count()
    }

    /// Events the scoring declined to trade.
    #[must_use]
    pub fn filtered_count(&self) -> usize {
        self.skipped.len() - self.excluded_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::TradeCosts;
    use chrono::NaiveDate;
    use ivcrush_core::error::AnalysisError;
    use ivcrush_core::types::VrpTier;

    use crate::trade::SkipReason;

    fn trade(day: u32, pnl: f64) -> SimulatedTrade {
        sized(day, pnl, 0.02)
    }

    fn sized(day: u32, pnl: f64, position_size_pct: f64) -> SimulatedTrade {
        SimulatedTrade {
            ticker: "AAPL".to_string(),
            earnings_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            config_name: "canonical".to_string(),
            tier: VrpTier::Good,
            vrp_ratio: 4.5,
            implied_move_pct: 6.0,
            actual_move_pct: 6.0 - pnl,
            costs: TradeCosts::default(),
            naive_pnl_pct: pnl,
            pnl_pct: pnl,
            position_size_pct,
            outcome: TradeOutcome::from_pnl(pnl),
        }
    }

    // ============================================================
    // BacktestMetrics
    // ============================================================

    #[test]
    fn empty_trades_give_empty_metrics() {
        assert_eq!(BacktestMetrics::from_trades(&[]), BacktestMetrics::empty());
    }

    #[test]
    fn counts_and_averages() {
        let trades = vec![trade(1, 2.0), trade(2, -1.0), trade(3, 3.0), trade(4, 0.0)];
        let m = BacktestMetrics::from_trades(&trades);

        assert_eq!(m.total_trades, 4);
        assert_eq!((m.wins, m.losses, m.scratches), (2, 1, 1));
        assert!((m.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.total_pnl - 4.0).abs() < 1e-12);
        assert!((m.avg_win - 2.5).abs() < 1e-12);
        assert!((m.avg_loss + 1.0).abs() < 1e-12);
        assert_eq!(m.profit_factor, Some(5.0));
    }

    #[test]
    fn no_losses_means_no_profit_factor() {
        let m = BacktestMetrics::from_trades(&[trade(1, 1.0), trade(2, 2.0)]);
        assert_eq!(m.profit_factor, None);
        assert_eq!(m.max_drawdown, 0.0);
    }

    #[test]
    fn drawdown_is_peak_to_trough() {
        // equity: 3, 1, 2, -1, 4
        let trades = vec![
            trade(1, 3.0),
            trade(2, -2.0),
            trade(3, 1.0),
            trade(4, -3.0),
            trade(5, 5.0),
        ];
        let m = BacktestMetrics::from_trades(&trades);
        assert!((m.max_drawdown - 4.0).abs() < 1e-12);
    }

    #[test]
    fn scratches_do_not_break_loss_streaks() {
        let trades = vec![
            trade(1, -1.0),
            trade(2, 0.0),
            trade(3, -1.0),
            trade(4, 1.0),
            trade(5, -1.0),
        ];
        assert_eq!(BacktestMetrics::from_trades(&trades).max_consecutive_losses, 2);
    }

    #[test]
    fn equity_figures_weight_by_position() {
        // a large losing position outweighs two small winners
        let trades = vec![sized(1, 4.0, 0.01), sized(2, -2.0, 0.05), sized(3, 4.0, 0.01)];
        let m = BacktestMetrics::from_trades(&trades);

        assert!((m.total_pnl - 6.0).abs() < 1e-12);
        assert!((m.equity_pnl + 0.02).abs() < 1e-12);
        assert!((m.equity_max_drawdown - 0.1).abs() < 1e-12);
        assert!(m.sharpe_ratio > 0.0);
        assert!(m.equity_sharpe < 0.0);
    }

    #[test]
    fn sharpe_is_zero_for_single_trade() {
        assert_eq!(BacktestMetrics::from_trades(&[trade(1, 2.0)]).sharpe_ratio, 0.0);
    }

    // ============================================================
    // BacktestResult
    // ============================================================

    #[test]
    fn result_splits_excluded_from_filtered() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let skip = |reason| SkippedEvent {
            ticker: "AAPL".to_string(),
            earnings_date: date,
            reason,
        };
        let result = BacktestResult::new(
            "canonical",
            vec![trade(2, 1.0)],
            vec![
                skip(SkipReason::Excluded(AnalysisError::insufficient_history("AAPL", 2, 0))),
                skip(SkipReason::NotTradeable(VrpTier::Skip)),
                skip(SkipReason::ZeroSize),
            ],
        );
        assert_eq!(result.excluded_count(), 1);
        assert_eq!(result.filtered_count(), 2);
        assert_eq!(result.metrics.total_trades, 1);
    }
}
