//! Replays scored earnings events against their realised outcomes.
//!
//! For each event the engine looks up only the history dated before the
//! announcement, runs the same scoring the live path uses, and, when the
//! result is tradeable and sized above zero, prices a short straddle through
//! the [`CostModel`]. Insufficient or defective inputs skip the event rather
//! than abort the run.

use std::sync::Arc;

use ivcrush_analysis::sizing::{size_position, PositionSize, SizingInputs};
use ivcrush_analysis::{analyze, consistency, vrp};
use ivcrush_core::config::ScoringConfig;
use ivcrush_core::traits::MoveHistory;
use ivcrush_core::types::VrpTier;

use crate::costs::CostModel;
use crate::metrics::BacktestResult;
use crate::trade::{BacktestEvent, MarketSnapshot, SimulatedTrade, SkipReason, SkippedEvent};

/// Scoring outcome the trade decision is made from.
struct EntryDecision {
    tier: VrpTier,
    ratio: f64,
    implied_move_pct: f64,
    spread_pct: Option<f64>,
    position: Option<PositionSize>,
}

/// Per-config replay over a point-in-time move history.
#[derive(Clone)]
pub struct BacktestEngine {
    history: Arc<dyn MoveHistory>,
    costs: CostModel,
}

impl BacktestEngine {
    #[must_use]
    pub fn new(history: Arc<dyn MoveHistory>) -> Self {
        Self {
            history,
            costs: CostModel::default(),
        }
    }

    #[must_use]
    pub fn with_cost_model(mut self, costs: CostModel) -> Self {
        self.costs = costs;
        self
    }

    #[must_use]
    pub fn cost_model(&self) -> &CostModel {
        &self.costs
    }

    /// Replays `events` in chronological order under one config.
    pub fn run<'a, I>(&self, config: &ScoringConfig, events: I) -> BacktestResult
    where
        I: IntoIterator<Item = &'a BacktestEvent>,
    {
        let mut ordered: Vec<&BacktestEvent> = events.into_iter().collect();
        ordered.sort_by(|a, b| {
            (a.earnings_date, &a.ticker).cmp(&(b.earnings_date, &b.ticker))
        });

        let mut trades = Vec::new();
        let mut skipped = Vec::new();
        for event in ordered {
            match self.replay(event, config) {
                Ok(trade) => trades.push(trade),
                Err(reason) => {
                    if reason.is_excluded() {
                        tracing::info!(
                            ticker = %event.ticker,
                            earnings_date = %event.earnings_date,
                            config = %config.name,
                            %reason,
                            "Backtest event excluded"
                        );
                    } else {
                        tracing::debug!(
                            ticker = %event.ticker,
                            earnings_date = %event.earnings_date,
                            config = %config.name,
                            %reason,
                            "Backtest event filtered"
                        );
                    }
                    skipped.push(SkippedEvent {
                        ticker: event.ticker.clone(),
                        earnings_date: event.earnings_date,
                        reason,
                    });
                }
            }
        }

        let result = BacktestResult::new(config.name.clone(), trades, skipped);
        tracing::debug!(
            config = %config.name,
            trades = result.metrics.total_trades,
            excluded = result.excluded_count(),
            filtered = result.filtered_count(),
            total_pnl = result.metrics.total_pnl,
            sharpe = result.metrics.sharpe_ratio,
            equity_sharpe = result.metrics.equity_sharpe,
            "Backtest run complete"
        );
        result
    }

    /// Scores one event and simulates the trade it would have produced.
    ///
    /// # Errors
    /// The [`SkipReason`] when no trade is taken.
    pub fn replay(
        &self,
        event: &BacktestEvent,
        config: &ScoringConfig,
    ) -> Result<SimulatedTrade, SkipReason> {
        let decision = self.decide(event, config).map_err(SkipReason::Excluded)?;

        if !decision.tier.is_tradeable() {
            return Err(SkipReason::NotTradeable(decision.tier));
        }
        let position = match decision.position {
            Some(p) if !p.is_zero() => p,
            _ => return Err(SkipReason::ZeroSize),
        };

        let pnl = self.costs.simulate(
            decision.implied_move_pct,
            event.outcome.close_move_pct,
            decision.spread_pct,
            event.spot,
        );
        Ok(SimulatedTrade::from_breakdown(
            event,
            &config.name,
            decision.tier,
            decision.ratio,
            position.position_size_pct,
            pnl,
        ))
    }

    fn decide(
        &self,
        event: &BacktestEvent,
        config: &ScoringConfig,
    ) -> ivcrush_core::error::Result<EntryDecision> {
        let history = self.history.moves_before(
            &event.ticker,
            event.earnings_date,
            config.consistency.max_quarters,
        );

        match &event.market {
            MarketSnapshot::Chain(chain) => {
                let result = analyze(&event.ticker, event.earnings_date, chain, &history, config)?;
                Ok(EntryDecision {
                    tier: result.vrp.tier,
                    ratio: result.vrp.ratio,
                    implied_move_pct: result.implied_move.implied_move_pct,
                    spread_pct: result.implied_move.spread_pct,
                    position: result.position,
                })
            }
            MarketSnapshot::ImpliedMove {
                implied_move_pct,
                spread_pct,
            } => {
                let consistency = consistency::analyze(&event.ticker, &history, &config.consistency)?;
                let vrp = vrp::calculate(
                    &event.ticker,
                    *implied_move_pct,
                    consistency.weighted_mean_pct,
                    &config.vrp,
                )?;
                let position = vrp.tier.is_tradeable().then(|| {
                    size_position(
                        &SizingInputs::from_analysis(&vrp, &consistency, None),
                        &config.sizing,
                    )
                });
                Ok(EntryDecision {
                    tier: vrp.tier,
                    ratio: vrp.ratio,
                    implied_move_pct: *implied_move_pct,
                    spread_pct: *spread_pct,
                    position,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chain, chain_event, event, move_on, quarterly_history};
    use chrono::NaiveDate;
    use ivcrush_core::error::AnalysisError;
    use ivcrush_core::traits::InMemoryMoveHistory;

    fn engine(ticker: &str, moves: &[f64]) -> BacktestEngine {
        let history = quarterly_history(ticker, NaiveDate::from_ymd_opt(2024, 1, 25).unwrap(), moves);
        BacktestEngine::new(Arc::new(InMemoryMoveHistory::from_moves(history)))
    }

    #[test]
    fn rich_premium_is_traded_and_profits() {
        let engine = engine("AAPL", &[2.0, 2.2, 1.8, 2.0]);
        let e = event("AAPL", NaiveDate::from_ymd_opt(2024, 4, 25).unwrap(), 9.0, 1.5);
        let trade = engine.replay(&e, &ScoringConfig::default()).unwrap();

        assert_eq!(trade.tier, VrpTier::Good);
        assert!(trade.pnl_pct > 0.0);
        assert!(trade.pnl_pct < trade.naive_pnl_pct);
        assert!(trade.position_size_pct > 0.0);
        assert_eq!(trade.actual_move_pct, 1.5);
    }

    #[test]
    fn cheap_premium_is_filtered() {
        let engine = engine("AAPL", &[6.0, 6.0, 6.0, 6.0]);
        let e = event("AAPL", NaiveDate::from_ymd_opt(2024, 4, 25).unwrap(), 5.0, 1.0);
        let reason = engine.replay(&e, &ScoringConfig::default()).unwrap_err();
        assert_eq!(reason, SkipReason::NotTradeable(VrpTier::Skip));
    }

    #[test]
    fn missing_history_is_excluded_not_lost() {
        let engine = engine("AAPL", &[2.0, 2.0]);
        let e = event("MSFT", NaiveDate::from_ymd_opt(2024, 4, 25).unwrap(), 9.0, 20.0);
        let reason = engine.replay(&e, &ScoringConfig::default()).unwrap_err();
        assert_eq!(
            reason,
            SkipReason::Excluded(AnalysisError::insufficient_history("MSFT", 2, 0))
        );
    }

    #[test]
    fn event_own_move_is_not_in_its_history() {
        // the 2024-04-25 row exists in the history but must not be used
        let mut moves = quarterly_history("AAPL", NaiveDate::from_ymd_opt(2024, 1, 25).unwrap(), &[2.0]);
        moves.push(move_on("AAPL", NaiveDate::from_ymd_opt(2024, 4, 25).unwrap(), 2.0));
        let engine = BacktestEngine::new(Arc::new(InMemoryMoveHistory::from_moves(moves)));
        let e = event("AAPL", NaiveDate::from_ymd_opt(2024, 4, 25).unwrap(), 9.0, 2.0);

        let reason = engine.replay(&e, &ScoringConfig::default()).unwrap_err();
        assert_eq!(
            reason,
            SkipReason::Excluded(AnalysisError::insufficient_history("AAPL", 2, 1))
        );
    }

    #[test]
    fn run_counts_every_event_once() {
        let engine = engine("AAPL", &[2.0, 2.2, 1.8, 2.0]);
        let events = vec![
            event("AAPL", NaiveDate::from_ymd_opt(2024, 4, 25).unwrap(), 9.0, 12.0),
            event("AAPL", NaiveDate::from_ymd_opt(2024, 4, 26).unwrap(), 1.0, 0.5),
            event("TSLA", NaiveDate::from_ymd_opt(2024, 4, 24).unwrap(), 9.0, 0.5),
        ];
        let result = engine.run(&ScoringConfig::default(), &events);

        assert_eq!(result.metrics.total_trades, 1);
        assert_eq!(result.metrics.losses, 1);
        assert_eq!(result.excluded_count(), 1);
        assert_eq!(result.filtered_count(), 1);
        assert_eq!(result.skipped[0].ticker, "TSLA");
    }

    #[test]
    fn naive_model_reports_frictionless_pnl() {
        let engine = engine("AAPL", &[2.0, 2.2, 1.8, 2.0]).with_cost_model(CostModel::naive());
        let e = event("AAPL", NaiveDate::from_ymd_opt(2024, 4, 25).unwrap(), 9.0, -1.5);
        let trade = engine.replay(&e, &ScoringConfig::default()).unwrap();
        assert!((trade.pnl_pct - 7.5).abs() < 1e-9);
        assert_eq!(trade.pnl_pct, trade.naive_pnl_pct);
    }

    // ==================== Chain snapshots ====================

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    #[test]
    fn chain_event_scores_like_live_analysis() {
        let engine = engine("AAPL", &[2.0, 2.2, 1.8, 2.0]);
        let config = ScoringConfig::default();
        let snapshot = chain("AAPL", day(26));
        let history = engine
            .history
            .moves_before("AAPL", day(25), config.consistency.max_quarters);
        let expected = analyze("AAPL", day(25), &snapshot, &history, &config).unwrap();

        let trade = engine
            .replay(&chain_event(snapshot, day(25), 1.5), &config)
            .unwrap();

        assert_eq!(trade.tier, expected.vrp.tier);
        assert!((trade.vrp_ratio - expected.vrp.ratio).abs() < 1e-12);
        assert!((trade.implied_move_pct - 8.0).abs() < 1e-9);
        let position = expected.position.unwrap();
        assert!(trade.position_size_pct > 0.0);
        assert!((trade.position_size_pct - position.position_size_pct).abs() < 1e-12);
    }

    #[test]
    fn chain_event_pays_the_straddle_spread() {
        let engine = engine("AAPL", &[2.0, 2.2, 1.8, 2.0]);
        let snapshot = chain("AAPL", day(26));
        // the wide wings dominate the chain-wide median
        assert!(snapshot.median_spread_pct(day(26)).unwrap() > 0.5);

        let trade = engine
            .replay(&chain_event(snapshot, day(25), 1.5), &ScoringConfig::default())
            .unwrap();

        // 0.40 wide on an 8.00 straddle; half paid on the 8% premium
        assert!((trade.costs.entry_slippage_pct - 0.2).abs() < 1e-9);
    }

    #[test]
    fn chain_without_event_expiration_is_excluded() {
        let engine = engine("AAPL", &[2.0, 2.2, 1.8, 2.0]);
        let e = chain_event(chain("AAPL", day(19)), day(25), 1.0);

        let reason = engine.replay(&e, &ScoringConfig::default()).unwrap_err();
        assert!(matches!(
            reason,
            SkipReason::Excluded(AnalysisError::InsufficientChainData { .. })
        ));

        let result = engine.run(&ScoringConfig::default(), [&e]);
        assert_eq!(result.metrics.total_trades, 0);
        assert_eq!(result.excluded_count(), 1);
    }
}
