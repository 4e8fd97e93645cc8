//! Replay inputs and per-event outcomes.

use chrono::NaiveDate;
use ivcrush_core::error::AnalysisError;
use ivcrush_core::types::{HistoricalMove, OptionChainSnapshot, VrpTier};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::costs::{PnlBreakdown, TradeCosts};

/// What the market looked like just before the announcement.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketSnapshot {
    /// A full chain; the whole analysis pipeline runs on it.
    Chain(OptionChainSnapshot),
    /// Only the straddle-implied move and its bid-ask spread were recorded.
    ImpliedMove {
        implied_move_pct: f64,
        spread_pct: Option<f64>,
    },
}

/// One historical earnings event to replay.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestEvent {
    pub ticker: String,
    pub earnings_date: NaiveDate,
    /// Spot at entry.
    pub spot: Decimal,
    pub market: MarketSnapshot,
    /// The realised reaction, read only after the entry decision.
    pub outcome: HistoricalMove,
}

impl BacktestEvent {
    #[must_use]
    pub fn new(spot: Decimal, market: MarketSnapshot, outcome: HistoricalMove) -> Self {
        Self {
            ticker: outcome.ticker.clone(),
            earnings_date: outcome.earnings_date,
            spot,
            market,
            outcome,
        }
    }

    /// Whether the event falls in `[start, end)`.
    #[must_use]
    pub fn within(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.earnings_date >= start && self.earnings_date < end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
    /// Closed flat after costs.
    Scratch,
}

impl TradeOutcome {
    #[must_use]
    pub fn from_pnl(pnl: f64) -> Self {
        if pnl > 0.0 {
            Self::Win
        } else if pnl < 0.0 {
            Self::Loss
        } else {
            Self::Scratch
        }
    }
}

/// A replayed trade with its friction breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTrade {
    pub ticker: String,
    pub earnings_date: NaiveDate,
    pub config_name: String,
    pub tier: VrpTier,
    pub vrp_ratio: f64,
    pub implied_move_pct: f64,
    /// Signed close-to-close move.
    pub actual_move_pct: f64,
    pub costs: TradeCosts,
    pub naive_pnl_pct: f64,
    /// Net P&L, percent of spot.
    pub pnl_pct: f64,
    /// Fraction of equity the sizer allocated.
    pub position_size_pct: f64,
    pub outcome: TradeOutcome,
}

impl SimulatedTrade {
    pub(crate) fn from_breakdown(
        event: &BacktestEvent,
        config_name: &str,
        tier: VrpTier,
        vrp_ratio: f64,
        position_size_pct: f64,
        pnl: PnlBreakdown,
    ) -> Self {
        Self {
            ticker: event.ticker.clone(),
            earnings_date: event.earnings_date,
            config_name: config_name.to_string(),
            tier,
            vrp_ratio,
            implied_move_pct: pnl.premium_pct,
            actual_move_pct: event.outcome.close_move_pct,
            costs: pnl.costs,
            naive_pnl_pct: pnl.naive_pnl_pct,
            pnl_pct: pnl.net_pnl_pct,
            position_size_pct,
            outcome: TradeOutcome::from_pnl(pnl.net_pnl_pct),
        }
    }

    /// P&L weighted by the allocated position, percent of equity.
    #[must_use]
    pub fn equity_pnl_pct(&self) -> f64 {
        self.pnl_pct * self.position_size_pct
    }
}

/// Why an event produced no trade.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Inputs were insufficient or defective; not a loss.
    Excluded(AnalysisError),
    /// The VRP tier did not warrant a trade.
    NotTradeable(VrpTier),
    /// The sizer allocated nothing.
    ZeroSize,
}

impl SkipReason {
    #[must_use]
    pub fn is_excluded(&self) -> bool {
        matches!(self, Self::Excluded(_))
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Excluded(e) => write!(f, "excluded: {e}"),
            Self::NotTradeable(tier) => write!(f, "filtered: tier {tier}"),
            Self::ZeroSize => write!(f, "filtered: zero size"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEvent {
    pub ticker: String,
    pub earnings_date: NaiveDate,
    pub reason: SkipReason,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn outcome() -> HistoricalMove {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        HistoricalMove::from_prices("NVDA", date, dec!(100), dec!(104), dec!(103)).unwrap()
    }

    #[test]
    fn event_takes_identity_from_outcome() {
        let event = BacktestEvent::new(
            dec!(100),
            MarketSnapshot::ImpliedMove {
                implied_move_pct: 6.0,
                spread_pct: None,
            },
            outcome(),
        );
        assert_eq!(event.ticker, "NVDA");
        assert_eq!(event.earnings_date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn window_is_half_open() {
        let event = BacktestEvent::new(
            dec!(100),
            MarketSnapshot::ImpliedMove {
                implied_move_pct: 6.0,
                spread_pct: None,
            },
            outcome(),
        );
        let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
        assert!(event.within(d(2, 1), d(3, 1)));
        assert!(!event.within(d(1, 1), d(2, 1)));
    }

    #[test]
    fn outcome_follows_sign() {
        assert_eq!(TradeOutcome::from_pnl(0.3), TradeOutcome::Win);
        assert_eq!(TradeOutcome::from_pnl(-0.3), TradeOutcome::Loss);
        assert_eq!(TradeOutcome::from_pnl(0.0), TradeOutcome::Scratch);
    }

    #[test]
    fn skip_reason_display() {
        assert_eq!(
            SkipReason::NotTradeable(VrpTier::Skip).to_string(),
            format!("filtered: tier {}", VrpTier::Skip)
        );
        assert!(SkipReason::Excluded(AnalysisError::InvalidInput("x".into())).is_excluded());
        assert!(!SkipReason::ZeroSize.is_excluded());
    }
}
