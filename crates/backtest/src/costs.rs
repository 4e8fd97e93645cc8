//! Execution cost model for a short at-the-money straddle held through earnings.
//!
//! All quantities are percent of spot at entry. The straddle is sold for the
//! implied move and bought back after the announcement at intrinsic value (the
//! realised move) plus a residual of extrinsic value. Each side pays half the
//! bid-ask spread, and every contract pays a fixed commission.

use ivcrush_core::config::ConfigError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Frictions applied to every simulated trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    /// Commission per option contract, in currency.
    pub commission_per_contract: Decimal,
    /// Contracts charged per trade: two legs, opened and closed.
    pub contracts_per_trade: u32,
    /// Shares per contract.
    pub contract_multiplier: u32,
    /// Share of the implied move still held as time value after the event.
    pub residual_extrinsic_fraction: f64,
    /// Bid-ask spread (fraction of mid) used when the event carries none.
    pub default_spread_pct: f64,
    /// When false, every friction is zero and P&L is premium minus intrinsic.
    pub use_realistic_model: bool,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            commission_per_contract: dec!(0.65),
            contracts_per_trade: 4,
            contract_multiplier: 100,
            residual_extrinsic_fraction: 0.10,
            default_spread_pct: 0.05,
            use_realistic_model: true,
        }
    }
}

/// Itemised frictions of one trade, percent of spot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeCosts {
    pub entry_slippage_pct: f64,
    pub residual_extrinsic_pct: f64,
    pub exit_slippage_pct: f64,
    pub commission_pct: f64,
}

impl TradeCosts {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.entry_slippage_pct
            + self.residual_extrinsic_pct
            + self.exit_slippage_pct
            + self.commission_pct
    }
}

/// P&L of one simulated straddle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PnlBreakdown {
    /// Credit received at mid.
    pub premium_pct: f64,
    /// Value of the straddle at expiry-equivalent: the absolute realised move.
    pub intrinsic_pct: f64,
    pub costs: TradeCosts,
    /// Premium minus intrinsic, no frictions.
    pub naive_pnl_pct: f64,
    pub net_pnl_pct: f64,
}

impl CostModel {
    /// The frictionless model, kept for comparison runs.
    #[must_use]
    pub fn naive() -> Self {
        Self {
            use_realistic_model: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_commission(mut self, per_contract: Decimal) -> Self {
        self.commission_per_contract = per_contract;
        self
    }

    #[must_use]
    pub fn with_default_spread(mut self, spread_pct: f64) -> Self {
        self.default_spread_pct = spread_pct;
        self
    }

    /// # Errors
    /// Returns `ConfigError` naming the first out-of-range field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |reason: &str| {
            Err(ConfigError {
                name: "cost_model".to_string(),
                reason: reason.to_string(),
            })
        };
        if self.commission_per_contract < Decimal::ZERO {
            return fail("commission_per_contract must be non-negative");
        }
        if self.contract_multiplier == 0 {
            return fail("contract_multiplier must be positive");
        }
        if !(0.0..=1.0).contains(&self.residual_extrinsic_fraction) {
            return fail("residual_extrinsic_fraction must be within [0, 1]");
        }
        if !(0.0..=2.0).contains(&self.default_spread_pct) {
            return fail("default_spread_pct must be within [0, 2]");
        }
        Ok(())
    }

    /// Total commission for one trade as percent of spot notional.
    #[must_use]
    pub fn commission_pct(&self, spot: Decimal) -> f64 {
        if spot <= Decimal::ZERO {
            return 0.0;
        }
        let total = self.commission_per_contract * Decimal::from(self.contracts_per_trade);
        let notional = spot * Decimal::from(self.contract_multiplier);
        (total / notional * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0)
    }

    /// Simulates selling the straddle at `implied_move_pct` and buying it back
    /// after a realised move of `actual_move_pct` (sign ignored).
    ///
    /// `spread_pct` falls back to `default_spread_pct` when `None`.
    #[must_use]
    pub fn simulate(
        &self,
        implied_move_pct: f64,
        actual_move_pct: f64,
        spread_pct: Option<f64>,
        spot: Decimal,
    ) -> PnlBreakdown {
        let premium_pct = implied_move_pct;
        let intrinsic_pct = actual_move_pct.abs();
        let naive_pnl_pct = premium_pct - intrinsic_pct;

        if !self.use_realistic_model {
            return PnlBreakdown {
                premium_pct,
                intrinsic_pct,
                costs: TradeCosts::default(),
                naive_pnl_pct,
                net_pnl_pct: naive_pnl_pct,
            };
        }

        let half_spread = spread_pct.unwrap_or(self.default_spread_pct).max(0.0) / 2.0;
        let residual_extrinsic_pct = implied_move_pct * self.residual_extrinsic_fraction;
        let exit_mid = intrinsic_pct + residual_extrinsic_pct;
        let costs = TradeCosts {
            entry_slippage_pct: premium_pct * half_spread,
            residual_extrinsic_pct,
            exit_slippage_pct: exit_mid * half_spread,
            commission_pct: self.commission_pct(spot),
        };

        PnlBreakdown {
            premium_pct,
            intrinsic_pct,
            costs,
            naive_pnl_pct,
            net_pnl_pct: naive_pnl_pct - costs.total(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    // ============================================================
    // Cost components
    // ============================================================

    #[test]
    fn default_model_is_valid() {
        assert!(CostModel::default().validate().is_ok());
    }

    #[test]
    fn commission_is_four_contracts_over_notional() {
        // 4 * 0.65 = 2.60 over 100 * 100 = 10,000 notional
        let pct = CostModel::default().commission_pct(dec!(100));
        assert!(close(pct, 0.026));
    }

    #[test]
    fn commission_is_zero_without_spot() {
        assert_eq!(CostModel::default().commission_pct(Decimal::ZERO), 0.0);
    }

    #[test]
    fn itemised_costs_follow_the_formula() {
        let model = CostModel::default();
        let pnl = model.simulate(8.0, -3.0, Some(0.10), dec!(100));

        assert!(close(pnl.costs.entry_slippage_pct, 0.4));
        assert!(close(pnl.costs.residual_extrinsic_pct, 0.8));
        // exit mid = 3.0 + 0.8
        assert!(close(pnl.costs.exit_slippage_pct, 0.19));
        assert!(close(pnl.naive_pnl_pct, 5.0));
        assert!(close(pnl.net_pnl_pct, 5.0 - 0.4 - 0.8 - 0.19 - 0.026));
    }

    #[test]
    fn missing_spread_uses_default() {
        let model = CostModel::default().with_default_spread(0.2);
        let pnl = model.simulate(5.0, 1.0, None, dec!(50));
        assert!(close(pnl.costs.entry_slippage_pct, 0.5));
    }

    // ============================================================
    // Realistic vs naive
    // ============================================================

    #[test]
    fn naive_model_has_no_frictions() {
        let pnl = CostModel::naive().simulate(6.0, 2.0, Some(0.3), dec!(20));
        assert_eq!(pnl.costs, TradeCosts::default());
        assert!(close(pnl.net_pnl_pct, 4.0));
    }

    #[test]
    fn frictions_never_add_profit() {
        let model = CostModel::default();
        for implied in [1.0, 4.0, 8.0, 15.0] {
            for actual in [-12.0, -2.0, 0.0, 0.5, 3.0, 9.0] {
                let pnl = model.simulate(implied, actual, Some(0.08), dec!(75));
                assert!(pnl.net_pnl_pct <= pnl.naive_pnl_pct);
            }
        }
    }

    #[test]
    fn negative_fraction_is_rejected() {
        let model = CostModel {
            residual_extrinsic_fraction: -0.1,
            ..CostModel::default()
        };
        assert_eq!(model.validate().unwrap_err().name, "cost_model");
    }
}
