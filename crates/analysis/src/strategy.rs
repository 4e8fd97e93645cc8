//! Strategy selection and strike placement.
//!
//! Selection is a pure mapping of (VRP tier, bias, bias confidence) onto one
//! or more premium-selling structures. Strike placement works in absolute
//! delta. The placement steps run in a fixed order:
//!
//! 1. shift the short leg toward the favored side, the long leg away
//! 2. restore the minimum short/long width by moving the long leg
//! 3. clamp both deltas into `[min_delta, max_delta]`
//! 4. re-check the width; if clamping broke it use the fallback pair
//!
//! Step 4 is what guarantees the width and range invariants together.

use std::fmt;

use chrono::NaiveDate;
use ivcrush_core::bias::{BiasFamily, BiasStrength, DirectionalBias};
use ivcrush_core::config::StrategyConfig;
use ivcrush_core::error::{AnalysisError, Result};
use ivcrush_core::types::{OptionChainSnapshot, OptionQuote, OptionType, VrpTier};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::skew::SkewAnalysis;

/// Structure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyType {
    /// One naked short option on the favored side.
    Single,
    /// Credit vertical on the favored side.
    Spread,
    /// Put credit vertical plus call credit vertical.
    IronCondor,
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "SINGLE"),
            Self::Spread => write!(f, "SPREAD"),
            Self::IronCondor => write!(f, "IRON_CONDOR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegAction {
    Sell,
    Buy,
}

/// One leg of a candidate, matched to a quoted strike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionLeg {
    pub action: LegAction,
    pub option_type: OptionType,
    pub strike: Decimal,
    /// Absolute delta the placement asked for.
    pub target_delta: Decimal,
    /// Signed delta of the matched quote.
    pub quote_delta: f64,
    pub mid: Decimal,
}

/// A concrete trade proposal. Money fields are per share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyCandidate {
    pub strategy_type: StrategyType,
    pub legs: Vec<OptionLeg>,
    /// Premium received (positive) or paid (negative).
    pub net_credit: Decimal,
    /// Strike distance of the widest vertical; zero for a single leg.
    pub width: Decimal,
    /// `None` when the loss is unbounded (naked call).
    pub max_loss: Option<Decimal>,
    /// Capital tied up per share.
    pub collateral: Decimal,
    pub breakevens: Vec<Decimal>,
    pub probability_of_profit: f64,
    /// Whether any side had to use the fallback delta pair.
    pub delta_fallback_used: bool,
}

impl StrategyCandidate {
    /// Credit over max loss, the payoff odds consumed by Kelly sizing.
    #[must_use]
    pub fn payoff_odds(&self) -> Option<f64> {
        let max_loss = self.max_loss?;
        if max_loss <= Decimal::ZERO || self.net_credit <= Decimal::ZERO {
            return None;
        }
        (self.net_credit / max_loss).to_f64()
    }

    /// Max loss as a fraction of collateral.
    #[must_use]
    pub fn max_loss_per_unit(&self) -> Option<f64> {
        let max_loss = self.max_loss?;
        if self.collateral <= Decimal::ZERO {
            return None;
        }
        (max_loss / self.collateral).to_f64()
    }

    #[must_use]
    pub fn short_legs(&self) -> impl Iterator<Item = &OptionLeg> {
        self.legs.iter().filter(|l| l.action == LegAction::Sell)
    }
}

/// Short and long target deltas for one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaPair {
    pub short: Decimal,
    pub long: Decimal,
    pub fallback_used: bool,
}

impl DeltaPair {
    #[must_use]
    pub fn width(&self) -> Decimal {
        self.short - self.long
    }
}

/// Adjustment magnitude for a bias strength.
#[must_use]
pub fn adjustment_for(strength: BiasStrength, config: &StrategyConfig) -> Decimal {
    match strength {
        BiasStrength::None => Decimal::ZERO,
        BiasStrength::Weak => config.weak_adjustment,
        BiasStrength::Moderate => config.moderate_adjustment,
        BiasStrength::Strong => config.strong_adjustment,
    }
}

/// Side that the bias favors for selling premium: puts when bullish, calls when bearish.
#[must_use]
pub fn favored_side(bias: DirectionalBias) -> Option<OptionType> {
    match bias.family() {
        BiasFamily::Bullish => Some(OptionType::Put),
        BiasFamily::Bearish => Some(OptionType::Call),
        BiasFamily::Neutral => None,
    }
}

/// Places short/long deltas for `side` under `bias`.
#[must_use]
pub fn place_deltas(bias: DirectionalBias, side: OptionType, config: &StrategyConfig) -> DeltaPair {
    let adjustment = adjustment_for(bias.strength(), config);
    let signed = match favored_side(bias) {
        Some(favored) if favored == side => adjustment,
        Some(_) => -adjustment,
        None => Decimal::ZERO,
    };

    // 1. bias adjustment
    let mut short = config.base_short_delta + signed;
    let mut long = config.base_long_delta - signed;

    // 2. minimum width
    if short - long < config.min_spread_width {
        long = short - config.min_spread_width;
    }

    // 3. clamp
    short = short.clamp(config.min_delta, config.max_delta);
    long = long.clamp(config.min_delta, config.max_delta);

    // 4. re-validate
    if short - long < config.min_spread_width {
        tracing::info!(
            %bias,
            %side,
            %short,
            %long,
            "Delta width lost to clamping, using fallback pair"
        );
        return DeltaPair {
            short: config.fallback_short_delta,
            long: config.fallback_long_delta,
            fallback_used: true,
        };
    }

    DeltaPair {
        short,
        long,
        fallback_used: false,
    }
}

/// Generates candidates, primary first. A `Skip` tier yields none.
///
/// Alternatives that cannot be matched against the chain are dropped; the
/// call fails only if no candidate can be built.
///
/// # Errors
/// `NoValidStrikes` when no structure can be matched, `InsufficientChainData`
/// when the expiration has no usable quotes.
pub fn generate(
    chain: &OptionChainSnapshot,
    expiration: NaiveDate,
    tier: VrpTier,
    skew: &SkewAnalysis,
    config: &StrategyConfig,
) -> Result<Vec<StrategyCandidate>> {
    if !tier.is_tradeable() {
        return Ok(Vec::new());
    }

    let quotes: Vec<&OptionQuote> = chain
        .for_expiration(expiration)
        .filter(|q| q.mid().is_some())
        .collect();
    if quotes.is_empty() {
        return Err(AnalysisError::insufficient_chain(
            &chain.symbol,
            format!("no valid quotes for {expiration}"),
        ));
    }

    let plan = select_structures(tier, skew.directional_bias, skew.bias_confidence, config);
    let builder = Builder {
        symbol: &chain.symbol,
        quotes: &quotes,
        bias: skew.directional_bias,
        config,
    };

    let mut candidates = Vec::with_capacity(plan.len());
    let mut first_error = None;
    for strategy_type in plan {
        let built = match strategy_type {
            StrategyType::IronCondor => builder.iron_condor(),
            StrategyType::Spread => builder.spread(),
            StrategyType::Single => builder.single(),
        };
        match built {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => {
                tracing::warn!(
                    symbol = %chain.symbol,
                    %strategy_type,
                    error = %e,
                    "Strategy could not be matched to the chain"
                );
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if candidates.is_empty() {
        if let Some(e) = first_error {
            return Err(e);
        }
    }
    Ok(candidates)
}

/// Ordered structure plan for a bias.
#[must_use]
pub fn select_structures(
    tier: VrpTier,
    bias: DirectionalBias,
    confidence: f64,
    config: &StrategyConfig,
) -> Vec<StrategyType> {
    if !tier.is_tradeable() {
        return Vec::new();
    }
    match bias.strength() {
        BiasStrength::None => vec![StrategyType::IronCondor],
        BiasStrength::Weak => vec![StrategyType::IronCondor, StrategyType::Spread],
        BiasStrength::Moderate => vec![StrategyType::Spread, StrategyType::IronCondor],
        BiasStrength::Strong => {
            let mut plan = vec![StrategyType::Spread];
            if tier == VrpTier::Excellent && confidence >= config.single_leg_min_confidence {
                plan.push(StrategyType::Single);
            }
            plan.push(StrategyType::IronCondor);
            plan
        }
    }
}

/// Matched short/long vertical on one side.
struct Vertical {
    short: OptionLeg,
    long: OptionLeg,
    fallback_used: bool,
}

impl Vertical {
    fn credit(&self) -> Decimal {
        self.short.mid - self.long.mid
    }

    fn width(&self) -> Decimal {
        (self.short.strike - self.long.strike).abs()
    }

    fn breakeven(&self) -> Decimal {
        match self.short.option_type {
            OptionType::Put => self.short.strike - self.credit(),
            OptionType::Call => self.short.strike + self.credit(),
        }
    }
}

struct Builder<'a> {
    symbol: &'a str,
    quotes: &'a [&'a OptionQuote],
    bias: DirectionalBias,
    config: &'a StrategyConfig,
}

impl Builder<'_> {
    fn iron_condor(&self) -> Result<StrategyCandidate> {
        let put = self.vertical(OptionType::Put)?;
        let call = self.vertical(OptionType::Call)?;

        let net_credit = put.credit() + call.credit();
        let width = put.width().max(call.width());
        let pop = 1.0 - put.short.quote_delta.abs() - call.short.quote_delta.abs();

        Ok(StrategyCandidate {
            strategy_type: StrategyType::IronCondor,
            net_credit,
            width,
            max_loss: Some(width - net_credit),
            collateral: width,
            breakevens: vec![
                put.short.strike - net_credit,
                call.short.strike + net_credit,
            ],
            probability_of_profit: pop.clamp(0.0, 1.0),
            delta_fallback_used: put.fallback_used || call.fallback_used,
            legs: vec![put.short, put.long, call.short, call.long],
        })
    }

    fn spread(&self) -> Result<StrategyCandidate> {
        let side = favored_side(self.bias).unwrap_or(OptionType::Put);
        let v = self.vertical(side)?;
        let net_credit = v.credit();
        let width = v.width();

        Ok(StrategyCandidate {
            strategy_type: StrategyType::Spread,
            net_credit,
            width,
            max_loss: Some(width - net_credit),
            collateral: width,
            breakevens: vec![v.breakeven()],
            probability_of_profit: (1.0 - v.short.quote_delta.abs()).clamp(0.0, 1.0),
            delta_fallback_used: v.fallback_used,
            legs: vec![v.short, v.long],
        })
    }

    fn single(&self) -> Result<StrategyCandidate> {
        let side = favored_side(self.bias).unwrap_or(OptionType::Put);
        let deltas = place_deltas(self.bias, side, self.config);
        let quote = self.nearest(side, deltas.short, |_| true)?;
        let leg = leg(LegAction::Sell, quote, deltas.short);

        let credit = leg.mid;
        let (max_loss, breakeven) = match side {
            OptionType::Put => (Some(leg.strike - credit), leg.strike - credit),
            OptionType::Call => (None, leg.strike + credit),
        };

        Ok(StrategyCandidate {
            strategy_type: StrategyType::Single,
            net_credit: credit,
            width: Decimal::ZERO,
            max_loss,
            collateral: leg.strike,
            breakevens: vec![breakeven],
            probability_of_profit: (1.0 - leg.quote_delta.abs()).clamp(0.0, 1.0),
            delta_fallback_used: deltas.fallback_used,
            legs: vec![leg],
        })
    }

    fn vertical(&self, side: OptionType) -> Result<Vertical> {
        let deltas = place_deltas(self.bias, side, self.config);
        let short = self.nearest(side, deltas.short, |_| true)?;
        // long leg must be further out of the money than the short
        let long = self.nearest(side, deltas.long, |q| match side {
            OptionType::Put => q.strike < short.strike,
            OptionType::Call => q.strike > short.strike,
        })?;

        Ok(Vertical {
            short: leg(LegAction::Sell, short, deltas.short),
            long: leg(LegAction::Buy, long, deltas.long),
            fallback_used: deltas.fallback_used,
        })
    }

    fn nearest(
        &self,
        side: OptionType,
        target: Decimal,
        accept: impl Fn(&OptionQuote) -> bool,
    ) -> Result<&OptionQuote> {
        let target_f = target.to_f64().unwrap_or(0.0);
        self.quotes
            .iter()
            .copied()
            .filter(|q| q.option_type == side && accept(*q))
            .map(|q| ((q.abs_delta() - target_f).abs(), q))
            .filter(|(distance, _)| *distance <= self.config.strike_delta_tolerance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, q)| q)
            .ok_or_else(|| AnalysisError::no_valid_strikes(self.symbol, side, target))
    }
}

fn leg(action: LegAction, quote: &OptionQuote, target_delta: Decimal) -> OptionLeg {
    OptionLeg {
        action,
        option_type: quote.option_type,
        strike: quote.strike,
        target_delta,
        quote_delta: quote.delta,
        mid: quote.mid().unwrap_or(Decimal::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chain_from, expiry, quote, smile_chain};
    use rust_decimal_macros::dec;

    fn skew_with(bias: DirectionalBias, confidence: f64) -> SkewAnalysis {
        SkewAnalysis {
            directional_bias: bias,
            raw_bias: bias,
            bias_confidence: confidence,
            ..SkewAnalysis::insufficient(16)
        }
    }

    // ==================== Delta Placement ====================

    #[test]
    fn neutral_uses_base_pair() {
        let c = StrategyConfig::default();
        let pair = place_deltas(DirectionalBias::Neutral, OptionType::Put, &c);
        assert_eq!(pair.short, dec!(0.30));
        assert_eq!(pair.long, dec!(0.20));
        assert!(!pair.fallback_used);
    }

    #[test]
    fn strong_bullish_shifts_put_side_toward_money() {
        let c = StrategyConfig::default();
        let puts = place_deltas(DirectionalBias::StrongBullish, OptionType::Put, &c);
        assert_eq!(puts.short, dec!(0.40));
        assert_eq!(puts.long, dec!(0.10));
        let calls = place_deltas(DirectionalBias::StrongBullish, OptionType::Call, &c);
        assert_eq!(calls.short, dec!(0.20));
        assert_eq!(calls.long, dec!(0.15));
    }

    #[test]
    fn moderate_bearish_shifts_call_side() {
        let c = StrategyConfig::default();
        let calls = place_deltas(DirectionalBias::ModerateBearish, OptionType::Call, &c);
        assert_eq!(calls.short, dec!(0.35));
        assert_eq!(calls.long, dec!(0.15));
        let puts = place_deltas(DirectionalBias::ModerateBearish, OptionType::Put, &c);
        assert_eq!(puts.short, dec!(0.25));
        assert_eq!(puts.long, dec!(0.20));
    }

    #[test]
    fn clamping_that_breaks_width_uses_fallback() {
        let c = StrategyConfig {
            base_short_delta: dec!(0.12),
            base_long_delta: dec!(0.10),
            ..StrategyConfig::default()
        };
        let pair = place_deltas(DirectionalBias::StrongBullish, OptionType::Call, &c);
        assert!(pair.fallback_used);
        assert_eq!(pair.short, dec!(0.25));
        assert_eq!(pair.long, dec!(0.20));
    }

    #[test]
    fn width_and_range_hold_for_every_bias_and_side() {
        let configs = [
            StrategyConfig::default(),
            StrategyConfig {
                base_short_delta: dec!(0.12),
                base_long_delta: dec!(0.10),
                ..StrategyConfig::default()
            },
            StrategyConfig {
                base_short_delta: dec!(0.40),
                base_long_delta: dec!(0.38),
                strong_adjustment: dec!(0.20),
                ..StrategyConfig::default()
            },
        ];
        for c in &configs {
            for bias in DirectionalBias::ALL {
                for side in [OptionType::Put, OptionType::Call] {
                    let pair = place_deltas(bias, side, c);
                    assert!(pair.width() >= dec!(0.05), "{bias} {side}: {pair:?}");
                    assert!(pair.short >= dec!(0.10) && pair.short <= dec!(0.40));
                    assert!(pair.long >= dec!(0.10) && pair.long <= dec!(0.40));
                }
            }
        }
    }

    // ==================== Selection ====================

    #[test]
    fn skip_tier_yields_nothing() {
        let chain = smile_chain("AAPL", 0.0);
        let skew = skew_with(DirectionalBias::Neutral, 0.0);
        let out = generate(&chain, expiry(), VrpTier::Skip, &skew, &StrategyConfig::default());
        assert!(out.unwrap().is_empty());
    }

    #[test]
    fn neutral_prefers_iron_condor() {
        let plan = select_structures(
            VrpTier::Good,
            DirectionalBias::Neutral,
            0.0,
            &StrategyConfig::default(),
        );
        assert_eq!(plan, vec![StrategyType::IronCondor]);
    }

    #[test]
    fn strong_bias_prefers_spread() {
        let c = StrategyConfig::default();
        let plan = select_structures(VrpTier::Good, DirectionalBias::StrongBearish, 0.9, &c);
        assert_eq!(plan[0], StrategyType::Spread);
        assert!(!plan.contains(&StrategyType::Single));
    }

    #[test]
    fn single_needs_excellent_tier_and_confidence() {
        let c = StrategyConfig::default();
        let plan = select_structures(VrpTier::Excellent, DirectionalBias::StrongBullish, 0.7, &c);
        assert!(plan.contains(&StrategyType::Single));
        let low = select_structures(VrpTier::Excellent, DirectionalBias::StrongBullish, 0.5, &c);
        assert!(!low.contains(&StrategyType::Single));
    }

    // ==================== Strike Matching ====================

    #[test]
    fn neutral_condor_matches_symmetric_strikes() {
        let chain = smile_chain("AAPL", 0.0);
        let skew = skew_with(DirectionalBias::Neutral, 0.0);
        let out =
            generate(&chain, expiry(), VrpTier::Good, &skew, &StrategyConfig::default()).unwrap();
        let condor = &out[0];
        assert_eq!(condor.strategy_type, StrategyType::IronCondor);
        let strikes: Vec<Decimal> = condor.legs.iter().map(|l| l.strike).collect();
        assert_eq!(strikes, vec![dec!(92.5), dec!(87.5), dec!(107.5), dec!(112.5)]);
        assert!(condor.net_credit > Decimal::ZERO);
        assert_eq!(condor.width, dec!(5));
        assert_eq!(condor.max_loss, Some(condor.width - condor.net_credit));
        assert!((condor.probability_of_profit - 0.375).abs() < 1e-9);
        assert_eq!(condor.breakevens.len(), 2);
    }

    #[test]
    fn bullish_spread_sells_puts() {
        let chain = smile_chain("AAPL", 120.0);
        let skew = skew_with(DirectionalBias::ModerateBullish, 0.8);
        let out =
            generate(&chain, expiry(), VrpTier::Good, &skew, &StrategyConfig::default()).unwrap();
        let spread = &out[0];
        assert_eq!(spread.strategy_type, StrategyType::Spread);
        assert!(spread.legs.iter().all(|l| l.option_type == OptionType::Put));
        let short = &spread.legs[0];
        let long = &spread.legs[1];
        assert_eq!(short.action, LegAction::Sell);
        assert!(long.strike < short.strike);
        assert_eq!(short.target_delta, dec!(0.35));
        assert_eq!(spread.breakevens, vec![short.strike - spread.net_credit]);
        assert_eq!(out[1].strategy_type, StrategyType::IronCondor);
    }

    #[test]
    fn bearish_single_is_naked_call_with_unbounded_loss() {
        let chain = smile_chain("TSLA", -200.0);
        let skew = skew_with(DirectionalBias::StrongBearish, 0.95);
        let out = generate(
            &chain,
            expiry(),
            VrpTier::Excellent,
            &skew,
            &StrategyConfig::default(),
        )
        .unwrap();
        let single = out
            .iter()
            .find(|c| c.strategy_type == StrategyType::Single)
            .unwrap();
        assert_eq!(single.legs.len(), 1);
        assert_eq!(single.legs[0].option_type, OptionType::Call);
        assert_eq!(single.max_loss, None);
        assert_eq!(single.payoff_odds(), None);
    }

    #[test]
    fn missing_deltas_fail_with_no_valid_strikes() {
        // Only deep ITM quotes: nothing near 0.30 delta
        let quotes = vec![
            quote(dec!(60), OptionType::Call, dec!(40), 0.5, 0.98),
            quote(dec!(140), OptionType::Put, dec!(40), 0.5, -0.98),
        ];
        let chain = chain_from("ITM", dec!(100), quotes);
        let skew = skew_with(DirectionalBias::Neutral, 0.0);
        let err = generate(&chain, expiry(), VrpTier::Good, &skew, &StrategyConfig::default())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoValidStrikes { .. }));
    }

    #[test]
    fn payoff_odds_from_credit_and_loss() {
        let chain = smile_chain("AAPL", 0.0);
        let skew = skew_with(DirectionalBias::Neutral, 0.0);
        let out =
            generate(&chain, expiry(), VrpTier::Good, &skew, &StrategyConfig::default()).unwrap();
        let c = &out[0];
        let expected = (c.net_credit / c.max_loss.unwrap()).to_f64().unwrap();
        assert!((c.payoff_odds().unwrap() - expected).abs() < 1e-12);
        assert!(c.max_loss_per_unit().unwrap() < 1.0);
    }
}
