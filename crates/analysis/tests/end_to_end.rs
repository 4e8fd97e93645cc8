//! End-to-end scenarios through the public analysis surface.

use chrono::{NaiveDate, TimeZone, Utc};
use ivcrush_analysis::implied_move;
use ivcrush_analysis::skew::classify;
use ivcrush_analysis::strategy::StrategyType;
use ivcrush_analysis::{analyze, vrp};
use ivcrush_core::bias::DirectionalBias;
use ivcrush_core::config::{ScoringConfig, SkewConfig};
use ivcrush_core::types::{HistoricalMove, OptionChainSnapshot, OptionQuote, OptionType, VrpTier};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn quote(strike: f64, option_type: OptionType, mid: f64, delta: f64) -> OptionQuote {
    let mid = Decimal::from_f64(mid).unwrap().round_dp(2);
    OptionQuote {
        strike: Decimal::from_f64(strike).unwrap(),
        option_type,
        expiration: date(2024, 5, 3),
        bid: mid - dec!(0.05),
        ask: mid + dec!(0.05),
        implied_volatility: 0.55,
        delta,
    }
}

/// Spot 100 between the 97.5 and 102.5 strikes, each straddle costing 8.00,
/// so the straddle interpolated at spot is 4.00 + 4.00.
fn fixture_chain() -> OptionChainSnapshot {
    let mut quotes = vec![
        quote(97.5, OptionType::Call, 5.5, 0.5625),
        quote(97.5, OptionType::Put, 2.5, -0.4375),
        quote(102.5, OptionType::Call, 2.5, 0.4375),
        quote(102.5, OptionType::Put, 5.5, -0.5625),
    ];
    for i in 0..7 {
        let offset = 5.0 + 2.5 * f64::from(i);
        let otm_delta = (0.4375 - 0.0625 * f64::from(i + 1)).max(0.02);
        let premium = (2.2 - 0.3 * f64::from(i)).max(0.1);
        quotes.push(quote(100.0 - offset, OptionType::Put, premium, -otm_delta));
        quotes.push(quote(100.0 + offset, OptionType::Call, premium, otm_delta));
    }
    OptionChainSnapshot::new(
        "AAPL",
        Utc.with_ymd_and_hms(2024, 4, 30, 20, 0, 0).unwrap(),
        dec!(100),
        quotes,
    )
}

/// Quarterly moves whose weighted mean is exactly `pct`.
fn flat_history(ticker: &str, pct: Decimal, quarters: u32) -> Vec<HistoricalMove> {
    (0..quarters)
        .map(|i| {
            let months_back = 3 * (i + 1);
            let total = 2024 * 12 + 4 - months_back;
            let d = date((total / 12) as i32, total % 12 + 1, 20);
            let close = dec!(100) + if i % 2 == 0 { pct } else { -pct };
            HistoricalMove::from_prices(ticker, d, dec!(100), close, close).unwrap()
        })
        .collect()
}

#[test]
fn interpolated_straddle_fixture_is_marginal() {
    let chain = fixture_chain();
    let implied = implied_move::calculate(&chain, date(2024, 5, 3), dec!(100)).unwrap();
    assert_eq!(implied.lower_strike, dec!(97.5));
    assert_eq!(implied.upper_strike, dec!(102.5));
    assert!((implied.implied_move_pct - 8.0).abs() < 1e-9);

    let result = vrp::calculate("AAPL", implied.implied_move_pct, 3.69, &Default::default()).unwrap();
    assert!((result.ratio - 2.17).abs() < 0.005);
    assert_eq!(result.tier, VrpTier::Marginal);
}

#[test]
fn full_pipeline_on_fixture() {
    let chain = fixture_chain();
    let history = flat_history("AAPL", dec!(3.69), 8);
    let result = analyze(
        "AAPL",
        date(2024, 5, 1),
        &chain,
        &history,
        &ScoringConfig::default(),
    )
    .unwrap();

    assert!((result.consistency.weighted_mean_pct - 3.69).abs() < 1e-9);
    assert!((result.vrp.ratio - 8.0 / 3.69).abs() < 1e-9);
    assert_eq!(result.vrp.tier, VrpTier::Marginal);
    assert_eq!(result.consistency.up_ratio, 0.5);
    // flat IV: neutral skew, symmetric condor
    assert_eq!(result.skew.directional_bias, DirectionalBias::Neutral);
    let primary = result.primary_strategy().unwrap();
    assert_eq!(primary.strategy_type, StrategyType::IronCondor);
    assert_eq!(primary.legs.len(), 4);
    assert!(primary.net_credit > Decimal::ZERO);
    let position = result.position.as_ref().unwrap();
    assert!(position.position_size_pct <= 0.05);
    assert!(position.max_loss_pct <= 0.02 + 1e-12);
}

#[test]
fn suppressed_skew_fixture_keeps_confidence() {
    let class = classify(84.16, 0.164, &SkewConfig::default());
    assert_eq!(class.directional_bias, DirectionalBias::Neutral);
    assert!((class.bias_confidence - 0.164 * 84.16 / 150.0).abs() < 1e-12);
    assert!((class.bias_confidence - 0.092).abs() < 5e-4);
    assert_ne!(class.bias_confidence, 0.0);
}

#[test]
fn stricter_config_skips_same_event() {
    let chain = fixture_chain();
    let history = flat_history("AAPL", dec!(3.69), 8);
    let strict = ScoringConfig::conservative();
    let result = analyze("AAPL", date(2024, 5, 1), &chain, &history, &strict).unwrap();
    // conservative marginal cutoff is 2.0
    assert_eq!(result.vrp.tier, VrpTier::Marginal);

    let tighter = ScoringConfig::default()
        .with_name("tight")
        .with_vrp_thresholds(9.0, 6.0, 3.0);
    let skipped = analyze("AAPL", date(2024, 5, 1), &chain, &history, &tighter).unwrap();
    assert_eq!(skipped.vrp.tier, VrpTier::Skip);
    assert!(skipped.strategies.is_empty());
    assert_eq!(skipped.config_name, "tight");
}
