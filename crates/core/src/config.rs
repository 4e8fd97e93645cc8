//! Scoring configuration.
//!
//! A `ScoringConfig` is the single bundle of tunables handed to every
//! component. Components never read thresholds from anywhere else, so two
//! configs can be scored side by side (the walk-forward driver does exactly
//! that).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid scoring config '{name}': {reason}")]
pub struct ConfigError {
    pub name: String,
    pub reason: String,
}

/// VRP ratio cutoffs, inclusive lower bounds per tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VrpThresholds {
    pub excellent: f64,
    pub good: f64,
    pub marginal: f64,
}

impl Default for VrpThresholds {
    fn default() -> Self {
        Self {
            excellent: 7.0,
            good: 4.0,
            marginal: 1.5,
        }
    }
}

/// Skew fit and bias classification parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkewConfig {
    /// |slope| at or below this is neutral.
    pub neutral_max_slope: f64,
    /// |slope| at or below this is weak.
    pub weak_max_slope: f64,
    /// |slope| at or below this is moderate; above is strong.
    pub moderate_max_slope: f64,
    /// Slope at which the slope factor of confidence saturates at 1.
    pub confidence_slope_scale: f64,
    /// Confidence floor below which the reported bias is forced neutral.
    pub min_bias_confidence: f64,
    /// Out-of-the-money points required for a fit.
    pub min_otm_points: usize,
}

impl Default for SkewConfig {
    fn default() -> Self {
        Self {
            neutral_max_slope: 30.0,
            weak_max_slope: 80.0,
            moderate_max_slope: 150.0,
            confidence_slope_scale: 150.0,
            min_bias_confidence: 0.15,
            min_otm_points: 5,
        }
    }
}

/// Historical move weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Weight multiplier per quarter back (weight = decay_base^quarters_back).
    pub decay_base: f64,
    /// Quarters required before statistics are trusted.
    pub min_quarters: usize,
    /// Most recent quarters considered.
    pub max_quarters: usize,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            decay_base: 0.85,
            min_quarters: 2,
            max_quarters: 12,
        }
    }
}

/// Delta placement for generated strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub base_short_delta: Decimal,
    pub base_long_delta: Decimal,
    pub strong_adjustment: Decimal,
    pub moderate_adjustment: Decimal,
    pub weak_adjustment: Decimal,
    /// Minimum short minus long delta.
    pub min_spread_width: Decimal,
    pub min_delta: Decimal,
    pub max_delta: Decimal,
    /// Pair used when clamping destroys the minimum width.
    pub fallback_short_delta: Decimal,
    pub fallback_long_delta: Decimal,
    /// Largest |quote delta - target delta| accepted when matching strikes.
    pub strike_delta_tolerance: f64,
    /// Bias confidence required before a single naked leg is offered.
    pub single_leg_min_confidence: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            base_short_delta: dec!(0.30),
            base_long_delta: dec!(0.20),
            strong_adjustment: dec!(0.10),
            moderate_adjustment: dec!(0.05),
            weak_adjustment: dec!(0.02),
            min_spread_width: dec!(0.05),
            min_delta: dec!(0.10),
            max_delta: dec!(0.40),
            fallback_short_delta: dec!(0.25),
            fallback_long_delta: dec!(0.20),
            strike_delta_tolerance: 0.10,
            single_leg_min_confidence: 0.60,
        }
    }
}

/// Kelly sizing and risk caps. All percentages are fractions of account equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub fractional_kelly: f64,
    pub max_position_pct: f64,
    pub max_loss_pct: f64,
    pub min_confidence: f64,
    pub max_total_exposure_pct: f64,
    /// Win probability with zero consistency and zero edge.
    pub base_win_probability: f64,
    /// Win probability added per unit of consistency score.
    pub consistency_weight: f64,
    /// Win probability added per unit of VRP edge score.
    pub edge_weight: f64,
    pub max_win_probability: f64,
    /// Payoff odds used when no strategy candidate supplies them.
    pub default_payoff_odds: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            fractional_kelly: 0.25,
            max_position_pct: 0.05,
            max_loss_pct: 0.02,
            min_confidence: 0.40,
            max_total_exposure_pct: 0.20,
            base_win_probability: 0.50,
            consistency_weight: 0.20,
            edge_weight: 0.20,
            max_win_probability: 0.90,
            default_payoff_odds: 0.50,
        }
    }
}

/// Named bundle of every tunable in the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub name: String,
    pub vrp: VrpThresholds,
    pub skew: SkewConfig,
    pub consistency: ConsistencyConfig,
    pub strategy: StrategyConfig,
    pub sizing: SizingConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            name: "canonical".to_string(),
            vrp: VrpThresholds::default(),
            skew: SkewConfig::default(),
            consistency: ConsistencyConfig::default(),
            strategy: StrategyConfig::default(),
            sizing: SizingConfig::default(),
        }
    }
}

impl ScoringConfig {
    /// Tighter tiers and smaller sizing.
    ///
    /// - Tiers: 8.0 / 5.0 / 2.0
    /// - Consistency decay 0.80
    /// - Eighth Kelly, 3% max position
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            name: "conservative".to_string(),
            vrp: VrpThresholds {
                excellent: 8.0,
                good: 5.0,
                marginal: 2.0,
            },
            consistency: ConsistencyConfig {
                decay_base: 0.80,
                ..ConsistencyConfig::default()
            },
            sizing: SizingConfig {
                fractional_kelly: 0.125,
                max_position_pct: 0.03,
                ..SizingConfig::default()
            },
            ..Self::default()
        }
    }

    /// Looser tiers, trading thinner premium.
    ///
    /// - Tiers: 5.0 / 2.5 / 1.2
    /// - Consistency decay 0.90
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            name: "aggressive".to_string(),
            vrp: VrpThresholds {
                excellent: 5.0,
                good: 2.5,
                marginal: 1.2,
            },
            consistency: ConsistencyConfig {
                decay_base: 0.90,
                ..ConsistencyConfig::default()
            },
            ..Self::default()
        }
    }

    /// Builder method to set the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder method to set the VRP tier cutoffs.
    #[must_use]
    pub fn with_vrp_thresholds(mut self, excellent: f64, good: f64, marginal: f64) -> Self {
        self.vrp = VrpThresholds {
            excellent,
            good,
            marginal,
        };
        self
    }

    /// Checks internal consistency of every section.
    ///
    /// # Errors
    /// Returns `ConfigError` describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |reason: String| -> Result<(), ConfigError> {
            Err(ConfigError {
                name: self.name.clone(),
                reason,
            })
        };

        let v = &self.vrp;
        if !(v.excellent > v.good && v.good > v.marginal && v.marginal > 0.0) {
            return fail(format!(
                "vrp cutoffs must satisfy excellent > good > marginal > 0 (got {} / {} / {})",
                v.excellent, v.good, v.marginal
            ));
        }

        let s = &self.skew;
        if !(s.neutral_max_slope >= 0.0
            && s.neutral_max_slope < s.weak_max_slope
            && s.weak_max_slope < s.moderate_max_slope)
        {
            return fail("skew slope cutoffs must be increasing".to_string());
        }
        if s.confidence_slope_scale <= 0.0 {
            return fail("skew confidence_slope_scale must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&s.min_bias_confidence) {
            return fail("skew min_bias_confidence must be within [0, 1]".to_string());
        }
        if s.min_otm_points < 3 {
            return fail("a quadratic fit needs at least 3 points".to_string());
        }

        let c = &self.consistency;
        if !(c.decay_base > 0.0 && c.decay_base <= 1.0) {
            return fail(format!("decay_base must be within (0, 1], got {}", c.decay_base));
        }
        if c.min_quarters < 2 || c.max_quarters < c.min_quarters {
            return fail("consistency requires 2 <= min_quarters <= max_quarters".to_string());
        }

        let st = &self.strategy;
        if st.min_delta <= Decimal::ZERO || st.min_delta >= st.max_delta || st.max_delta >= Decimal::ONE {
            return fail("strategy deltas must satisfy 0 < min_delta < max_delta < 1".to_string());
        }
        if st.fallback_short_delta - st.fallback_long_delta < st.min_spread_width
            || st.fallback_long_delta < st.min_delta
            || st.fallback_short_delta > st.max_delta
        {
            return fail("fallback delta pair must itself satisfy width and range".to_string());
        }
        if st.min_spread_width <= Decimal::ZERO {
            return fail("min_spread_width must be positive".to_string());
        }

        let z = &self.sizing;
        for (label, value) in [
            ("fractional_kelly", z.fractional_kelly),
            ("max_position_pct", z.max_position_pct),
            ("max_loss_pct", z.max_loss_pct),
            ("max_total_exposure_pct", z.max_total_exposure_pct),
            ("max_win_probability", z.max_win_probability),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return fail(format!("sizing {label} must be within (0, 1], got {value}"));
            }
        }
        if !(0.0..=1.0).contains(&z.min_confidence) {
            return fail("sizing min_confidence must be within [0, 1]".to_string());
        }
        if z.default_payoff_odds <= 0.0 {
            return fail("sizing default_payoff_odds must be positive".to_string());
        }

        Ok(())
    }
}

/// A set of named configs, the unit loaded from configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfigSet {
    #[serde(default = "default_configs")]
    pub configs: Vec<ScoringConfig>,
}

fn default_configs() -> Vec<ScoringConfig> {
    vec![ScoringConfig::default()]
}

impl Default for ScoringConfigSet {
    fn default() -> Self {
        Self {
            configs: default_configs(),
        }
    }
}

impl ScoringConfigSet {
    /// Looks up a config by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ScoringConfig> {
        self.configs.iter().find(|c| c.name == name)
    }

    /// Validates every config and rejects duplicate names.
    ///
    /// # Errors
    /// Returns the first `ConfigError` encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.configs.is_empty() {
            return Err(ConfigError {
                name: String::new(),
                reason: "at least one scoring config is required".to_string(),
            });
        }
        for (i, config) in self.configs.iter().enumerate() {
            config.validate()?;
            if self.configs[..i].iter().any(|c| c.name == config.name) {
                return Err(ConfigError {
                    name: config.name.clone(),
                    reason: "duplicate config name".to_string(),
                });
            }
        }
        Ok(())
    }
}
