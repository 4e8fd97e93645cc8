//! Volatility skew fit and directional bias.
//!
//! Out-of-the-money puts (strike below spot) and calls (strike above spot)
//! are mapped to `(moneyness, IV%)` points and fitted with a quadratic
//! `iv = a + b*m + c*m^2`. The ATM slope is `b`: a positive slope means upside
//! strikes carry richer volatility (bullish), a negative slope means downside
//! protection is bid (bearish).
//!
//! Classification and confidence are independent outputs. When confidence
//! falls below the floor the reported bias is forced to neutral but the
//! confidence value is kept as computed.

use chrono::NaiveDate;
use ivcrush_core::bias::{BiasFamily, BiasStrength, DirectionalBias};
use ivcrush_core::config::SkewConfig;
use ivcrush_core::error::{AnalysisError, Result};
use ivcrush_core::types::{OptionChainSnapshot, OptionType};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Result of a skew fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkewAnalysis {
    /// First derivative at moneyness 0, in IV points per unit moneyness.
    pub slope_atm: f64,
    /// Second-order coefficient of the fit.
    pub curvature: f64,
    pub r_squared: f64,
    /// Reported bias, neutral when confidence is below the floor.
    pub directional_bias: DirectionalBias,
    /// Bias implied by the slope alone, before the confidence floor.
    pub raw_bias: DirectionalBias,
    /// `r_squared * min(1, |slope_atm| / scale)`, never altered by the floor.
    pub bias_confidence: f64,
    pub num_points: usize,
}

impl SkewAnalysis {
    /// Neutral, zero-confidence result used when a fit is impossible.
    #[must_use]
    pub fn insufficient(num_points: usize) -> Self {
        Self {
            slope_atm: 0.0,
            curvature: 0.0,
            r_squared: 0.0,
            directional_bias: DirectionalBias::Neutral,
            raw_bias: DirectionalBias::Neutral,
            bias_confidence: 0.0,
            num_points,
        }
    }

    /// Whether the bias was suppressed by the confidence floor.
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.directional_bias != self.raw_bias
    }
}

/// Classification of a slope/fit pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasClassification {
    pub raw_bias: DirectionalBias,
    pub directional_bias: DirectionalBias,
    pub bias_confidence: f64,
}

/// Classifies an ATM slope and fit quality.
#[must_use]
pub fn classify(slope_atm: f64, r_squared: f64, config: &SkewConfig) -> BiasClassification {
    let magnitude = slope_atm.abs();
    let strength = if magnitude <= config.neutral_max_slope {
        BiasStrength::None
    } else if magnitude <= config.weak_max_slope {
        BiasStrength::Weak
    } else if magnitude <= config.moderate_max_slope {
        BiasStrength::Moderate
    } else {
        BiasStrength::Strong
    };
    let family = if slope_atm > 0.0 {
        BiasFamily::Bullish
    } else if slope_atm < 0.0 {
        BiasFamily::Bearish
    } else {
        BiasFamily::Neutral
    };
    let raw_bias = DirectionalBias::from_parts(family, strength);

    let slope_factor = if config.confidence_slope_scale > 0.0 {
        (magnitude / config.confidence_slope_scale).min(1.0)
    } else {
        1.0
    };
    let bias_confidence = (r_squared.clamp(0.0, 1.0) * slope_factor).clamp(0.0, 1.0);

    let directional_bias = if bias_confidence < config.min_bias_confidence {
        DirectionalBias::Neutral
    } else {
        raw_bias
    };

    BiasClassification {
        raw_bias,
        directional_bias,
        bias_confidence,
    }
}

/// Fits the skew of one expiration.
///
/// Fewer than `min_otm_points` usable points is not an error: the result is
/// neutral with zero confidence.
///
/// # Errors
/// `InvalidInput` if the snapshot spot is not positive.
pub fn analyze(
    chain: &OptionChainSnapshot,
    expiration: NaiveDate,
    config: &SkewConfig,
) -> Result<SkewAnalysis> {
    let spot = chain.spot_f64();
    if spot <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "{}: spot must be positive",
            chain.symbol
        )));
    }

    let points: Vec<(f64, f64)> = chain
        .for_expiration(expiration)
        .filter(|q| q.is_valid() && q.implied_volatility.is_finite() && q.implied_volatility > 0.0)
        .filter_map(|q| {
            let strike = q.strike.to_f64()?;
            let otm = match q.option_type {
                OptionType::Put => strike < spot,
                OptionType::Call => strike > spot,
            };
            otm.then(|| ((strike - spot) / spot, q.implied_volatility * 100.0))
        })
        .collect();

    if points.len() < config.min_otm_points.max(3) {
        tracing::debug!(
            symbol = %chain.symbol,
            points = points.len(),
            required = config.min_otm_points,
            "Too few OTM points for skew fit, reporting neutral"
        );
        return Ok(SkewAnalysis::insufficient(points.len()));
    }

    let Some(fit) = fit_quadratic(&points) else {
        tracing::warn!(symbol = %chain.symbol, "Degenerate skew fit, reporting neutral");
        return Ok(SkewAnalysis::insufficient(points.len()));
    };

    let class = classify(fit.b, fit.r_squared, config);
    if class.directional_bias != class.raw_bias {
        tracing::info!(
            symbol = %chain.symbol,
            raw_bias = %class.raw_bias,
            confidence = class.bias_confidence,
            floor = config.min_bias_confidence,
            "Skew bias suppressed by confidence floor"
        );
    }

    Ok(SkewAnalysis {
        slope_atm: fit.b,
        curvature: fit.c,
        r_squared: fit.r_squared,
        directional_bias: class.directional_bias,
        raw_bias: class.raw_bias,
        bias_confidence: class.bias_confidence,
        num_points: points.len(),
    })
}

#[derive(Debug, Clone, Copy)]
struct QuadraticFit {
    b: f64,
    c: f64,
    r_squared: f64,
}

/// Least-squares quadratic via the 3x3 normal equations.
fn fit_quadratic(points: &[(f64, f64)]) -> Option<QuadraticFit> {
    let mut s = [0.0f64; 5]; // sum of x^0..x^4
    let mut t = [0.0f64; 3]; // sum of y * x^0..x^2
    for &(x, y) in points {
        let mut p = 1.0;
        for (k, sk) in s.iter_mut().enumerate() {
            *sk += p;
            if k < 3 {
                t[k] += y * p;
            }
            p *= x;
        }
    }

    let mut m = [
        [s[0], s[1], s[2], t[0]],
        [s[1], s[2], s[3], t[1]],
        [s[2], s[3], s[4], t[2]],
    ];
    let [a, b, c] = solve3(&mut m)?;

    let n = points.len() as f64;
    let mean_y = t[0] / n;
    let (ss_res, ss_tot) = points.iter().fold((0.0, 0.0), |(res, tot), &(x, y)| {
        let predicted = a + b * x + c * x * x;
        (res + (y - predicted).powi(2), tot + (y - mean_y).powi(2))
    });
    // Constant IV explains nothing; treat as zero fit quality.
    let r_squared = if ss_tot <= 1e-12 {
        0.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };

    Some(QuadraticFit { b, c, r_squared })
}

/// Gaussian elimination with partial pivoting on an augmented 3x4 matrix.
fn solve3(m: &mut [[f64; 4]; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))?;
        if m[pivot][col].abs() < 1e-14 {
            return None;
        }
        m.swap(col, pivot);
        for row in (col + 1)..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut x = [0.0f64; 3];
    for row in (0..3).rev() {
        let tail: f64 = ((row + 1)..3).map(|k| m[row][k] * x[k]).sum();
        x[row] = (m[row][3] - tail) / m[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}
