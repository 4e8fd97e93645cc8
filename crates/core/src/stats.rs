//! Statistical helpers shared by the analyzers and the backtest metrics.

/// Weighted mean and population standard deviation.
///
/// Returns `None` if the slices differ in length, are empty, or the weights
/// sum to zero.
#[must_use]
pub fn weighted_moments(values: &[f64], weights: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() || values.len() != weights.len() {
        return None;
    }
    let weight_sum: f64 = weights.iter().sum();
    if weight_sum <= 0.0 {
        return None;
    }

    let mean = values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / weight_sum;
    let variance = values
        .iter()
        .zip(weights)
        .map(|(v, w)| w * (v - mean).powi(2))
        .sum::<f64>()
        / weight_sum;

    Some((mean, variance.max(0.0).sqrt()))
}

/// Arithmetic mean, 0 for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1), 0 with fewer than two values.
#[must_use]
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Per-observation Sharpe ratio (mean / sample std), not annualised.
///
/// Returns 0 with fewer than two observations or zero dispersion.
#[must_use]
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    let std = sample_std(returns);
    if std <= f64::EPSILON {
        return 0.0;
    }
    mean(returns) / std
}

/// Calculates the Wilson score confidence interval for a proportion.
///
/// # Formula
/// ```text
/// CI = (p + z^2/(2n) +/- z * sqrt(p(1-p)/n + z^2/(4n^2))) / (1 + z^2/n)
/// ```
///
/// # Examples
/// ```
/// use ivcrush_core::stats::wilson_ci;
///
/// let (lower, upper) = wilson_ci(50, 100, 1.96);
/// assert!(lower > 0.39 && lower < 0.41);
/// assert!(upper > 0.59 && upper < 0.61);
/// ```
#[must_use]
pub fn wilson_ci(wins: usize, n: usize, z: f64) -> (f64, f64) {
    if n == 0 {
        return (0.0, 0.0);
    }

    let n_f = n as f64;
    let p = wins as f64 / n_f;
    let z_sq = z * z;

    let denominator = 1.0 + z_sq / n_f;
    let center = p + z_sq / (2.0 * n_f);
    let spread = z * (p * (1.0 - p) / n_f + z_sq / (4.0 * n_f * n_f)).sqrt();

    let lower = (center - spread) / denominator;
    let upper = (center + spread) / denominator;

    (lower.max(0.0), upper.min(1.0))
}
