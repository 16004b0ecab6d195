//! Numeric primitives shared by the feature extractor and the detectors.
//!
//! Mean and standard deviation come from statrs. Percentiles use linear
//! interpolation between closest ranks (Hyndman-Fan type 7), which is what the
//! IQR fence and the prominence cut-off are calibrated against.

use statrs::statistics::Statistics;

/// Arithmetic mean, 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().mean()
}

/// Population standard deviation (ddof = 0), 0.0 for an empty slice.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().population_std_dev()
}

/// Coefficient of variation with the denominator floored at 1.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    std_dev(values) / mean(values).max(1.0)
}

/// Percentage change from `from` to `to`, denominator floored at 1.
///
/// The floor caps the ratio when the reference level is near zero.
pub fn pct_change(from: f64, to: f64) -> f64 {
    (to - from) / from.max(1.0) * 100.0
}

/// Percentile `q` (0-100) of unsorted data, linearly interpolated.
///
/// Returns `None` for empty input or non-finite `q`.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !q.is_finite() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(percentile_sorted(&sorted, q))
}

/// Percentile of already-sorted, non-empty data.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Standardize to zero mean and unit variance.
///
/// A zero-variance input maps to all zeros (scale treated as 1).
pub fn standardize(values: &[f64]) -> Vec<f64> {
    let m = mean(values);
    let sd = std_dev(values);
    let scale = if sd > 0.0 { sd } else { 1.0 };
    values.iter().map(|v| (v - m) / scale).collect()
}
