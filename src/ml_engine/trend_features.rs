//! Trend Feature Extractor
//!
//! Turns a raw CCU series into the scalar features consumed by the forecast
//! and discovery models:
//!
//! - `baseline_ccu`: mean of the series
//! - `trend_slope`: % change between first-quarter and last-quarter means
//! - `volatility`: coefficient of variation
//! - `recent_momentum`: % change between the last 20% and the 20% window
//!   centred on the series midpoint
//!
//! Every ratio floors its denominator at 1 CCU so that near-zero baselines
//! cannot blow the ratio up.

use crate::types::TrendFeatures;

use super::stats;

/// Minimum samples required to compute trend features.
pub const MIN_TREND_SAMPLES: usize = 10;

/// Stateless trend feature extractor.
pub struct TrendFeatureExtractor;

impl TrendFeatureExtractor {
    /// Compute trend features for a series.
    ///
    /// Returns all-zero features when fewer than `MIN_TREND_SAMPLES` samples
    /// are available.
    pub fn compute(series: &[f64]) -> TrendFeatures {
        let n = series.len();
        if n < MIN_TREND_SAMPLES {
            return TrendFeatures::default();
        }

        let baseline_ccu = stats::mean(series);

        let quarter = n / 4;
        let early = stats::mean(&series[..quarter]);
        let late = stats::mean(&series[n - quarter..]);
        let trend_slope = stats::pct_change(early, late);

        let volatility = stats::coefficient_of_variation(series);

        let window = n / 5;
        let recent = stats::mean(&series[n - window..]);
        let mid_start = n / 2 - window / 2;
        let middle = stats::mean(&series[mid_start..mid_start + window]);
        let recent_momentum = stats::pct_change(middle, recent);

        TrendFeatures {
            baseline_ccu,
            trend_slope,
            volatility,
            recent_momentum,
        }
    }
}

/// Free-function form of [`TrendFeatureExtractor::compute`].
pub fn compute_trend_features(series: &[f64]) -> TrendFeatures {
    TrendFeatureExtractor::compute(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_series_returns_zeros() {
        for len in 0..MIN_TREND_SAMPLES {
            let series = vec![100.0; len];
            assert_eq!(compute_trend_features(&series), TrendFeatures::default());
        }
    }

    #[test]
    fn test_constant_series() {
        let f = compute_trend_features(&[250.0; 336]);
        assert!((f.baseline_ccu - 250.0).abs() < 1e-9);
        assert_eq!(f.trend_slope, 0.0);
        assert_eq!(f.volatility, 0.0);
        assert_eq!(f.recent_momentum, 0.0);
    }

    #[test]
    fn test_linear_growth_slope() {
        // 0..100 → first quarter mean 12, last quarter mean 87
        let series: Vec<f64> = (0..100).map(f64::from).collect();
        let f = compute_trend_features(&series);
        assert!((f.trend_slope - (87.0 - 12.0) / 12.0 * 100.0).abs() < 1e-9);
        assert!(f.recent_momentum > 0.0);
    }

    #[test]
    fn test_zero_early_quarter_uses_floor() {
        let mut series = vec![0.0; 40];
        for v in series.iter_mut().skip(30) {
            *v = 5.0;
        }
        let f = compute_trend_features(&series);
        // early mean 0 floored to 1, late mean 5
        assert!((f.trend_slope - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_declining_momentum() {
        let series: Vec<f64> = (0..50).map(|i| 1000.0 - f64::from(i) * 10.0).collect();
        let f = compute_trend_features(&series);
        assert!(f.trend_slope < 0.0);
        assert!(f.recent_momentum < 0.0);
    }

    #[test]
    fn test_deterministic() {
        let series: Vec<f64> = (0..336).map(|i| (f64::from(i) * 0.37).sin() * 40.0 + 200.0).collect();
        let a = compute_trend_features(&series);
        let b = compute_trend_features(&series);
        assert_eq!(a.baseline_ccu.to_bits(), b.baseline_ccu.to_bits());
        assert_eq!(a.trend_slope.to_bits(), b.trend_slope.to_bits());
        assert_eq!(a.volatility.to_bits(), b.volatility.to_bits());
        assert_eq!(a.recent_momentum.to_bits(), b.recent_momentum.to_bits());
    }
}
