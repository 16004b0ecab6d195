//! Detection Scenario Tests
//!
//! End-to-end runs of the three-method spike detector, trend features and
//! forecast through the public API, on synthetic CCU series shaped like real
//! maps: flat, daily-seasonal, noisy, with and without historical context.

use harvest::config::DetectionConfig;
use harvest::ml_engine::forecast::{classify_trend, forecast_7day};
use harvest::ml_engine::spike_detection::{
    LocalOutlierDetector, PeakProminenceDetector, SeasonalResidualDetector, SpikeMethod,
};
use harvest::ml_engine::{compute_trend_features, detect_spikes, DetectOptions, DetectionError};
use harvest::types::{Trend, TrendStrength};
use harvest::HybridSpikeDetector;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn constant_with_spike(len: usize, base: f64, spike_at: usize, spike: f64) -> Vec<f64> {
    let mut series = vec![base; len];
    series[spike_at] = spike;
    series
}

/// Seven days at 30-minute resolution with a daily swing.
fn daily_pattern(base: f64, amplitude: f64) -> Vec<f64> {
    (0..336)
        .map(|i| base + amplitude * ((i % 48) as f64 / 48.0 * std::f64::consts::TAU).sin())
        .collect()
}

fn all_methods() -> Vec<Box<dyn SpikeMethod>> {
    let c = DetectionConfig::default();
    vec![
        Box::new(SeasonalResidualDetector::new(c.seasonal_period, c.iqr_multiplier)),
        Box::new(PeakProminenceDetector::new(c.peak_distance, c.prominence_percentile)),
        Box::new(LocalOutlierDetector::new(c.lof_neighbors, c.lof_contamination)),
    ]
}

// ============================================================================
// Hybrid detector
// ============================================================================

#[test]
fn single_large_spike_end_to_end() {
    let series = constant_with_spike(336, 5000.0, 200, 50000.0);
    let result = detect_spikes(&series, &DetectOptions::default()).unwrap();

    assert_eq!(result.samples_analyzed, 336);
    assert_eq!(result.spike_events.len(), 1);
    let event = &result.spike_events[0];
    assert_eq!(event.peak_index, 200);
    assert_eq!(event.peak_ccu, 50000.0);
    assert!(event.votes >= 2, "votes = {}", event.votes);
    assert!(!result.map_scale.is_small_map);
}

#[test]
fn constant_series_flags_nothing_in_any_method() {
    for value in [0.0, 3.0, 5000.0] {
        let series = vec![value; 336];
        for method in all_methods() {
            assert!(
                method.detect(&series).unwrap().is_empty(),
                "{} flagged a constant series of {value}",
                method.name()
            );
        }
        let result = detect_spikes(&series, &DetectOptions::default()).unwrap();
        assert!(result.spike_events.is_empty());
        assert_eq!(compute_trend_features(&series).volatility, 0.0);
    }
}

#[test]
fn spike_on_daily_seasonal_pattern() {
    let mut series = daily_pattern(200.0, 50.0);
    series[200] += 2000.0;

    let result = detect_spikes(&series, &DetectOptions::default()).unwrap();
    assert_eq!(result.spike_events.len(), 1);
    assert_eq!(result.spike_events[0].peak_index, 200);
    assert_eq!(result.spike_events[0].votes, 3);
}

#[test]
fn seasonal_swing_alone_is_not_a_spike() {
    let result = detect_spikes(&daily_pattern(1000.0, 300.0), &DetectOptions::default()).unwrap();
    assert!(result.spike_events.is_empty());
}

#[test]
fn noisy_baseline_with_spike() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut series: Vec<f64> = (0..336).map(|_| 1000.0 + rng.gen_range(-30.0..30.0)).collect();
    series[150] = 6000.0;

    let result = detect_spikes(&series, &DetectOptions::default()).unwrap();
    // Noise peaks may collect votes but sit far below the normal-tier floor
    assert_eq!(result.spike_events.len(), 1);
    assert_eq!(result.spike_events[0].peak_index, 150);
    assert_eq!(result.spike_events[0].peak_ccu, 6000.0);
}

#[test]
fn tiny_map_bump_is_suppressed() {
    // 5-CCU bump on a map that never exceeds 10 CCU
    let series = constant_with_spike(336, 5.0, 200, 10.0);

    let peaks = PeakProminenceDetector::new(6, 90.0).detect(&series).unwrap();
    assert!(peaks.contains(&200), "individual method should still flag the bump");

    let result = detect_spikes(&series, &DetectOptions::default()).unwrap();
    assert!(result.map_scale.is_tiny_map);
    assert!(result.spike_events.is_empty());

    // The same shape a hundred times larger clears the floor
    let scaled: Vec<f64> = series.iter().map(|v| v * 100.0).collect();
    assert_eq!(detect_spikes(&scaled, &DetectOptions::default()).unwrap().spike_events.len(), 1);
}

#[test]
fn short_series_is_insufficient() {
    let err = detect_spikes(&[100.0; 49], &DetectOptions::default()).unwrap_err();
    assert!(matches!(err, DetectionError::InsufficientData { needed: 50, got: 49 }));
}

#[test]
fn unanimous_vote_threshold_from_config() {
    let config = DetectionConfig {
        min_votes: 3,
        ..DetectionConfig::default()
    };
    let detector = HybridSpikeDetector::new(&config);
    let series = constant_with_spike(336, 5000.0, 200, 50000.0);
    let result = detector.detect(&series, &DetectOptions::from_config(&config)).unwrap();
    assert!(result.spike_events.iter().all(|e| e.votes == 3));
}

// ============================================================================
// Historical context
// ============================================================================

#[test]
fn history_spike_outside_recent_window_is_dropped() {
    // History twice the recent window, spike in the older two thirds
    let series = constant_with_spike(1008, 5000.0, 300, 50000.0);
    let options = DetectOptions::default().recent_window(336);

    let result = detect_spikes(&series, &options).unwrap();
    assert_eq!(result.samples_analyzed, 1008);
    assert!(result.spike_events.is_empty());
}

#[test]
fn recent_spike_index_is_rebased() {
    let series = constant_with_spike(1008, 5000.0, 900, 50000.0);
    let options = DetectOptions::default().recent_window(336);

    let result = detect_spikes(&series, &options).unwrap();
    assert_eq!(result.spike_events.len(), 1);
    let event = &result.spike_events[0];
    assert_eq!(event.peak_index, 900 - 672);
    assert_eq!(event.absolute_index, 900);
    assert!(event.peak_index < 336);
}

// ============================================================================
// Trend features and forecast
// ============================================================================

#[test]
fn short_series_has_zero_features() {
    for len in 0..10 {
        let features = compute_trend_features(&vec![123.0; len]);
        assert_eq!(features.baseline_ccu, 0.0);
        assert_eq!(features.trend_slope, 0.0);
        assert_eq!(features.volatility, 0.0);
        assert_eq!(features.recent_momentum, 0.0);
    }
}

#[test]
fn trend_features_are_deterministic() {
    let mut rng = StdRng::seed_from_u64(42);
    let series: Vec<f64> = (0..336).map(|i| 500.0 + i as f64 + rng.gen_range(0.0..80.0)).collect();
    let a = compute_trend_features(&series);
    let b = compute_trend_features(&series);
    assert_eq!(a.baseline_ccu.to_bits(), b.baseline_ccu.to_bits());
    assert_eq!(a.trend_slope.to_bits(), b.trend_slope.to_bits());
    assert_eq!(a.volatility.to_bits(), b.volatility.to_bits());
    assert_eq!(a.recent_momentum.to_bits(), b.recent_momentum.to_bits());
}

#[test]
fn flat_trend_forecasts_flat_line() {
    let features = compute_trend_features(&vec![1234.4; 336]);
    assert_eq!(features.trend_slope, 0.0);

    let forecast = forecast_7day(&features, 0.0);
    assert_eq!(forecast.daily_forecast.len(), 7);
    assert!(forecast.daily_forecast.iter().all(|d| d.predicted_ccu == 1234));
    assert_eq!(forecast.trend, Trend::Stable);
}

#[test]
fn trend_classification_boundary() {
    assert_eq!(classify_trend(10.0).0, Trend::Stable);
    assert_eq!(classify_trend(10.01), (Trend::Growing, TrendStrength::Moderate));
    assert_eq!(classify_trend(-10.0).0, Trend::Stable);
}
