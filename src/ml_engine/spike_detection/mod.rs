//! Hybrid Spike Detector
//!
//! Three independent single-series anomaly detectors vote on every sample:
//!
//! - `seasonal`: daily seasonal decomposition, upper IQR fence on residuals
//! - `peaks`: local maxima in the top prominence percentile
//! - `lof`: local outlier factor over standardized (ccu, time)
//!
//! Samples with at least `min_votes` votes are grouped when they lie within
//! `grouping_window` samples of each other. Each group becomes one spike
//! event represented by its highest sample, and events whose magnitude
//! (peak − mean) falls below the map's scale-tier floor are discarded.
//!
//! In historical-context mode a long concatenated series is analyzed but only
//! events peaking inside the trailing `recent_count` samples are reported,
//! with indices rebased onto that recent window.

pub mod lof;
pub mod peaks;
pub mod seasonal;

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::debug;

use crate::config::{DetectionConfig, ScaleTierConfig};
use crate::types::{DateRange, MapScale, MethodName, SpikeDetection, SpikeEvent};

use super::stats;

pub use lof::LocalOutlierDetector;
pub use peaks::PeakProminenceDetector;
pub use seasonal::SeasonalResidualDetector;

/// Anomaly score reported when no spike survives filtering.
pub const NORMAL_ANOMALY_SCORE: f64 = 0.1;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
    #[error("Insufficient data: need {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },
}

// ============================================================================
// Detection Methods
// ============================================================================

/// A single-series anomaly detector contributing one vote per flagged sample.
pub trait SpikeMethod: Send + Sync {
    fn name(&self) -> MethodName;

    /// Indices of samples this method considers anomalous.
    fn detect(&self, series: &[f64]) -> Result<BTreeSet<usize>, DetectionError>;
}

/// Per-call detection options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOptions {
    /// Votes required for a sample to count as consensus
    pub min_votes: u8,
    /// Maximum gap (samples) between consensus points of one event
    pub grouping_window: usize,
    /// Only report events inside the trailing `recent_count` samples
    pub focus_recent: bool,
    pub recent_count: usize,
    /// Wall-clock span of the reported window, for event timestamps
    pub range: Option<DateRange>,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            min_votes: 2,
            grouping_window: 6,
            focus_recent: false,
            recent_count: 0,
            range: None,
        }
    }
}

impl DetectOptions {
    /// Options seeded from configuration defaults.
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            min_votes: config.min_votes,
            grouping_window: config.grouping_window,
            ..Self::default()
        }
    }

    /// Historical-context mode: analyze everything, report only the tail.
    pub fn recent_window(mut self, recent_count: usize) -> Self {
        self.focus_recent = true;
        self.recent_count = recent_count;
        self
    }

    pub fn with_range(mut self, range: Option<DateRange>) -> Self {
        self.range = range;
        self
    }
}

// ============================================================================
// Scale Classification
// ============================================================================

/// Classify the traffic tier of a series and derive its spike floor.
pub fn classify_scale(series: &[f64], tiers: &ScaleTierConfig) -> MapScale {
    let mean_ccu = stats::mean(series);
    let max_ccu = series.iter().copied().fold(0.0_f64, f64::max);
    let is_tiny_map = max_ccu < tiers.tiny_max_ccu;
    let is_small_map = max_ccu < tiers.small_max_ccu;

    let min_spike_magnitude = if is_tiny_map {
        tiers.tiny_floor.max(mean_ccu * tiers.tiny_mean_multiplier)
    } else if is_small_map {
        tiers.small_floor.max(mean_ccu * tiers.small_mean_multiplier)
    } else {
        tiers.normal_floor.max(mean_ccu * tiers.normal_mean_multiplier)
    };

    MapScale {
        mean_ccu,
        max_ccu,
        min_spike_magnitude,
        is_tiny_map,
        is_small_map,
    }
}

// ============================================================================
// Hybrid Detector
// ============================================================================

/// Ensemble of spike methods combined by consensus voting.
pub struct HybridSpikeDetector {
    methods: Vec<Box<dyn SpikeMethod>>,
    min_samples: usize,
    tiers: ScaleTierConfig,
}

impl HybridSpikeDetector {
    /// Build the standard three-method ensemble from configuration.
    pub fn new(config: &DetectionConfig) -> Self {
        let methods: Vec<Box<dyn SpikeMethod>> = vec![
            Box::new(SeasonalResidualDetector::new(
                config.seasonal_period,
                config.iqr_multiplier,
            )),
            Box::new(PeakProminenceDetector::new(
                config.peak_distance,
                config.prominence_percentile,
            )),
            Box::new(LocalOutlierDetector::new(
                config.lof_neighbors,
                config.lof_contamination,
            )),
        ];
        Self::with_methods(methods, config.min_samples, config.scale.clone())
    }

    /// Build a detector from an explicit set of methods.
    pub fn with_methods(
        methods: Vec<Box<dyn SpikeMethod>>,
        min_samples: usize,
        tiers: ScaleTierConfig,
    ) -> Self {
        Self {
            methods,
            min_samples,
            tiers,
        }
    }

    /// Run every method, tally votes, group and scale-filter.
    ///
    /// Fails only when the series is shorter than the configured minimum.
    /// A method that errors contributes zero votes.
    pub fn detect(
        &self,
        series: &[f64],
        options: &DetectOptions,
    ) -> Result<SpikeDetection, DetectionError> {
        let n = series.len();
        if n < self.min_samples {
            return Err(DetectionError::InsufficientData {
                needed: self.min_samples,
                got: n,
            });
        }

        // Votes per sample, and which methods cast them
        let mut flagged_by: Vec<BTreeSet<MethodName>> = vec![BTreeSet::new(); n];
        let mut methods_run = Vec::with_capacity(self.methods.len());
        for method in &self.methods {
            match method.detect(series) {
                Ok(indices) => {
                    debug!(method = %method.name(), flagged = indices.len(), "Spike method finished");
                    for i in indices.into_iter().filter(|&i| i < n) {
                        flagged_by[i].insert(method.name());
                    }
                    methods_run.push(method.name());
                }
                Err(e) => {
                    debug!(method = %method.name(), error = %e, "Spike method skipped");
                }
            }
        }

        let consensus: Vec<usize> = flagged_by
            .iter()
            .enumerate()
            .filter_map(|(i, m)| (m.len() >= usize::from(options.min_votes)).then_some(i))
            .collect();

        let map_scale = classify_scale(series, &self.tiers);
        let recent_start = if options.focus_recent {
            n - options.recent_count.min(n)
        } else {
            0
        };
        let window_len = n - recent_start;

        let mut spike_events = Vec::new();
        for group in group_indices(&consensus, options.grouping_window) {
            let Some(event) = self.build_event(series, &group, &flagged_by, &map_scale) else {
                continue;
            };
            if event.absolute_index < recent_start {
                continue;
            }
            let peak_index = event.absolute_index - recent_start;
            let timestamp = options
                .range
                .map(|r| r.timestamp_at(peak_index, window_len));
            spike_events.push(SpikeEvent {
                peak_index,
                timestamp,
                ..event
            });
        }

        debug!(
            samples = n,
            consensus = consensus.len(),
            events = spike_events.len(),
            min_magnitude = map_scale.min_spike_magnitude,
            "Hybrid spike detection complete"
        );

        Ok(SpikeDetection {
            spike_events,
            map_scale,
            samples_analyzed: n,
            methods_run,
        })
    }

    /// Turn one consensus group into an event, or `None` if it is below the
    /// scale floor.
    fn build_event(
        &self,
        series: &[f64],
        group: &[usize],
        flagged_by: &[BTreeSet<MethodName>],
        scale: &MapScale,
    ) -> Option<SpikeEvent> {
        let (first, last) = (*group.first()?, *group.last()?);

        // Representative point is the true peak, earliest on ties
        let mut peak = first;
        for &i in group {
            if series[i] > series[peak] {
                peak = i;
            }
        }

        let peak_ccu = series[peak];
        let magnitude = peak_ccu - scale.mean_ccu;
        if magnitude < scale.min_spike_magnitude {
            return None;
        }

        let methods: BTreeSet<MethodName> = group
            .iter()
            .flat_map(|&i| flagged_by[i].iter().copied())
            .collect();

        Some(SpikeEvent {
            peak_index: peak,
            absolute_index: peak,
            peak_ccu,
            magnitude,
            votes: u8::try_from(methods.len()).unwrap_or(u8::MAX),
            methods: methods.into_iter().collect(),
            duration_samples: last - first + 1,
            timestamp: None,
        })
    }
}

impl Default for HybridSpikeDetector {
    fn default() -> Self {
        Self::new(&DetectionConfig::default())
    }
}

/// Split sorted indices into runs whose consecutive gaps are at most `window`.
pub fn group_indices(indices: &[usize], window: usize) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for &i in indices {
        if let Some(group) = groups.last_mut() {
            if group.last().is_some_and(|&last| i - last <= window) {
                group.push(i);
                continue;
            }
        }
        groups.push(vec![i]);
    }
    groups
}

/// Detect spikes with the default three-method ensemble.
pub fn detect_spikes(
    series: &[f64],
    options: &DetectOptions,
) -> Result<SpikeDetection, DetectionError> {
    HybridSpikeDetector::default().detect(series, options)
}

// ============================================================================
// Reporting Helpers
// ============================================================================

/// Heuristic anomaly score: more negative means more anomalous.
///
/// Scales with the average consensus strength of the reported events.
pub fn anomaly_score(events: &[SpikeEvent]) -> f64 {
    if events.is_empty() {
        return NORMAL_ANOMALY_SCORE;
    }
    let avg_votes =
        events.iter().map(|e| f64::from(e.votes)).sum::<f64>() / events.len() as f64;
    -(avg_votes / 3.0 * 0.5 + 0.05 * (events.len().min(5) as f64 - 1.0))
}

/// Human-readable summary of a detection result.
pub fn interpret(events: &[SpikeEvent], scale: &MapScale) -> String {
    let Some(largest) = events.iter().max_by(|a, b| a.magnitude.total_cmp(&b.magnitude)) else {
        return if scale.is_small_map {
            format!(
                "No significant spikes detected. Fluctuations below {:.0} CCU are treated as normal for a map of this size.",
                scale.min_spike_magnitude
            )
        } else {
            "No significant spikes detected. CCU pattern looks organic.".to_string()
        };
    };

    let plural = if events.len() == 1 { "" } else { "s" };
    let pct = largest.magnitude / scale.mean_ccu.max(1.0) * 100.0;
    format!(
        "Detected {} spike{} confirmed by multiple detection methods. Largest spike reached {:.0} CCU, {:.0} above average (+{:.0}%), likely from a campaign or viral moment.",
        events.len(),
        plural,
        largest.peak_ccu,
        largest.magnitude,
        pct
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Method that flags a fixed set of indices.
    struct Fixed(MethodName, Vec<usize>);

    impl SpikeMethod for Fixed {
        fn name(&self) -> MethodName {
            self.0
        }
        fn detect(&self, _series: &[f64]) -> Result<BTreeSet<usize>, DetectionError> {
            Ok(self.1.iter().copied().collect())
        }
    }

    /// Method that always fails.
    struct Failing;

    impl SpikeMethod for Failing {
        fn name(&self) -> MethodName {
            MethodName::SeasonalResidual
        }
        fn detect(&self, series: &[f64]) -> Result<BTreeSet<usize>, DetectionError> {
            Err(DetectionError::InsufficientData {
                needed: 1000,
                got: series.len(),
            })
        }
    }

    fn baseline_with_spike(len: usize, base: f64, spike_at: usize, spike: f64) -> Vec<f64> {
        let mut s = vec![base; len];
        s[spike_at] = spike;
        s
    }

    #[test]
    fn test_group_indices() {
        let groups = group_indices(&[1, 3, 9, 20, 26, 33], 6);
        assert_eq!(groups, vec![vec![1, 3, 9], vec![20, 26], vec![33]]);
        assert!(group_indices(&[], 6).is_empty());
    }

    #[test]
    fn test_scale_tiers() {
        let tiers = ScaleTierConfig::default();

        let tiny = classify_scale(&[5.0, 5.0, 10.0, 4.0], &tiers);
        assert!(tiny.is_tiny_map && tiny.is_small_map);
        assert!((tiny.min_spike_magnitude - 12.0).abs() < 1e-9); // max(10, 6 * 2)

        let small = classify_scale(&[30.0, 40.0], &tiers);
        assert!(!small.is_tiny_map && small.is_small_map);
        assert!((small.min_spike_magnitude - 52.5).abs() < 1e-9); // max(15, 35 * 1.5)

        let large = classify_scale(&[40.0, 60.0], &tiers);
        assert!(!large.is_small_map);
        assert!((large.min_spike_magnitude - 20.0).abs() < 1e-9); // max(20, 12.5)
    }

    #[test]
    fn test_consensus_requires_min_votes() {
        let series = baseline_with_spike(100, 100.0, 40, 900.0);
        let detector = HybridSpikeDetector::with_methods(
            vec![
                Box::new(Fixed(MethodName::SeasonalResidual, vec![40])),
                Box::new(Fixed(MethodName::PeakProminence, vec![40])),
                Box::new(Fixed(MethodName::LocalOutlierFactor, vec![])),
            ],
            50,
            ScaleTierConfig::default(),
        );

        let result = detector.detect(&series, &DetectOptions::default()).unwrap();
        assert_eq!(result.spike_events.len(), 1);
        assert_eq!(result.spike_events[0].votes, 2);

        let unanimous = DetectOptions {
            min_votes: 3,
            ..DetectOptions::default()
        };
        assert!(detector.detect(&series, &unanimous).unwrap().spike_events.is_empty());
    }

    #[test]
    fn test_group_peak_is_max_value() {
        let mut series = vec![100.0; 100];
        series[40] = 500.0;
        series[42] = 900.0;
        series[45] = 600.0;
        let detector = HybridSpikeDetector::with_methods(
            vec![
                Box::new(Fixed(MethodName::SeasonalResidual, vec![40, 45])),
                Box::new(Fixed(MethodName::PeakProminence, vec![40, 42, 45])),
                Box::new(Fixed(MethodName::LocalOutlierFactor, vec![42])),
            ],
            50,
            ScaleTierConfig::default(),
        );

        let result = detector.detect(&series, &DetectOptions::default()).unwrap();
        assert_eq!(result.spike_events.len(), 1);
        let event = &result.spike_events[0];
        assert_eq!(event.peak_index, 42);
        assert_eq!(event.peak_ccu, 900.0);
        assert_eq!(event.votes, 3);
        assert_eq!(event.duration_samples, 6);
    }

    #[test]
    fn test_failing_method_contributes_no_votes() {
        let series = baseline_with_spike(100, 100.0, 40, 900.0);
        let detector = HybridSpikeDetector::with_methods(
            vec![
                Box::new(Failing),
                Box::new(Fixed(MethodName::PeakProminence, vec![40])),
                Box::new(Fixed(MethodName::LocalOutlierFactor, vec![40])),
            ],
            50,
            ScaleTierConfig::default(),
        );

        let result = detector.detect(&series, &DetectOptions::default()).unwrap();
        assert_eq!(result.methods_run.len(), 2);
        assert_eq!(result.spike_events.len(), 1);
    }

    #[test]
    fn test_too_short_series_fails() {
        let result = detect_spikes(&[10.0; 49], &DetectOptions::default());
        assert_eq!(
            result.unwrap_err(),
            DetectionError::InsufficientData { needed: 50, got: 49 }
        );
    }

    #[test]
    fn test_scale_filter_drops_small_bump() {
        let series = baseline_with_spike(100, 5.0, 40, 10.0);
        let detector = HybridSpikeDetector::with_methods(
            vec![
                Box::new(Fixed(MethodName::SeasonalResidual, vec![40])),
                Box::new(Fixed(MethodName::PeakProminence, vec![40])),
                Box::new(Fixed(MethodName::LocalOutlierFactor, vec![40])),
            ],
            50,
            ScaleTierConfig::default(),
        );
        let result = detector.detect(&series, &DetectOptions::default()).unwrap();
        assert!(result.spike_events.is_empty());
        assert!(result.map_scale.is_tiny_map);
    }

    #[test]
    fn test_recent_window_rebases_indices() {
        let mut series = vec![100.0; 300];
        series[50] = 900.0;
        series[250] = 800.0;
        let detector = HybridSpikeDetector::with_methods(
            vec![
                Box::new(Fixed(MethodName::SeasonalResidual, vec![50, 250])),
                Box::new(Fixed(MethodName::PeakProminence, vec![50, 250])),
            ],
            50,
            ScaleTierConfig::default(),
        );

        let options = DetectOptions::default().recent_window(100);
        let result = detector.detect(&series, &options).unwrap();
        assert_eq!(result.spike_events.len(), 1);
        assert_eq!(result.spike_events[0].peak_index, 50);
        assert_eq!(result.spike_events[0].absolute_index, 250);
    }

    #[test]
    fn test_anomaly_score_and_interpretation() {
        let scale = classify_scale(&[100.0; 10], &ScaleTierConfig::default());
        assert_eq!(anomaly_score(&[]), NORMAL_ANOMALY_SCORE);
        assert!(interpret(&[], &scale).starts_with("No significant spikes"));

        let event = SpikeEvent {
            peak_index: 3,
            absolute_index: 3,
            peak_ccu: 400.0,
            magnitude: 300.0,
            votes: 3,
            methods: vec![MethodName::PeakProminence],
            duration_samples: 1,
            timestamp: None,
        };
        assert!(anomaly_score(std::slice::from_ref(&event)) < 0.0);
        assert!(interpret(&[event], &scale).contains("Detected 1 spike "));
    }
}
