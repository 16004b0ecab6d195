//! Core data types for Project Harvest
//!
//! This module defines the shared data structures that flow between the
//! data sources, the ML engine and the API layer:
//!
//! - `CcuSeries` / `DateRange`: the raw concurrent-user time series
//! - `MapSnapshot`: static map and creator attributes at fetch time
//! - `MapSeries`: a fetched series plus metadata and provenance
//! - `TrendFeatures`, `SpikeEvent`, `MapScale`: derived analytics
//! - Result records returned to the API layer
//! - `CatalogMap`, `MetricSeries`, `MetricsSummary`: the local map catalog

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Time Series
// ============================================================================

/// Nominal sampling interval of a CCU series, in minutes.
pub const SAMPLE_INTERVAL_MINUTES: u32 = 30;

/// Samples per day at the nominal interval.
pub const SAMPLES_PER_DAY: usize = 48;

/// Wall-clock span covered by a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// Approximate timestamp of sample `index` in a series of `len` samples,
    /// linearly interpolated over `[from, to]`.
    pub fn timestamp_at(&self, index: usize, len: usize) -> DateTime<Utc> {
        if len <= 1 {
            return self.from;
        }
        let span_ms = (self.to - self.from).num_milliseconds() as f64;
        let fraction = index.min(len - 1) as f64 / (len - 1) as f64;
        self.from + chrono::Duration::milliseconds((span_ms * fraction).round() as i64)
    }
}

/// Ordered, equally spaced concurrent-user samples.
///
/// Samples are chronological, oldest first. Gaps only ever appear as missing
/// leading/trailing data, never as interior holes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CcuSeries {
    pub samples: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<DateRange>,
}

impl CcuSeries {
    pub fn new(samples: Vec<f64>) -> Self {
        Self { samples, range: None }
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }
}

// ============================================================================
// Map Metadata
// ============================================================================

/// Static-ish map and creator attributes captured at fetch time.
///
/// Constructed fresh for every request and never persisted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSnapshot {
    pub map_code: String,
    pub name: String,
    /// Map type / creation tool (`uefn`, `creative`, ...)
    pub map_type: String,
    pub primary_tag: String,
    pub num_tags: u32,
    pub max_players: u32,
    pub xp_enabled: bool,
    pub creator_followers: u64,
    /// Published version / update count
    pub version: u32,
    pub map_age_days: Option<u32>,
    /// Instantaneous CCU at fetch time
    pub current_ccu: f64,
    pub in_discovery: bool,
}

impl MapSnapshot {
    /// Snapshot with the defaults the upstream API implies for missing fields.
    pub fn placeholder(map_code: &str) -> Self {
        Self {
            map_code: map_code.to_string(),
            name: "Unknown".to_string(),
            map_type: "uefn".to_string(),
            primary_tag: "unknown".to_string(),
            num_tags: 0,
            max_players: 16,
            xp_enabled: true,
            creator_followers: 0,
            version: 1,
            map_age_days: None,
            current_ccu: 0.0,
            in_discovery: false,
        }
    }
}

/// Which data source served a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Cache,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Live => write!(f, "live"),
            DataSource::Cache => write!(f, "cache"),
        }
    }
}

/// A map's CCU series plus metadata, tagged with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSeries {
    pub snapshot: MapSnapshot,
    pub series: CcuSeries,
    pub source: DataSource,
    /// Date the cached data was captured (cache source only)
    pub as_of_date: Option<NaiveDate>,
}

impl MapSeries {
    /// User-facing staleness note when the live source was unavailable.
    pub fn staleness_warning(&self) -> Option<String> {
        match self.source {
            DataSource::Live => None,
            DataSource::Cache => Some(match self.as_of_date {
                Some(date) => format!(
                    "Live data unavailable; using cached data from {date}. Results may be outdated."
                ),
                None => "Live data unavailable; using cached data. Results may be outdated."
                    .to_string(),
            }),
        }
    }
}

// ============================================================================
// Derived Features
// ============================================================================

/// Scalar trend features derived from a CCU series.
///
/// All four values are pure functions of the input series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendFeatures {
    /// Mean of the series
    pub baseline_ccu: f64,
    /// % change, first-quarter mean vs last-quarter mean
    pub trend_slope: f64,
    /// Coefficient of variation (stdev / mean)
    pub volatility: f64,
    /// % change, last 20% vs the 20% window centred on the midpoint
    pub recent_momentum: f64,
}

/// Traffic tier of the analyzed series, used to scale-gate spike events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapScale {
    pub mean_ccu: f64,
    pub max_ccu: f64,
    pub min_spike_magnitude: f64,
    pub is_tiny_map: bool,
    pub is_small_map: bool,
}

/// Detection method names, as reported in `SpikeEvent::methods`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodName {
    SeasonalResidual,
    PeakProminence,
    LocalOutlierFactor,
}

impl std::fmt::Display for MethodName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodName::SeasonalResidual => write!(f, "seasonal_residual"),
            MethodName::PeakProminence => write!(f, "peak_prominence"),
            MethodName::LocalOutlierFactor => write!(f, "local_outlier_factor"),
        }
    }
}

/// A grouped, consensus-confirmed, scale-filtered upward excursion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeEvent {
    /// Peak index, relative to the recent window in historical-context mode
    pub peak_index: usize,
    /// Peak index within the full analyzed series
    pub absolute_index: usize,
    pub peak_ccu: f64,
    /// `peak_ccu - mean_ccu`
    pub magnitude: f64,
    /// Number of methods (0-3) that flagged a point in this group
    pub votes: u8,
    pub methods: Vec<MethodName>,
    /// Span of the group in samples
    pub duration_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Output of the hybrid spike detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeDetection {
    pub spike_events: Vec<SpikeEvent>,
    pub map_scale: MapScale,
    /// Number of samples analyzed (history included)
    pub samples_analyzed: usize,
    /// Methods that ran without error
    pub methods_run: Vec<MethodName>,
}

// ============================================================================
// Result Records
// ============================================================================

/// Spike-detection result record returned to the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyReport {
    pub map_code: String,
    pub map_name: String,
    pub is_anomalous: bool,
    /// More negative means more anomalous
    pub anomaly_score: f64,
    pub num_spikes: usize,
    pub spikes: Vec<SpikeEvent>,
    pub interpretation: String,
    pub map_scale: MapScale,
    pub samples_analyzed: usize,
    pub historical_days: usize,
    pub source: DataSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_warning: Option<String>,
}

/// Trend direction of a 7-day forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Growing,
    Stable,
    Declining,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Growing => write!(f, "Growing"),
            Trend::Stable => write!(f, "Stable"),
            Trend::Declining => write!(f, "Declining"),
        }
    }
}

/// Strength qualifier of a forecast trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendStrength {
    Strong,
    Moderate,
    Weak,
}

impl std::fmt::Display for TrendStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendStrength::Strong => write!(f, "Strong"),
            TrendStrength::Moderate => write!(f, "Moderate"),
            TrendStrength::Weak => write!(f, "Weak"),
        }
    }
}

/// One day of the 7-day forecast curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    /// 1-based day offset
    pub day: u32,
    pub predicted_ccu: i64,
    pub lower_bound: i64,
    pub upper_bound: i64,
}

/// Direction a feature pushes the forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Positive,
    Neutral,
    Negative,
}

/// One ranked explanatory factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorExplanation {
    pub feature: String,
    pub value: f64,
    pub importance: f64,
    pub impact: Impact,
}

/// Output of the forecast generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub daily_forecast: Vec<DailyForecast>,
    pub predicted_ccu_7d: i64,
    pub total_change_pct: f64,
    pub trend: Trend,
    pub trend_strength: TrendStrength,
    pub key_insights: Vec<String>,
}

/// Future-CCU result record returned to the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub map_code: String,
    pub map_name: String,
    pub current_ccu: f64,
    pub baseline_ccu: f64,
    #[serde(flatten)]
    pub forecast: Forecast,
    pub features: TrendFeatures,
    pub factors: Vec<FactorExplanation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_driver: Option<String>,
    pub explanation: String,
    pub model_mae: f64,
    pub source: DataSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_warning: Option<String>,
}

/// Confidence band for a discovery probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::High => write!(f, "High"),
            Confidence::Medium => write!(f, "Medium"),
            Confidence::Low => write!(f, "Low"),
        }
    }
}

/// Recommendation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// An actionable discovery recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: String,
    /// Estimated probability-point gain
    pub estimated_impact: f64,
    pub priority: Priority,
}

/// Output of the discovery scorer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryScore {
    /// Probability in percent (0-100)
    pub probability: f64,
    /// "YES" or "NO"
    pub prediction: String,
    pub confidence: Confidence,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<Recommendation>,
}

/// Discovery result record returned to the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub map_code: String,
    pub map_name: String,
    pub currently_in_discovery: bool,
    #[serde(flatten)]
    pub score: DiscoveryScore,
    pub source: DataSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_warning: Option<String>,
}

/// Peak-CCU result record returned to the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct PeakPrediction {
    pub map_code: String,
    pub predicted_peak_ccu: i64,
    /// "high", "medium" or "low"
    pub confidence: String,
    pub model_name: String,
    pub model_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_r2_score: Option<f64>,
    pub source: DataSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_warning: Option<String>,
}

// ============================================================================
// Map Catalog
// ============================================================================

/// One entry of the locally stored map catalog (`islands.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMap {
    pub code: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub creator_code: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// "UEFN" or "Creative"
    #[serde(default)]
    pub created_in: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One interval of an engagement metric. `value` is null when upstream
/// had no data for the interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricInterval {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    #[serde(default)]
    pub intervals: Vec<MetricInterval>,
}

impl MetricSeries {
    /// Non-null values, in interval order.
    pub fn values(&self) -> Vec<f64> {
        self.intervals.iter().filter_map(|i| i.value).collect()
    }
}

/// Engagement metrics keyed by upstream name (`peak-ccu`, `plays`, ...).
pub type MapMetrics = std::collections::BTreeMap<String, MetricSeries>;

/// Aggregates over a map's engagement metrics. A field is `None` when the
/// metric is absent or has no non-null values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub peak_ccu: Option<f64>,
    pub total_favorites: Option<f64>,
    pub total_plays: Option<f64>,
    pub total_minutes_played: Option<f64>,
    pub unique_players: Option<f64>,
    pub avg_session_length: Option<f64>,
    pub avg_retention: Option<f64>,
}

/// Catalog page returned by the map listing.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogPage {
    pub maps: Vec<CatalogMap>,
    pub count: usize,
    pub total_available: usize,
}

/// Catalog entry with its full metric history.
#[derive(Debug, Clone, Serialize)]
pub struct MapMetricsReport {
    pub map: CatalogMap,
    pub metrics: MapMetrics,
    pub fetched_at: String,
}

/// Catalog entry with aggregated metrics only.
#[derive(Debug, Clone, Serialize)]
pub struct MapSummaryReport {
    pub code: String,
    pub title: String,
    pub category: Option<String>,
    pub metrics_summary: MetricsSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapPresence {
    pub code: String,
    pub exists: bool,
    pub has_metrics: bool,
}
