//! ML Engine for Map Analytics
//!
//! Pure, synchronous computation over a map's CCU series. Nothing in this
//! module performs I/O or holds shared state, so every function is safe to
//! call concurrently from request handlers.
//!
//! ## Architecture
//! - `stats`: numeric primitives (mean, stdev, percentile) shared by all stages
//! - `trend_features`: baseline, slope, volatility and momentum of a series
//! - `spike_detection`: three-method consensus spike detector with scale gating
//! - `forecast`: 7-day linear projection, trend classification, insights
//! - `discovery`: discovery probability interpretation and recommendations
//! - `metrics_summary`: max/total/average aggregates of engagement metrics

pub mod stats;
pub mod trend_features;
pub mod spike_detection;
pub mod forecast;
pub mod discovery;
pub mod metrics_summary;

// Re-export public types
pub use trend_features::{compute_trend_features, TrendFeatureExtractor};
pub use spike_detection::{
    anomaly_score, detect_spikes, interpret, DetectOptions, DetectionError, HybridSpikeDetector,
    SpikeMethod,
};
pub use forecast::{classify_trend, forecast_7day, ForecastGenerator};
pub use discovery::{score_discovery, DiscoveryFeatures, DiscoveryScorer};
pub use metrics_summary::summarize_metrics;
