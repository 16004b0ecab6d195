//! Harvest: CCU analytics for user-generated game maps
//!
//! Turns a map's concurrent-user (CCU) history into spike reports, 7-day
//! forecasts and Discovery-placement scores.
//!
//! ## Architecture
//!
//! - **ML Engine**: pure computation over a CCU series (trend features,
//!   hybrid spike detection, forecasting, discovery scoring)
//! - **Models**: trained estimator artifacts loaded once at startup
//! - **Sources**: live API, local cache fallback, daily historical snapshots
//! - **Service**: map code in, result record out, with typed errors
//! - **API**: axum HTTP surface over the service

pub mod api;
pub mod collector;
pub mod config;
pub mod ml_engine;
pub mod models;
pub mod service;
pub mod sources;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, HarvestConfig};

// Re-export commonly used types
pub use types::{
    AnomalyReport, CcuSeries, DataSource, DiscoveryReport, ForecastReport, MapScale, MapSeries,
    MapSnapshot, PeakPrediction, SpikeEvent, TrendFeatures,
};

// Re-export ML Engine entry points
pub use ml_engine::{
    compute_trend_features, detect_spikes, forecast_7day, score_discovery, DetectOptions,
    HybridSpikeDetector,
};

// Re-export the service layer
pub use models::{ModelError, ModelRegistry, ModelSlot};
pub use service::{AnalyticsError, AnalyticsService};
pub use sources::{MapCatalog, MapDataSource, MapResolver, SourceError};
