//! Analytics Service
//!
//! Glue between a map code and the result records: validate the code,
//! resolve the map's data through the source chain, run the ML engine and
//! attach provenance. One instance is built at startup and shared by `Arc`.
//!
//! Catalog lookups (listing, stored engagement metrics and their summary)
//! read the local raw data directory and never touch the source chain.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::HarvestConfig;
use crate::ml_engine::discovery::{DiscoveryFeatures, DiscoveryScorer};
use crate::ml_engine::metrics_summary::summarize_metrics;
use crate::ml_engine::forecast::{self, ForecastGenerator};
use crate::ml_engine::spike_detection::{
    anomaly_score, interpret, DetectOptions, DetectionError, HybridSpikeDetector,
};
use crate::ml_engine::trend_features::compute_trend_features;
use crate::models::{peak_confidence, FeatureInputs, ModelError, ModelInfo, ModelRegistry, ModelSlot};
use crate::sources::{
    is_valid_map_code, CatalogFilter, HistoricalStore, MapCatalog, MapResolver, SourceError,
};
use crate::types::{
    AnomalyReport, CatalogMap, CatalogPage, DiscoveryReport, ForecastReport, MapMetricsReport,
    MapPresence, MapSeries, MapSummaryReport, MetricsSummary, PeakPrediction, TrendFeatures,
};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Invalid map code '{map_code}': expected format 1234-5678-9012")]
    InvalidMapCode { map_code: String },

    #[error("Map {map_code} not found in live or cached data")]
    NotFound { map_code: String },

    #[error("Insufficient data for map {map_code}: need {needed} samples, got {got}")]
    InsufficientData {
        map_code: String,
        needed: usize,
        got: usize,
    },

    #[error("Model '{model}' is not loaded; cannot analyze map {map_code}")]
    ModelUnavailable { map_code: String, model: String },

    #[error("Model evaluation failed for map {map_code}: {source}")]
    Model {
        map_code: String,
        #[source]
        source: ModelError,
    },

    #[error("Data source failed for map {map_code}: {source}")]
    Source {
        map_code: String,
        #[source]
        source: SourceError,
    },

    #[error("Map {map_code} is not in the catalog")]
    NotInCatalog { map_code: String },

    #[error("Metrics not found for map {map_code}; the map may be inactive")]
    MetricsNotFound { map_code: String },

    #[error("Map catalog unreadable: {0}")]
    Catalog(#[source] SourceError),
}

impl AnalyticsError {
    fn from_model(map_code: &str, e: ModelError) -> Self {
        match e {
            ModelError::Unavailable { model } => AnalyticsError::ModelUnavailable {
                map_code: map_code.to_string(),
                model,
            },
            source => AnalyticsError::Model {
                map_code: map_code.to_string(),
                source,
            },
        }
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct AnalyticsService {
    config: Arc<HarvestConfig>,
    registry: Arc<ModelRegistry>,
    resolver: MapResolver,
    history: HistoricalStore,
    catalog: MapCatalog,
    detector: HybridSpikeDetector,
}

impl AnalyticsService {
    pub fn new(
        config: Arc<HarvestConfig>,
        registry: Arc<ModelRegistry>,
        resolver: MapResolver,
    ) -> Self {
        let history = HistoricalStore::new(&config.data.historical_dir);
        let catalog = MapCatalog::new(&config.data.raw_dir);
        let detector = HybridSpikeDetector::new(&config.detection);
        Self {
            config,
            registry,
            resolver,
            history,
            catalog,
            detector,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &MapResolver {
        &self.resolver
    }

    pub fn history(&self) -> &HistoricalStore {
        &self.history
    }

    pub fn catalog(&self) -> &MapCatalog {
        &self.catalog
    }

    /// Validate the code and resolve the map through the source chain.
    pub async fn fetch(&self, map_code: &str) -> Result<MapSeries, AnalyticsError> {
        if !is_valid_map_code(map_code) {
            return Err(AnalyticsError::InvalidMapCode {
                map_code: map_code.to_string(),
            });
        }
        self.resolver
            .resolve(map_code)
            .await
            .map_err(|e| match e {
                SourceError::NotFound { map_code } => AnalyticsError::NotFound { map_code },
                source => AnalyticsError::Source {
                    map_code: map_code.to_string(),
                    source,
                },
            })
    }

    /// Detect campaign/viral spikes in the map's recent CCU.
    ///
    /// With `use_history`, stored daily snapshots are prepended as context;
    /// only spikes inside the recent window are reported.
    pub async fn detect_anomalies(
        &self,
        map_code: &str,
        use_history: bool,
    ) -> Result<AnomalyReport, AnalyticsError> {
        let map = self.fetch(map_code).await?;
        let recent = map.series.as_slice();

        let (history, historical_days) = if use_history && self.config.historical.enabled {
            match self
                .history
                .load_historical_series(map_code, self.config.historical.max_days)
                .await
            {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!(map_code = %map_code, error = %e, "Historical snapshots unavailable, using recent window only");
                    (Vec::new(), 0)
                }
            }
        } else {
            (Vec::new(), 0)
        };

        let base = DetectOptions::from_config(&self.config.detection).with_range(map.series.range);
        let detection = if history.is_empty() {
            self.detector.detect(recent, &base)
        } else {
            let mut combined = history;
            combined.extend_from_slice(recent);
            self.detector
                .detect(&combined, &base.recent_window(recent.len()))
        }
        .map_err(|DetectionError::InsufficientData { needed, got }| {
            AnalyticsError::InsufficientData {
                map_code: map_code.to_string(),
                needed,
                got,
            }
        })?;

        let events = detection.spike_events;
        info!(
            map_code = %map_code,
            source = %map.source,
            samples = detection.samples_analyzed,
            historical_days,
            spikes = events.len(),
            "Anomaly detection complete"
        );

        Ok(AnomalyReport {
            map_code: map_code.to_string(),
            map_name: map.snapshot.name.clone(),
            is_anomalous: !events.is_empty(),
            anomaly_score: anomaly_score(&events),
            num_spikes: events.len(),
            interpretation: interpret(&events, &detection.map_scale),
            spikes: events,
            map_scale: detection.map_scale,
            samples_analyzed: detection.samples_analyzed,
            historical_days,
            staleness_warning: map.staleness_warning(),
            source: map.source,
        })
    }

    /// 7-day CCU forecast anchored on the future-CCU model's prediction.
    pub async fn forecast(&self, map_code: &str) -> Result<ForecastReport, AnalyticsError> {
        let model = self
            .registry
            .get(ModelSlot::FutureCcu)
            .map_err(|e| AnalyticsError::from_model(map_code, e))?;
        let map = self.fetch(map_code).await?;
        let samples = map.series.as_slice();
        let features = compute_trend_features(samples);

        let inputs = FeatureInputs::new(&map.snapshot, &features, samples);
        let predicted = model
            .predict(&inputs)
            .map_err(|e| AnalyticsError::from_model(map_code, e))?
            .max(0.0);

        // The curve's day-7 point lands on the model's prediction
        let baseline = features.baseline_ccu;
        let model_features = TrendFeatures {
            trend_slope: (predicted - baseline) / baseline.max(1.0) * 100.0,
            ..features
        };
        let forecast = ForecastGenerator::forecast(
            &model_features,
            model.mae(),
            self.config.forecast.interval_multiplier,
        );

        let factors = forecast::rank_factors(
            &features,
            map.snapshot.creator_followers,
            &model.metadata.feature_importances,
        );
        let driver = forecast::primary_driver(&factors);
        let explanation = forecast::explain(&forecast, driver);
        let primary_driver = driver.map(|f| f.feature.clone());

        info!(
            map_code = %map_code,
            source = %map.source,
            predicted_ccu_7d = forecast.predicted_ccu_7d,
            trend = %forecast.trend,
            "Forecast complete"
        );

        Ok(ForecastReport {
            map_code: map_code.to_string(),
            map_name: map.snapshot.name.clone(),
            current_ccu: map.snapshot.current_ccu,
            baseline_ccu: baseline,
            forecast,
            features,
            factors,
            primary_driver,
            explanation,
            model_mae: model.mae(),
            staleness_warning: map.staleness_warning(),
            source: map.source,
        })
    }

    /// Probability of a Discovery placement, with recommendations.
    pub async fn discovery(&self, map_code: &str) -> Result<DiscoveryReport, AnalyticsError> {
        let model = self
            .registry
            .get(ModelSlot::Discovery)
            .map_err(|e| AnalyticsError::from_model(map_code, e))?;
        let map = self.fetch(map_code).await?;
        let samples = map.series.as_slice();
        let features = compute_trend_features(samples);

        let inputs = FeatureInputs::new(&map.snapshot, &features, samples);
        let probability = model
            .predict(&inputs)
            .map_err(|e| AnalyticsError::from_model(map_code, e))?
            .clamp(0.0, 1.0)
            * 100.0;

        let snapshot = &map.snapshot;
        let discovery_features = DiscoveryFeatures {
            avg_ccu_7d: features.baseline_ccu,
            growth_rate: features.trend_slope,
            xp_enabled: snapshot.xp_enabled,
            creator_followers: snapshot.creator_followers,
            num_tags: snapshot.num_tags,
            max_players: snapshot.max_players,
        };
        let score = DiscoveryScorer::score(&discovery_features, probability);

        info!(
            map_code = %map_code,
            source = %map.source,
            probability = score.probability,
            confidence = %score.confidence,
            "Discovery prediction complete"
        );

        Ok(DiscoveryReport {
            map_code: map_code.to_string(),
            map_name: snapshot.name.clone(),
            currently_in_discovery: snapshot.in_discovery,
            score,
            staleness_warning: map.staleness_warning(),
            source: map.source,
        })
    }

    /// Peak CCU prediction with a data-quality confidence label.
    pub async fn predict_peak(&self, map_code: &str) -> Result<PeakPrediction, AnalyticsError> {
        let model = self
            .registry
            .get(ModelSlot::PeakCcu)
            .map_err(|e| AnalyticsError::from_model(map_code, e))?;
        let map = self.fetch(map_code).await?;
        let samples = map.series.as_slice();
        let features = compute_trend_features(samples);

        let inputs = FeatureInputs::new(&map.snapshot, &features, samples);
        let predicted = model
            .predict(&inputs)
            .map_err(|e| AnalyticsError::from_model(map_code, e))?;
        let confidence = peak_confidence(predicted, &map.snapshot);

        info!(map_code = %map_code, source = %map.source, predicted, confidence, "Peak prediction complete");

        Ok(PeakPrediction {
            map_code: map_code.to_string(),
            predicted_peak_ccu: predicted.max(0.0) as i64,
            confidence: confidence.to_string(),
            model_name: model.metadata.name.clone(),
            model_version: model.metadata.version.clone(),
            model_r2_score: model.metadata.r2_score,
            staleness_warning: map.staleness_warning(),
            source: map.source,
        })
    }

    pub fn model_info(&self) -> ModelInfo {
        self.registry.model_info()
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    pub async fn list_maps(&self, filter: &CatalogFilter) -> Result<CatalogPage, AnalyticsError> {
        let maps = self.catalog.maps().await.map_err(AnalyticsError::Catalog)?;
        Ok(filter.apply(maps))
    }

    pub async fn catalog_map(&self, map_code: &str) -> Result<CatalogMap, AnalyticsError> {
        if !is_valid_map_code(map_code) {
            return Err(AnalyticsError::InvalidMapCode {
                map_code: map_code.to_string(),
            });
        }
        self.catalog
            .find(map_code)
            .await
            .map_err(AnalyticsError::Catalog)?
            .ok_or_else(|| AnalyticsError::NotInCatalog {
                map_code: map_code.to_string(),
            })
    }

    /// Catalog entry plus its full stored metric history.
    pub async fn map_metrics(&self, map_code: &str) -> Result<MapMetricsReport, AnalyticsError> {
        let map = self.catalog_map(map_code).await?;
        let file = self
            .catalog
            .metrics(map_code)
            .await
            .map_err(AnalyticsError::Catalog)?
            .ok_or_else(|| AnalyticsError::MetricsNotFound {
                map_code: map_code.to_string(),
            })?;
        Ok(MapMetricsReport {
            map,
            metrics: file.metrics,
            fetched_at: file.fetched_at,
        })
    }

    /// Catalog entry with aggregated metrics; all-empty when none are stored.
    pub async fn map_summary(&self, map_code: &str) -> Result<MapSummaryReport, AnalyticsError> {
        let map = self.catalog_map(map_code).await?;
        let metrics_summary = match self
            .catalog
            .metrics(map_code)
            .await
            .map_err(AnalyticsError::Catalog)?
        {
            Some(file) => summarize_metrics(&file.metrics),
            None => MetricsSummary::default(),
        };
        Ok(MapSummaryReport {
            code: map.code,
            title: map.title,
            category: map.category,
            metrics_summary,
        })
    }

    pub async fn map_exists(&self, map_code: &str) -> Result<MapPresence, AnalyticsError> {
        let exists = self
            .catalog
            .find(map_code)
            .await
            .map_err(AnalyticsError::Catalog)?
            .is_some();
        Ok(MapPresence {
            code: map_code.to_string(),
            exists,
            has_metrics: exists && self.catalog.has_metrics(map_code),
        })
    }
}
