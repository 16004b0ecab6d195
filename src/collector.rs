//! Daily snapshot collection
//!
//! Fetches live data for each tracked map once per day, writes the day's
//! snapshot to the historical store and refreshes the local cache. Maps
//! already collected today are skipped, so the command is safe to re-run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::HarvestConfig;
use crate::sources::{CacheSource, HistoricalStore, LiveSource, MapBundle, SourceError};
use crate::types::DataSource;

/// Anything that can produce a raw map bundle. The live API in production.
#[async_trait]
pub trait BundleSource: Send + Sync {
    async fn fetch_bundle(&self, map_code: &str) -> Result<MapBundle, SourceError>;
}

#[async_trait]
impl BundleSource for LiveSource {
    async fn fetch_bundle(&self, map_code: &str) -> Result<MapBundle, SourceError> {
        LiveSource::fetch_bundle(self, map_code).await
    }
}

/// `{"maps": [..]}` in the tracked maps file.
#[derive(Debug, Default, Deserialize)]
struct TrackedMapsFile {
    #[serde(default)]
    maps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionFailure {
    pub map_code: String,
    pub error: String,
}

/// Outcome of one collection run, also written to `_logs/collection_{date}.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionSummary {
    pub date: NaiveDate,
    pub total_maps: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<CollectionFailure>,
}

pub struct DailyCollector<S> {
    source: S,
    cache: CacheSource,
    history: HistoricalStore,
    historical_dir: PathBuf,
    tracked_maps_file: PathBuf,
}

impl DailyCollector<LiveSource> {
    pub fn from_config(config: &HarvestConfig) -> Result<Self, SourceError> {
        Ok(Self::new(LiveSource::new(&config.source)?, config))
    }
}

impl<S: BundleSource> DailyCollector<S> {
    pub fn new(source: S, config: &HarvestConfig) -> Self {
        Self {
            source,
            cache: CacheSource::new(&config.data.raw_dir),
            history: HistoricalStore::new(&config.data.historical_dir),
            historical_dir: config.data.historical_dir.clone(),
            tracked_maps_file: config.data.tracked_maps.clone(),
        }
    }

    /// Codes listed in the tracked maps file plus every cached map.
    pub async fn tracked_maps(&self) -> Vec<String> {
        let mut codes = BTreeSet::new();

        match tokio::fs::read(&self.tracked_maps_file).await {
            Ok(bytes) => match serde_json::from_slice::<TrackedMapsFile>(&bytes) {
                Ok(file) => codes.extend(file.maps),
                Err(e) => warn!(path = %self.tracked_maps_file.display(), error = %e, "Ignoring malformed tracked maps file"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.tracked_maps_file.display(), error = %e, "Could not read tracked maps file"),
        }

        match self.cache.cached_codes().await {
            Ok(cached) => codes.extend(cached),
            Err(e) => warn!(error = %e, "Could not list cached maps"),
        }

        codes.into_iter().collect()
    }

    /// Collect today's snapshot for each code.
    pub async fn collect(&self, map_codes: &[String]) -> CollectionSummary {
        self.collect_on(map_codes, Utc::now().date_naive()).await
    }

    pub async fn collect_on(&self, map_codes: &[String], date: NaiveDate) -> CollectionSummary {
        info!(date = %date, maps = map_codes.len(), "Starting daily collection");
        let mut summary = CollectionSummary {
            date,
            total_maps: map_codes.len(),
            successful: 0,
            failed: 0,
            skipped: 0,
            errors: Vec::new(),
        };

        for map_code in map_codes {
            if self.history.has_snapshot(map_code, date) {
                info!(map_code = %map_code, "Already collected today");
                summary.skipped += 1;
                continue;
            }
            match self.collect_one(map_code, date).await {
                Ok(path) => {
                    info!(map_code = %map_code, path = %path.display(), "Collected");
                    summary.successful += 1;
                }
                Err(e) => {
                    warn!(map_code = %map_code, error = %e, "Collection failed");
                    summary.failed += 1;
                    summary.errors.push(CollectionFailure {
                        map_code: map_code.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Err(e) = self.write_log(&summary).await {
            warn!(error = %e, "Could not write collection log");
        }
        info!(
            successful = summary.successful,
            skipped = summary.skipped,
            failed = summary.failed,
            "Daily collection complete"
        );
        summary
    }

    async fn collect_one(&self, map_code: &str, date: NaiveDate) -> Result<PathBuf, SourceError> {
        let bundle = self.source.fetch_bundle(map_code).await?;
        let series = bundle
            .clone()
            .into_map_series(map_code, DataSource::Live, None, Utc::now());
        let path = self.history.save_snapshot(&series, date).await?;
        // Snapshot is the primary output; a cache write failure only degrades fallback
        if let Err(e) = self.cache.store(map_code, &bundle).await {
            warn!(map_code = %map_code, error = %e, "Could not refresh cached bundle");
        }
        Ok(path)
    }

    async fn write_log(&self, summary: &CollectionSummary) -> Result<(), SourceError> {
        let dir = self.historical_dir.join("_logs");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SourceError::Io(dir.clone(), e))?;
        let path = dir.join(format!("collection_{}.json", summary.date.format("%Y-%m-%d")));
        write_json(&path, summary).await
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SourceError> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| SourceError::Parse(path.display().to_string(), e))?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| SourceError::Io(path.to_path_buf(), e))
}
