//! Map Data Sources
//!
//! Where a map's CCU series comes from. Sources are tried in order by the
//! `MapResolver`; the first success wins and the result carries its
//! provenance (`live` or `cache`) so callers can warn about staleness.
//!
//! - `live`: the upstream map API over HTTP
//! - `cache`: last-known-good API responses on local disk
//! - `historical`: daily snapshots used as context for spike detection
//! - `catalog`: the local map catalog and per-map engagement metrics

pub mod cache;
pub mod catalog;
pub mod historical;
pub mod live;
pub mod wire;

pub use cache::CacheSource;
pub use catalog::{CatalogFilter, MapCatalog, MetricsFile};
pub use historical::{DailySnapshot, HistoricalStore};
pub use live::LiveSource;
pub use wire::MapBundle;

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::HarvestConfig;
use crate::types::MapSeries;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Map {map_code} not found")]
    NotFound { map_code: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("I/O error ({0}): {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse {0}: {1}")]
    Parse(String, #[source] serde_json::Error),

    #[error("No CCU data for map {map_code}")]
    NoData { map_code: String },
}

impl SourceError {
    /// Failure talking to the upstream API, as opposed to local storage.
    pub fn is_upstream(&self) -> bool {
        matches!(self, SourceError::Http(_) | SourceError::Status(_))
    }
}

// ============================================================================
// Map Codes
// ============================================================================

static MAP_CODE_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// `true` for codes shaped like `1234-5678-9012`.
pub fn is_valid_map_code(code: &str) -> bool {
    MAP_CODE_RE
        .get_or_init(|| Regex::new(r"^\d{4}-\d{4}-\d{4}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(code))
}

// ============================================================================
// Source Strategy
// ============================================================================

/// One way of obtaining a map's CCU series.
#[async_trait]
pub trait MapDataSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, map_code: &str) -> Result<MapSeries, SourceError>;
}

/// Ordered list of sources; the first success wins.
#[derive(Clone)]
pub struct MapResolver {
    sources: Vec<Arc<dyn MapDataSource>>,
}

impl MapResolver {
    pub fn new(sources: Vec<Arc<dyn MapDataSource>>) -> Self {
        Self { sources }
    }

    /// Live API (when enabled) followed by the local cache.
    pub fn from_config(config: &HarvestConfig) -> Result<Self, SourceError> {
        let mut sources: Vec<Arc<dyn MapDataSource>> = Vec::new();
        if config.source.live_enabled {
            sources.push(Arc::new(LiveSource::new(&config.source)?));
        }
        sources.push(Arc::new(CacheSource::new(&config.data.raw_dir)));
        Ok(Self::new(sources))
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Try each source once, in order. No retries, no backoff.
    ///
    /// `NotFound` only when every source reports the map missing; otherwise
    /// the last real failure is returned so an outage is not mistaken for
    /// an unknown map.
    pub async fn resolve(&self, map_code: &str) -> Result<MapSeries, SourceError> {
        let mut last_failure = None;
        for (i, source) in self.sources.iter().enumerate() {
            match source.fetch(map_code).await {
                Ok(series) => {
                    if i > 0 {
                        info!(map_code = %map_code, source = source.name(), "Served from fallback source");
                    }
                    debug!(map_code = %map_code, source = %series.source, samples = series.series.len(), "Map data resolved");
                    return Ok(series);
                }
                Err(SourceError::NotFound { .. }) => {
                    debug!(map_code = %map_code, source = source.name(), "Map not found in source");
                }
                Err(e) => {
                    warn!(map_code = %map_code, source = source.name(), error = %e, "Source failed, trying next");
                    last_failure = Some(e);
                }
            }
        }
        Err(last_failure.unwrap_or_else(|| SourceError::NotFound {
            map_code: map_code.to_string(),
        }))
    }
}
