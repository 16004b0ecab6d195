//! Last-known-good map data on local disk.
//!
//! One `map_{code}.json` per map holding the same bundle the live source
//! fetches. The file's modification date is reported as the data's as-of date.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{DataSource, MapSeries};

use super::wire::MapBundle;
use super::{MapDataSource, SourceError};

#[derive(Debug, Clone)]
pub struct CacheSource {
    raw_dir: PathBuf,
}

impl CacheSource {
    pub fn new(raw_dir: &Path) -> Self {
        Self {
            raw_dir: raw_dir.to_path_buf(),
        }
    }

    pub fn path_for(&self, map_code: &str) -> PathBuf {
        self.raw_dir.join(format!("map_{map_code}.json"))
    }

    /// Overwrite the cached bundle for a map.
    pub async fn store(&self, map_code: &str, bundle: &MapBundle) -> Result<(), SourceError> {
        tokio::fs::create_dir_all(&self.raw_dir)
            .await
            .map_err(|e| SourceError::Io(self.raw_dir.clone(), e))?;
        let path = self.path_for(map_code);
        let json = serde_json::to_vec_pretty(bundle)
            .map_err(|e| SourceError::Parse(path.display().to_string(), e))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| SourceError::Io(path.clone(), e))?;
        debug!(map_code = %map_code, path = %path.display(), "Cached map bundle");
        Ok(())
    }

    /// Map codes with a cached bundle.
    pub async fn cached_codes(&self) -> Result<Vec<String>, SourceError> {
        let mut codes = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.raw_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(codes),
            Err(e) => return Err(SourceError::Io(self.raw_dir.clone(), e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SourceError::Io(self.raw_dir.clone(), e))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(code) = name
                .strip_prefix("map_")
                .and_then(|rest| rest.strip_suffix(".json"))
            {
                codes.push(code.to_string());
            }
        }
        codes.sort();
        Ok(codes)
    }
}

#[async_trait]
impl MapDataSource for CacheSource {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn fetch(&self, map_code: &str) -> Result<MapSeries, SourceError> {
        let path = self.path_for(map_code);
        let contents = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound {
                    map_code: map_code.to_string(),
                })
            }
            Err(e) => return Err(SourceError::Io(path, e)),
        };
        let bundle: MapBundle = serde_json::from_slice(&contents)
            .map_err(|e| SourceError::Parse(path.display().to_string(), e))?;

        let as_of = tokio::fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .ok()
            .map(|t| DateTime::<Utc>::from(t).date_naive());

        Ok(bundle.into_map_series(map_code, DataSource::Cache, as_of, Utc::now()))
    }
}
