//! Local map catalog.
//!
//! Lives next to the cached bundles in the raw data directory:
//! `islands.json` holds `{"data": [map, ...]}` and each map's engagement
//! metrics sit in `metrics_{code with underscores}.json`. A missing catalog
//! file reads as an empty catalog.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::types::{CatalogMap, CatalogPage, MapMetrics};

use super::SourceError;

pub const CATALOG_FILE: &str = "islands.json";

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    data: Vec<CatalogMap>,
}

/// Stored metrics for one map.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsFile {
    #[serde(default)]
    pub metrics: MapMetrics,
    #[serde(default)]
    pub fetched_at: String,
}

/// Listing filters. `category` and `created_in` match exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogFilter {
    pub limit: usize,
    pub category: Option<String>,
    pub created_in: Option<String>,
}

impl CatalogFilter {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 200;

    fn matches(&self, map: &CatalogMap) -> bool {
        let category_ok = self
            .category
            .as_deref()
            .map_or(true, |c| map.category.as_deref() == Some(c));
        let created_ok = self
            .created_in
            .as_deref()
            .map_or(true, |c| map.created_in.as_deref() == Some(c));
        category_ok && created_ok
    }

    /// Filter then truncate, keeping catalog order.
    pub fn apply(&self, maps: Vec<CatalogMap>) -> CatalogPage {
        let total_available = maps.len();
        let maps: Vec<CatalogMap> = maps
            .into_iter()
            .filter(|m| self.matches(m))
            .take(self.limit)
            .collect();
        CatalogPage {
            count: maps.len(),
            maps,
            total_available,
        }
    }
}

impl Default for CatalogFilter {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            category: None,
            created_in: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MapCatalog {
    raw_dir: PathBuf,
}

impl MapCatalog {
    pub fn new(raw_dir: &Path) -> Self {
        Self {
            raw_dir: raw_dir.to_path_buf(),
        }
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.raw_dir.join(CATALOG_FILE)
    }

    pub fn metrics_path(&self, map_code: &str) -> PathBuf {
        self.raw_dir
            .join(format!("metrics_{}.json", map_code.replace('-', "_")))
    }

    /// Every catalog entry, in file order.
    pub async fn maps(&self) -> Result<Vec<CatalogMap>, SourceError> {
        let path = self.catalog_path();
        match read_json::<CatalogFile>(&path).await? {
            Some(file) => Ok(file.data),
            None => {
                debug!(path = %path.display(), "No map catalog on disk");
                Ok(Vec::new())
            }
        }
    }

    pub async fn find(&self, map_code: &str) -> Result<Option<CatalogMap>, SourceError> {
        Ok(self.maps().await?.into_iter().find(|m| m.code == map_code))
    }

    /// Stored metrics for a map, `None` when the map has none.
    pub async fn metrics(&self, map_code: &str) -> Result<Option<MetricsFile>, SourceError> {
        read_json(&self.metrics_path(map_code)).await
    }

    pub fn has_metrics(&self, map_code: &str) -> bool {
        self.metrics_path(map_code).is_file()
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, SourceError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SourceError::Io(path.to_path_buf(), e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| SourceError::Parse(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{"data": [
        {"code": "1111-1111-1111", "title": "Box Fights", "category": "pvp", "createdIn": "UEFN", "tags": ["pvp"]},
        {"code": "2222-2222-2222", "title": "Tycoon", "category": "tycoon", "createdIn": "Creative"},
        {"code": "3333-3333-3333", "title": "Zone Wars", "category": "pvp", "createdIn": "Creative"}
    ]}"#;

    fn catalog() -> (MapCatalog, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CATALOG_FILE), CATALOG).unwrap();
        (MapCatalog::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn test_reads_camel_case_fields() {
        let (catalog, _dir) = catalog();
        let map = catalog.find("1111-1111-1111").await.unwrap().unwrap();
        assert_eq!(map.title, "Box Fights");
        assert_eq!(map.created_in.as_deref(), Some("UEFN"));
        assert!(catalog.find("9999-9999-9999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_filters_then_limits() {
        let (catalog, _dir) = catalog();
        let maps = catalog.maps().await.unwrap();

        let filter = CatalogFilter {
            category: Some("pvp".into()),
            ..CatalogFilter::default()
        };
        let page = filter.apply(maps.clone());
        assert_eq!(page.count, 2);
        assert_eq!(page.total_available, 3);

        let filter = CatalogFilter {
            limit: 1,
            category: Some("pvp".into()),
            created_in: Some("Creative".into()),
        };
        let page = filter.apply(maps);
        assert_eq!(page.count, 1);
        assert_eq!(page.maps[0].code, "3333-3333-3333");
    }

    #[tokio::test]
    async fn test_missing_catalog_is_empty() {
        let catalog = MapCatalog::new(Path::new("/nonexistent/harvest/raw"));
        assert!(catalog.maps().await.unwrap().is_empty());
        assert!(catalog.metrics("1111-1111-1111").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_metrics_file_name_uses_underscores() {
        let (catalog, dir) = catalog();
        std::fs::write(
            dir.path().join("metrics_1111_1111_1111.json"),
            r#"{"metrics": {"plays": {"intervals": [{"timestamp": "t", "value": 4}]}}, "fetched_at": "2025-11-13"}"#,
        )
        .unwrap();

        assert!(catalog.has_metrics("1111-1111-1111"));
        let file = catalog.metrics("1111-1111-1111").await.unwrap().unwrap();
        assert_eq!(file.fetched_at, "2025-11-13");
        assert_eq!(file.metrics["plays"].values(), vec![4.0]);
    }

    #[tokio::test]
    async fn test_corrupt_catalog_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CATALOG_FILE), "{ nope").unwrap();
        let catalog = MapCatalog::new(dir.path());
        assert!(matches!(catalog.maps().await, Err(SourceError::Parse(..))));
    }
}
