//! Daily CCU snapshot store
//!
//! Layout: `{historical_dir}/{code without dashes}/{YYYY-MM-DD}.json`, one
//! file per map per collection day. Concatenated oldest-first, the snapshots
//! give the spike detector a longer context than the live 7-day window.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ml_engine::stats;
use crate::types::MapSeries;

use super::SourceError;

/// Span of the readings in a snapshot, as reported upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRange {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub avg_ccu: f64,
    pub max_ccu: f64,
    pub min_ccu: f64,
    pub std_ccu: f64,
    pub median_ccu: f64,
}

impl SnapshotSummary {
    pub fn from_readings(readings: &[f64]) -> Self {
        if readings.is_empty() {
            return Self::default();
        }
        let round2 = |v: f64| (v * 100.0).round() / 100.0;
        Self {
            avg_ccu: round2(stats::mean(readings)),
            max_ccu: readings.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min_ccu: readings.iter().copied().fold(f64::INFINITY, f64::min),
            std_ccu: round2(stats::std_dev(readings)),
            median_ccu: round2(stats::percentile(readings, 50.0).unwrap_or(0.0)),
        }
    }
}

/// One day's stored CCU readings for a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub map_code: String,
    #[serde(default)]
    pub map_name: String,
    pub collection_date: NaiveDate,
    #[serde(default)]
    pub collection_timestamp: Option<String>,
    #[serde(default)]
    pub data_range: SnapshotRange,
    pub ccu_readings: Vec<f64>,
    #[serde(default)]
    pub num_readings: usize,
    #[serde(default)]
    pub summary: SnapshotSummary,
}

/// Reader and writer for daily snapshots.
#[derive(Debug, Clone)]
pub struct HistoricalStore {
    dir: PathBuf,
}

impl HistoricalStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn map_dir(&self, map_code: &str) -> PathBuf {
        self.dir.join(map_code.replace('-', ""))
    }

    fn snapshot_path(&self, map_code: &str, date: NaiveDate) -> PathBuf {
        self.map_dir(map_code)
            .join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    pub fn has_snapshot(&self, map_code: &str, date: NaiveDate) -> bool {
        self.snapshot_path(map_code, date).exists()
    }

    /// All readable snapshots for a map, oldest first.
    ///
    /// Unreadable files are skipped with a warning.
    pub async fn snapshots(&self, map_code: &str) -> Result<Vec<DailySnapshot>, SourceError> {
        let dir = self.map_dir(map_code);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SourceError::Io(dir, e)),
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SourceError::Io(dir.clone(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read(&path)
                .await
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<DailySnapshot>(&bytes).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable snapshot"),
            }
        }

        snapshots.sort_by_key(|s| s.collection_date);
        Ok(snapshots)
    }

    /// Concatenated readings of the latest `max_days` snapshots, oldest
    /// first, and the number of days covered. Empty when no history exists.
    pub async fn load_historical_series(
        &self,
        map_code: &str,
        max_days: usize,
    ) -> Result<(Vec<f64>, usize), SourceError> {
        let snapshots = self.snapshots(map_code).await?;
        let skip = snapshots.len().saturating_sub(max_days);
        let recent = &snapshots[skip..];

        let series: Vec<f64> = recent
            .iter()
            .flat_map(|s| s.ccu_readings.iter().copied())
            .collect();
        debug!(map_code = %map_code, days = recent.len(), samples = series.len(), "Loaded historical series");
        Ok((series, recent.len()))
    }

    /// Write one day's snapshot of a fetched series.
    pub async fn save_snapshot(
        &self,
        map: &MapSeries,
        date: NaiveDate,
    ) -> Result<PathBuf, SourceError> {
        let map_code = &map.snapshot.map_code;
        let readings = map.series.samples.clone();
        if readings.is_empty() {
            return Err(SourceError::NoData {
                map_code: map_code.clone(),
            });
        }

        let snapshot = DailySnapshot {
            map_code: map_code.clone(),
            map_name: map.snapshot.name.clone(),
            collection_date: date,
            collection_timestamp: Some(Utc::now().to_rfc3339()),
            data_range: map
                .series
                .range
                .map(|r| SnapshotRange {
                    from: r.from.to_rfc3339(),
                    to: r.to.to_rfc3339(),
                })
                .unwrap_or_default(),
            num_readings: readings.len(),
            summary: SnapshotSummary::from_readings(&readings),
            ccu_readings: readings,
        };

        let dir = self.map_dir(map_code);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SourceError::Io(dir.clone(), e))?;
        let path = self.snapshot_path(map_code, date);
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| SourceError::Parse(path.display().to_string(), e))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| SourceError::Io(path.clone(), e))?;

        info!(map_code = %map_code, date = %date, readings = snapshot.num_readings, "Saved daily snapshot");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CcuSeries, DataSource, MapSnapshot};

    fn map(code: &str, samples: Vec<f64>) -> MapSeries {
        MapSeries {
            snapshot: MapSnapshot::placeholder(code),
            series: CcuSeries::new(samples),
            source: DataSource::Live,
            as_of_date: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[tokio::test]
    async fn test_missing_history_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoricalStore::new(dir.path());
        let (series, days) = store.load_historical_series("1234-5678-9012", 7).await.unwrap();
        assert!(series.is_empty());
        assert_eq!(days, 0);
    }

    #[tokio::test]
    async fn test_concatenates_latest_days_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoricalStore::new(dir.path());
        let code = "1234-5678-9012";
        // Written out of order on purpose
        store.save_snapshot(&map(code, vec![3.0, 3.0]), day(3)).await.unwrap();
        store.save_snapshot(&map(code, vec![1.0]), day(1)).await.unwrap();
        store.save_snapshot(&map(code, vec![2.0, 2.0]), day(2)).await.unwrap();

        assert!(dir.path().join("123456789012").join("2024-05-02.json").exists());
        assert!(store.has_snapshot(code, day(1)));

        let (series, days) = store.load_historical_series(code, 2).await.unwrap();
        assert_eq!(days, 2);
        assert_eq!(series, vec![2.0, 2.0, 3.0, 3.0]);

        let (all, days) = store.load_historical_series(code, 7).await.unwrap();
        assert_eq!(days, 3);
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_series_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoricalStore::new(dir.path());
        let err = store.save_snapshot(&map("1234-5678-9012", vec![]), day(1)).await;
        assert!(matches!(err, Err(SourceError::NoData { .. })));
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoricalStore::new(dir.path());
        let code = "1234-5678-9012";
        store.save_snapshot(&map(code, vec![4.0]), day(4)).await.unwrap();
        std::fs::write(dir.path().join("123456789012").join("2024-05-05.json"), "garbage").unwrap();

        let (series, days) = store.load_historical_series(code, 7).await.unwrap();
        assert_eq!((series, days), (vec![4.0], 1));
    }

    #[test]
    fn test_summary() {
        let s = SnapshotSummary::from_readings(&[1.0, 2.0, 3.0, 10.0]);
        assert_eq!(s.avg_ccu, 4.0);
        assert_eq!(s.max_ccu, 10.0);
        assert_eq!(s.min_ccu, 1.0);
        assert_eq!(s.median_ccu, 2.5);
    }
}
