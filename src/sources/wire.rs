//! Upstream map API payloads and their conversion into `MapSeries`.
//!
//! The cache stores the same bundle the live fetcher assembles, so both
//! sources share one decoding path.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CcuSeries, DataSource, DateRange, MapSeries, MapSnapshot};

/// Map details plus 7-day stats, as fetched together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapBundle {
    #[serde(default)]
    pub map_data: MapData,
    #[serde(default)]
    pub stats_7d: StatsResponse,
}

/// `GET /api/maps/{code}` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct MapResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<MapData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub map_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub max_players: Option<u32>,
    #[serde(default)]
    pub xp_enabled: Option<bool>,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default, rename = "lastSyncCcu")]
    pub last_sync_ccu: Option<f64>,
    #[serde(default)]
    pub creator: Option<Creator>,
    #[serde(default)]
    pub discovery: Option<serde_json::Value>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Creator {
    #[serde(default)]
    pub lookup_follower_count: Option<u64>,
}

/// `POST /api/maps/{code}/v2/stats` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<StatsData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsData {
    /// CCU samples, oldest first; upstream pads missing samples with null
    #[serde(default)]
    pub stats: Vec<Option<f64>>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

impl StatsResponse {
    pub fn readings(&self) -> Vec<f64> {
        if !self.success {
            return Vec::new();
        }
        self.data
            .as_ref()
            .map(|d| d.stats.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    pub fn range(&self) -> Option<DateRange> {
        let data = self.data.as_ref()?;
        Some(DateRange {
            from: parse_timestamp(data.from.as_deref()?)?,
            to: parse_timestamp(data.to.as_deref()?)?,
        })
    }
}

impl MapBundle {
    /// Decode into a tagged `MapSeries`.
    pub fn into_map_series(
        self,
        map_code: &str,
        source: DataSource,
        as_of_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> MapSeries {
        let defaults = MapSnapshot::placeholder(map_code);
        let m = &self.map_data;

        let snapshot = MapSnapshot {
            map_code: map_code.to_string(),
            name: m.name.clone().unwrap_or(defaults.name),
            map_type: m.map_type.clone().unwrap_or(defaults.map_type),
            primary_tag: m.tags.first().cloned().unwrap_or(defaults.primary_tag),
            num_tags: u32::try_from(m.tags.len()).unwrap_or(u32::MAX),
            max_players: m.max_players.unwrap_or(defaults.max_players),
            xp_enabled: m.xp_enabled.unwrap_or(defaults.xp_enabled),
            creator_followers: m
                .creator
                .as_ref()
                .and_then(|c| c.lookup_follower_count)
                .unwrap_or(0),
            version: m.version.unwrap_or(defaults.version),
            map_age_days: m
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .map(|created| u32::try_from((now - created).num_days().max(0)).unwrap_or(0)),
            current_ccu: m.last_sync_ccu.unwrap_or(0.0),
            in_discovery: m.discovery.as_ref().is_some_and(is_truthy),
        };

        let mut series = CcuSeries::new(self.stats_7d.readings());
        series.range = self.stats_7d.range();

        MapSeries {
            snapshot,
            series,
            source,
            as_of_date,
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Some payloads omit the offset
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}
