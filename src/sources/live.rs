//! Live map data from the upstream map API.

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::config::SourceConfig;
use crate::types::{DataSource, MapSeries};

use super::wire::{MapBundle, MapResponse, StatsResponse};
use super::{MapDataSource, SourceError};

/// HTTP client for the upstream map API.
#[derive(Clone)]
pub struct LiveSource {
    http: reqwest::Client,
    base_url: String,
}

impl LiveSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch map details and 7-day stats.
    pub async fn fetch_bundle(&self, map_code: &str) -> Result<MapBundle, SourceError> {
        info!(map_code = %map_code, "Fetching map from upstream API");

        let resp = self
            .http
            .get(format!("{}/api/maps/{}", self.base_url, map_code))
            .query(&[("cs", "true")])
            .send()
            .await?;
        let map: MapResponse = match resp.status() {
            reqwest::StatusCode::NOT_FOUND => {
                return Err(SourceError::NotFound {
                    map_code: map_code.to_string(),
                })
            }
            status if !status.is_success() => return Err(SourceError::Status(status)),
            _ => resp.json().await?,
        };
        let map_data = match (map.success, map.data) {
            (true, Some(data)) => data,
            _ => {
                return Err(SourceError::NotFound {
                    map_code: map_code.to_string(),
                })
            }
        };

        let resp = self
            .http
            .post(format!("{}/api/maps/{}/v2/stats", self.base_url, map_code))
            .json(&serde_json::json!({ "type": "7d" }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status()));
        }
        let stats_7d: StatsResponse = resp.json().await?;

        Ok(MapBundle { map_data, stats_7d })
    }
}

#[async_trait]
impl MapDataSource for LiveSource {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn fetch(&self, map_code: &str) -> Result<MapSeries, SourceError> {
        let bundle = self.fetch_bundle(map_code).await?;
        Ok(bundle.into_map_series(map_code, DataSource::Live, None, Utc::now()))
    }
}
