//! API handlers
//!
//! All handlers return `Response` via [`ApiResponse::ok`] or [`ApiErrorResponse`].

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::models::ModelSlot;
use crate::service::AnalyticsService;
use crate::sources::CatalogFilter;

// ============================================================================
// Shared State
// ============================================================================

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AnalyticsService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<AnalyticsService>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MapRequest {
    pub map_code: String,
}

#[derive(Debug, Deserialize)]
pub struct AnomalyRequest {
    pub map_code: String,
    #[serde(default = "default_use_historical")]
    pub use_historical: bool,
}

fn default_use_historical() -> bool {
    true
}

/// Query string of `GET /api/maps`.
#[derive(Debug, Deserialize)]
pub struct MapListQuery {
    pub limit: Option<usize>,
    pub category: Option<String>,
    pub created_in: Option<String>,
}

impl MapListQuery {
    fn into_filter(self) -> Result<CatalogFilter, String> {
        let limit = self.limit.unwrap_or(CatalogFilter::DEFAULT_LIMIT);
        if !(1..=CatalogFilter::MAX_LIMIT).contains(&limit) {
            return Err(format!(
                "limit must be between 1 and {}, got {limit}",
                CatalogFilter::MAX_LIMIT
            ));
        }
        Ok(CatalogFilter {
            limit,
            category: self.category,
            created_in: self.created_in,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub sources: Vec<&'static str>,
    pub models: Vec<ModelHealth>,
    pub historical_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelHealth {
    pub model: ModelSlot,
    pub loaded: bool,
}

fn parse<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(req)| req)
        .map_err(|e| ApiErrorResponse::bad_request(format!("Invalid request body: {e}")))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Response {
    let registry = state.service.registry();
    let models: Vec<ModelHealth> = ModelSlot::ALL
        .iter()
        .map(|&slot| ModelHealth {
            model: slot,
            loaded: registry.is_loaded(slot),
        })
        .collect();
    // Spike detection needs no model, so the service is usable without any
    let status = if models.iter().all(|m| m.loaded) {
        "healthy"
    } else {
        "degraded"
    };

    ApiResponse::ok(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        sources: state.service.resolver().source_names(),
        models,
        historical_enabled: state.service.config().historical.enabled,
    })
}

/// GET /api/analytics/model-info
pub async fn model_info(State(state): State<AppState>) -> Response {
    ApiResponse::ok(state.service.model_info())
}

/// POST /api/analytics/predict
pub async fn predict_peak(
    State(state): State<AppState>,
    body: Result<Json<MapRequest>, JsonRejection>,
) -> Response {
    let req = match parse(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    debug!(map_code = %req.map_code, "Peak prediction requested");
    match state.service.predict_peak(&req.map_code).await {
        Ok(prediction) => ApiResponse::ok(prediction),
        Err(e) => e.into(),
    }
}

/// POST /api/analytics/predict/future-ccu
pub async fn predict_future_ccu(
    State(state): State<AppState>,
    body: Result<Json<MapRequest>, JsonRejection>,
) -> Response {
    let req = match parse(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    debug!(map_code = %req.map_code, "Forecast requested");
    match state.service.forecast(&req.map_code).await {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => e.into(),
    }
}

/// POST /api/analytics/detect/anomalies
pub async fn detect_anomalies(
    State(state): State<AppState>,
    body: Result<Json<AnomalyRequest>, JsonRejection>,
) -> Response {
    let req = match parse(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    debug!(map_code = %req.map_code, use_historical = req.use_historical, "Anomaly detection requested");
    match state
        .service
        .detect_anomalies(&req.map_code, req.use_historical)
        .await
    {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => e.into(),
    }
}

/// POST /api/analytics/predict/discovery
pub async fn predict_discovery(
    State(state): State<AppState>,
    body: Result<Json<MapRequest>, JsonRejection>,
) -> Response {
    let req = match parse(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    debug!(map_code = %req.map_code, "Discovery prediction requested");
    match state.service.discovery(&req.map_code).await {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => e.into(),
    }
}

// ============================================================================
// Map Catalog
// ============================================================================

/// GET /api/maps
pub async fn list_maps(
    State(state): State<AppState>,
    query: Result<Query<MapListQuery>, QueryRejection>,
) -> Response {
    let filter = match query
        .map_err(|e| e.to_string())
        .and_then(|Query(q)| q.into_filter())
    {
        Ok(filter) => filter,
        Err(msg) => return ApiErrorResponse::bad_request(format!("Invalid query: {msg}")),
    };
    match state.service.list_maps(&filter).await {
        Ok(page) => ApiResponse::ok(page),
        Err(e) => e.into(),
    }
}

/// GET /api/maps/:code
pub async fn get_map(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    match state.service.catalog_map(&code).await {
        Ok(map) => ApiResponse::ok(map),
        Err(e) => e.into(),
    }
}

/// GET /api/maps/:code/metrics
pub async fn get_map_metrics(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    match state.service.map_metrics(&code).await {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => e.into(),
    }
}

/// GET /api/maps/:code/summary
pub async fn get_map_summary(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    match state.service.map_summary(&code).await {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => e.into(),
    }
}

/// GET /api/maps/:code/exists
pub async fn map_exists(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    match state.service.map_exists(&code).await {
        Ok(presence) => ApiResponse::ok(presence),
        Err(e) => e.into(),
    }
}
