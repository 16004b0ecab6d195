//! API route definitions
//!
//! - /api/health - service, source and model status
//! - /api/analytics/model-info - loaded model metadata
//! - /api/analytics/predict - peak CCU
//! - /api/analytics/predict/future-ccu - 7-day forecast
//! - /api/analytics/detect/anomalies - spike detection
//! - /api/analytics/predict/discovery - discovery probability
//! - /api/maps - local map catalog, filterable by category and tool
//! - /api/maps/:code{,/metrics,/summary,/exists} - one catalog entry

use axum::{routing::{get, post}, Router};

use super::handlers::{self, AppState};

/// Create all API routes
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/analytics/model-info", get(handlers::model_info))
        .route("/api/analytics/predict", post(handlers::predict_peak))
        .route("/api/analytics/predict/future-ccu", post(handlers::predict_future_ccu))
        .route("/api/analytics/predict/discovery", post(handlers::predict_discovery))
        .route("/api/analytics/detect/anomalies", post(handlers::detect_anomalies))
        .route("/api/maps", get(handlers::list_maps))
        .route("/api/maps/:code", get(handlers::get_map))
        .route("/api/maps/:code/metrics", get(handlers::get_map_metrics))
        .route("/api/maps/:code/summary", get(handlers::get_map_summary))
        .route("/api/maps/:code/exists", get(handlers::map_exists))
        .with_state(state)
}
