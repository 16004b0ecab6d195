//! REST API module using Axum
//!
//! Thin HTTP surface over [`AnalyticsService`](crate::service::AnalyticsService).
//! Every response uses the envelope in [`envelope`]; service errors map to
//! status codes there.

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::AppState;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build a CORS layer from the configured origins.
///
/// An empty list allows no cross-origin requests.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    if origins.is_empty() {
        return layer;
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "CORS: ignoring unparseable origin");
                None
            }
        })
        .collect();
    tracing::info!(origins = ?origins, "CORS: allowing configured origins");
    layer.allow_origin(allowed)
}

/// Create the complete application router.
pub fn create_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.service.config().server.cors_origins);

    Router::new()
        .merge(routes::api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
