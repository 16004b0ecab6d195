//! JSON envelope for Harvest responses.
//!
//! Analytics and catalog results go out as `{data, meta}`; failures as
//! `{error: {code, message}, meta}` with the HTTP status chosen from the
//! [`AnalyticsError`] variant. `meta` stamps the server time and crate
//! version so clients can tell which build produced a forecast.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;

use crate::service::AnalyticsError;

/// Server time and build version.
#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: String,
    pub version: &'static str,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// `{ "data": T, "meta": { ... } }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Response {
        let body = Self {
            data,
            meta: ResponseMeta::default(),
        };
        (StatusCode::OK, axum::Json(body)).into_response()
    }
}

/// Machine-readable code plus the error's display text.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// `{ "error": { "code": "...", "message": "..." }, "meta": { ... } }`
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

impl ApiErrorResponse {
    fn build(status: StatusCode, code: &str, msg: impl Into<String>) -> Response {
        let body = Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: msg.into(),
            },
            meta: ResponseMeta::default(),
        };
        (status, axum::Json(body)).into_response()
    }

    pub fn not_found(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::NOT_FOUND, "NOT_FOUND", msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
    }

    pub fn unprocessable(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_DATA", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
    }
}

impl From<AnalyticsError> for Response {
    fn from(err: AnalyticsError) -> Self {
        let msg = err.to_string();
        match err {
            AnalyticsError::InvalidMapCode { .. } => ApiErrorResponse::bad_request(msg),
            AnalyticsError::NotFound { .. }
            | AnalyticsError::NotInCatalog { .. }
            | AnalyticsError::MetricsNotFound { .. } => ApiErrorResponse::not_found(msg),
            AnalyticsError::InsufficientData { .. } => ApiErrorResponse::unprocessable(msg),
            AnalyticsError::ModelUnavailable { .. } => ApiErrorResponse::service_unavailable(msg),
            AnalyticsError::Source { source, .. } if source.is_upstream() => {
                ApiErrorResponse::bad_gateway(msg)
            }
            AnalyticsError::Source { .. }
            | AnalyticsError::Catalog(_)
            | AnalyticsError::Model { .. } => ApiErrorResponse::internal(msg),
        }
    }
}
