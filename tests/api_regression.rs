//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! every /api/* endpoint using `tower::ServiceExt::oneshot()`.
//! Map data comes from a stub source; model artifacts are written to a
//! temp directory and loaded through the real registry.

use harvest::api::{create_app, AppState};
use harvest::sources::{MapDataSource, MapResolver, SourceError};
use harvest::types::{CcuSeries, DataSource, MapSeries, MapSnapshot};
use harvest::{AnalyticsService, HarvestConfig, ModelRegistry};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const SPIKY: &str = "8530-0110-2817";
const SHORT: &str = "1111-1111-1111";
const CACHED: &str = "2222-2222-2222";

struct StubSource;

#[async_trait]
impl MapDataSource for StubSource {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn fetch(&self, map_code: &str) -> Result<MapSeries, SourceError> {
        let mut snapshot = MapSnapshot::placeholder(map_code);
        snapshot.name = "Box Fights".to_string();
        snapshot.current_ccu = 5200.0;
        snapshot.creator_followers = 12_000;

        let (samples, source, as_of_date) = match map_code {
            SPIKY => {
                let mut s = vec![5000.0; 336];
                s[200] = 50000.0;
                (s, DataSource::Live, None)
            }
            SHORT => (vec![40.0; 20], DataSource::Live, None),
            CACHED => (
                vec![800.0; 336],
                DataSource::Cache,
                NaiveDate::from_ymd_opt(2024, 5, 1),
            ),
            _ => {
                return Err(SourceError::NotFound {
                    map_code: map_code.to_string(),
                })
            }
        };
        Ok(MapSeries {
            snapshot,
            series: CcuSeries::new(samples),
            source,
            as_of_date,
        })
    }
}

fn write_models(dir: &Path) {
    let artifacts = [
        (
            "future_ccu.json",
            json!({
                "metadata": {
                    "name": "future_ccu_linear",
                    "feature_names": ["baseline_ccu"],
                    "mae": 100.0,
                    "feature_importances": {"baseline_ccu": 0.6, "trend_slope": 0.3}
                },
                "estimator": {"kind": "linear", "intercept": 0.0, "coefficients": [1.2]}
            }),
        ),
        (
            "discovery.json",
            json!({
                "metadata": {"name": "discovery_logit", "feature_names": ["xp_enabled"]},
                "estimator": {"kind": "logistic", "intercept": 0.0, "coefficients": [0.0]}
            }),
        ),
        (
            "peak_ccu.json",
            json!({
                "metadata": {
                    "name": "peak_ccu_forest",
                    "version": "2.1.0",
                    "feature_names": ["peak_ccu"],
                    "r2_score": 0.91
                },
                "estimator": {"kind": "forest", "trees": [
                    {"nodes": [
                        {"feature": 0, "threshold": 10000.0, "left": 1, "right": 2},
                        {"value": 2000.0},
                        {"value": 50000.0}
                    ]}
                ]}
            }),
        ),
    ];
    for (file, body) in artifacts {
        std::fs::write(dir.join(file), body.to_string()).unwrap();
    }
}

fn write_catalog(raw_dir: &Path) {
    let catalog = json!({"data": [
        {"code": SPIKY, "title": "Box Fights", "category": "pvp", "createdIn": "UEFN", "tags": ["pvp", "boxfight"]},
        {"code": SHORT, "title": "Tiny Tycoon", "category": "tycoon", "createdIn": "Creative"},
        {"code": "3333-3333-3333", "title": "Zone Wars", "category": "pvp", "createdIn": "Creative"}
    ]});
    std::fs::write(raw_dir.join("islands.json"), catalog.to_string()).unwrap();

    let interval = |v: Value| json!({"timestamp": "2025-11-13T00:00:00.000Z", "value": v});
    let metrics = json!({
        "fetched_at": "2025-11-14T08:00:00Z",
        "metrics": {
            "peak-ccu": {"intervals": [interval(json!(4000)), interval(json!(5200)), interval(Value::Null)]},
            "plays": {"intervals": [interval(json!(100)), interval(json!(250))]},
            "retention": {"intervals": [interval(json!(0.3)), interval(json!(0.45))]}
        }
    });
    std::fs::write(raw_dir.join("metrics_8530_0110_2817.json"), metrics.to_string()).unwrap();
}

/// App plus the temp dir that must outlive it.
fn create_test_app(with_models: bool) -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = HarvestConfig::default();
    config.data.models_dir = dir.path().join("models");
    config.data.historical_dir = dir.path().join("historical");
    config.data.raw_dir = dir.path().join("raw");
    std::fs::create_dir_all(&config.data.models_dir).unwrap();
    std::fs::create_dir_all(&config.data.raw_dir).unwrap();
    write_catalog(&config.data.raw_dir);
    if with_models {
        write_models(&config.data.models_dir);
    }

    let registry = ModelRegistry::load(&config.data.models_dir);
    let resolver = MapResolver::new(vec![Arc::new(StubSource)]);
    let service = AnalyticsService::new(Arc::new(config), Arc::new(registry), resolver);
    (create_app(AppState::new(Arc::new(service))), dir)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(resp).await
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(resp).await
}

async fn read(resp: axum::response::Response) -> (StatusCode, Value) {
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ============================================================================
// Health and model info
// ============================================================================

#[tokio::test]
async fn health_reports_sources_and_models() {
    let (app, _dir) = create_test_app(true);
    let (status, body) = get(app, "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["sources"], json!(["stub"]));
    assert_eq!(body["data"]["models"].as_array().unwrap().len(), 3);
    assert!(body["meta"]["timestamp"].is_string());
}

#[tokio::test]
async fn health_is_degraded_without_models() {
    let (app, _dir) = create_test_app(false);
    let (status, body) = get(app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "degraded");
}

#[tokio::test]
async fn model_info_lists_metadata() {
    let (app, _dir) = create_test_app(true);
    let (status, body) = get(app, "/api/analytics/model-info").await;

    assert_eq!(status, StatusCode::OK);
    let models = body["data"]["models"].as_array().unwrap();
    assert!(models.iter().all(|m| m["loaded"] == true));
    let peak = models.iter().find(|m| m["slot"] == "peak_ccu").unwrap();
    assert_eq!(peak["metadata"]["version"], "2.1.0");
}

// ============================================================================
// Anomaly detection
// ============================================================================

#[tokio::test]
async fn detect_anomalies_finds_injected_spike() {
    let (app, _dir) = create_test_app(false);
    let (status, body) = post(
        app,
        "/api/analytics/detect/anomalies",
        json!({"map_code": SPIKY}),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let data = &body["data"];
    assert_eq!(data["map_name"], "Box Fights");
    assert_eq!(data["is_anomalous"], true);
    assert_eq!(data["num_spikes"], 1);
    assert_eq!(data["spikes"][0]["peak_index"], 200);
    assert_eq!(data["spikes"][0]["peak_ccu"], 50000.0);
    assert_eq!(data["samples_analyzed"], 336);
    assert_eq!(data["historical_days"], 0);
    assert_eq!(data["source"], "live");
    assert!(data["anomaly_score"].as_f64().unwrap() < 0.0);
}

#[tokio::test]
async fn detect_anomalies_short_series_is_422() {
    let (app, _dir) = create_test_app(false);
    let (status, body) = post(
        app,
        "/api/analytics/detect/anomalies",
        json!({"map_code": SHORT, "use_historical": false}),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_DATA");
    assert!(body["error"]["message"].as_str().unwrap().contains(SHORT));
}

#[tokio::test]
async fn cached_data_carries_staleness_warning() {
    let (app, _dir) = create_test_app(false);
    let (status, body) = post(
        app,
        "/api/analytics/detect/anomalies",
        json!({"map_code": CACHED}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["source"], "cache");
    assert_eq!(body["data"]["is_anomalous"], false);
    assert!(body["data"]["staleness_warning"]
        .as_str()
        .unwrap()
        .contains("2024-05-01"));
}

// ============================================================================
// Model-backed endpoints
// ============================================================================

#[tokio::test]
async fn future_ccu_day_seven_matches_model() {
    let (app, _dir) = create_test_app(true);
    let (status, body) = post(
        app,
        "/api/analytics/predict/future-ccu",
        json!({"map_code": SPIKY}),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let data = &body["data"];
    let baseline = data["baseline_ccu"].as_f64().unwrap();
    let day7 = data["daily_forecast"][6]["predicted_ccu"].as_i64().unwrap();
    assert!((day7 as f64 - baseline * 1.2).abs() <= 1.0);
    assert_eq!(data["trend"], "Growing");
    assert_eq!(data["model_mae"], 100.0);
    // Bands are ±1.5 × MAE
    assert_eq!(data["daily_forecast"][6]["upper_bound"].as_i64().unwrap(), day7 + 150);
    assert_eq!(data["primary_driver"], "baseline_ccu");
    assert!(data["explanation"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn discovery_scales_probability_to_percent() {
    let (app, _dir) = create_test_app(true);
    let (status, body) = post(
        app,
        "/api/analytics/predict/discovery",
        json!({"map_code": SPIKY}),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["probability"], 50.0);
    assert_eq!(body["data"]["prediction"], "NO");
    assert_eq!(body["data"]["currently_in_discovery"], false);
}

#[tokio::test]
async fn peak_prediction_uses_forest() {
    let (app, _dir) = create_test_app(true);
    let (status, body) = post(app, "/api/analytics/predict", json!({"map_code": SPIKY})).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["predicted_peak_ccu"], 50000);
    assert_eq!(body["data"]["confidence"], "high");
    assert_eq!(body["data"]["model_name"], "peak_ccu_forest");
    assert_eq!(body["data"]["model_r2_score"], 0.91);
}

#[tokio::test]
async fn model_endpoints_without_models_are_503() {
    for uri in [
        "/api/analytics/predict",
        "/api/analytics/predict/future-ccu",
        "/api/analytics/predict/discovery",
    ] {
        let (app, _dir) = create_test_app(false);
        let (status, body) = post(app, uri, json!({"map_code": SPIKY})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "POST {uri}");
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    }
}

// ============================================================================
// Request errors
// ============================================================================

#[tokio::test]
async fn invalid_map_code_is_400() {
    let (app, _dir) = create_test_app(true);
    let (status, body) = post(app, "/api/analytics/predict", json!({"map_code": "abc"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_map_is_404() {
    let (app, _dir) = create_test_app(false);
    let (status, body) = post(
        app,
        "/api/analytics/detect/anomalies",
        json!({"map_code": "9999-9999-9999"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn malformed_body_is_400_with_envelope() {
    let (app, _dir) = create_test_app(false);
    let (status, body) = post(app, "/api/analytics/detect/anomalies", json!({"code": SPIKY})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("Invalid request body"));
}

// ============================================================================
// Map catalog
// ============================================================================

#[tokio::test]
async fn list_maps_filters_and_limits() {
    let (app, _dir) = create_test_app(false);
    let (status, body) = get(app, "/api/maps?category=pvp").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(body["data"]["total_available"], 3);

    let (app, _dir) = create_test_app(false);
    let (_, body) = get(app, "/api/maps?category=pvp&created_in=Creative&limit=1").await;
    assert_eq!(body["data"]["count"], 1);
    assert_eq!(body["data"]["maps"][0]["code"], "3333-3333-3333");
}

#[tokio::test]
async fn list_maps_rejects_out_of_range_limit() {
    for uri in ["/api/maps?limit=0", "/api/maps?limit=201", "/api/maps?limit=many"] {
        let (app, _dir) = create_test_app(false);
        let (status, body) = get(app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "GET {uri}");
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn map_detail_and_unknown_map() {
    let (app, _dir) = create_test_app(false);
    let (status, body) = get(app, &format!("/api/maps/{SPIKY}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Box Fights");
    assert_eq!(body["data"]["createdIn"], "UEFN");

    let (app, _dir) = create_test_app(false);
    let (status, _) = get(app, "/api/maps/9999-9999-9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn map_metrics_returns_series_or_404() {
    let (app, _dir) = create_test_app(false);
    let (status, body) = get(app, &format!("/api/maps/{SPIKY}/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fetched_at"], "2025-11-14T08:00:00Z");
    assert_eq!(body["data"]["metrics"]["plays"]["intervals"].as_array().unwrap().len(), 2);

    // In the catalog but never had metrics collected
    let (app, _dir) = create_test_app(false);
    let (status, body) = get(app, &format!("/api/maps/{SHORT}/metrics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"]["message"].as_str().unwrap().contains("inactive"));
}

#[tokio::test]
async fn map_summary_aggregates_metrics() {
    let (app, _dir) = create_test_app(false);
    let (status, body) = get(app, &format!("/api/maps/{SPIKY}/summary")).await;
    assert_eq!(status, StatusCode::OK);
    let summary = &body["data"]["metrics_summary"];
    assert_eq!(summary["peak_ccu"], 5200.0);
    assert_eq!(summary["total_plays"], 350.0);
    assert_eq!(summary["avg_retention"], 0.38);
    assert!(summary["total_favorites"].is_null());

    // No metrics file: every aggregate is null
    let (app, _dir) = create_test_app(false);
    let (status, body) = get(app, &format!("/api/maps/{SHORT}/summary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Tiny Tycoon");
    assert!(body["data"]["metrics_summary"]["peak_ccu"].is_null());
}

#[tokio::test]
async fn map_exists_reports_metrics_presence() {
    let (app, _dir) = create_test_app(false);
    let (_, body) = get(app, &format!("/api/maps/{SPIKY}/exists")).await;
    assert_eq!(body["data"], json!({"code": SPIKY, "exists": true, "has_metrics": true}));

    let (app, _dir) = create_test_app(false);
    let (_, body) = get(app, &format!("/api/maps/{SHORT}/exists")).await;
    assert_eq!(body["data"]["has_metrics"], false);

    let (app, _dir) = create_test_app(false);
    let (status, body) = get(app, "/api/maps/0000-0000-0000/exists").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["exists"], false);
}
