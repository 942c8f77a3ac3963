// =============================================================================
// Dashboard REST Endpoints — Axum 0.7
// =============================================================================
//
// Read-only JSON views for the sector heat dashboard.  Everything lives under
// `/api/v1/`.  CORS is permissive so a static frontend on another origin can
// poll it.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::app_state::AppState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the dashboard router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/scores", get(scores))
        .route("/api/v1/bias/weekly", get(weekly_bias))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    baskets: usize,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        baskets: state.baskets.len(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Heat scores
// =============================================================================

async fn scores(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_score_snapshot().await)
}

// =============================================================================
// Weekly bias summary
// =============================================================================

async fn weekly_bias(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.weekly_bias() {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            warn!(error = %e, "bias journal unreadable");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": format!("{e:#}") })),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::NaiveDate;
    use tower::ServiceExt;

    use crate::bias_tracker::BiasTracker;
    use crate::futures_intel::FundingRateMonitor;
    use crate::history::append_snapshot;
    use crate::runtime_config::HeatConfig;
    use crate::types::Baskets;

    fn state_in(dir: &std::path::Path, enable_funding: bool) -> Arc<AppState> {
        let mut config = HeatConfig {
            prices_path: dir.join("prices.csv"),
            tvl_path: dir.join("tvl.csv"),
            bias_path: dir.join("bias_data.json"),
            ..HeatConfig::default()
        };
        config.score.enable_funding = enable_funding;
        let baskets = Baskets::from_yaml("AI: [FET]\nL1: [SOL]\n").unwrap();
        Arc::new(AppState::new(
            config,
            baskets,
            FundingRateMonitor::with_client(reqwest::Client::new()),
        ))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get_json(router(state_in(dir.path(), false)), "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["baskets"], 2);
    }

    #[tokio::test]
    async fn scores_are_computed_from_history() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path(), false);

        let columns = vec!["FET".to_string(), "SOL".to_string()];
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        for i in 0..8i64 {
            let mut row = BTreeMap::new();
            row.insert("FET".to_string(), 1.0 + i as f64);
            row.insert("SOL".to_string(), 100.0);
            append_snapshot(&state.config.prices_path, start + chrono::Duration::days(i), &columns, &row).unwrap();
        }

        let (status, body) = get_json(router(state), "/api/v1/scores").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["max_score"], 4);
        assert_eq!(body["alert_threshold"], 4);
        let baskets = body["baskets"].as_array().unwrap();
        assert_eq!(baskets[0]["basket"], "AI");
        assert_eq!(baskets[0]["score"], 2);
        assert_eq!(baskets[1]["basket"], "L1");
        assert_eq!(baskets[1]["score"], 0);
    }

    #[tokio::test]
    async fn seeded_funding_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path(), true);
        let mut rates = HashMap::new();
        rates.insert("SOL".to_string(), 0.003);
        state.seed_funding(rates);

        let (_, body) = get_json(router(state), "/api/v1/scores").await;
        let l1 = &body["baskets"][1];
        assert_eq!(l1["basket"], "L1");
        assert_eq!(l1["score"], 2);
        let funding = l1["contributions"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["signal"] == "funding")
            .unwrap();
        assert_eq!(funding["fired"], true);
    }

    #[tokio::test]
    async fn weekly_bias_reads_journal() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path(), false);
        let mut tracker = BiasTracker::open(&state.config.bias_path).unwrap();
        tracker
            .add_bias("BTC", "bullish", "u", chrono::Utc::now())
            .unwrap();

        let (status, body) = get_json(router(state), "/api/v1/bias/weekly").await;
        assert_eq!(status, StatusCode::OK);
        let day = body["biases"].as_object().unwrap().values().next().unwrap();
        assert_eq!(day["BTC"]["bias"], "bullish");
    }

    #[tokio::test]
    async fn corrupt_journal_is_a_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path(), false);
        std::fs::write(&state.config.bias_path, "{ not json").unwrap();

        let (status, body) = get_json(router(state), "/api/v1/bias/weekly").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("bias journal"));
    }
}
