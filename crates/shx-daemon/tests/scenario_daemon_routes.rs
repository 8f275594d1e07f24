//! In-process scenario tests for the shx-daemon status API.
//!
//! The router is driven via `tower::ServiceExt::oneshot`; no TCP socket is
//! bound.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use shx_daemon::{
    routes,
    state::{AppState, StartupInfo},
};
use shx_reconcile::{ChainReport, ChainStatus, TickReport};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_state() -> Arc<AppState> {
    Arc::new(AppState::new(StartupInfo {
        config_hash: "abc123".to_string(),
        sink: "textfile".to_string(),
        cold_start: "skip_history".to_string(),
        interval_secs: 300,
    }))
}

async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = routes::build_router(Arc::clone(state))
        .oneshot(req)
        .await
        .expect("oneshot failed");
    let status = resp.status();
    let body: bytes::Bytes = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).expect("body is not valid JSON")
    };
    (status, json)
}

fn report_with(chain: &str, emitted: usize, failed: usize, status: ChainStatus) -> TickReport {
    TickReport {
        chains: vec![ChainReport {
            chain: chain.to_string(),
            status,
            watermark_before: 0,
            watermark_after: 7,
            emitted,
            failed,
        }],
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let (status, json) = get(&make_state(), "/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "shx-daemon");
    assert!(json["version"].is_string());
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_before_first_tick_is_starting() {
    let (status, json) = get(&make_state(), "/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "starting");
    assert_eq!(json["config_hash"], "abc123");
    assert_eq!(json["sink"], "textfile");
    assert_eq!(json["interval_secs"], 300);
    assert_eq!(json["ticks_total"], 0);
    assert!(json["last_tick"].is_null());
}

#[tokio::test]
async fn status_reflects_failed_emissions_as_degraded() {
    let state = make_state();
    state
        .record_tick(
            &report_with("alpha", 1, 1, ChainStatus::Partial { first_failed: 7 }),
            BTreeMap::from([("alpha".to_string(), 6)]),
        )
        .await;

    let (_, json) = get(&state, "/v1/status").await;
    assert_eq!(json["state"], "degraded");
    assert_eq!(json["ticks_total"], 1);
    assert_eq!(json["emitted_total"], 1);
    assert_eq!(json["failed_emissions_total"], 1);
    assert_eq!(json["last_tick"]["partial_chains"], 1);
    assert_eq!(json["last_tick"]["ok"], true);
}

#[tokio::test]
async fn abandoned_tick_is_reported_with_error() {
    let state = make_state();
    state
        .record_abandoned_tick("epoch fact snapshot read failed".to_string())
        .await;

    let (_, json) = get(&state, "/v1/status").await;
    assert_eq!(json["state"], "degraded");
    assert_eq!(json["ticks_abandoned"], 1);
    assert_eq!(json["last_tick"]["ok"], false);
    assert_eq!(json["last_tick"]["error"], "epoch fact snapshot read failed");
}

// ---------------------------------------------------------------------------
// GET /v1/watermarks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn watermarks_follow_the_last_tick() {
    let state = make_state();

    let (_, json) = get(&state, "/v1/watermarks").await;
    assert_eq!(json["chains"], serde_json::json!({}));

    state
        .record_tick(
            &report_with("alpha", 3, 0, ChainStatus::Reconciled),
            BTreeMap::from([("alpha".to_string(), 7), ("beta".to_string(), 12)]),
        )
        .await;

    let (status, json) = get(&state, "/v1/watermarks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["chains"]["alpha"], 7);
    assert_eq!(json["chains"]["beta"], 12);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (status, _) = get(&make_state(), "/v1/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
