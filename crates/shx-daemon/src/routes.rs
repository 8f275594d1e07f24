//! Axum router for the read-only status API.
//!
//! `build_router` is the single entry point; `main.rs` attaches the trace
//! layer so tests can drive the bare router.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};

use crate::{
    api_types::{HealthResponse, WatermarksResponse},
    state::{uptime_secs, AppState},
};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/watermarks", get(watermarks))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.clone(),
            version: st.build.version.clone(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let mut snap = st.status.read().await.clone();
    snap.daemon_uptime_secs = uptime_secs();
    (StatusCode::OK, Json(snap))
}

// ---------------------------------------------------------------------------
// GET /v1/watermarks
// ---------------------------------------------------------------------------

pub(crate) async fn watermarks(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let chains = st.watermarks.read().await.clone();
    (StatusCode::OK, Json(WatermarksResponse { chains }))
}
