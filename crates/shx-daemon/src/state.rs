//! Shared runtime state for shx-daemon.
//!
//! The scheduler is the only writer; the status API reads. The watermark
//! tracker itself stays owned by the scheduler: this module only holds a
//! copy published after each tick.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shx_reconcile::{ChainId, ChainStatus, Epoch, TickReport};
use tokio::sync::RwLock;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Outcome of the most recent tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub ok: bool,
    pub chains: usize,
    pub emitted: usize,
    pub failed: usize,
    pub partial_chains: usize,
    pub inconsistent_chains: usize,
    /// Set when the tick was abandoned (store unreachable).
    pub error: Option<String>,
}

impl TickSummary {
    pub fn from_report(report: &TickReport) -> Self {
        Self {
            ok: true,
            chains: report.chains.len(),
            emitted: report.emitted(),
            failed: report.failed(),
            partial_chains: report.count_status(|s| matches!(s, ChainStatus::Partial { .. })),
            inconsistent_chains: report
                .count_status(|s| matches!(s, ChainStatus::Inconsistent { .. })),
            error: None,
        }
    }

    pub fn abandoned(error: String) -> Self {
        Self {
            ok: false,
            chains: 0,
            emitted: 0,
            failed: 0,
            partial_chains: 0,
            inconsistent_chains: 0,
            error: Some(error),
        }
    }
}

/// Point-in-time view of the exporter, returned by GET /v1/status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    /// "starting" | "running" | "degraded"
    pub state: String,
    pub config_hash: String,
    pub sink: String,
    pub cold_start: String,
    pub interval_secs: u64,
    pub ticks_total: u64,
    pub ticks_abandoned: u64,
    pub emitted_total: u64,
    pub failed_emissions_total: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_tick: Option<TickSummary>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Static facts about this process, fixed at startup.
#[derive(Clone, Debug)]
pub struct StartupInfo {
    pub config_hash: String,
    pub sink: String,
    pub cold_start: String,
    pub interval_secs: u64,
}

/// Cloneable (Arc) handle shared by the scheduler and the Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub status: Arc<RwLock<StatusSnapshot>>,
    pub watermarks: Arc<RwLock<BTreeMap<ChainId, Epoch>>>,
}

impl AppState {
    pub fn new(info: StartupInfo) -> Self {
        let initial_status = StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            state: "starting".to_string(),
            config_hash: info.config_hash,
            sink: info.sink,
            cold_start: info.cold_start,
            interval_secs: info.interval_secs,
            ticks_total: 0,
            ticks_abandoned: 0,
            emitted_total: 0,
            failed_emissions_total: 0,
            last_tick_at: None,
            last_tick: None,
        };

        Self {
            build: BuildInfo {
                service: "shx-daemon".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            status: Arc::new(RwLock::new(initial_status)),
            watermarks: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Publish a finished tick and the watermarks it left behind.
    pub async fn record_tick(&self, report: &TickReport, watermarks: BTreeMap<ChainId, Epoch>) {
        let summary = TickSummary::from_report(report);
        {
            let mut st = self.status.write().await;
            st.ticks_total += 1;
            st.emitted_total += summary.emitted as u64;
            st.failed_emissions_total += summary.failed as u64;
            st.state = if summary.failed > 0 {
                "degraded".to_string()
            } else {
                "running".to_string()
            };
            st.last_tick_at = Some(Utc::now());
            st.last_tick = Some(summary);
        }
        *self.watermarks.write().await = watermarks;
    }

    /// Publish an abandoned tick. Watermarks are untouched.
    pub async fn record_abandoned_tick(&self, error: String) {
        let mut st = self.status.write().await;
        st.ticks_total += 1;
        st.ticks_abandoned += 1;
        st.state = "degraded".to_string();
        st.last_tick_at = Some(Utc::now());
        st.last_tick = Some(TickSummary::abandoned(error));
    }

    /// Seed the published watermarks before the first tick.
    pub async fn publish_watermarks(&self, watermarks: BTreeMap<ChainId, Epoch>) {
        *self.watermarks.write().await = watermarks;
    }
}

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
