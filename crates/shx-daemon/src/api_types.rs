//! Response types for the status API.
//!
//! `Serialize + Deserialize` so they can be JSON-encoded by Axum and
//! decoded by tests. No logic lives here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// /v1/watermarks
// ---------------------------------------------------------------------------

/// Highest confirmed-emitted epoch per chain, as of the last finished tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatermarksResponse {
    pub chains: BTreeMap<String, u64>,
}
