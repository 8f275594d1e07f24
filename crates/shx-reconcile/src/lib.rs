//! shx-reconcile
//!
//! Incremental reconciliation of per-chain, per-epoch share counts into
//! metric emissions.
//!
//! Architectural decisions:
//! - One store read per tick; both metric series derive from that snapshot
//! - Per-chain watermark, advanced only after a confirmed emission
//! - Within a chain, epochs are emitted strictly ascending
//! - A failed emission pins the watermark below the failed epoch
//! - Failures are isolated per (chain, epoch); a tick only fails when the
//!   store cannot be read at all
//!
//! The store and the metric sink are traits; this crate performs no IO of
//! its own.

mod engine;
mod source;
mod types;
mod watermark;

pub use engine::{plan_chain, ChainPlan, ChainReport, ChainStatus, Reconciler, TickReport};
pub use source::{EpochFactSource, MetricSink};
pub use types::*;
pub use watermark::{ColdStartPolicy, WatermarkTracker};
