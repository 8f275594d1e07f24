//! Metric Emitter backends.
//!
//! Two interchangeable [`shx_reconcile::MetricSink`] implementations:
//! - [`TextfileSink`]: `<dir>/<chain>.prom` files for a node-exporter style
//!   textfile collector.
//! - [`PushGatewaySink`]: one HTTP push per sample to a metrics push
//!   gateway.
//!
//! Both render samples with [`exposition`].

pub mod exposition;
mod push;
mod textfile;

pub use push::PushGatewaySink;
pub use textfile::{ensure_output_dir, FileMode, TextfileSink};
