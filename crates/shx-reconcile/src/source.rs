//! Collaborator boundaries: the epoch fact store and the metric sink.
//!
//! Both are consumed, never implemented, by the reconciler. Concrete
//! adapters live in `shx-db` and `shx-metrics`; in-memory doubles live in
//! `shx-testkit`.

use anyhow::Result;

use crate::{EpochFactSnapshot, MaxEpochs, MetricSample, PositiveCounts};

/// Read views over the (chain, epoch, share_count) table.
///
/// Implementations must be `Send + Sync` so the scheduler can hold them
/// across await points.
#[async_trait::async_trait]
pub trait EpochFactSource: Send + Sync {
    /// Per chain, every epoch with a positive count.
    async fn positive_counts(&self) -> Result<PositiveCounts>;

    /// Per chain, the highest epoch with a positive count.
    async fn max_positive_epoch(&self) -> Result<MaxEpochs>;

    /// Both views for one tick.
    ///
    /// The default reads them one after the other; adapters that can read
    /// both under one consistent snapshot should override it.
    async fn snapshot(&self) -> Result<EpochFactSnapshot> {
        let positive_counts = self.positive_counts().await?;
        let max_epochs = self.max_positive_epoch().await?;
        Ok(EpochFactSnapshot {
            positive_counts,
            max_epochs,
        })
    }
}

/// Publishes one fully resolved sample.
///
/// `Ok(())` means the sample is durably handed off; only then may the
/// reconciler advance the chain's watermark.
#[async_trait::async_trait]
pub trait MetricSink: Send + Sync {
    /// Short backend name for logs (e.g. `"textfile"`).
    fn name(&self) -> &'static str;

    async fn emit(&self, sample: &MetricSample) -> Result<()>;
}
