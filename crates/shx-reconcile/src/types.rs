use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, case-sensitive chain name. Used as a label value, never parsed.
pub type ChainId = String;

/// Ordinal work interval within a chain (height, round, ...).
pub type Epoch = u64;

/// Monitored quantity for one (chain, epoch). Zero means "absent".
pub type ShareCount = u64;

/// chain -> (epoch -> count), count > 0 only.
pub type PositiveCounts = BTreeMap<ChainId, BTreeMap<Epoch, ShareCount>>;

/// chain -> highest epoch with a positive count.
pub type MaxEpochs = BTreeMap<ChainId, Epoch>;

/// One consistent read of the epoch fact store.
///
/// Both metric series of a tick are derived from the same snapshot so they
/// always agree on the observed state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EpochFactSnapshot {
    pub positive_counts: PositiveCounts,
    pub max_epochs: MaxEpochs,
}

impl EpochFactSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Record one positive fact and keep `max_epochs` in step with it.
    ///
    /// Zero counts are ignored: they are absent by definition.
    pub fn insert(&mut self, chain: impl Into<ChainId>, epoch: Epoch, count: ShareCount) {
        if count == 0 {
            return;
        }
        let chain = chain.into();
        let max = self.max_epochs.entry(chain.clone()).or_insert(epoch);
        if epoch > *max {
            *max = epoch;
        }
        self.positive_counts
            .entry(chain)
            .or_default()
            .insert(epoch, count);
    }

    pub fn chain_count(&self) -> usize {
        self.positive_counts.len()
    }
}

/// The two derived series published per chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSeries {
    /// Time series over epochs: one sample per epoch with a positive count.
    EpochCount,
    /// Snapshot of the frontier: the count at the chain's max epoch.
    LatestNonzero,
}

impl MetricSeries {
    /// Exposition metric name.
    pub fn metric_name(&self) -> &'static str {
        match self {
            MetricSeries::EpochCount => "shares_epoch_count",
            MetricSeries::LatestNonzero => "shares_latest_nonzero",
        }
    }
}

impl fmt::Display for MetricSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metric_name())
    }
}

/// A fully resolved emission handed to a [`crate::MetricSink`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MetricSample {
    pub series: MetricSeries,
    pub chain: ChainId,
    /// Epoch the value belongs to. Carried for logs and failure bookkeeping;
    /// sinks must not turn it into a label.
    pub epoch: Epoch,
    pub value: ShareCount,
}

impl MetricSample {
    pub fn new(
        series: MetricSeries,
        chain: impl Into<ChainId>,
        epoch: Epoch,
        value: ShareCount,
    ) -> Self {
        Self {
            series,
            chain: chain.into(),
            epoch,
            value,
        }
    }
}

impl fmt::Display for MetricSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{{chain={:?}}}={} @epoch {}",
            self.series, self.chain, self.value, self.epoch
        )
    }
}
