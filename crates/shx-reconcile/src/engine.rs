use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::{
    ChainId, Epoch, EpochFactSnapshot, EpochFactSource, MetricSample, MetricSeries, MetricSink,
    ShareCount, WatermarkTracker,
};

// ---------------------------------------------------------------------------
// Planning (pure)
// ---------------------------------------------------------------------------

/// Emissions owed by one chain for one tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainPlan {
    pub chain: ChainId,
    /// Watermark at planning time; the pending range starts above it.
    pub watermark: Epoch,
    /// Upper bound (inclusive) of the pending range.
    pub max_epoch: Epoch,
    /// `shares_epoch_count` samples, strictly ascending by epoch.
    pub epoch_samples: Vec<MetricSample>,
    /// `shares_latest_nonzero` sample, present only when the count at
    /// `max_epoch` itself is positive.
    pub latest_nonzero: Option<MetricSample>,
}

impl ChainPlan {
    pub fn emission_count(&self) -> usize {
        self.epoch_samples.len() + usize::from(self.latest_nonzero.is_some())
    }
}

/// Decide what one chain owes the sink.
///
/// Returns `None` when `max_epoch <= watermark`: nothing new exists and no
/// emission may be attempted. Otherwise the pending range is
/// `(watermark, max_epoch]`; only stored epochs with a positive count inside
/// it are planned, so sparse ranges cost nothing per missing epoch.
pub fn plan_chain(
    chain: &str,
    counts: &BTreeMap<Epoch, ShareCount>,
    max_epoch: Epoch,
    watermark: Epoch,
) -> Option<ChainPlan> {
    if max_epoch <= watermark {
        return None;
    }

    let epoch_samples = counts
        .range((Excluded(watermark), Included(max_epoch)))
        .filter(|(_, count)| **count > 0)
        .map(|(epoch, count)| MetricSample::new(MetricSeries::EpochCount, chain, *epoch, *count))
        .collect();

    let latest_nonzero = counts
        .get(&max_epoch)
        .filter(|count| **count > 0)
        .map(|count| MetricSample::new(MetricSeries::LatestNonzero, chain, max_epoch, *count));

    Some(ChainPlan {
        chain: chain.to_string(),
        watermark,
        max_epoch,
        epoch_samples,
        latest_nonzero,
    })
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one chain within one tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainStatus {
    /// `max_epoch <= watermark`; no emission attempted.
    UpToDate,
    /// Every planned emission succeeded; watermark is at `max_epoch`.
    Reconciled,
    /// At least one emission failed. The watermark stops just below
    /// `first_failed`, which is retried next tick.
    Partial { first_failed: Epoch },
    /// The chain was present in only one of the two store views.
    Inconsistent { reason: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainReport {
    pub chain: ChainId,
    pub status: ChainStatus,
    pub watermark_before: Epoch,
    pub watermark_after: Epoch,
    pub emitted: usize,
    pub failed: usize,
}

impl ChainReport {
    fn unchanged(chain: &str, watermark: Epoch, status: ChainStatus) -> Self {
        Self {
            chain: chain.to_string(),
            status,
            watermark_before: watermark,
            watermark_after: watermark,
            emitted: 0,
            failed: 0,
        }
    }
}

/// Everything one tick did, ordered by chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub chains: Vec<ChainReport>,
}

impl TickReport {
    pub fn emitted(&self) -> usize {
        self.chains.iter().map(|c| c.emitted).sum()
    }

    pub fn failed(&self) -> usize {
        self.chains.iter().map(|c| c.failed).sum()
    }

    /// `true` when the tick attempted no emission at all.
    pub fn is_idle(&self) -> bool {
        self.emitted() == 0 && self.failed() == 0
    }

    pub fn chain(&self, chain: &str) -> Option<&ChainReport> {
        self.chains.iter().find(|c| c.chain == chain)
    }

    pub fn count_status(&self, pred: impl Fn(&ChainStatus) -> bool) -> usize {
        self.chains.iter().filter(|c| pred(&c.status)).count()
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Turns one store snapshot into the minimal set of emissions and advances
/// watermarks as emissions are confirmed.
#[derive(Clone, Debug)]
pub struct Reconciler {
    chain_concurrency: usize,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    /// Sequential reconciler: one chain at a time.
    pub fn new() -> Self {
        Self {
            chain_concurrency: 1,
        }
    }

    /// Process up to `n` chains concurrently within a tick (minimum 1).
    pub fn with_chain_concurrency(mut self, n: usize) -> Self {
        self.chain_concurrency = n.max(1);
        self
    }

    pub fn chain_concurrency(&self) -> usize {
        self.chain_concurrency
    }

    /// One full reconciliation pass.
    ///
    /// Fails only if the store snapshot cannot be read; in that case no
    /// watermark has moved. Per-chain and per-emission failures are logged
    /// and reported in the returned [`TickReport`].
    pub async fn run_tick<S, K>(
        &self,
        tracker: &mut WatermarkTracker,
        source: &S,
        sink: &K,
    ) -> Result<TickReport>
    where
        S: EpochFactSource + ?Sized,
        K: MetricSink + ?Sized,
    {
        let snapshot = source
            .snapshot()
            .await
            .context("epoch fact snapshot read failed")?;
        Ok(self.apply_snapshot(tracker, &snapshot, sink).await)
    }

    /// Reconcile an already-fetched snapshot.
    pub async fn apply_snapshot<K>(
        &self,
        tracker: &mut WatermarkTracker,
        snapshot: &EpochFactSnapshot,
        sink: &K,
    ) -> TickReport
    where
        K: MetricSink + ?Sized,
    {
        let mut chains: Vec<ChainReport> = Vec::new();

        for chain in snapshot.max_epochs.keys() {
            if !snapshot.positive_counts.contains_key(chain) {
                warn!(
                    chain = chain.as_str(),
                    "chain has a max epoch but no positive counts; skipping this tick"
                );
                chains.push(ChainReport::unchanged(
                    chain,
                    tracker.get(chain),
                    ChainStatus::Inconsistent {
                        reason: "missing positive counts",
                    },
                ));
            }
        }

        // Advance calls from concurrently processed chains are serialized
        // here. The lock is never held across an await.
        let marks = Mutex::new(tracker);

        let processed: Vec<ChainReport> = stream::iter(snapshot.positive_counts.iter())
            .map(|(chain, counts)| {
                let max_epoch = snapshot.max_epochs.get(chain).copied();
                reconcile_chain(&marks, chain, counts, max_epoch, sink)
            })
            .buffer_unordered(self.chain_concurrency)
            .collect()
            .await;

        chains.extend(processed);
        chains.sort_by(|a, b| a.chain.cmp(&b.chain));

        let report = TickReport { chains };
        info!(
            sink = sink.name(),
            chains = report.chains.len(),
            emitted = report.emitted(),
            failed = report.failed(),
            "reconcile tick complete"
        );
        report
    }
}

fn read_mark(marks: &Mutex<&mut WatermarkTracker>, chain: &str) -> Epoch {
    marks
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(chain)
}

fn advance_mark(marks: &Mutex<&mut WatermarkTracker>, chain: &str, epoch: Epoch) {
    marks
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .advance(chain, epoch);
}

async fn reconcile_chain<K>(
    marks: &Mutex<&mut WatermarkTracker>,
    chain: &str,
    counts: &BTreeMap<Epoch, ShareCount>,
    max_epoch: Option<Epoch>,
    sink: &K,
) -> ChainReport
where
    K: MetricSink + ?Sized,
{
    let before = read_mark(marks, chain);

    let Some(max_epoch) = max_epoch else {
        warn!(chain, "chain has positive counts but no max epoch; skipping this tick");
        return ChainReport::unchanged(
            chain,
            before,
            ChainStatus::Inconsistent {
                reason: "missing max epoch",
            },
        );
    };

    let Some(plan) = plan_chain(chain, counts, max_epoch, before) else {
        return ChainReport::unchanged(chain, before, ChainStatus::UpToDate);
    };

    debug!(
        chain,
        from = before + 1,
        to = max_epoch,
        planned = plan.emission_count(),
        "pending range"
    );

    // The frontier epoch is only confirmed once its latest-nonzero sample
    // is out too, otherwise a failed frontier push would never be retried.
    let ceiling = if plan.latest_nonzero.is_some() {
        max_epoch - 1
    } else {
        max_epoch
    };

    let mut emitted = 0usize;
    let mut failed = 0usize;
    let mut first_failed: Option<Epoch> = None;

    for sample in &plan.epoch_samples {
        match sink.emit(sample).await {
            Ok(()) => {
                emitted += 1;
                debug!(chain, epoch = sample.epoch, value = sample.value, "emitted epoch count");
                if first_failed.is_none() {
                    advance_mark(marks, chain, sample.epoch.min(ceiling));
                }
            }
            Err(err) => {
                failed += 1;
                warn!(
                    chain,
                    epoch = sample.epoch,
                    sink = sink.name(),
                    "emission failed, epoch will be retried next tick: {err:#}"
                );
                if first_failed.is_none() {
                    first_failed = Some(sample.epoch);
                    advance_mark(marks, chain, sample.epoch.saturating_sub(1));
                }
            }
        }
    }

    if let Some(latest) = &plan.latest_nonzero {
        match sink.emit(latest).await {
            Ok(()) => {
                emitted += 1;
                debug!(chain, epoch = max_epoch, value = latest.value, "emitted latest nonzero");
            }
            Err(err) => {
                failed += 1;
                warn!(
                    chain,
                    epoch = max_epoch,
                    sink = sink.name(),
                    "latest-nonzero emission failed, frontier will be retried next tick: {err:#}"
                );
                if first_failed.is_none() {
                    first_failed = Some(max_epoch);
                    advance_mark(marks, chain, max_epoch - 1);
                }
            }
        }
    }

    if first_failed.is_none() {
        advance_mark(marks, chain, max_epoch);
    }

    let after = read_mark(marks, chain);
    let status = match first_failed {
        None => ChainStatus::Reconciled,
        Some(first_failed) => ChainStatus::Partial { first_failed },
    };

    info!(chain, before, after, emitted, failed, "chain reconciled");

    ChainReport {
        chain: chain.to_string(),
        status,
        watermark_before: before,
        watermark_after: after,
        emitted,
        failed,
    }
}
