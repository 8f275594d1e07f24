//! In-memory doubles for the two collaborators of the reconciler.
//!
//! - [`MemoryFactSource`]: a mutable epoch fact table that can be switched
//!   to "unreachable" to simulate a lost database connection.
//! - [`ScriptedSink`]: records every sample it accepts and fails the
//!   (chain, series, epoch) units it is told to fail.
//!
//! Neither type is meant for production wiring.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use shx_reconcile::{
    ChainId, Epoch, EpochFactSnapshot, EpochFactSource, MaxEpochs, MetricSample, MetricSeries,
    MetricSink, PositiveCounts, ShareCount,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// MemoryFactSource
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SourceState {
    rows: Vec<(ChainId, Epoch, ShareCount)>,
    unreachable: bool,
    extra_max: MaxEpochs,
    reads: usize,
}

/// A `shares_epoch_counts` table held in memory.
///
/// Both views are derived from the raw rows exactly the way the SQL
/// adapter derives them: zero-count rows are filtered out, max epochs are
/// computed over positive rows only.
#[derive(Debug, Default)]
pub struct MemoryFactSource {
    state: Mutex<SourceState>,
}

impl MemoryFactSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from `(chain, epoch, share_count)` rows.
    pub fn with_rows<C: Into<ChainId>>(
        rows: impl IntoIterator<Item = (C, Epoch, ShareCount)>,
    ) -> Self {
        let src = Self::new();
        for (chain, epoch, count) in rows {
            src.upsert(chain, epoch, count);
        }
        src
    }

    /// Insert or overwrite one row.
    pub fn upsert(&self, chain: impl Into<ChainId>, epoch: Epoch, count: ShareCount) {
        let chain = chain.into();
        let mut st = lock(&self.state);
        st.rows.retain(|(c, e, _)| !(c == &chain && *e == epoch));
        st.rows.push((chain, epoch, count));
    }

    /// Simulate the store being down (`true`) or back (`false`).
    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.state).unreachable = unreachable;
    }

    /// Force a max-epoch row for a chain, bypassing the positive rows.
    ///
    /// Used to simulate the two views disagreeing.
    pub fn force_max_epoch(&self, chain: impl Into<ChainId>, epoch: Epoch) {
        lock(&self.state).extra_max.insert(chain.into(), epoch);
    }

    /// Number of successful view reads served so far.
    pub fn reads(&self) -> usize {
        lock(&self.state).reads
    }

    fn check_reachable(st: &mut SourceState) -> Result<()> {
        if st.unreachable {
            bail!("memory fact source unreachable");
        }
        st.reads += 1;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EpochFactSource for MemoryFactSource {
    async fn positive_counts(&self) -> Result<PositiveCounts> {
        let mut st = lock(&self.state);
        Self::check_reachable(&mut st)?;

        let mut out = PositiveCounts::new();
        for (chain, epoch, count) in st.rows.iter().filter(|(_, _, n)| *n > 0) {
            out.entry(chain.clone()).or_default().insert(*epoch, *count);
        }
        Ok(out)
    }

    async fn max_positive_epoch(&self) -> Result<MaxEpochs> {
        let mut st = lock(&self.state);
        Self::check_reachable(&mut st)?;

        let mut out = MaxEpochs::new();
        for (chain, epoch, _) in st.rows.iter().filter(|(_, _, n)| *n > 0) {
            let max = out.entry(chain.clone()).or_insert(*epoch);
            if *epoch > *max {
                *max = *epoch;
            }
        }
        for (chain, epoch) in &st.extra_max {
            out.insert(chain.clone(), *epoch);
        }
        Ok(out)
    }

    async fn snapshot(&self) -> Result<EpochFactSnapshot> {
        // One reachability decision for both views.
        if lock(&self.state).unreachable {
            bail!("memory fact source unreachable");
        }
        Ok(EpochFactSnapshot {
            positive_counts: self.positive_counts().await?,
            max_epochs: self.max_positive_epoch().await?,
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedSink
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SinkState {
    accepted: Vec<MetricSample>,
    attempts: usize,
    fail_units: BTreeSet<(ChainId, MetricSeries, Epoch)>,
    fail_chains: BTreeSet<ChainId>,
}

/// Metric sink that records accepted samples and fails on request.
#[derive(Debug, Default)]
pub struct ScriptedSink {
    state: Mutex<SinkState>,
}

impl ScriptedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every emission of `series` for `(chain, epoch)` until healed.
    pub fn fail_on(&self, chain: impl Into<ChainId>, series: MetricSeries, epoch: Epoch) {
        lock(&self.state)
            .fail_units
            .insert((chain.into(), series, epoch));
    }

    /// Fail every emission for `chain` until healed.
    pub fn fail_chain(&self, chain: impl Into<ChainId>) {
        lock(&self.state).fail_chains.insert(chain.into());
    }

    /// Clear all scripted failures.
    pub fn heal(&self) {
        let mut st = lock(&self.state);
        st.fail_units.clear();
        st.fail_chains.clear();
    }

    /// Samples accepted so far, in emission order.
    pub fn accepted(&self) -> Vec<MetricSample> {
        lock(&self.state).accepted.clone()
    }

    /// Accepted samples of one series for one chain.
    pub fn accepted_for(&self, chain: &str, series: MetricSeries) -> Vec<MetricSample> {
        lock(&self.state)
            .accepted
            .iter()
            .filter(|s| s.chain == chain && s.series == series)
            .cloned()
            .collect()
    }

    /// Emission attempts so far, successful or not.
    pub fn attempts(&self) -> usize {
        lock(&self.state).attempts
    }

    /// Forget recorded samples and attempts; scripted failures stay.
    pub fn clear(&self) {
        let mut st = lock(&self.state);
        st.accepted.clear();
        st.attempts = 0;
    }
}

#[async_trait::async_trait]
impl MetricSink for ScriptedSink {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn emit(&self, sample: &MetricSample) -> Result<()> {
        let mut st = lock(&self.state);
        st.attempts += 1;

        let unit = (sample.chain.clone(), sample.series, sample.epoch);
        if st.fail_chains.contains(&sample.chain) || st.fail_units.contains(&unit) {
            bail!("scripted failure for {sample}");
        }
        st.accepted.push(sample.clone());
        Ok(())
    }
}
