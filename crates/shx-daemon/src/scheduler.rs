//! Periodic reconciliation loop.
//!
//! One `Scheduler` owns the watermark tracker for the lifetime of the
//! process. Ticks run sequentially: a tick always finishes before the next
//! one starts, and shutdown is only observed between ticks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use shx_reconcile::{EpochFactSource, MetricSink, Reconciler, TickReport, WatermarkTracker};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::state::AppState;

pub struct Scheduler {
    tracker: WatermarkTracker,
    reconciler: Reconciler,
    source: Arc<dyn EpochFactSource>,
    sink: Arc<dyn MetricSink>,
    interval: Duration,
    state: Arc<AppState>,
}

impl Scheduler {
    pub fn new(
        tracker: WatermarkTracker,
        reconciler: Reconciler,
        source: Arc<dyn EpochFactSource>,
        sink: Arc<dyn MetricSink>,
        interval: Duration,
        state: Arc<AppState>,
    ) -> Self {
        Self {
            tracker,
            reconciler,
            source,
            sink,
            interval,
            state,
        }
    }

    pub fn tracker(&self) -> &WatermarkTracker {
        &self.tracker
    }

    /// Run one tick and publish its outcome to the shared state.
    ///
    /// An `Err` means the tick was abandoned before any emission; the
    /// tracker is unchanged.
    pub async fn tick_once(&mut self) -> Result<TickReport> {
        let outcome = self
            .reconciler
            .run_tick(&mut self.tracker, self.source.as_ref(), self.sink.as_ref())
            .await;

        match outcome {
            Ok(report) => {
                if report.failed() > 0 {
                    warn!(
                        failed = report.failed(),
                        "tick finished with failed emissions; they will be retried"
                    );
                }
                self.state
                    .record_tick(&report, self.tracker.snapshot())
                    .await;
                Ok(report)
            }
            Err(err) => {
                error!(
                    retry_in_secs = self.interval.as_secs(),
                    "tick abandoned: {err:#}"
                );
                self.state.record_abandoned_tick(format!("{err:#}")).await;
                Err(err)
            }
        }
    }

    /// Tick immediately, then every `interval`, until `shutdown` resolves.
    ///
    /// Returns the tracker so callers can inspect the final watermarks.
    pub async fn run_until<F>(mut self, shutdown: F) -> WatermarkTracker
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.interval.as_secs(),
            sink = self.sink.name(),
            chains = self.tracker.len(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }
            // Errors are already logged and published.
            let _ = self.tick_once().await;
        }

        info!(chains = self.tracker.len(), "scheduler stopped");
        self.tracker
    }
}
