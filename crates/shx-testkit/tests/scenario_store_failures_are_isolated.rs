//! Scenario: store-level and view-level failures.
//!
//! # Invariants under test
//!
//! 1. An unreachable store fails the tick and moves no watermark.
//! 2. Once the store is back, the next tick proceeds normally.
//! 3. A chain present in only one of the two views is skipped as
//!    inconsistent; other chains proceed.
//! 4. Cold start with skip-history seeds watermarks so existing history is
//!    not emitted; replay-all emits it.

use shx_reconcile::{
    ChainStatus, ColdStartPolicy, EpochFactSource, MetricSeries, Reconciler, WatermarkTracker,
};
use shx_testkit::{MemoryFactSource, ScriptedSink};

#[tokio::test]
async fn unreachable_store_abandons_tick_without_advancing() {
    let source = MemoryFactSource::with_rows([("alpha", 1, 1)]);
    source.set_unreachable(true);
    let sink = ScriptedSink::new();
    let mut tracker = WatermarkTracker::new();
    let reconciler = Reconciler::new();

    let err = reconciler
        .run_tick(&mut tracker, &source, &sink)
        .await
        .expect_err("tick must fail when the store is unreachable");
    assert!(format!("{err:#}").contains("unreachable"));
    assert!(tracker.is_empty());
    assert_eq!(sink.attempts(), 0);

    source.set_unreachable(false);
    reconciler
        .run_tick(&mut tracker, &source, &sink)
        .await
        .expect("tick after recovery");
    assert_eq!(tracker.get("alpha"), 1);
}

#[tokio::test]
async fn chain_missing_from_positive_view_is_skipped() {
    let source = MemoryFactSource::with_rows([("alpha", 2, 5)]);
    source.force_max_epoch("ghost", 40);
    let sink = ScriptedSink::new();
    let mut tracker = WatermarkTracker::new();

    let report = Reconciler::new()
        .run_tick(&mut tracker, &source, &sink)
        .await
        .expect("tick");

    assert!(matches!(
        report.chain("ghost").map(|c| &c.status),
        Some(ChainStatus::Inconsistent { .. })
    ));
    assert_eq!(tracker.get("ghost"), 0);
    assert_eq!(tracker.get("alpha"), 2);
}

#[tokio::test]
async fn skip_history_cold_start_emits_only_new_facts() {
    let source = MemoryFactSource::with_rows([("alpha", 1, 1), ("alpha", 2, 2)]);
    let max = source.max_positive_epoch().await.expect("seed read");
    let mut tracker = WatermarkTracker::seeded(ColdStartPolicy::SkipHistory, &max);
    let sink = ScriptedSink::new();
    let reconciler = Reconciler::new();

    reconciler
        .run_tick(&mut tracker, &source, &sink)
        .await
        .expect("tick");
    assert_eq!(sink.attempts(), 0, "pre-existing history is skipped");

    source.upsert("alpha", 3, 6);
    reconciler
        .run_tick(&mut tracker, &source, &sink)
        .await
        .expect("tick");
    let epochs: Vec<u64> = sink
        .accepted_for("alpha", MetricSeries::EpochCount)
        .iter()
        .map(|s| s.epoch)
        .collect();
    assert_eq!(epochs, vec![3]);
}

#[tokio::test]
async fn replay_all_cold_start_emits_history() {
    let source = MemoryFactSource::with_rows([("alpha", 1, 1), ("alpha", 2, 2)]);
    let max = source.max_positive_epoch().await.expect("seed read");
    let mut tracker = WatermarkTracker::seeded(ColdStartPolicy::ReplayAll, &max);
    let sink = ScriptedSink::new();

    Reconciler::new()
        .run_tick(&mut tracker, &source, &sink)
        .await
        .expect("tick");
    assert_eq!(sink.accepted_for("alpha", MetricSeries::EpochCount).len(), 2);
}
