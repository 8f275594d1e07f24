//! Scenario: an unchanged source produces no emissions.
//!
//! # Invariants under test
//!
//! 1. A second tick over an unchanged source attempts zero emissions and
//!    leaves the watermark in place.
//! 2. New facts appended after a tick are the only ones emitted next tick.
//! 3. Watermarks are non-decreasing across a sequence of ticks.

use shx_reconcile::{ChainStatus, MetricSeries, Reconciler, WatermarkTracker};
use shx_testkit::{MemoryFactSource, ScriptedSink};

#[tokio::test]
async fn unchanged_source_second_tick_emits_nothing() {
    let source = MemoryFactSource::with_rows([("alpha", 5, 10), ("alpha", 6, 0), ("alpha", 7, 3)]);
    let sink = ScriptedSink::new();
    let mut tracker = WatermarkTracker::new();
    let reconciler = Reconciler::new();

    reconciler
        .run_tick(&mut tracker, &source, &sink)
        .await
        .expect("first tick");
    sink.clear();

    let report = reconciler
        .run_tick(&mut tracker, &source, &sink)
        .await
        .expect("second tick");

    assert_eq!(sink.attempts(), 0, "steady state must not touch the sink");
    assert!(report.is_idle());
    assert_eq!(tracker.get("alpha"), 7);
    assert_eq!(
        report.chain("alpha").map(|c| c.status.clone()),
        Some(ChainStatus::UpToDate)
    );
}

#[tokio::test]
async fn only_new_facts_are_emitted_after_append() {
    let source = MemoryFactSource::with_rows([("alpha", 1, 2), ("alpha", 2, 5)]);
    let sink = ScriptedSink::new();
    let mut tracker = WatermarkTracker::new();
    let reconciler = Reconciler::new();

    reconciler
        .run_tick(&mut tracker, &source, &sink)
        .await
        .expect("first tick");
    sink.clear();

    source.upsert("alpha", 3, 0);
    source.upsert("alpha", 4, 9);

    reconciler
        .run_tick(&mut tracker, &source, &sink)
        .await
        .expect("second tick");

    let epochs: Vec<u64> = sink
        .accepted_for("alpha", MetricSeries::EpochCount)
        .iter()
        .map(|s| s.epoch)
        .collect();
    assert_eq!(epochs, vec![4]);
    assert_eq!(
        sink.accepted_for("alpha", MetricSeries::LatestNonzero)[0].value,
        9
    );
    assert_eq!(tracker.get("alpha"), 4);
}

#[tokio::test]
async fn watermark_is_monotonic_across_ticks() {
    let source = MemoryFactSource::new();
    let sink = ScriptedSink::new();
    let mut tracker = WatermarkTracker::new();
    let reconciler = Reconciler::new();

    let mut last = 0;
    for epoch in 1..=6u64 {
        source.upsert("delta", epoch * 2, epoch);
        if epoch == 3 {
            sink.fail_chain("delta");
        }
        if epoch == 5 {
            sink.heal();
        }
        reconciler
            .run_tick(&mut tracker, &source, &sink)
            .await
            .expect("tick");
        let now = tracker.get("delta");
        assert!(now >= last, "watermark regressed from {last} to {now}");
        last = now;
    }
    assert_eq!(last, 12);
}
