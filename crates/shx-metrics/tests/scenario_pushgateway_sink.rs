//! Scenario: push gateway backend against a mock HTTP server.
//!
//! # Invariants under test
//!
//! 1. Each sample is one POST to `/metrics/job/<job>/chain/<chain>` with a
//!    text exposition body.
//! 2. A configured job replaces the chain as job name.
//! 3. A chain containing `/` is pushed under the base64 grouping form.
//! 4. Non-2xx responses are reported as emission failures.

use httpmock::prelude::*;
use shx_metrics::PushGatewaySink;
use shx_reconcile::{MetricSample, MetricSeries, MetricSink};

#[tokio::test]
async fn pushes_sample_under_chain_job() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/metrics/job/alpha/chain/alpha")
                .header("content-type", "text/plain; version=0.0.4")
                .body("# TYPE shares_epoch_count gauge\nshares_epoch_count{chain=\"alpha\"} 10\n");
            then.status(200);
        })
        .await;

    let sink = PushGatewaySink::new(&server.base_url(), None).expect("sink");
    sink.emit(&MetricSample::new(MetricSeries::EpochCount, "alpha", 5, 10))
        .await
        .expect("push must succeed");

    mock.assert_async().await;
}

#[tokio::test]
async fn configured_job_is_used() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/metrics/job/shares/chain/beta")
                .body_contains("shares_latest_nonzero{chain=\"beta\"} 8");
            then.status(202);
        })
        .await;

    let sink = PushGatewaySink::new(&server.base_url(), Some("shares".to_string())).expect("sink");
    sink.emit(&MetricSample::new(MetricSeries::LatestNonzero, "beta", 9, 8))
        .await
        .expect("push must succeed");

    mock.assert_async().await;
}

#[tokio::test]
async fn chain_with_slash_uses_base64_grouping_key() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/metrics/job/shares/chain@base64/cG9vbC9ldQ")
                .body_contains("shares_epoch_count{chain=\"pool/eu\"} 4");
            then.status(200);
        })
        .await;

    let sink = PushGatewaySink::new(&server.base_url(), Some("shares".to_string())).expect("sink");
    sink.emit(&MetricSample::new(MetricSeries::EpochCount, "pool/eu", 3, 4))
        .await
        .expect("push must succeed");

    mock.assert_async().await;
}

#[tokio::test]
async fn server_error_is_an_emission_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(500).body("boom");
        })
        .await;

    let sink = PushGatewaySink::new(&server.base_url(), None).expect("sink");
    let err = sink
        .emit(&MetricSample::new(MetricSeries::EpochCount, "alpha", 1, 1))
        .await
        .expect_err("5xx must fail the emission");
    let msg = format!("{err:#}");
    assert!(msg.contains("status=500"), "{msg}");
    assert!(msg.contains("boom"), "{msg}");
}
