//! Startup wiring shared by `main.rs` and the scenario tests.

use std::sync::Arc;

use anyhow::{Context, Result};
use shx_config::OutputTarget;
use shx_metrics::{ensure_output_dir, PushGatewaySink, TextfileSink};
use shx_reconcile::{ColdStartPolicy, EpochFactSource, MetricSink, WatermarkTracker};
use tracing::info;

/// Build the configured sink. A textfile directory is created if missing.
pub fn build_sink(target: &OutputTarget) -> Result<Arc<dyn MetricSink>> {
    match target {
        OutputTarget::Textfile { dir, mode } => {
            ensure_output_dir(dir)
                .with_context(|| format!("output directory unusable: {}", dir.display()))?;
            info!(dir = %dir.display(), mode = mode.as_str(), "textfile sink ready");
            Ok(Arc::new(TextfileSink::new(dir.clone(), *mode)))
        }
        OutputTarget::PushGateway { url, job } => {
            let sink = PushGatewaySink::new(url, job.clone())?;
            info!(
                url = url.as_str(),
                job = job.as_deref().unwrap_or("<chain>"),
                "push gateway sink ready"
            );
            Ok(Arc::new(sink))
        }
    }
}

/// Seed the watermark tracker from the store's current frontier.
///
/// Failure here is fatal to startup: the daemon must not begin ticking
/// without knowing where history ends.
pub async fn seed_tracker(
    source: &dyn EpochFactSource,
    policy: ColdStartPolicy,
) -> Result<WatermarkTracker> {
    let max_epochs = source
        .max_positive_epoch()
        .await
        .context("failed to read max positive epochs at startup")?;

    let tracker = WatermarkTracker::seeded(policy, &max_epochs);
    info!(
        policy = policy.as_str(),
        chains = tracker.len(),
        "watermarks seeded"
    );
    Ok(tracker)
}
