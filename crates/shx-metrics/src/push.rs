//! Push backend: one HTTP request per sample to a push gateway.

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::Url;
use shx_reconcile::{MetricSample, MetricSink};
use tracing::debug;

use crate::exposition::render_sample;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Pushes each sample as its own gauge group.
///
/// Requests go to `POST {base}/metrics/job/{job}/chain/{chain}`. `POST`
/// only replaces metrics with the same name inside the group, so the two
/// series of a chain live side by side. The job defaults to the chain name.
/// Label values containing `/` use the gateway's `<label>@base64/<value>`
/// form, since a percent-encoded slash is decoded before the path is split.
#[derive(Clone, Debug)]
pub struct PushGatewaySink {
    base_url: Url,
    job: Option<String>,
    http: reqwest::Client,
}

impl PushGatewaySink {
    /// Fails if `base_url` is not an absolute http(s) URL.
    pub fn new(base_url: &str, job: Option<String>) -> Result<Self> {
        Self::new_with_client(base_url, job, reqwest::Client::new())
    }

    pub fn new_with_client(
        base_url: &str,
        job: Option<String>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid push gateway url: {base_url}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!("push gateway url must be http or https: {base_url}");
        }
        if base_url.cannot_be_a_base() {
            bail!("push gateway url cannot be a base: {base_url}");
        }
        Ok(Self {
            base_url,
            job,
            http,
        })
    }

    /// Job name used for `chain`.
    pub fn job_for<'a>(&'a self, chain: &'a str) -> &'a str {
        self.job.as_deref().unwrap_or(chain)
    }

    /// Grouping URL for `chain`; path segments are percent-encoded.
    pub fn push_url(&self, chain: &str) -> Result<Url> {
        if chain.is_empty() {
            bail!("empty chain cannot be used as a grouping label");
        }
        let mut segments = vec!["metrics".to_string()];
        segments.extend(grouping_pair("job", self.job_for(chain)));
        segments.extend(grouping_pair("chain", chain));

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("push gateway url cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(&segments);
        Ok(url)
    }
}

fn grouping_pair(label: &str, value: &str) -> [String; 2] {
    if value.contains('/') {
        [format!("{label}@base64"), URL_SAFE_NO_PAD.encode(value)]
    } else {
        [label.to_string(), value.to_string()]
    }
}

#[async_trait::async_trait]
impl MetricSink for PushGatewaySink {
    fn name(&self) -> &'static str {
        "pushgateway"
    }

    async fn emit(&self, sample: &MetricSample) -> Result<()> {
        let url = self.push_url(&sample.chain)?;

        let resp = self
            .http
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(render_sample(sample))
            .send()
            .await
            .with_context(|| format!("push gateway request failed: {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "push gateway http error status={} url={} body={}",
                status.as_u16(),
                url,
                body.trim()
            );
        }

        debug!("pushed {} to {}", sample, url);
        Ok(())
    }
}
