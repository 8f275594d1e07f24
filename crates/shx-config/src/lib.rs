//! Exporter configuration.
//!
//! Layering, lowest precedence first:
//! 1. built-in defaults ([`ExporterConfig::default`])
//! 2. YAML documents, deep-merged in the order given
//! 3. command-line overrides ([`CliOverrides`])
//!
//! The merged document is deserialized into a typed [`ExporterConfig`],
//! validated, and hashed. Secrets (the data-source DSN) never live in the
//! config document; see [`secrets`].

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use shx_metrics::FileMode;
use shx_reconcile::ColdStartPolicy;

pub mod secrets;

pub use secrets::{resolve_secrets, ResolvedSecrets, DEFAULT_DSN_ENV};

/// Leaf string values starting with one of these abort loading with
/// CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // Stripe / OpenAI style
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
];

// ---------------------------------------------------------------------------
// Typed config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExporterConfig {
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub poll: PollConfig,
    pub cold_start: ColdStartPolicy,
    pub reconcile: ReconcileConfig,
    pub status: StatusConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            output: OutputConfig::default(),
            poll: PollConfig::default(),
            cold_start: ColdStartPolicy::SkipHistory,
            reconcile: ReconcileConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// NAME of the env var holding the DSN. Never the DSN itself.
    pub dsn_env: String,
    pub max_connections: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dsn_env: DEFAULT_DSN_ENV.to_string(),
            max_connections: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub textfile_dir: Option<PathBuf>,
    pub pushgateway_url: Option<String>,
    /// Push job name; `None` uses the chain name.
    pub push_job: Option<String>,
    pub file_mode: FileMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    pub interval_minutes: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    pub chain_concurrency: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            chain_concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatusConfig {
    /// Bind address of the status API; `None` disables it.
    pub listen_addr: Option<String>,
}

/// The resolved metric destination. Exactly one is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Textfile { dir: PathBuf, mode: FileMode },
    PushGateway { url: String, job: Option<String> },
}

impl ExporterConfig {
    /// Check cross-field rules and resolve the output target.
    pub fn validate(&self) -> Result<OutputTarget> {
        if self.poll.interval_minutes == 0 {
            bail!("CONFIG_INVALID: poll.interval_minutes must be >= 1");
        }
        if self.reconcile.chain_concurrency == 0 {
            bail!("CONFIG_INVALID: reconcile.chain_concurrency must be >= 1");
        }
        if self.source.max_connections == 0 {
            bail!("CONFIG_INVALID: source.max_connections must be >= 1");
        }
        if self.source.dsn_env.trim().is_empty() {
            bail!("CONFIG_INVALID: source.dsn_env must name an environment variable");
        }
        if let Some(addr) = &self.status.listen_addr {
            addr.parse::<SocketAddr>()
                .with_context(|| format!("CONFIG_INVALID: status.listen_addr {addr:?}"))?;
        }
        self.output_target()
    }

    fn output_target(&self) -> Result<OutputTarget> {
        let dir = self
            .output
            .textfile_dir
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty());
        let url = self
            .output
            .pushgateway_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (dir, url) {
            (Some(dir), None) => Ok(OutputTarget::Textfile {
                dir: dir.clone(),
                mode: self.output.file_mode,
            }),
            (None, Some(url)) => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    bail!("CONFIG_INVALID: output.pushgateway_url must be http(s): {url}");
                }
                Ok(OutputTarget::PushGateway {
                    url: url.to_string(),
                    job: self.output.push_job.clone().filter(|j| !j.is_empty()),
                })
            }
            (Some(_), Some(_)) => bail!(
                "CONFIG_INVALID: output.textfile_dir and output.pushgateway_url are mutually exclusive"
            ),
            (None, None) => bail!(
                "CONFIG_MISSING: an output target is required (--output-path or --push-url)"
            ),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_minutes.saturating_mul(60))
    }

    pub fn status_addr(&self) -> Option<SocketAddr> {
        self.status
            .listen_addr
            .as_deref()
            .and_then(|a| a.parse().ok())
    }
}

// ---------------------------------------------------------------------------
// CLI overrides
// ---------------------------------------------------------------------------

/// Values given on the command line. `None` leaves lower layers in place.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output_path: Option<PathBuf>,
    pub push_url: Option<String>,
    pub push_job: Option<String>,
    pub file_mode: Option<FileMode>,
    pub interval_minutes: Option<u64>,
    pub cold_start: Option<ColdStartPolicy>,
    pub chain_concurrency: Option<usize>,
    pub status_addr: Option<String>,
}

impl CliOverrides {
    /// Render as a config layer containing only the keys that were set.
    ///
    /// Picking one output target on the command line clears the other one
    /// from lower layers.
    pub fn to_layer(&self) -> Value {
        let mut root = serde_json::Map::new();
        let mut output = serde_json::Map::new();

        if let Some(p) = &self.output_path {
            output.insert("textfile_dir".into(), Value::String(p.display().to_string()));
            if self.push_url.is_none() {
                output.insert("pushgateway_url".into(), Value::Null);
            }
        }
        if let Some(u) = &self.push_url {
            output.insert("pushgateway_url".into(), Value::String(u.clone()));
            if self.output_path.is_none() {
                output.insert("textfile_dir".into(), Value::Null);
            }
        }
        if let Some(j) = &self.push_job {
            output.insert("push_job".into(), Value::String(j.clone()));
        }
        if let Some(m) = self.file_mode {
            output.insert("file_mode".into(), Value::String(m.as_str().into()));
        }
        if !output.is_empty() {
            root.insert("output".into(), Value::Object(output));
        }

        if let Some(n) = self.interval_minutes {
            root.insert("poll".into(), serde_json::json!({ "interval_minutes": n }));
        }
        if let Some(p) = self.cold_start {
            root.insert("cold_start".into(), Value::String(p.as_str().into()));
        }
        if let Some(n) = self.chain_concurrency {
            root.insert("reconcile".into(), serde_json::json!({ "chain_concurrency": n }));
        }
        if let Some(a) = &self.status_addr {
            root.insert("status".into(), serde_json::json!({ "listen_addr": a }));
        }

        Value::Object(root)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ExporterConfig,
    pub output: OutputTarget,
    /// SHA-256 hex of `canonical_json`.
    pub config_hash: String,
    pub canonical_json: String,
}

/// Read YAML files from disk and load them with `overrides` on top.
pub fn load_layered(paths: &[PathBuf], overrides: &CliOverrides) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        docs.push(read_yaml(p)?);
    }
    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs, overrides)
}

fn read_yaml(p: &Path) -> Result<String> {
    fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {}", p.display()))
}

pub fn load_layered_yaml_from_strings(
    yaml_docs: &[&str],
    overrides: &CliOverrides,
) -> Result<LoadedConfig> {
    let mut merged =
        serde_json::to_value(ExporterConfig::default()).context("default config serialize failed")?;
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }
    merged = deep_merge(merged, overrides.to_layer());

    enforce_no_secret_literals(&merged)?;

    let config: ExporterConfig =
        serde_json::from_value(merged).context("CONFIG_INVALID: config does not match schema")?;
    let output = config.validate()?;

    // Serializing the typed struct gives a field order fixed by the type,
    // independent of key order in the YAML input.
    let canonical_json = serde_json::to_string(&config).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());

    Ok(LoadedConfig {
        config,
        output,
        config_hash,
        canonical_json,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_string_leaves(v, "", &mut leaves);
    for (ptr, s) in leaves {
        if looks_like_secret(s) {
            bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
        }
    }
    Ok(())
}

fn collect_string_leaves<'a>(v: &'a Value, prefix: &str, out: &mut Vec<(String, &'a str)>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map {
                collect_string_leaves(vv, &format!("{prefix}/{k}"), out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                collect_string_leaves(vv, &format!("{prefix}/{i}"), out);
            }
        }
        Value::String(s) => out.push((prefix.to_string(), s.as_str())),
        _ => {}
    }
}

/// Secret-looking prefixes, or a URL/DSN carrying a password
/// (`user:password@host`).
fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p)) {
        return true;
    }
    let after_scheme = t.split_once("://").map(|(_, rest)| rest).unwrap_or(t);
    match after_scheme.split_once('@') {
        Some((userinfo, _)) => userinfo
            .split_once(':')
            .map(|(_, pass)| !pass.is_empty() && !pass.contains('/'))
            .unwrap_or(false),
        None => false,
    }
}
