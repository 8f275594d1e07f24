//! Textfile backend: one `<chain>.prom` file per chain under a directory.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use shx_reconcile::{MetricSample, MetricSink};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::exposition::{line_metric_name, sample_line, type_line};

/// How a sample lands in its chain's file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMode {
    /// Keep one line per series: the emitted series' line is replaced and
    /// the file is swapped in atomically (temp file + rename).
    #[default]
    Replace,
    /// Append the sample line to the end of the file.
    Append,
}

impl FileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileMode::Replace => "replace",
            FileMode::Append => "append",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "replace" => Some(FileMode::Replace),
            "append" => Some(FileMode::Append),
            _ => None,
        }
    }
}

/// Create `path` (and parents) if missing.
///
/// Called once at startup; an error here is fatal for the process.
pub fn ensure_output_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        info!("output path already exists: {}", path.display());
        return Ok(());
    }
    if path.exists() {
        bail!("output path exists but is not a directory: {}", path.display());
    }

    info!("output path does not exist, creating: {}", path.display());
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder
        .create(path)
        .with_context(|| format!("failed to create output directory {}", path.display()))?;
    info!("output path created: {}", path.display());
    Ok(())
}

/// Writes samples to `<dir>/<chain>.prom`.
#[derive(Clone, Debug)]
pub struct TextfileSink {
    dir: PathBuf,
    mode: FileMode,
}

impl TextfileSink {
    pub fn new(dir: impl Into<PathBuf>, mode: FileMode) -> Self {
        Self {
            dir: dir.into(),
            mode,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// Path of the file for `chain`. Chains that cannot be a file name are
    /// rejected so one bad chain never writes outside `dir`.
    pub fn chain_path(&self, chain: &str) -> Result<PathBuf> {
        if chain.is_empty()
            || chain == "."
            || chain == ".."
            || chain.contains(['/', '\\', '\0'])
        {
            bail!("chain {chain:?} cannot be used as a file name");
        }
        Ok(self.dir.join(format!("{chain}.prom")))
    }

    async fn append(&self, path: &Path, sample: &MetricSample) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("failed to open or create file {}", path.display()))?;
        file.write_all(sample_line(sample).as_bytes())
            .await
            .with_context(|| format!("failed to write to file {}", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("failed to flush file {}", path.display()))?;
        Ok(())
    }

    async fn replace(&self, path: &Path, sample: &MetricSample) -> Result<()> {
        let existing = match tokio::fs::read_to_string(path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to read file {}", path.display())))
            }
        };

        let name = sample.series.metric_name();
        let mut body = String::with_capacity(existing.len() + 96);
        for line in existing.lines() {
            if line_metric_name(line) == Some(name) {
                continue;
            }
            body.push_str(line);
            body.push('\n');
        }
        body.push_str(&type_line(sample));
        body.push_str(&sample_line(sample));

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, body.as_bytes())
            .await
            .with_context(|| format!("failed to write temp file {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("failed to move {} into place", tmp.display()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MetricSink for TextfileSink {
    fn name(&self) -> &'static str {
        "textfile"
    }

    async fn emit(&self, sample: &MetricSample) -> Result<()> {
        let path = self.chain_path(&sample.chain)?;
        match self.mode {
            FileMode::Append => self.append(&path, sample).await?,
            FileMode::Replace => self.replace(&path, sample).await?,
        }
        debug!("wrote {} to {}", sample, path.display());
        Ok(())
    }
}
