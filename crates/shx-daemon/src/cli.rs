//! Command-line surface of the daemon.

use std::path::PathBuf;

use clap::Parser;
use shx_config::CliOverrides;
use shx_metrics::FileMode;
use shx_reconcile::ColdStartPolicy;

#[derive(Parser, Debug)]
#[command(
    name = "shx-daemon",
    version,
    about = "Republishes per-chain epoch share counts as Prometheus metrics"
)]
pub struct Cli {
    /// Layered config YAML files, applied in order.
    #[arg(long = "config")]
    pub config_paths: Vec<PathBuf>,

    /// Ops database DSN. Overrides the env var named by source.dsn_env.
    #[arg(long = "ops-dsn", alias = "opsDsn")]
    pub ops_dsn: Option<String>,

    /// Directory for per-chain .prom files.
    #[arg(long = "output-path", alias = "outputPath")]
    pub output_path: Option<PathBuf>,

    /// Push gateway base URL.
    #[arg(long = "push-url", alias = "pushURL")]
    pub push_url: Option<String>,

    /// Push job name (defaults to the chain name).
    #[arg(long = "push-job")]
    pub push_job: Option<String>,

    /// replace | append
    #[arg(long = "file-mode", value_parser = parse_file_mode)]
    pub file_mode: Option<FileMode>,

    /// Poll interval in minutes.
    #[arg(long = "interval")]
    pub interval: Option<u64>,

    /// skip_history | replay_all
    #[arg(long = "cold-start", value_parser = parse_cold_start)]
    pub cold_start: Option<ColdStartPolicy>,

    #[arg(long = "chain-concurrency")]
    pub chain_concurrency: Option<usize>,

    /// Bind address for the status API, e.g. 127.0.0.1:9464
    #[arg(long = "status-addr")]
    pub status_addr: Option<String>,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            output_path: self.output_path.clone(),
            push_url: self.push_url.clone(),
            push_job: self.push_job.clone(),
            file_mode: self.file_mode,
            interval_minutes: self.interval,
            cold_start: self.cold_start,
            chain_concurrency: self.chain_concurrency,
            status_addr: self.status_addr.clone(),
        }
    }
}

fn parse_file_mode(s: &str) -> Result<FileMode, String> {
    FileMode::parse(s).ok_or_else(|| format!("unknown file mode {s:?} (expected replace|append)"))
}

fn parse_cold_start(s: &str) -> Result<ColdStartPolicy, String> {
    ColdStartPolicy::parse(s).ok_or_else(|| {
        format!("unknown cold start policy {s:?} (expected skip_history|replay_all)")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_output_flags_into_overrides() {
        let cli = Cli::try_parse_from([
            "shx-daemon",
            "--ops-dsn",
            "mysql://u:p@localhost/ops",
            "--output-path",
            "/var/lib/node_exporter",
            "--file-mode",
            "append",
            "--interval",
            "2",
            "--cold-start",
            "replay-all",
        ])
        .unwrap();

        assert_eq!(cli.ops_dsn.as_deref(), Some("mysql://u:p@localhost/ops"));
        let o = cli.overrides();
        assert_eq!(o.output_path, Some(PathBuf::from("/var/lib/node_exporter")));
        assert_eq!(o.file_mode, Some(FileMode::Append));
        assert_eq!(o.interval_minutes, Some(2));
        assert_eq!(o.cold_start, Some(ColdStartPolicy::ReplayAll));
        assert!(o.push_url.is_none());
    }

    #[test]
    fn accepts_legacy_flag_spellings() {
        let cli = Cli::try_parse_from([
            "shx-daemon",
            "--opsDsn",
            "x",
            "--pushURL",
            "http://gw:9091",
        ])
        .unwrap();
        assert_eq!(cli.ops_dsn.as_deref(), Some("x"));
        assert_eq!(cli.push_url.as_deref(), Some("http://gw:9091"));
    }

    #[test]
    fn rejects_unknown_file_mode() {
        let err = Cli::try_parse_from(["shx-daemon", "--file-mode", "truncate"]).unwrap_err();
        assert!(err.to_string().contains("truncate"));
    }
}
