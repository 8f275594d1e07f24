//! Runtime secret resolution.
//!
//! # Contract
//! - The config document stores only the env var NAME of the DSN
//!   (`source.dsn_env`, default [`DEFAULT_DSN_ENV`]).
//! - The DSN value comes from the command line or that env var, resolved
//!   once at startup.
//! - `Debug` redacts the value; error messages name the variable, never
//!   the value.

use anyhow::{bail, Result};

/// Env var consulted when the config does not name another one.
pub const DEFAULT_DSN_ENV: &str = "SHX_OPS_DSN";

/// Secrets resolved for one process. **Values are redacted in `Debug`.**
#[derive(Clone)]
pub struct ResolvedSecrets {
    pub ops_dsn: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("ops_dsn", &"<REDACTED>")
            .finish()
    }
}

/// Resolve the data-source DSN.
///
/// `cli_dsn` wins when non-blank; otherwise the env var `dsn_env` is read.
///
/// # Errors
/// `SECRETS_MISSING` naming `dsn_env` when neither source yields a value.
pub fn resolve_secrets(cli_dsn: Option<&str>, dsn_env: &str) -> Result<ResolvedSecrets> {
    if let Some(dsn) = cli_dsn.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(ResolvedSecrets {
            ops_dsn: dsn.to_string(),
        });
    }
    match std::env::var(dsn_env) {
        Ok(v) if !v.trim().is_empty() => Ok(ResolvedSecrets {
            ops_dsn: v.trim().to_string(),
        }),
        _ => bail!(
            "SECRETS_MISSING: data-source DSN is required; pass --ops-dsn or set env var '{}'",
            dsn_env
        ),
    }
}
