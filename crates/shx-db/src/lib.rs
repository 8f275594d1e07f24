//! Epoch fact store over the `shares_epoch_counts` table.
//!
//! Read-only: the exporter never writes to the ops database.

use anyhow::{anyhow, bail, Context, Result};
use shx_reconcile::{
    ChainId, Epoch, EpochFactSnapshot, EpochFactSource, MaxEpochs, PositiveCounts, ShareCount,
};
use sqlx::mysql::{MySql, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Executor, Row};
use tracing::{info, warn};

mod dsn;

pub use dsn::normalize_dsn;

/// Env var with the DSN used by DB-backed tests.
pub const ENV_TEST_DB_URL: &str = "SHX_TEST_DATABASE_URL";

const POSITIVE_COUNTS_SQL: &str = r#"
    select chain,
           cast(epoch as signed) as epoch,
           cast(share_count as signed) as share_count
    from shares_epoch_counts
    where share_count > 0
"#;

const MAX_POSITIVE_EPOCH_SQL: &str = r#"
    select chain,
           cast(max(epoch) as signed) as max_epoch
    from shares_epoch_counts
    where share_count > 0
    group by chain
"#;

/// Open a pool and prove it works with a ping.
///
/// `dsn` may be a `mysql://` URL or a `user:pass@tcp(host:port)/db` DSN.
/// The DSN is never included in errors or logs.
pub async fn connect(dsn: &str, max_connections: u32) -> Result<MySqlPool> {
    let url = normalize_dsn(dsn)?;
    info!("connecting to MySQL...");

    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await
        .context("failed to connect to MySQL")?;

    ping(&pool).await?;
    info!("successfully connected to MySQL");
    Ok(pool)
}

/// Connectivity check.
pub async fn ping(pool: &MySqlPool) -> Result<()> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("failed to ping MySQL")?;
    if one != 1 {
        bail!("unexpected ping result: {one}");
    }
    Ok(())
}

/// Pool for DB-backed tests, from [`ENV_TEST_DB_URL`].
pub async fn testkit_db_pool() -> Result<MySqlPool> {
    let url = std::env::var(ENV_TEST_DB_URL)
        .with_context(|| format!("missing env var {ENV_TEST_DB_URL}"))?;
    connect(&url, 2).await
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

/// Decode one `(chain, epoch, share_count)` row.
///
/// NULLs, negative numbers and non-positive counts are malformed.
pub fn decode_count_row(
    chain: Option<String>,
    epoch: Option<i64>,
    count: Option<i64>,
) -> Result<(ChainId, Epoch, ShareCount)> {
    let chain = chain.ok_or_else(|| anyhow!("chain is NULL"))?;
    let epoch = non_negative(epoch, "epoch")?;
    let count = non_negative(count, "share_count")?;
    if count == 0 {
        bail!("share_count is 0 in a positive-count row");
    }
    Ok((chain, epoch, count))
}

/// Decode one `(chain, max_epoch)` row.
pub fn decode_max_row(chain: Option<String>, max_epoch: Option<i64>) -> Result<(ChainId, Epoch)> {
    let chain = chain.ok_or_else(|| anyhow!("chain is NULL"))?;
    let epoch = non_negative(max_epoch, "max_epoch")?;
    Ok((chain, epoch))
}

fn non_negative(v: Option<i64>, field: &str) -> Result<u64> {
    let v = v.ok_or_else(|| anyhow!("{field} is NULL"))?;
    u64::try_from(v).map_err(|_| anyhow!("{field} is negative: {v}"))
}

fn count_row(row: &MySqlRow) -> Result<(ChainId, Epoch, ShareCount)> {
    decode_count_row(
        row.try_get("chain")?,
        row.try_get("epoch")?,
        row.try_get("share_count")?,
    )
}

fn max_row(row: &MySqlRow) -> Result<(ChainId, Epoch)> {
    decode_max_row(row.try_get("chain")?, row.try_get("max_epoch")?)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Every positive (chain, epoch, share_count) fact, grouped by chain.
///
/// Malformed rows are logged and skipped; the rest of the read proceeds.
pub async fn fetch_positive_counts<'e, E>(ex: E) -> Result<PositiveCounts>
where
    E: Executor<'e, Database = MySql>,
{
    let rows = sqlx::query(POSITIVE_COUNTS_SQL)
        .fetch_all(ex)
        .await
        .context("failed to query share counts")?;

    let mut out = PositiveCounts::new();
    for (i, row) in rows.iter().enumerate() {
        match count_row(row) {
            Ok((chain, epoch, count)) => {
                out.entry(chain).or_default().insert(epoch, count);
            }
            Err(err) => warn!(row = i, "skipping malformed share count row: {err:#}"),
        }
    }
    Ok(out)
}

/// Highest positive epoch per chain.
pub async fn fetch_max_positive_epoch<'e, E>(ex: E) -> Result<MaxEpochs>
where
    E: Executor<'e, Database = MySql>,
{
    let rows = sqlx::query(MAX_POSITIVE_EPOCH_SQL)
        .fetch_all(ex)
        .await
        .context("failed to query max share epochs")?;

    let mut out = MaxEpochs::new();
    for (i, row) in rows.iter().enumerate() {
        match max_row(row) {
            Ok((chain, epoch)) => {
                out.insert(chain, epoch);
            }
            Err(err) => warn!(row = i, "skipping malformed max epoch row: {err:#}"),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// EpochFactSource
// ---------------------------------------------------------------------------

/// [`EpochFactSource`] backed by a MySQL pool.
#[derive(Clone, Debug)]
pub struct DbEpochFactSource {
    pool: MySqlPool,
}

impl DbEpochFactSource {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl EpochFactSource for DbEpochFactSource {
    async fn positive_counts(&self) -> Result<PositiveCounts> {
        fetch_positive_counts(&self.pool).await
    }

    async fn max_positive_epoch(&self) -> Result<MaxEpochs> {
        fetch_max_positive_epoch(&self.pool).await
    }

    /// Both views inside one transaction so they observe the same data.
    async fn snapshot(&self) -> Result<EpochFactSnapshot> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin snapshot transaction")?;

        let positive_counts = fetch_positive_counts(&mut *tx).await?;
        let max_epochs = fetch_max_positive_epoch(&mut *tx).await?;

        tx.commit()
            .await
            .context("failed to close snapshot transaction")?;

        Ok(EpochFactSnapshot {
            positive_counts,
            max_epochs,
        })
    }
}
