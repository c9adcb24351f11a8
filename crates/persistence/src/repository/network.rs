//! Network repository - snapshot history and latest per-trader summaries

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A persisted network refresh result
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NetworkSnapshotRecord {
    pub id: Option<i64>,
    pub fingerprint: String,
    pub cycle_at: i64,
    pub trader_count: i64,
    pub traders_with_positions: i64,
    pub connection_count: i64,
    pub link_count: i64,
    pub min_similarity: f64,
    pub link_cap: i64,
    pub snapshot_json: String,
    pub created_at: Option<i64>,
}

/// Snapshot metadata without the JSON body, for history listings
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SnapshotSummary {
    pub id: i64,
    pub fingerprint: String,
    pub cycle_at: i64,
    pub trader_count: i64,
    pub traders_with_positions: i64,
    pub connection_count: i64,
    pub link_count: i64,
    pub min_similarity: f64,
    pub link_cap: i64,
}

/// Latest summary for one tracked wallet
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrackedTraderRecord {
    pub wallet_id: String,
    pub display_name: Option<String>,
    pub rank: Option<i64>,
    pub volume: f64,
    pub pnl: f64,
    pub total_value: f64,
    pub position_count: i64,
    pub connection_count: i64,
    pub last_activity: Option<i64>,
    pub verified: bool,
    pub updated_at: Option<i64>,
}

/// Repository for network snapshots and tracked traders
pub struct NetworkRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NetworkRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a snapshot unless the latest stored one has the same fingerprint.
    /// Returns true when a new row was written.
    pub async fn save_snapshot(&self, record: &NetworkSnapshotRecord) -> DbResult<bool> {
        let latest: Option<(String,)> = sqlx::query_as(
            "SELECT fingerprint FROM network_snapshots ORDER BY cycle_at DESC, id DESC LIMIT 1",
        )
        .fetch_optional(self.pool)
        .await?;
        if latest.is_some_and(|(fingerprint,)| fingerprint == record.fingerprint) {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"INSERT INTO network_snapshots
                (fingerprint, cycle_at, trader_count, traders_with_positions,
                 connection_count, link_count, min_similarity, link_cap, snapshot_json)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&record.fingerprint)
        .bind(record.cycle_at)
        .bind(record.trader_count)
        .bind(record.traders_with_positions)
        .bind(record.connection_count)
        .bind(record.link_count)
        .bind(record.min_similarity)
        .bind(record.link_cap)
        .bind(&record.snapshot_json)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Most recent snapshot by cycle time
    pub async fn get_latest_snapshot(&self) -> DbResult<Option<NetworkSnapshotRecord>> {
        let record = sqlx::query_as::<_, NetworkSnapshotRecord>(
            "SELECT * FROM network_snapshots ORDER BY cycle_at DESC, id DESC LIMIT 1",
        )
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// Snapshot history, newest first
    pub async fn list_snapshots(&self, limit: i64) -> DbResult<Vec<SnapshotSummary>> {
        let records = sqlx::query_as::<_, SnapshotSummary>(
            r#"SELECT id, fingerprint, cycle_at, trader_count, traders_with_positions,
                      connection_count, link_count, min_similarity, link_cap
               FROM network_snapshots
               ORDER BY cycle_at DESC, id DESC
               LIMIT ?1"#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// Keep the newest `keep` snapshots, delete the rest. Returns (deleted, remaining).
    pub async fn prune_snapshots(&self, keep: i64) -> DbResult<(u64, i64)> {
        let result = sqlx::query(
            r#"DELETE FROM network_snapshots WHERE id NOT IN (
                 SELECT id FROM network_snapshots ORDER BY cycle_at DESC, id DESC LIMIT ?1
               )"#,
        )
        .bind(keep.max(0))
        .execute(self.pool)
        .await?;

        let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM network_snapshots")
            .fetch_one(self.pool)
            .await?;

        Ok((result.rows_affected(), remaining))
    }

    /// Insert or update a trader summary (upsert by wallet_id)
    pub async fn save_trader(&self, record: &TrackedTraderRecord) -> DbResult<()> {
        sqlx::query(
            r#"INSERT INTO tracked_traders
                (wallet_id, display_name, rank, volume, pnl, total_value, position_count,
                 connection_count, last_activity, verified, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, strftime('%s', 'now'))
               ON CONFLICT(wallet_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 rank = excluded.rank,
                 volume = excluded.volume,
                 pnl = excluded.pnl,
                 total_value = excluded.total_value,
                 position_count = excluded.position_count,
                 connection_count = excluded.connection_count,
                 last_activity = excluded.last_activity,
                 verified = excluded.verified,
                 updated_at = strftime('%s', 'now')
            "#,
        )
        .bind(&record.wallet_id)
        .bind(&record.display_name)
        .bind(record.rank)
        .bind(record.volume)
        .bind(record.pnl)
        .bind(record.total_value)
        .bind(record.position_count)
        .bind(record.connection_count)
        .bind(record.last_activity)
        .bind(record.verified)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// All tracked traders, best rank first (unranked last)
    pub async fn get_all_traders(&self) -> DbResult<Vec<TrackedTraderRecord>> {
        let records = sqlx::query_as::<_, TrackedTraderRecord>(
            r#"SELECT wallet_id, display_name, rank, volume, pnl, total_value, position_count,
                      connection_count, last_activity, verified, updated_at
               FROM tracked_traders
               ORDER BY rank IS NULL, rank ASC, pnl DESC"#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// Reclaim disk space after pruning
    pub async fn vacuum(&self) -> DbResult<()> {
        sqlx::query("VACUUM").execute(self.pool).await?;
        Ok(())
    }
}
