//! Persistence layer for the copy network
//!
//! SQLite storage for network snapshots and the latest per-trader summaries.

pub mod repository;
pub mod schema;

pub use sqlx::sqlite::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Applied on every open; API reads run alongside the refresh task's writes
const PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode=WAL",
    "PRAGMA synchronous=NORMAL",
    "PRAGMA busy_timeout=5000",
];

/// Handle to the snapshot store
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the store at `path`
    pub async fn new(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| DbError::Connection(format!("{}: {e}", dir.display())))?;
        }

        Self::open(&format!("sqlite:{}?mode=rwc", path.display()), 5).await
    }

    /// Throwaway store for tests. One connection, since every connection to
    /// `sqlite::memory:` is its own database.
    pub async fn in_memory() -> DbResult<Self> {
        Self::open("sqlite::memory:", 1).await
    }

    async fn open(url: &str, max_connections: u32) -> DbResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| DbError::Connection(format!("{url}: {e}")))?;

        let db = Self { pool };
        db.migrate().await?;
        for pragma in PRAGMAS {
            sqlx::query(pragma)
                .execute(&db.pool)
                .await
                .map_err(|e| DbError::Connection(format!("{pragma}: {e}")))?;
        }
        Ok(db)
    }

    async fn migrate(&self) -> DbResult<()> {
        for sql in schema_statements(schema::CREATE_TABLES) {
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| DbError::Migration(format!("{e}: {sql}")))?;
        }

        // Column additions are not idempotent in SQLite; an existing column is fine
        for migration in schema::MIGRATIONS {
            if let Err(e) = sqlx::query(migration).execute(&self.pool).await {
                if !e.to_string().contains("duplicate column name") {
                    return Err(DbError::Migration(format!("{e}: {migration}")));
                }
            }
        }

        tracing::debug!(migrations = schema::MIGRATIONS.len(), "Schema up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Owned pool handle for spawned refresh tasks
    pub fn pool_clone(&self) -> SqlitePool {
        self.pool.clone()
    }
}

/// Split a schema script into executable statements, dropping `--` comment lines
fn schema_statements(script: &str) -> Vec<String> {
    script
        .split(';')
        .map(|stmt| {
            stmt.lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|stmt| !stmt.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_skip_comments() {
        let script = "-- header\nCREATE TABLE a (x INTEGER);\n\n-- only a comment\n;CREATE INDEX i ON a(x)";
        let statements = schema_statements(script);
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (x INTEGER)", "CREATE INDEX i ON a(x)"]
        );
    }

    #[tokio::test]
    async fn test_migrations_rerun_cleanly() {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('network_snapshots', 'tracked_traders')",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(count, 2);
    }
}
