//! Database schema definitions

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- One row per distinct network refresh result
CREATE TABLE IF NOT EXISTS network_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL,
    cycle_at INTEGER NOT NULL,
    trader_count INTEGER NOT NULL DEFAULT 0,
    traders_with_positions INTEGER NOT NULL DEFAULT 0,
    connection_count INTEGER NOT NULL DEFAULT 0,
    link_count INTEGER NOT NULL DEFAULT 0,
    min_similarity REAL NOT NULL,
    link_cap INTEGER NOT NULL,
    snapshot_json TEXT NOT NULL,
    created_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- Latest summary per tracked wallet
CREATE TABLE IF NOT EXISTS tracked_traders (
    wallet_id TEXT PRIMARY KEY,
    display_name TEXT,
    rank INTEGER,
    volume REAL NOT NULL DEFAULT 0,
    pnl REAL NOT NULL DEFAULT 0,
    total_value REAL NOT NULL DEFAULT 0,
    position_count INTEGER NOT NULL DEFAULT 0,
    connection_count INTEGER NOT NULL DEFAULT 0,
    last_activity INTEGER,
    updated_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_snapshots_cycle ON network_snapshots(cycle_at DESC);
CREATE INDEX IF NOT EXISTS idx_snapshots_fingerprint ON network_snapshots(fingerprint);
CREATE INDEX IF NOT EXISTS idx_traders_rank ON tracked_traders(rank)
"#;

/// Additive column migrations, applied after CREATE_TABLES
pub const MIGRATIONS: &[&str] = &["ALTER TABLE tracked_traders ADD COLUMN verified INTEGER NOT NULL DEFAULT 0"];
