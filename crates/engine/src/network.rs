//! Network refresh - ranking → positions → tracked traders → connections → graph
//!
//! One call to [`refresh_network`] is one cycle. The server runs it on a timer and on
//! demand; the CLI runs it once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use persistence::repository::network::{
    NetworkRepository, NetworkSnapshotRecord, TrackedTraderRecord,
};
use persistence::{DbResult, SqlitePool};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::aggregator::{aggregate_traders, has_any_positions};
use crate::api::polymarket::{ranked_traders, PolymarketDataClient};
use crate::cache::NetworkCache;
use crate::config::NetworkConfig;
use crate::error::{EngineError, EngineResult};
use crate::fetcher::{fetch_positions_with_report, FetchOptions, FetchReport, PositionSource};
use crate::graph::build_graph;
use crate::similarity::compute_connections;
use crate::types::{Position, RankedTrader, TrackedTrader, TraderConnection, TraderGraph};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Anything that can return the ranked trader cohort
#[async_trait]
pub trait RankingSource: Send + Sync {
    async fn fetch_ranking(&self, limit: u32) -> anyhow::Result<Vec<RankedTrader>>;
}

#[async_trait]
impl RankingSource for PolymarketDataClient {
    async fn fetch_ranking(&self, limit: u32) -> anyhow::Result<Vec<RankedTrader>> {
        let entries = self.get_leaderboard(limit).await?;
        Ok(ranked_traders(&entries))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkStats {
    pub trader_count: usize,
    pub traders_with_positions: usize,
    pub connection_count: usize,
    pub link_count: usize,
    pub avg_similarity: f64,
    pub max_similarity: f64,
}

/// Result of one completed refresh cycle
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSnapshot {
    pub cycle_at: DateTime<Utc>,
    pub min_similarity: f64,
    pub link_cap: usize,
    pub traders: Vec<TrackedTrader>,
    pub connections: Vec<TraderConnection>,
    pub graph: TraderGraph,
    pub stats: NetworkStats,
    pub fetch: FetchReport,
}

impl NetworkSnapshot {
    /// Build the graph and stats for already-scored traders
    pub fn assemble(
        cycle_at: DateTime<Utc>,
        traders: Vec<TrackedTrader>,
        connections: Vec<TraderConnection>,
        config: &NetworkConfig,
    ) -> Self {
        let graph = build_graph(&traders, &connections, config.link_cap);

        let connection_count = connections.len();
        let avg_similarity = if connection_count > 0 {
            connections.iter().map(|c| c.similarity).sum::<f64>() / connection_count as f64
        } else {
            0.0
        };
        let stats = NetworkStats {
            trader_count: traders.len(),
            traders_with_positions: traders.iter().filter(|t| t.has_positions()).count(),
            connection_count,
            link_count: graph.links.len(),
            avg_similarity,
            max_similarity: connections.first().map(|c| c.similarity).unwrap_or(0.0),
        };

        Self {
            cycle_at,
            min_similarity: config.min_similarity,
            link_cap: config.link_cap,
            traders,
            connections,
            graph,
            stats,
            fetch: FetchReport::default(),
        }
    }

    /// Graph re-capped to `link_cap` links from this cycle's connections
    pub fn graph_with_cap(&self, link_cap: usize) -> TraderGraph {
        build_graph(&self.traders, &self.connections, link_cap)
    }

    /// Connection count per wallet
    pub fn connection_counts(&self) -> HashMap<&str, usize> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for c in &self.connections {
            *counts.entry(c.trader1.as_str()).or_default() += 1;
            *counts.entry(c.trader2.as_str()).or_default() += 1;
        }
        counts
    }

    /// Content hash over every persisted figure except timestamps. Identical data in
    /// two cycles gives the same fingerprint regardless of cycle time.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for t in &self.traders {
            hasher.update(t.wallet_id().as_bytes());
            hasher.update(b"|");
            hasher.update(t.display_name().unwrap_or_default().as_bytes());
            hasher.update(t.rank().unwrap_or(0).to_le_bytes());
            hasher.update([t.verified() as u8]);
            for figure in [t.volume(), t.pnl(), t.total_value()] {
                hasher.update(figure.to_bits().to_le_bytes());
            }

            let mut positions: Vec<&Position> = t.positions().iter().collect();
            positions.sort_by(|a, b| {
                a.market_id
                    .cmp(&b.market_id)
                    .then((a.outcome as u8).cmp(&(b.outcome as u8)))
            });
            for p in positions {
                hasher.update(b"|");
                hasher.update(p.market_id.as_bytes());
                hasher.update([p.outcome as u8]);
                for figure in [
                    Some(p.shares),
                    Some(p.avg_price),
                    p.current_price,
                    p.pnl,
                    p.pnl_percentage,
                ] {
                    hasher.update(figure.map_or(u64::MAX, f64::to_bits).to_le_bytes());
                }
            }
            hasher.update(b";");
        }
        for c in &self.connections {
            hasher.update(c.trader1.as_bytes());
            hasher.update(c.trader2.as_bytes());
            hasher.update(c.similarity.to_bits().to_le_bytes());
        }
        hasher.update(self.link_cap.to_le_bytes());
        hasher.update(self.min_similarity.to_bits().to_le_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Progress tracking for the refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NetworkStatus {
    Idle,
    FetchingLeaderboard,
    FetchingPositions,
    Scoring,
    Complete,
    Error,
}

pub struct NetworkProgress {
    status: RwLock<NetworkStatus>,
    pub total_traders: AtomicU32,
    pub cycles_completed: AtomicU32,
    started_at: RwLock<Option<DateTime<Utc>>>,
    error_message: RwLock<Option<String>>,
}

impl NetworkProgress {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(NetworkStatus::Idle),
            total_traders: AtomicU32::new(0),
            cycles_completed: AtomicU32::new(0),
            started_at: RwLock::new(None),
            error_message: RwLock::new(None),
        }
    }

    pub fn status(&self) -> NetworkStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: NetworkStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.started_at.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn error_message(&self) -> Option<String> {
        self.error_message
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.status(),
            NetworkStatus::FetchingLeaderboard
                | NetworkStatus::FetchingPositions
                | NetworkStatus::Scoring
        )
    }

    /// Claim the progress slot for a new cycle. Returns false if one is running.
    pub fn try_begin(&self) -> bool {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(
            *status,
            NetworkStatus::FetchingLeaderboard
                | NetworkStatus::FetchingPositions
                | NetworkStatus::Scoring
        ) {
            return false;
        }
        *status = NetworkStatus::FetchingLeaderboard;
        self.total_traders.store(0, Ordering::Relaxed);
        *self.started_at.write().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        *self.error_message.write().unwrap_or_else(PoisonError::into_inner) = None;
        true
    }

    fn fail(&self, message: String) {
        *self.error_message.write().unwrap_or_else(PoisonError::into_inner) = Some(message);
        self.set_status(NetworkStatus::Error);
    }
}

impl Default for NetworkProgress {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

async fn build_network_inner<S: PositionSource + ?Sized>(
    source: &S,
    ranked: &[RankedTrader],
    config: &NetworkConfig,
    progress: Option<&NetworkProgress>,
) -> EngineResult<NetworkSnapshot> {
    config.validate()?;
    let cycle_at = Utc::now();

    if let Some(p) = progress {
        p.set_status(NetworkStatus::FetchingPositions);
    }
    let wallets: Vec<String> = ranked.iter().map(|r| r.wallet_id.clone()).collect();
    let (positions, report) =
        fetch_positions_with_report(source, &wallets, &FetchOptions::from(config)).await;

    if let Some(p) = progress {
        p.set_status(NetworkStatus::Scoring);
    }
    let traders = aggregate_traders(ranked, &positions);
    if !has_any_positions(&traders) {
        warn!(traders = traders.len(), "No tracked trader has open positions this cycle");
    }
    let connections = compute_connections(&traders, config.min_similarity);

    let mut snapshot = NetworkSnapshot::assemble(cycle_at, traders, connections, config);
    snapshot.fetch = report;

    info!(
        traders = snapshot.stats.trader_count,
        with_positions = snapshot.stats.traders_with_positions,
        connections = snapshot.stats.connection_count,
        links = snapshot.stats.link_count,
        max_similarity = snapshot.stats.max_similarity,
        "Network built"
    );
    Ok(snapshot)
}

/// Fetch positions for a ranking and build the full network
pub async fn build_network<S: PositionSource + ?Sized>(
    source: &S,
    ranked: &[RankedTrader],
    config: &NetworkConfig,
) -> EngineResult<NetworkSnapshot> {
    build_network_inner(source, ranked, config, None).await
}

/// Run one refresh cycle: ranking, positions, scoring, cache, optional persistence.
///
/// Failures are reported through `progress`; the previous cache entry is kept when a
/// cycle fails.
pub async fn refresh_network<C>(
    client: &C,
    progress: &NetworkProgress,
    config: &NetworkConfig,
    cache: &NetworkCache,
    db_pool: Option<SqlitePool>,
) -> Option<Arc<NetworkSnapshot>>
where
    C: RankingSource + PositionSource,
{
    info!(limit = config.leaderboard_limit, "Starting network refresh");
    progress.set_status(NetworkStatus::FetchingLeaderboard);

    if let Err(e) = config.validate() {
        error!("{}", e);
        progress.fail(e.to_string());
        return None;
    }

    let ranked = match client.fetch_ranking(config.leaderboard_limit).await {
        Ok(r) => r,
        Err(err) => {
            let err = EngineError::Leaderboard(err.to_string());
            error!("{}", err);
            progress.fail(err.to_string());
            return None;
        }
    };
    progress
        .total_traders
        .store(ranked.len() as u32, Ordering::Relaxed);
    info!(count = ranked.len(), "Leaderboard fetched, fetching positions");

    let snapshot = match build_network_inner(client, &ranked, config, Some(progress)).await {
        Ok(s) => s,
        Err(e) => {
            error!("Network build failed: {}", e);
            progress.fail(e.to_string());
            return None;
        }
    };

    if let Some(pool) = db_pool {
        match persist_snapshot(&pool, &snapshot).await {
            Ok(true) => info!("Snapshot persisted"),
            Ok(false) => info!("Snapshot unchanged since last cycle, not persisted"),
            Err(e) => warn!(error = %e, "Failed to persist snapshot"),
        }
    }

    let snapshot = cache.store(snapshot).await;
    progress.cycles_completed.fetch_add(1, Ordering::Relaxed);
    progress.set_status(NetworkStatus::Complete);
    info!(cycle_at = %snapshot.cycle_at, "Network refresh complete");
    Some(snapshot)
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

pub fn snapshot_to_record(snapshot: &NetworkSnapshot) -> serde_json::Result<NetworkSnapshotRecord> {
    Ok(NetworkSnapshotRecord {
        id: None,
        fingerprint: snapshot.fingerprint(),
        cycle_at: snapshot.cycle_at.timestamp(),
        trader_count: snapshot.stats.trader_count as i64,
        traders_with_positions: snapshot.stats.traders_with_positions as i64,
        connection_count: snapshot.stats.connection_count as i64,
        link_count: snapshot.stats.link_count as i64,
        min_similarity: snapshot.min_similarity,
        link_cap: snapshot.link_cap as i64,
        snapshot_json: serde_json::to_string(snapshot)?,
        created_at: None,
    })
}

pub fn trader_to_record(trader: &TrackedTrader, connection_count: usize) -> TrackedTraderRecord {
    TrackedTraderRecord {
        wallet_id: trader.wallet_id().to_string(),
        display_name: trader.display_name().map(String::from),
        rank: trader.rank().map(i64::from),
        volume: trader.volume(),
        pnl: trader.pnl(),
        total_value: trader.total_value(),
        position_count: trader.position_count() as i64,
        connection_count: connection_count as i64,
        last_activity: trader.last_activity().map(|t| t.timestamp()),
        verified: trader.verified(),
        updated_at: None,
    }
}

/// Save the snapshot (skipped when unchanged) and upsert every trader summary.
/// Returns whether a new snapshot row was written.
pub async fn persist_snapshot(pool: &SqlitePool, snapshot: &NetworkSnapshot) -> DbResult<bool> {
    let repo = NetworkRepository::new(pool);

    let record = snapshot_to_record(snapshot)?;
    let inserted = repo.save_snapshot(&record).await?;

    let counts = snapshot.connection_counts();
    for trader in &snapshot.traders {
        let n = counts.get(trader.wallet_id()).copied().unwrap_or(0);
        if let Err(e) = repo.save_trader(&trader_to_record(trader, n)).await {
            warn!(wallet = trader.wallet_id(), error = %e, "Failed to save trader");
        }
    }

    Ok(inserted)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
