//! Copy Network Engine - who trades like whom among top Polymarket traders
//!
//! Provides:
//! - Position normalization for loosely-typed Data API records
//! - Batched, timeout-bounded concurrent position fetching
//! - Trader aggregation with derived exposure figures
//! - Pairwise Jaccard similarity over held markets
//! - A capped node/link graph ready for visualization
//! - A refresh orchestrator with progress tracking, cache and snapshot persistence

pub mod aggregator;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod graph;
pub mod network;
pub mod position;
pub mod similarity;
pub mod types;

// Re-exports for convenience
pub use aggregator::{aggregate_traders, has_any_positions};
pub use api::PolymarketDataClient;
pub use cache::NetworkCache;
pub use config::NetworkConfig;
pub use error::{EngineError, EngineResult};
pub use fetcher::{
    fetch_positions_for_wallets, fetch_positions_with_report, FetchOptions, FetchReport,
    PositionSource,
};
pub use graph::{build_graph, truncate_wallet};
pub use network::{
    build_network, persist_snapshot, refresh_network, NetworkProgress, NetworkSnapshot,
    NetworkStats, NetworkStatus, RankingSource,
};
pub use position::{normalize_position, normalize_positions};
pub use similarity::{compute_connections, connections_for, jaccard_similarity};
pub use types::*;
