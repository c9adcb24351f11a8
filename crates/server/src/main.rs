//! Copy Network - similarity graph of top Polymarket traders
//!
//! Usage:
//!   copy-network serve --port 3002          - Launch web server with periodic refresh
//!   copy-network run --limit 30             - Run one refresh cycle from CLI

use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use engine::{
    connections_for, refresh_network, NetworkCache, NetworkConfig, NetworkProgress,
    NetworkSnapshot, PolymarketDataClient,
};
use persistence::repository::NetworkRepository;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

#[derive(Parser)]
#[command(name = "copy-network")]
#[command(about = "Similarity network of top prediction-market traders", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that runs a refresh cycle
#[derive(Args, Clone)]
struct NetworkArgs {
    /// Number of leaderboard traders to track
    #[arg(long, default_value_t = engine::config::DEFAULT_LEADERBOARD_LIMIT)]
    limit: u32,
    /// Minimum Jaccard similarity for a connection (0..1)
    #[arg(long, default_value_t = engine::config::DEFAULT_MIN_SIMILARITY)]
    threshold: f64,
    /// Maximum number of graph links
    #[arg(long, default_value_t = engine::config::DEFAULT_LINK_CAP)]
    link_cap: usize,
    /// Wallets fetched concurrently per batch
    #[arg(long, default_value_t = engine::config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// Per-wallet fetch timeout in seconds
    #[arg(long, default_value_t = engine::config::DEFAULT_WALLET_TIMEOUT_SECS)]
    timeout_secs: u64,
    /// Pause between fetch batches in milliseconds
    #[arg(long, default_value_t = 0)]
    batch_delay_ms: u64,
}

impl NetworkArgs {
    fn to_config(&self) -> NetworkConfig {
        NetworkConfig {
            min_similarity: self.threshold,
            link_cap: self.link_cap,
            batch_size: self.batch_size,
            wallet_timeout_secs: self.timeout_secs,
            batch_delay_ms: self.batch_delay_ms,
            leaderboard_limit: self.limit,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the web server and refresh the network periodically
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3002)]
        port: u16,
        /// Seconds between automatic refreshes (0 disables)
        #[arg(long, default_value_t = 300)]
        refresh_secs: u64,
        #[command(flatten)]
        network: NetworkArgs,
    },
    /// Run a single refresh cycle from CLI (no web server)
    Run {
        #[command(flatten)]
        network: NetworkArgs,
        /// Number of connections to print
        #[arg(long, default_value_t = 20)]
        top_n: usize,
        /// Optional JSON export path for the full snapshot
        #[arg(long)]
        export: Option<String>,
        /// Skip writing the snapshot to the database
        #[arg(long)]
        no_db: bool,
    },
    /// Cleanup DB: keep the newest N snapshots, delete the rest
    Cleanup {
        /// Number of snapshots to keep
        #[arg(long, default_value_t = 50)]
        keep: i64,
    },
}

#[derive(Clone)]
struct AppState {
    client: Arc<PolymarketDataClient>,
    db: Arc<persistence::Database>,
    progress: Arc<NetworkProgress>,
    cache: Arc<NetworkCache>,
    config: Arc<NetworkConfig>,
    refresh_every: Option<Duration>,
}

impl AppState {
    /// Cached cycle older than two refresh intervals is reported as stale
    async fn cache_is_stale(&self) -> bool {
        match self.refresh_every {
            Some(every) => self.cache.fresh(every * 2).await.is_none(),
            None => false,
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,copy_network=debug,hyper=info")
    } else {
        EnvFilter::new("info,engine=info,copy_network=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

fn db_path() -> String {
    std::env::var("COPY_NETWORK_DB_PATH").unwrap_or_else(|_| "data/network.db".to_string())
}

fn data_client() -> PolymarketDataClient {
    match std::env::var("COPY_NETWORK_DATA_API_URL") {
        Ok(url) if !url.trim().is_empty() => PolymarketDataClient::with_base_url(&url),
        _ => PolymarketDataClient::new(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve {
            host,
            port,
            refresh_secs,
            network,
        } => {
            cmd_serve(&host, port, refresh_secs, network.to_config()).await?;
        }
        Commands::Run {
            network,
            top_n,
            export,
            no_db,
        } => {
            cmd_run(network.to_config(), top_n, export, no_db).await?;
        }
        Commands::Cleanup { keep } => {
            cmd_cleanup(keep).await?;
        }
    }

    Ok(())
}

// ============================================================================
// Serve command - Axum web server
// ============================================================================

async fn cmd_serve(
    host: &str,
    port: u16,
    refresh_secs: u64,
    config: NetworkConfig,
) -> anyhow::Result<()> {
    info!("Copy-Network v{} starting...", APP_VERSION);
    config.validate()?;

    let db_path = db_path();
    let db = persistence::Database::new(&db_path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;
    info!("Database initialized: {}", db_path);

    let state = AppState {
        client: Arc::new(data_client()),
        db: Arc::new(db),
        progress: Arc::new(NetworkProgress::new()),
        cache: Arc::new(NetworkCache::new()),
        config: Arc::new(config),
        refresh_every: (refresh_secs > 0).then(|| Duration::from_secs(refresh_secs)),
    };

    if refresh_secs > 0 {
        tokio::spawn(refresh_loop(state.clone(), Duration::from_secs(refresh_secs)));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Determine static files directory
    let exe_path = std::env::current_exe().unwrap_or_default();
    let exe_dir = exe_path.parent().unwrap_or(std::path::Path::new("."));
    let dist_dir = exe_dir.join("dist");
    let static_dir = if dist_dir.exists() {
        dist_dir
    } else {
        std::path::PathBuf::from("dist")
    };

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/network", get(api_network_graph))
        .route("/network/refresh", post(api_refresh))
        .route("/network/status", get(api_status))
        .route("/network/traders", get(api_traders))
        .route("/network/connections", get(api_connections))
        .route("/network/history", get(api_history))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(&static_dir))
        .layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== Copy-Network v{} ===", APP_VERSION);
    println!("Trader Similarity Server");
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /api/health              - Health check");
    println!("  GET  /api/network             - Graph (nodes + strongest links)");
    println!("  POST /api/network/refresh     - Start a refresh cycle");
    println!("  GET  /api/network/status      - Poll refresh progress");
    println!("  GET  /api/network/traders     - Tracked traders with positions");
    println!("  GET  /api/network/connections - Scored trader pairs");
    println!("  GET  /api/network/history     - Persisted snapshot history");
    println!("\n  Database: {}", db_path);
    if refresh_secs > 0 {
        println!("  Auto-refresh: every {}s", refresh_secs);
    }
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodic refresh; a tick is skipped when a cycle is still running
async fn refresh_loop(state: AppState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        if !state.progress.try_begin() {
            warn!("Previous refresh still running, skipping tick");
            continue;
        }
        refresh_network(
            state.client.as_ref(),
            &state.progress,
            &state.config,
            &state.cache,
            Some(state.db.pool_clone()),
        )
        .await;
    }
}

// ============================================================================
// Run command - CLI mode (no web server)
// ============================================================================

async fn cmd_run(
    config: NetworkConfig,
    top_n: usize,
    export: Option<String>,
    no_db: bool,
) -> anyhow::Result<()> {
    println!("\n=== Copy-Network v{} ===", APP_VERSION);
    config.validate()?;

    let db = if no_db {
        None
    } else {
        let db_path = db_path();
        let db = persistence::Database::new(&db_path)
            .await
            .map_err(|e| anyhow::anyhow!("Database initialization failed: {}", e))?;
        println!("Database: {}", db_path);
        Some(db)
    };
    println!(
        "Traders: {} | Threshold: {:.2} | Link cap: {} | Batch: {} | Timeout: {}s",
        config.leaderboard_limit,
        config.min_similarity,
        config.link_cap,
        config.batch_size,
        config.wallet_timeout_secs
    );
    println!();

    let client = data_client();
    let progress = NetworkProgress::new();
    let cache = NetworkCache::new();
    progress.try_begin();

    let snapshot = refresh_network(
        &client,
        &progress,
        &config,
        &cache,
        db.as_ref().map(|d| d.pool_clone()),
    )
    .await;

    let Some(snapshot) = snapshot else {
        let err = progress.error_message().unwrap_or_default();
        anyhow::bail!("Refresh failed: {}", err);
    };

    if snapshot.stats.traders_with_positions == 0 {
        println!("No open positions found for any tracked trader.");
    }
    print_traders(&snapshot);
    print_connections(&snapshot, top_n);

    if let Some(export_path) = export {
        let json = serde_json::to_string_pretty(snapshot.as_ref())?;
        std::fs::write(&export_path, &json)?;
        println!("\nSnapshot exported to {}", export_path);
    }

    Ok(())
}

fn short_label(trader: &engine::TrackedTrader) -> String {
    let label = trader
        .display_name()
        .map(String::from)
        .unwrap_or_else(|| engine::truncate_wallet(trader.wallet_id()));
    label.chars().take(20).collect()
}

fn print_traders(snapshot: &NetworkSnapshot) {
    let counts = snapshot.connection_counts();
    println!("Tracked Traders ({}):", snapshot.traders.len());
    println!(
        "  {:>4}  {:<20} {:>12} {:>12} {:>6} {:>12} {:>6}",
        "Rank", "Trader", "Volume", "PnL", "Pos", "Value", "Links"
    );
    println!("  {}", "-".repeat(80));
    for t in &snapshot.traders {
        println!(
            "  {:>4}  {:<20} {:>12.0} {:>+12.0} {:>6} {:>12.0} {:>6}",
            t.rank().map(|r| r.to_string()).unwrap_or_else(|| "-".into()),
            short_label(t),
            t.volume(),
            t.pnl(),
            t.position_count(),
            t.total_value() / 100.0,
            counts.get(t.wallet_id()).copied().unwrap_or(0),
        );
    }
}

fn print_connections(snapshot: &NetworkSnapshot, top_n: usize) {
    let labels: std::collections::HashMap<&str, String> = snapshot
        .traders
        .iter()
        .map(|t| (t.wallet_id(), short_label(t)))
        .collect();
    let label = |w: &str| labels.get(w).cloned().unwrap_or_else(|| w.to_string());

    println!(
        "\nTop {} of {} Connections:",
        snapshot.connections.len().min(top_n),
        snapshot.connections.len()
    );
    println!(
        "  {:>3}  {:<20} {:<20} {:>10} {:>7}",
        "#", "Trader", "Trader", "Similarity", "Shared"
    );
    println!("  {}", "-".repeat(66));
    for (i, c) in snapshot.connections.iter().take(top_n).enumerate() {
        println!(
            "  {:>3}  {:<20} {:<20} {:>10.3} {:>7}",
            i + 1,
            label(&c.trader1),
            label(&c.trader2),
            c.similarity,
            c.common_markets_count,
        );
    }
}

// ============================================================================
// API Handlers - Network
// ============================================================================

/// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "copy-network",
        "version": APP_VERSION,
    }))
}

/// POST /api/network/refresh - start a refresh cycle, optionally with config overrides
async fn api_refresh(
    State(state): State<AppState>,
    body: Option<Json<NetworkConfig>>,
) -> Json<serde_json::Value> {
    let config = body
        .map(|Json(c)| c)
        .unwrap_or_else(|| state.config.as_ref().clone());
    if let Err(e) = config.validate() {
        return Json(serde_json::json!({
            "success": false,
            "message": e.to_string(),
        }));
    }

    if !state.progress.try_begin() {
        return Json(serde_json::json!({
            "success": false,
            "message": "Network refresh already running",
        }));
    }

    info!(
        limit = config.leaderboard_limit,
        threshold = config.min_similarity,
        link_cap = config.link_cap,
        "Starting network refresh via API"
    );

    let client = state.client.clone();
    let progress = state.progress.clone();
    let cache = state.cache.clone();
    let db_pool = Some(state.db.pool_clone());
    tokio::spawn(async move {
        refresh_network(client.as_ref(), &progress, &config, &cache, db_pool).await;
    });

    Json(serde_json::json!({
        "success": true,
        "message": "Network refresh started",
    }))
}

/// GET /api/network/status - poll refresh progress
async fn api_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let progress = &state.progress;
    let latest = state.cache.latest().await;

    Json(serde_json::json!({
        "status": progress.status(),
        "total_traders": progress.total_traders.load(std::sync::atomic::Ordering::Relaxed),
        "cycles_completed": progress.cycles_completed.load(std::sync::atomic::Ordering::Relaxed),
        "started_at": progress.started_at().map(|t| t.to_rfc3339()),
        "error": progress.error_message(),
        "cycle_at": latest.as_ref().map(|s| s.cycle_at.to_rfc3339()),
        "stats": latest.as_ref().map(|s| &s.stats),
        "fetch": latest.as_ref().map(|s| s.fetch),
    }))
}

#[derive(Deserialize)]
struct GraphParams {
    links: Option<usize>,
}

/// GET /api/network - graph from the latest cycle (falls back to the last persisted one)
async fn api_network_graph(
    State(state): State<AppState>,
    Query(params): Query<GraphParams>,
) -> Json<serde_json::Value> {
    if let Some(snapshot) = state.cache.latest().await {
        let graph = match params.links {
            Some(cap) => snapshot.graph_with_cap(cap),
            None => snapshot.graph.clone(),
        };
        return Json(serde_json::json!({
            "success": true,
            "stale": state.cache_is_stale().await,
            "cycle_at": snapshot.cycle_at.to_rfc3339(),
            "stats": snapshot.stats,
            "graph": graph,
        }));
    }

    let repo = NetworkRepository::new(state.db.pool());
    match repo.get_latest_snapshot().await {
        Ok(Some(record)) => {
            let stored: serde_json::Value =
                serde_json::from_str(&record.snapshot_json).unwrap_or_default();
            Json(serde_json::json!({
                "success": true,
                "stale": true,
                "cycle_at": stored.get("cycle_at"),
                "stats": stored.get("stats"),
                "graph": stored.get("graph"),
            }))
        }
        Ok(None) => Json(serde_json::json!({
            "success": false,
            "message": "No network computed yet",
            "graph": { "nodes": [], "links": [] },
        })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "error": format!("Failed to load snapshot: {}", e),
        })),
    }
}

/// GET /api/network/traders - tracked traders with their positions
async fn api_traders(State(state): State<AppState>) -> Json<serde_json::Value> {
    if let Some(snapshot) = state.cache.latest().await {
        return Json(serde_json::json!({
            "success": true,
            "stale": state.cache_is_stale().await,
            "cycle_at": snapshot.cycle_at.to_rfc3339(),
            "data": snapshot.traders,
            "total": snapshot.traders.len(),
        }));
    }

    let repo = NetworkRepository::new(state.db.pool());
    match repo.get_all_traders().await {
        Ok(records) => Json(serde_json::json!({
            "success": true,
            "stale": true,
            "total": records.len(),
            "data": records,
        })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "error": format!("Failed to query traders: {}", e),
            "data": [],
            "total": 0,
        })),
    }
}

#[derive(Deserialize)]
struct ConnectionParams {
    min_similarity: Option<f64>,
    wallet: Option<String>,
    #[serde(default = "default_connection_limit")]
    limit: usize,
}

fn default_connection_limit() -> usize {
    100
}

/// GET /api/network/connections - scored pairs, optionally for one wallet
async fn api_connections(
    State(state): State<AppState>,
    Query(params): Query<ConnectionParams>,
) -> Json<serde_json::Value> {
    let Some(snapshot) = state.cache.latest().await else {
        return Json(serde_json::json!({
            "success": false,
            "message": "No network computed yet",
            "data": [],
            "total": 0,
        }));
    };

    let scoped: Vec<&engine::TraderConnection> = match params.wallet.as_deref() {
        Some(wallet) => connections_for(wallet, &snapshot.connections),
        None => snapshot.connections.iter().collect(),
    };
    let min = params.min_similarity.unwrap_or(0.0);
    let filtered: Vec<&engine::TraderConnection> = scoped
        .into_iter()
        .filter(|c| c.similarity >= min)
        .collect();
    let total = filtered.len();
    let data: Vec<&engine::TraderConnection> = filtered.into_iter().take(params.limit).collect();

    Json(serde_json::json!({
        "success": true,
        "stale": state.cache_is_stale().await,
        "cycle_at": snapshot.cycle_at.to_rfc3339(),
        "data": data,
        "total": total,
    }))
}

#[derive(Deserialize)]
struct HistoryParams {
    #[serde(default = "default_history_limit")]
    limit: i64,
}

fn default_history_limit() -> i64 {
    20
}

/// GET /api/network/history - persisted snapshot metadata, newest first
async fn api_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<serde_json::Value> {
    let repo = NetworkRepository::new(state.db.pool());
    match repo.list_snapshots(params.limit).await {
        Ok(records) => Json(serde_json::json!({
            "success": true,
            "generated_at": Utc::now().to_rfc3339(),
            "data": records,
            "total": records.len(),
        })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "error": format!("Failed to query history: {}", e),
            "data": [],
            "total": 0,
        })),
    }
}

// ============================================================================
// Cleanup command - keep newest N snapshots
// ============================================================================

async fn cmd_cleanup(keep: i64) -> anyhow::Result<()> {
    info!("Copy-Network DB cleanup - keeping newest {} snapshots", keep);

    let db_path = db_path();
    let db = persistence::Database::new(&db_path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;
    info!("Database opened: {}", db_path);

    let repo = NetworkRepository::new(db.pool());
    let (deleted, remaining) = repo
        .prune_snapshots(keep)
        .await
        .map_err(|e| anyhow::anyhow!("Cleanup failed: {}", e))?;

    info!("Running VACUUM to reclaim disk space...");
    repo.vacuum()
        .await
        .map_err(|e| anyhow::anyhow!("VACUUM failed: {}", e))?;

    info!("Done! Deleted {} snapshots, {} remaining.", deleted, remaining);
    Ok(())
}
