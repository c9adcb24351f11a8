//! Polymarket Data API client - public endpoints, no authentication required
//!
//! Uses `data-api.polymarket.com` for the leaderboard ranking and per-wallet positions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::fetcher::PositionSource;
use crate::types::RankedTrader;

pub const DEFAULT_BASE_URL: &str = "https://data-api.polymarket.com";

/// Polymarket Data API client
#[derive(Clone)]
pub struct PolymarketDataClient {
    client: Client,
    base_url: String,
}

// ---------------------------------------------------------------------------
// Deserialization structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    #[serde(default, deserialize_with = "de_opt_rank")]
    pub rank: Option<u32>,
    pub proxy_wallet: Option<String>,
    pub user_name: Option<String>,
    pub vol: Option<f64>,
    pub pnl: Option<f64>,
    pub profile_image: Option<String>,
    pub x_username: Option<String>,
    pub verified_badge: Option<bool>,
}

/// The endpoint reports rank as either a number or a numeric string
fn de_opt_rank<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|r| u32::try_from(r).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Wrapper: the leaderboard endpoint returns `{ "leaderboard": [...] }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LeaderboardResponse {
    Wrapped { leaderboard: Vec<LeaderboardEntry> },
    Bare(Vec<LeaderboardEntry>),
}

impl LeaderboardEntry {
    /// Convert to a ranking entry; entries without a wallet are unusable
    pub fn to_ranked(&self, position: usize) -> Option<RankedTrader> {
        let wallet = self.proxy_wallet.as_deref().map(str::trim).unwrap_or("");
        if wallet.is_empty() {
            return None;
        }
        Some(RankedTrader {
            wallet_id: wallet.to_string(),
            display_name: self.user_name.clone().filter(|n| !n.trim().is_empty()),
            rank: self.rank.or(u32::try_from(position + 1).ok()),
            volume: self.vol.unwrap_or(0.0),
            pnl: self.pnl.unwrap_or(0.0),
            verified: self.verified_badge.unwrap_or(false),
        })
    }
}

/// Turn leaderboard entries into a ranking, skipping entries with no wallet
pub fn ranked_traders(entries: &[LeaderboardEntry]) -> Vec<RankedTrader> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let ranked = entry.to_ranked(i);
            if ranked.is_none() {
                warn!(rank = ?entry.rank, "Skipping trader with no wallet");
            }
            ranked
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Client implementation
// ---------------------------------------------------------------------------

impl Default for PolymarketDataClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PolymarketDataClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the client at another host (proxies, test servers)
    pub fn with_base_url(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /v1/leaderboard - top traders
    pub async fn get_leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>> {
        let url = format!(
            "{}/v1/leaderboard?category=OVERALL&timePeriod=ALL&orderBy=PNL&limit={}",
            self.base_url, limit
        );
        debug!("Fetching leaderboard: {}", url);

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Polymarket leaderboard error {}: {}", status, body);
        }

        let entries = match resp.json::<LeaderboardResponse>().await? {
            LeaderboardResponse::Wrapped { leaderboard } => leaderboard,
            LeaderboardResponse::Bare(entries) => entries,
        };
        debug!(count = entries.len(), "Leaderboard fetched");
        Ok(entries)
    }

    /// GET /positions?user={address} - raw, loosely typed position records
    pub async fn get_raw_positions(&self, address: &str) -> Result<Vec<Value>> {
        let url = format!(
            "{}/positions?user={}&sortBy=CURRENT&sortDirection=DESC&limit=100&sizeThreshold=0",
            self.base_url, address
        );
        debug!(address, "Fetching positions");

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Polymarket positions error {}: {}", status, body);
        }

        let payload: Value = resp
            .json()
            .await
            .with_context(|| format!("Malformed positions payload for {}", address))?;
        let positions = positions_from_payload(payload, address)?;
        debug!(count = positions.len(), "Positions fetched");
        Ok(positions)
    }
}

/// Unwrap a positions response: a bare array, or an object carrying the array under
/// `positions` or `data`
fn positions_from_payload(payload: Value, address: &str) -> Result<Vec<Value>> {
    match payload {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => match obj.remove("positions").or_else(|| obj.remove("data")) {
            Some(Value::Array(items)) => Ok(items),
            _ => anyhow::bail!("Unexpected positions payload shape for {}", address),
        },
        _ => anyhow::bail!("Unexpected positions payload shape for {}", address),
    }
}

#[async_trait]
impl PositionSource for PolymarketDataClient {
    async fn fetch_raw_positions(&self, wallet: &str) -> Result<Vec<Value>> {
        self.get_raw_positions(wallet).await
    }
}
