//! Multi-Trader Position Fetcher - concurrent per-wallet retrieval with failure isolation
//!
//! Wallets are fetched in fixed-size batches. Inside a batch every retrieval runs
//! concurrently under its own timeout; a failed or slow wallet degrades to an empty
//! position list instead of failing the batch.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{NetworkConfig, DEFAULT_BATCH_SIZE, DEFAULT_WALLET_TIMEOUT_SECS};
use crate::position::normalize_positions;
use crate::types::Position;

/// Anything that can return the raw position records of one wallet
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn fetch_raw_positions(&self, wallet: &str) -> anyhow::Result<Vec<Value>>;
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub batch_size: usize,
    pub wallet_timeout: Duration,
    pub batch_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            wallet_timeout: Duration::from_secs(DEFAULT_WALLET_TIMEOUT_SECS),
            batch_delay: Duration::ZERO,
        }
    }
}

impl From<&NetworkConfig> for FetchOptions {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            wallet_timeout: config.wallet_timeout(),
            batch_delay: config.batch_delay(),
        }
    }
}

/// How each wallet fared during one fetch cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

enum WalletOutcome {
    Ok(Vec<Position>),
    Failed,
    TimedOut,
}

async fn fetch_one<S: PositionSource + ?Sized>(
    source: &S,
    wallet: &str,
    timeout: Duration,
    fetched_at: DateTime<Utc>,
) -> WalletOutcome {
    match tokio::time::timeout(timeout, source.fetch_raw_positions(wallet)).await {
        Ok(Ok(records)) => {
            let positions = normalize_positions(&records, fetched_at);
            debug!(
                wallet,
                raw = records.len(),
                kept = positions.len(),
                "Positions normalized"
            );
            WalletOutcome::Ok(positions)
        }
        Ok(Err(e)) => {
            warn!(wallet, error = %e, "Failed to fetch positions");
            WalletOutcome::Failed
        }
        Err(_) => {
            warn!(wallet, timeout_ms = timeout.as_millis() as u64, "Position fetch timed out");
            WalletOutcome::TimedOut
        }
    }
}

/// Fetch and normalize positions for every wallet, returning a report alongside.
///
/// Duplicate wallets are fetched once. The map holds exactly one entry per distinct
/// input wallet.
pub async fn fetch_positions_with_report<S: PositionSource + ?Sized>(
    source: &S,
    wallets: &[String],
    options: &FetchOptions,
) -> (HashMap<String, Vec<Position>>, FetchReport) {
    let mut seen = HashSet::new();
    let unique: Vec<&String> = wallets.iter().filter(|w| seen.insert(w.as_str())).collect();

    let batch_size = options.batch_size.max(1);
    let fetched_at = Utc::now();
    let mut result = HashMap::with_capacity(unique.len());
    let mut report = FetchReport {
        requested: unique.len(),
        ..Default::default()
    };

    let batch_count = unique.len().div_ceil(batch_size);
    for (i, batch) in unique.chunks(batch_size).enumerate() {
        let outcomes = join_all(
            batch
                .iter()
                .map(|w| fetch_one(source, w, options.wallet_timeout, fetched_at)),
        )
        .await;

        for (wallet, outcome) in batch.iter().zip(outcomes) {
            let positions = match outcome {
                WalletOutcome::Ok(p) => {
                    report.succeeded += 1;
                    p
                }
                WalletOutcome::Failed => {
                    report.failed += 1;
                    Vec::new()
                }
                WalletOutcome::TimedOut => {
                    report.timed_out += 1;
                    Vec::new()
                }
            };
            result.insert((*wallet).clone(), positions);
        }

        if i + 1 < batch_count && !options.batch_delay.is_zero() {
            tokio::time::sleep(options.batch_delay).await;
        }
    }

    info!(
        requested = report.requested,
        succeeded = report.succeeded,
        failed = report.failed,
        timed_out = report.timed_out,
        "Position fetch complete"
    );

    (result, report)
}

/// Fetch and normalize positions for every wallet
pub async fn fetch_positions_for_wallets<S: PositionSource + ?Sized>(
    source: &S,
    wallets: &[String],
    options: &FetchOptions,
) -> HashMap<String, Vec<Position>> {
    fetch_positions_with_report(source, wallets, options).await.0
}
