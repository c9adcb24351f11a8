//! Data model for the copy network: positions, tracked traders, connections, graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side of a binary position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The held share pays out if the market resolves this way (e.g. "Yes")
    Favorable,
    /// The held share pays out against the headline question (e.g. "No")
    Unfavorable,
}

/// One open stake a trader holds in one market outcome.
///
/// Prices are always on a 0–100 percentage scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub market_id: String,
    pub market_label: String,
    pub outcome: Outcome,
    pub shares: f64,
    pub avg_price: f64,
    pub current_price: Option<f64>,
    pub pnl: Option<f64>,
    pub pnl_percentage: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Current price when known, otherwise the average entry price
    pub fn best_price(&self) -> f64 {
        self.current_price.unwrap_or(self.avg_price)
    }

    /// shares × best available price
    pub fn exposure_value(&self) -> f64 {
        self.shares * self.best_price()
    }
}

/// One entry from the leaderboard ranking, ordered ascending by rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTrader {
    pub wallet_id: String,
    pub display_name: Option<String>,
    pub rank: Option<u32>,
    pub volume: f64,
    pub pnl: f64,
    #[serde(default)]
    pub verified: bool,
}

/// A ranked trader plus their current position snapshot.
///
/// Summary figures are derived from `positions` in [`TrackedTrader::new`] and the
/// record is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedTrader {
    wallet_id: String,
    display_name: Option<String>,
    rank: Option<u32>,
    volume: f64,
    pnl: f64,
    verified: bool,
    positions: Vec<Position>,
    total_value: f64,
    position_count: usize,
    last_activity: Option<DateTime<Utc>>,
}

impl TrackedTrader {
    pub fn new(entry: &RankedTrader, positions: Vec<Position>) -> Self {
        let total_value = positions.iter().map(Position::exposure_value).sum();
        let position_count = positions.len();
        let last_activity = positions.iter().map(|p| p.updated_at).max();

        Self {
            wallet_id: entry.wallet_id.clone(),
            display_name: entry.display_name.clone(),
            rank: entry.rank,
            volume: entry.volume,
            pnl: entry.pnl,
            verified: entry.verified,
            positions,
            total_value,
            position_count,
            last_activity,
        }
    }

    pub fn wallet_id(&self) -> &str {
        &self.wallet_id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn rank(&self) -> Option<u32> {
        self.rank
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn pnl(&self) -> f64 {
        self.pnl
    }

    pub fn verified(&self) -> bool {
        self.verified
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn total_value(&self) -> f64 {
        self.total_value
    }

    pub fn position_count(&self) -> usize {
        self.position_count
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    pub fn has_positions(&self) -> bool {
        !self.positions.is_empty()
    }
}

/// A scored relationship between two distinct traders.
///
/// `trader1` precedes `trader2` in the input order of the similarity run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderConnection {
    pub trader1: String,
    pub trader2: String,
    pub similarity: f64,
    pub common_markets: Vec<String>,
    pub common_markets_count: usize,
}

impl TraderConnection {
    pub fn involves(&self, wallet: &str) -> bool {
        self.trader1 == wallet || self.trader2 == wallet
    }

    /// The other side of the connection, if `wallet` is part of it
    pub fn counterpart(&self, wallet: &str) -> Option<&str> {
        if self.trader1 == wallet {
            Some(&self.trader2)
        } else if self.trader2 == wallet {
            Some(&self.trader1)
        } else {
            None
        }
    }
}

/// Graph node: one per tracked trader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub volume: f64,
    pub pnl: f64,
    pub position_count: usize,
    pub total_value: f64,
    pub rank: Option<u32>,
    pub verified: bool,
}

/// Graph edge between two traders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    pub similarity: f64,
    pub common_markets_count: usize,
}

/// Render-ready projection of the network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraderGraph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_position(market: &str, shares: f64, avg: f64, cur: Option<f64>, ts: i64) -> Position {
        Position {
            market_id: market.into(),
            market_label: format!("Market {}", market),
            outcome: Outcome::Favorable,
            shares,
            avg_price: avg,
            current_price: cur,
            pnl: None,
            pnl_percentage: None,
            updated_at: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    fn make_entry(wallet: &str) -> RankedTrader {
        RankedTrader {
            wallet_id: wallet.into(),
            display_name: None,
            rank: Some(1),
            volume: 1000.0,
            pnl: 50.0,
            verified: false,
        }
    }

    #[test]
    fn test_tracked_trader_summary() {
        let positions = vec![
            make_position("m1", 10.0, 40.0, Some(60.0), 1_700_000_000),
            make_position("m2", 5.0, 20.0, None, 1_700_000_500),
        ];
        let trader = TrackedTrader::new(&make_entry("0xabc"), positions);

        assert_eq!(trader.position_count(), 2);
        assert!((trader.total_value() - (10.0 * 60.0 + 5.0 * 20.0)).abs() < 1e-9);
        assert_eq!(
            trader.last_activity(),
            Some(Utc.timestamp_opt(1_700_000_500, 0).unwrap())
        );
    }

    #[test]
    fn test_tracked_trader_without_positions() {
        let trader = TrackedTrader::new(&make_entry("0xabc"), Vec::new());
        assert_eq!(trader.position_count(), 0);
        assert_eq!(trader.total_value(), 0.0);
        assert!(trader.last_activity().is_none());
        assert!(!trader.has_positions());
    }

    #[test]
    fn test_connection_counterpart() {
        let conn = TraderConnection {
            trader1: "a".into(),
            trader2: "b".into(),
            similarity: 0.5,
            common_markets: vec!["m".into()],
            common_markets_count: 1,
        };
        assert_eq!(conn.counterpart("a"), Some("b"));
        assert_eq!(conn.counterpart("b"), Some("a"));
        assert_eq!(conn.counterpart("c"), None);
        assert!(conn.involves("b"));
    }
}
