//! Trader Aggregator - join the ranking with fetched positions

use std::collections::HashMap;

use crate::types::{Position, RankedTrader, TrackedTrader};

/// One [`TrackedTrader`] per ranking entry, in ranking order. Traders whose wallet is
/// missing from `positions` get an empty position list; nobody is filtered out.
pub fn aggregate_traders(
    ranked: &[RankedTrader],
    positions: &HashMap<String, Vec<Position>>,
) -> Vec<TrackedTrader> {
    ranked
        .iter()
        .map(|entry| {
            let held = positions.get(&entry.wallet_id).cloned().unwrap_or_default();
            TrackedTrader::new(entry, held)
        })
        .collect()
}

/// Whether any trader came back with at least one position
pub fn has_any_positions(traders: &[TrackedTrader]) -> bool {
    traders.iter().any(TrackedTrader::has_positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outcome;
    use chrono::{TimeZone, Utc};

    fn make_entry(wallet: &str, rank: u32) -> RankedTrader {
        RankedTrader {
            wallet_id: wallet.into(),
            display_name: Some(format!("Trader {}", rank)),
            rank: Some(rank),
            volume: 10_000.0 / rank as f64,
            pnl: 500.0,
            verified: rank == 1,
        }
    }

    fn make_position(market: &str, shares: f64, avg: f64, cur: Option<f64>, ts: i64) -> Position {
        Position {
            market_id: market.into(),
            market_label: market.to_uppercase(),
            outcome: Outcome::Favorable,
            shares,
            avg_price: avg,
            current_price: cur,
            pnl: None,
            pnl_percentage: None,
            updated_at: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    #[test]
    fn test_preserves_ranking_order_and_keeps_empty_traders() {
        let ranked = vec![make_entry("0xa", 1), make_entry("0xb", 2), make_entry("0xc", 3)];
        let mut positions = HashMap::new();
        positions.insert(
            "0xb".to_string(),
            vec![make_position("m1", 10.0, 50.0, None, 100)],
        );
        positions.insert("0xc".to_string(), Vec::new());

        let traders = aggregate_traders(&ranked, &positions);

        let wallets: Vec<&str> = traders.iter().map(|t| t.wallet_id()).collect();
        assert_eq!(wallets, vec!["0xa", "0xb", "0xc"]);
        assert_eq!(traders[0].position_count(), 0);
        assert_eq!(traders[0].total_value(), 0.0);
        assert_eq!(traders[1].position_count(), 1);
        assert_eq!(traders[2].position_count(), 0);
        assert!(traders[0].verified());
        assert!(has_any_positions(&traders));
    }

    #[test]
    fn test_exposure_prefers_current_price() {
        let ranked = vec![make_entry("0xa", 1)];
        let mut positions = HashMap::new();
        positions.insert(
            "0xa".to_string(),
            vec![
                make_position("m1", 10.0, 40.0, Some(70.0), 100),
                make_position("m2", 4.0, 25.0, None, 300),
                make_position("m3", 2.0, 90.0, Some(0.0), 200),
            ],
        );

        let traders = aggregate_traders(&ranked, &positions);
        let t = &traders[0];
        assert!((t.total_value() - (700.0 + 100.0 + 0.0)).abs() < 1e-9);
        assert_eq!(t.last_activity(), Some(Utc.timestamp_opt(300, 0).unwrap()));
    }

    #[test]
    fn test_no_positions_anywhere() {
        let ranked = vec![make_entry("0xa", 1), make_entry("0xb", 2)];
        let traders = aggregate_traders(&ranked, &HashMap::new());
        assert_eq!(traders.len(), 2);
        assert!(!has_any_positions(&traders));
    }
}
