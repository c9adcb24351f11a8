//! Similarity Engine - pairwise Jaccard similarity over market exposure
//!
//! Every unordered pair of traders is scored once. Cohorts are tens of traders, so
//! the quadratic pass is fine.

use std::collections::BTreeSet;

use crate::config::DEFAULT_MIN_SIMILARITY;
use crate::types::{TrackedTrader, TraderConnection};

/// |a ∩ b| / |a ∪ b|, or 0 when both sets are empty
pub fn jaccard_similarity(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn market_set(trader: &TrackedTrader) -> BTreeSet<&str> {
    trader
        .positions()
        .iter()
        .map(|p| p.market_id.as_str())
        .collect()
}

/// Score every pair of traders and keep those at or above `min_similarity`.
///
/// Traders without positions are never paired. The result is sorted by similarity
/// descending; equal scores keep pair enumeration order (i < j, row by row).
pub fn compute_connections(traders: &[TrackedTrader], min_similarity: f64) -> Vec<TraderConnection> {
    let threshold = if min_similarity.is_nan() {
        DEFAULT_MIN_SIMILARITY
    } else {
        min_similarity.clamp(0.0, 1.0)
    };

    let sets: Vec<Option<BTreeSet<&str>>> = traders
        .iter()
        .map(|t| t.has_positions().then(|| market_set(t)))
        .collect();

    let mut connections = Vec::new();
    for i in 0..traders.len() {
        let Some(a) = &sets[i] else { continue };
        for j in (i + 1)..traders.len() {
            let Some(b) = &sets[j] else { continue };

            let similarity = jaccard_similarity(a, b);
            if similarity < threshold {
                continue;
            }

            let common_markets: Vec<String> =
                a.intersection(b).map(|m| m.to_string()).collect();
            connections.push(TraderConnection {
                trader1: traders[i].wallet_id().to_string(),
                trader2: traders[j].wallet_id().to_string(),
                similarity,
                common_markets_count: common_markets.len(),
                common_markets,
            });
        }
    }

    // sort_by is stable
    connections.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    connections
}

/// Connections that touch `wallet`, keeping their order
pub fn connections_for<'a>(
    wallet: &str,
    connections: &'a [TraderConnection],
) -> Vec<&'a TraderConnection> {
    connections.iter().filter(|c| c.involves(wallet)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Outcome, Position, RankedTrader};
    use chrono::Utc;

    fn make_trader(wallet: &str, markets: &[&str]) -> TrackedTrader {
        let entry = RankedTrader {
            wallet_id: wallet.into(),
            display_name: None,
            rank: None,
            volume: 0.0,
            pnl: 0.0,
            verified: false,
        };
        let positions = markets
            .iter()
            .map(|m| Position {
                market_id: m.to_string(),
                market_label: m.to_string(),
                outcome: Outcome::Favorable,
                shares: 1.0,
                avg_price: 50.0,
                current_price: None,
                pnl: None,
                pnl_percentage: None,
                updated_at: Utc::now(),
            })
            .collect();
        TrackedTrader::new(&entry, positions)
    }

    #[test]
    fn test_full_overlap() {
        let traders = vec![make_trader("a", &["x"]), make_trader("b", &["x"])];
        let conns = compute_connections(&traders, 0.1);
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].similarity, 1.0);
        assert_eq!(conns[0].common_markets, vec!["x".to_string()]);
        assert_eq!(conns[0].common_markets_count, 1);
    }

    #[test]
    fn test_partial_overlap() {
        let traders = vec![make_trader("a", &["x", "y"]), make_trader("b", &["y", "z"])];
        let conns = compute_connections(&traders, 0.1);
        assert_eq!(conns.len(), 1);
        assert!((conns[0].similarity - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(conns[0].common_markets, vec!["y".to_string()]);
        assert_eq!(conns[0].trader1, "a");
        assert_eq!(conns[0].trader2, "b");
    }

    #[test]
    fn test_empty_trader_never_connected() {
        let traders = vec![make_trader("a", &["x"]), make_trader("b", &[])];
        assert!(compute_connections(&traders, 0.0).is_empty());
    }

    #[test]
    fn test_threshold_omits_weak_pairs() {
        let traders = vec![make_trader("a", &["x", "y"]), make_trader("b", &["y", "z"])];
        assert!(compute_connections(&traders, 0.5).is_empty());
    }

    #[test]
    fn test_zero_threshold_keeps_disjoint_pairs() {
        let traders = vec![make_trader("a", &["x"]), make_trader("b", &["y"])];
        let conns = compute_connections(&traders, 0.0);
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].similarity, 0.0);
        assert!(conns[0].common_markets.is_empty());
    }

    #[test]
    fn test_duplicate_markets_collapse() {
        let traders = vec![make_trader("a", &["x", "x", "y"]), make_trader("b", &["x"])];
        let conns = compute_connections(&traders, 0.1);
        assert_eq!(conns[0].similarity, 0.5);
        assert_eq!(conns[0].common_markets_count, 1);
    }

    #[test]
    fn test_symmetric() {
        let a = make_trader("a", &["m1", "m2", "m3"]);
        let b = make_trader("b", &["m2", "m3", "m4", "m5"]);
        let ab = compute_connections(&[a.clone(), b.clone()], 0.0);
        let ba = compute_connections(&[b, a], 0.0);
        assert_eq!(ab[0].similarity, ba[0].similarity);
        assert_eq!(ab[0].common_markets, ba[0].common_markets);
    }

    #[test]
    fn test_sorted_with_stable_ties_and_invariants() {
        let traders = vec![
            make_trader("a", &["m1", "m2"]),
            make_trader("b", &["m1", "m2"]),
            make_trader("c", &["m1", "m3"]),
            make_trader("d", &["m9"]),
            make_trader("e", &[]),
        ];
        let conns = compute_connections(&traders, 0.1);

        // a-b = 1.0, a-c = 1/3, b-c = 1/3
        assert_eq!(conns.len(), 3);
        assert_eq!((conns[0].trader1.as_str(), conns[0].trader2.as_str()), ("a", "b"));
        assert_eq!((conns[1].trader1.as_str(), conns[1].trader2.as_str()), ("a", "c"));
        assert_eq!((conns[2].trader1.as_str(), conns[2].trader2.as_str()), ("b", "c"));

        for c in &conns {
            assert!(c.similarity >= 0.1 && c.similarity <= 1.0);
            assert!(!c.involves("e"));
            assert_eq!(c.common_markets_count, c.common_markets.len());
        }
        assert!(conns.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_idempotent() {
        let traders = vec![
            make_trader("a", &["m1", "m2", "m3"]),
            make_trader("b", &["m3", "m2"]),
            make_trader("c", &["m3"]),
        ];
        assert_eq!(compute_connections(&traders, 0.1), compute_connections(&traders, 0.1));
    }

    #[test]
    fn test_nan_threshold_falls_back_to_default() {
        let traders = vec![make_trader("a", &["x", "y", "z", "w"]), make_trader("b", &["x"])];
        // 0.25 passes the 0.1 default
        assert_eq!(compute_connections(&traders, f64::NAN).len(), 1);
    }

    #[test]
    fn test_connections_for_wallet() {
        let traders = vec![
            make_trader("a", &["x"]),
            make_trader("b", &["x"]),
            make_trader("c", &["y"]),
            make_trader("d", &["y"]),
        ];
        let conns = compute_connections(&traders, 0.1);
        let for_c = connections_for("c", &conns);
        assert_eq!(for_c.len(), 1);
        assert_eq!(for_c[0].counterpart("c"), Some("d"));
    }
}
