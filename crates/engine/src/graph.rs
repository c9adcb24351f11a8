//! Graph Builder - project traders and their strongest connections into nodes/links

use crate::types::{GraphLink, GraphNode, TrackedTrader, TraderConnection, TraderGraph};

/// Shorten a wallet address to `0x1234…abcd`
pub fn truncate_wallet(wallet: &str) -> String {
    let chars: Vec<char> = wallet.chars().collect();
    if chars.len() <= 10 {
        return wallet.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

fn node_label(trader: &TrackedTrader) -> String {
    match trader.display_name().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => truncate_wallet(trader.wallet_id()),
    }
}

/// Build the graph. Every trader becomes a node; links are the first `link_cap`
/// entries of `connections`, which must already be sorted strongest first.
pub fn build_graph(
    traders: &[TrackedTrader],
    connections: &[TraderConnection],
    link_cap: usize,
) -> TraderGraph {
    let nodes = traders
        .iter()
        .map(|t| GraphNode {
            id: t.wallet_id().to_string(),
            label: node_label(t),
            volume: t.volume(),
            pnl: t.pnl(),
            position_count: t.position_count(),
            total_value: t.total_value(),
            rank: t.rank(),
            verified: t.verified(),
        })
        .collect();

    let links = connections
        .iter()
        .take(link_cap)
        .map(|c| GraphLink {
            source: c.trader1.clone(),
            target: c.trader2.clone(),
            similarity: c.similarity,
            common_markets_count: c.common_markets_count,
        })
        .collect();

    TraderGraph { nodes, links }
}
