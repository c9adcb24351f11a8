//! Position Normalizer - turn one loosely-typed position record into a [`Position`]
//!
//! Upstream payloads are not consistent about field names or price scales, so every
//! field is read through an ordered list of candidate keys. The table below is the
//! single place where that mapping lives.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::types::{Outcome, Position};

/// Candidate keys per field, tried in order. The first key that is present and not
/// `null` wins.
pub struct ExtractionRules {
    pub market_id: &'static [&'static str],
    pub market_label: &'static [&'static str],
    pub outcome: &'static [&'static str],
    pub shares: &'static [&'static str],
    pub avg_price: &'static [&'static str],
    pub current_price: &'static [&'static str],
    pub timestamp: &'static [&'static str],
}

pub const POSITION_RULES: ExtractionRules = ExtractionRules {
    market_id: &["conditionId", "condition_id", "marketId", "market_id", "market", "asset"],
    market_label: &["title", "question", "marketTitle", "market_title", "slug"],
    outcome: &["outcome", "side", "outcomeIndex", "outcome_index"],
    shares: &["size", "shares", "amount", "quantity"],
    avg_price: &["avgPrice", "avg_price", "averagePrice", "entryPrice"],
    current_price: &["curPrice", "cur_price", "currentPrice", "price"],
    timestamp: &["timestamp", "updatedAt", "updated_at", "lastUpdated"],
};

/// Labels that mean the upstream never resolved the market
const PLACEHOLDER_LABELS: &[&str] = &["unknown", "unknown market", "n/a", "undefined", "null"];

/// Epoch values above this are milliseconds
const MILLIS_CUTOFF: f64 = 1e12;

fn resolve<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find(|v| !v.is_null())
}

/// Numeric coercion: numbers pass through, numeric strings are parsed, anything
/// else (including NaN/inf) is zero.
fn coerce_f64(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Prices above 1 are already percentages; anything at or below 1 is a fraction.
pub fn normalize_price(price: f64) -> f64 {
    if price > 1.0 {
        price
    } else {
        price * 100.0
    }
}

fn parse_outcome(value: Option<&Value>) -> Outcome {
    match value {
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "no" | "down" | "false" | "unfavorable" => Outcome::Unfavorable,
            "1" => Outcome::Unfavorable,
            _ => Outcome::Favorable,
        },
        Some(Value::Number(n)) if n.as_f64() == Some(1.0) => Outcome::Unfavorable,
        Some(Value::Bool(false)) => Outcome::Unfavorable,
        _ => Outcome::Favorable,
    }
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Number(n) => epoch_to_datetime(n.as_f64()?),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(secs) = s.parse::<f64>() {
                return epoch_to_datetime(secs);
            }
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
        _ => None,
    }
}

fn epoch_to_datetime(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    let millis = if raw >= MILLIS_CUTOFF { raw } else { raw * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}

fn is_placeholder_label(label: &str) -> bool {
    label.is_empty() || PLACEHOLDER_LABELS.contains(&label.to_lowercase().as_str())
}

/// Profit/loss for a position, signed by which side was bought.
///
/// Returns `(pnl, pnl_percentage)`; the percentage is `None` when the average price
/// is zero.
pub fn compute_pnl(
    outcome: Outcome,
    shares: f64,
    avg_price: f64,
    current_price: f64,
) -> (f64, Option<f64>) {
    let pnl = match outcome {
        Outcome::Favorable => (current_price - avg_price) * shares,
        Outcome::Unfavorable => (avg_price - current_price) * shares,
    };
    let cost = avg_price * shares;
    let pnl_percentage = if cost != 0.0 {
        Some(pnl / cost * 100.0)
    } else {
        None
    };
    (pnl, pnl_percentage)
}

/// Normalize one raw record. Returns `None` when the record is noise: no market id,
/// no shares, or an unresolved market label.
pub fn normalize_position(record: &Value, fetched_at: DateTime<Utc>) -> Option<Position> {
    let rules = &POSITION_RULES;

    let market_id = resolve(record, rules.market_id)
        .map(coerce_string)
        .unwrap_or_default();
    if market_id.is_empty() {
        return None;
    }

    let shares = resolve(record, rules.shares).map(coerce_f64).unwrap_or(0.0);
    if shares <= 0.0 {
        return None;
    }

    let market_label = resolve(record, rules.market_label)
        .map(coerce_string)
        .unwrap_or_default();
    if is_placeholder_label(&market_label) {
        return None;
    }

    let outcome = parse_outcome(resolve(record, rules.outcome));

    let avg_price = resolve(record, rules.avg_price).map(|v| normalize_price(coerce_f64(v)));
    let current_price =
        resolve(record, rules.current_price).map(|v| normalize_price(coerce_f64(v)));

    let (pnl, pnl_percentage) = match (avg_price, current_price) {
        (Some(avg), Some(cur)) => {
            let (pnl, pct) = compute_pnl(outcome, shares, avg, cur);
            (Some(pnl), pct)
        }
        _ => (None, None),
    };

    let updated_at = parse_timestamp(resolve(record, rules.timestamp)).unwrap_or(fetched_at);

    Some(Position {
        market_id,
        market_label,
        outcome,
        shares,
        avg_price: avg_price.unwrap_or(0.0),
        current_price,
        pnl,
        pnl_percentage,
        updated_at,
    })
}

/// Normalize a full payload for one wallet, dropping rejected records
pub fn normalize_positions(records: &[Value], fetched_at: DateTime<Utc>) -> Vec<Position> {
    records
        .iter()
        .filter_map(|r| normalize_position(r, fetched_at))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_fraction_prices_scaled_to_percent() {
        let record = json!({
            "conditionId": "0xcond",
            "title": "Will it rain?",
            "outcome": "Yes",
            "size": 100.0,
            "avgPrice": 0.40,
            "curPrice": 0.55,
        });
        let pos = normalize_position(&record, now()).unwrap();
        assert_eq!(pos.market_id, "0xcond");
        assert!((pos.avg_price - 40.0).abs() < 1e-9);
        assert!((pos.current_price.unwrap() - 55.0).abs() < 1e-9);
        assert_eq!(pos.outcome, Outcome::Favorable);
        assert!((pos.pnl.unwrap() - 1500.0).abs() < 1e-9);
        assert!((pos.pnl_percentage.unwrap() - 37.5).abs() < 1e-9);
    }

    #[test]
    fn test_percentage_prices_kept() {
        let record = json!({
            "marketId": "m1",
            "question": "Q",
            "shares": "20",
            "averagePrice": "35",
            "currentPrice": 50,
        });
        let pos = normalize_position(&record, now()).unwrap();
        assert_eq!(pos.avg_price, 35.0);
        assert_eq!(pos.current_price, Some(50.0));
        assert_eq!(pos.shares, 20.0);
    }

    #[test]
    fn test_unfavorable_pnl_sign() {
        let record = json!({
            "conditionId": "c",
            "title": "T",
            "outcome": "No",
            "size": 10,
            "avgPrice": 0.60,
            "curPrice": 0.40,
        });
        let pos = normalize_position(&record, now()).unwrap();
        assert_eq!(pos.outcome, Outcome::Unfavorable);
        // (60 - 40) * 10
        assert!((pos.pnl.unwrap() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_pnl_without_current_price() {
        let record = json!({
            "conditionId": "c",
            "title": "T",
            "size": 10,
            "avgPrice": 0.60,
        });
        let pos = normalize_position(&record, now()).unwrap();
        assert!(pos.current_price.is_none());
        assert!(pos.pnl.is_none());
        assert!(pos.pnl_percentage.is_none());
        assert!((pos.best_price() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_avg_price_has_no_percentage() {
        let (pnl, pct) = compute_pnl(Outcome::Favorable, 10.0, 0.0, 50.0);
        assert_eq!(pnl, 500.0);
        assert!(pct.is_none());
    }

    #[test]
    fn test_drops_noise_records() {
        let empty_market = json!({"conditionId": "", "title": "T", "size": 5});
        let zero_shares = json!({"conditionId": "c", "title": "T", "size": 0});
        let negative = json!({"conditionId": "c", "title": "T", "size": -3});
        let bad_shares = json!({"conditionId": "c", "title": "T", "size": "lots"});
        let placeholder = json!({"conditionId": "c", "title": "Unknown Market", "size": 5});
        let no_label = json!({"conditionId": "c", "size": 5});

        for record in [empty_market, zero_shares, negative, bad_shares, placeholder, no_label] {
            assert!(normalize_position(&record, now()).is_none(), "{record}");
        }
    }

    #[test]
    fn test_null_key_falls_through_to_next_rule() {
        let record = json!({
            "conditionId": null,
            "market": "fallback-market",
            "title": "T",
            "size": 1,
        });
        let pos = normalize_position(&record, now()).unwrap();
        assert_eq!(pos.market_id, "fallback-market");
    }

    #[test]
    fn test_timestamp_parsing() {
        let secs = json!({"conditionId": "c", "title": "T", "size": 1, "timestamp": 1_650_000_000});
        let millis = json!({"conditionId": "c", "title": "T", "size": 1, "timestamp": 1_650_000_000_000i64});
        let rfc = json!({"conditionId": "c", "title": "T", "size": 1, "updatedAt": "2022-04-15T05:20:00Z"});
        let missing = json!({"conditionId": "c", "title": "T", "size": 1});

        let expected = Utc.timestamp_opt(1_650_000_000, 0).unwrap();
        assert_eq!(normalize_position(&secs, now()).unwrap().updated_at, expected);
        assert_eq!(normalize_position(&millis, now()).unwrap().updated_at, expected);
        assert_eq!(
            normalize_position(&rfc, now()).unwrap().updated_at,
            Utc.with_ymd_and_hms(2022, 4, 15, 5, 20, 0).unwrap()
        );
        assert_eq!(normalize_position(&missing, now()).unwrap().updated_at, now());
    }

    #[test]
    fn test_millis_cutoff_is_inclusive() {
        let at_cutoff = json!(1_000_000_000_000i64);
        assert_eq!(
            parse_timestamp(Some(&at_cutoff)),
            Utc.timestamp_millis_opt(1_000_000_000_000).single()
        );
        let below = json!(999_999_999_999i64);
        assert_eq!(
            parse_timestamp(Some(&below)),
            Utc.timestamp_opt(999_999_999_999, 0).single()
        );
    }

    #[test]
    fn test_outcome_index() {
        let idx1 = json!({"conditionId": "c", "title": "T", "size": 1, "outcomeIndex": 1});
        let idx0 = json!({"conditionId": "c", "title": "T", "size": 1, "outcomeIndex": 0});
        assert_eq!(normalize_position(&idx1, now()).unwrap().outcome, Outcome::Unfavorable);
        assert_eq!(normalize_position(&idx0, now()).unwrap().outcome, Outcome::Favorable);
    }

    #[test]
    fn test_normalize_positions_filters() {
        let records = vec![
            json!({"conditionId": "a", "title": "A", "size": 1}),
            json!({"conditionId": "b", "title": "B", "size": 0}),
            json!("not an object"),
        ];
        let positions = normalize_positions(&records, now());
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].market_id, "a");
    }

    #[test]
    fn test_price_boundary() {
        assert_eq!(normalize_price(1.0), 100.0);
        assert_eq!(normalize_price(0.0), 0.0);
        assert_eq!(normalize_price(1.5), 1.5);
        assert_eq!(normalize_price(72.0), 72.0);
    }
}
