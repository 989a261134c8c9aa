//! Nested-key price/timestamp extraction shared by the oracle and spot feed
//! parsers (§4.1, §4.2). The wire shape varies by deployment, so a frame is
//! searched depth-first for one of a closed set of known key names rather
//! than deserialized into a fixed struct.

use crate::error::{FeedError, FeedResult};
use rust_decimal::Decimal;
use serde_json::Value;
use updown_core::{normalize_timestamp, Price};

const PRICE_KEYS: &[&str] = &["value", "price", "px"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "ts", "time"];
const SYMBOL_KEYS: &[&str] = &["symbol", "coin", "asset"];
const BID_KEYS: &[&str] = &["bid", "bidPrice", "bestBid"];
const ASK_KEYS: &[&str] = &["ask", "askPrice", "bestAsk"];

/// Depth-first search for the first of `keys` present anywhere in `value`.
pub fn find_nested<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    match value {
        Value::Object(obj) => {
            for key in keys {
                if let Some(v) = obj.get(*key) {
                    return Some(v);
                }
            }
            obj.values().find_map(|v| find_nested(v, keys))
        }
        Value::Array(arr) => arr.iter().find_map(|v| find_nested(v, keys)),
        _ => None,
    }
}

fn value_to_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => n.as_f64().and_then(|f| Decimal::try_from(f).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// A parsed, symbol-validated, timestamp-normalized frame, prior to any
/// divergence metadata or source tagging.
pub struct ParsedFrame {
    pub symbol: String,
    pub price: Price,
    /// Normalized to seconds.
    pub event_time_seconds: f64,
}

/// Locates symbol/price/timestamp anywhere in `frame` and validates the
/// symbol matches `expected_symbol` (case-insensitive). Returns `None` for
/// frames missing any of the three (caller counts and logs the drop).
pub fn parse_price_frame(frame: &Value, expected_symbol: &str) -> FeedResult<ParsedFrame> {
    let symbol = find_nested(frame, SYMBOL_KEYS)
        .and_then(Value::as_str)
        .ok_or_else(|| FeedError::ParseError("missing symbol".to_string()))?;
    if !symbol.eq_ignore_ascii_case(expected_symbol) {
        return Err(FeedError::ParseError(format!(
            "symbol mismatch: expected {expected_symbol}, got {symbol}"
        )));
    }

    let price = find_nested(frame, PRICE_KEYS)
        .and_then(value_to_decimal)
        .ok_or_else(|| FeedError::ParseError("missing price".to_string()))?;

    let ts_raw = find_nested(frame, TIMESTAMP_KEYS)
        .and_then(value_to_f64)
        .ok_or_else(|| FeedError::ParseError("missing timestamp".to_string()))?;

    Ok(ParsedFrame {
        symbol: symbol.to_string(),
        price: Price::new(price),
        event_time_seconds: normalize_timestamp(ts_raw),
    })
}

/// A parsed (bid, ask) venue tick, prior to mid-price collapse.
pub struct ParsedBidAsk {
    pub symbol: String,
    pub bid: Price,
    pub ask: Price,
    pub event_time_seconds: f64,
}

/// Same nested-key-search discipline as `parse_price_frame`, but for a
/// (bid, ask) venue tick (§4.2 spot feed).
pub fn parse_bid_ask_frame(frame: &Value, expected_symbol: &str) -> FeedResult<ParsedBidAsk> {
    let symbol = find_nested(frame, SYMBOL_KEYS)
        .and_then(Value::as_str)
        .ok_or_else(|| FeedError::ParseError("missing symbol".to_string()))?;
    if !symbol.eq_ignore_ascii_case(expected_symbol) {
        return Err(FeedError::ParseError(format!(
            "symbol mismatch: expected {expected_symbol}, got {symbol}"
        )));
    }

    let bid = find_nested(frame, BID_KEYS)
        .and_then(value_to_decimal)
        .ok_or_else(|| FeedError::ParseError("missing bid".to_string()))?;
    let ask = find_nested(frame, ASK_KEYS)
        .and_then(value_to_decimal)
        .ok_or_else(|| FeedError::ParseError("missing ask".to_string()))?;
    let ts_raw = find_nested(frame, TIMESTAMP_KEYS)
        .and_then(value_to_f64)
        .ok_or_else(|| FeedError::ParseError("missing timestamp".to_string()))?;

    Ok(ParsedBidAsk {
        symbol: symbol.to_string(),
        bid: Price::new(bid),
        ask: Price::new(ask),
        event_time_seconds: normalize_timestamp(ts_raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_price_under_alternate_key_names() {
        let frame = json!({"coin": "BTC", "px": "50000.1", "ts": 1_700_000_000});
        let parsed = parse_price_frame(&frame, "BTC").unwrap();
        assert_eq!(parsed.price.to_string(), "50000.1");
        assert_eq!(parsed.event_time_seconds, 1_700_000_000.0);
    }

    #[test]
    fn normalizes_millisecond_timestamps() {
        let frame = json!({"symbol": "BTC", "value": 50000, "timestamp": 1_700_000_000_000i64});
        let parsed = parse_price_frame(&frame, "BTC").unwrap();
        assert_eq!(parsed.event_time_seconds, 1_700_000_000.0);
    }

    #[test]
    fn rejects_symbol_mismatch() {
        let frame = json!({"symbol": "ETH", "price": 3000, "time": 1_700_000_000});
        assert!(parse_price_frame(&frame, "BTC").is_err());
    }

    #[test]
    fn rejects_missing_price() {
        let frame = json!({"symbol": "BTC", "time": 1_700_000_000});
        assert!(parse_price_frame(&frame, "BTC").is_err());
    }

    #[test]
    fn parses_bid_ask_frame() {
        let frame = json!({"coin": "BTC", "bidPrice": "49999.5", "askPrice": "50000.5", "ts": 1_700_000_000});
        let parsed = parse_bid_ask_frame(&frame, "BTC").unwrap();
        assert_eq!(parsed.bid.to_string(), "49999.5");
        assert_eq!(parsed.ask.to_string(), "50000.5");
    }
}
