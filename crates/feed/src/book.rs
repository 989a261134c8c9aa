//! Book feed client (§4.4): a single WebSocket carrying per-token order book
//! events. Two event families exist in the wild — the newer flat
//! per-asset summary shape and an older `changes`-array shape — and this
//! parser accepts both, plus bare top-of-book snapshots and tick-size
//! updates.

use crate::book_state::BookState;
use crate::error::FeedError;
use rust_decimal::Decimal;
use serde_json::Value;
use updown_core::{Level, Price, Size};

const SNAPSHOT_EVENT_TYPES: &[&str] = &["book", "snapshot", "book_snapshot", "price_snapshot"];
const UPDATE_EVENT_TYPES: &[&str] = &["update", "book_update", "price_update"];

/// One fully parsed book event, ready to apply to a `BookState`.
#[derive(Debug, Clone, PartialEq)]
pub enum BookEvent {
    Snapshot {
        token_id: String,
        bids: Vec<Level>,
        asks: Vec<Level>,
    },
    Partial {
        token_id: String,
        bids: Option<Vec<Level>>,
        asks: Option<Vec<Level>>,
    },
    TickSizeChange {
        token_id: String,
        tick_size: Decimal,
    },
}

/// Why a frame or sub-event was dropped, for metrics/logging (§4.4: "unknown/
/// unparseable frames increment a drop counter labeled by reason and
/// event_type").
#[derive(Debug, Clone, PartialEq)]
pub struct DropReason {
    pub reason: &'static str,
    pub event_type: String,
}

/// Parses one WebSocket text frame, which may be a single event object or an
/// array of event objects, into zero or more book events plus any drops.
pub fn parse_frame(frame: &Value) -> (Vec<BookEvent>, Vec<DropReason>) {
    let mut events = Vec::new();
    let mut drops = Vec::new();

    let items: Vec<&Value> = match frame {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![frame],
        other => {
            drops.push(DropReason {
                reason: "message_not_object_or_array",
                event_type: type_name(other).to_string(),
            });
            return (events, drops);
        }
    };

    for item in items {
        match parse_event(item) {
            Ok(mut parsed) => events.append(&mut parsed),
            Err(drop) => drops.push(drop),
        }
    }
    (events, drops)
}

fn parse_event(event: &Value) -> Result<Vec<BookEvent>, DropReason> {
    let event_type = event
        .get("event_type")
        .or_else(|| event.get("type"))
        .and_then(Value::as_str)
        .ok_or_else(|| DropReason {
            reason: "missing_event_type",
            event_type: "unknown".to_string(),
        })?;

    if SNAPSHOT_EVENT_TYPES.contains(&event_type) {
        return parse_snapshot(event, event_type);
    }
    if event_type == "price_change" {
        return parse_price_change(event);
    }
    if UPDATE_EVENT_TYPES.contains(&event_type) {
        return parse_update(event, event_type);
    }
    if event_type == "tick_size_change" {
        return parse_tick_size_change(event);
    }

    Err(DropReason {
        reason: "unrecognized_event_type",
        event_type: event_type.to_string(),
    })
}

fn token_id_of(event: &Value) -> Option<String> {
    event
        .get("asset_id")
        .or_else(|| event.get("token_id"))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

fn parse_snapshot(event: &Value, event_type: &str) -> Result<Vec<BookEvent>, DropReason> {
    let token_id = token_id_of(event).ok_or_else(|| DropReason {
        reason: "missing_token_id",
        event_type: event_type.to_string(),
    })?;
    let bids = parse_levels(event.get("bids"));
    let asks = parse_levels(event.get("asks"));
    Ok(vec![BookEvent::Snapshot {
        token_id,
        bids,
        asks,
    }])
}

/// `changes: [{side, price, size}]`-shaped partial update: `update` /
/// `book_update` / `price_update` / legacy `price_change`.
fn parse_update(event: &Value, event_type: &str) -> Result<Vec<BookEvent>, DropReason> {
    if let Some(changes) = event.get("changes").and_then(Value::as_array) {
        return parse_changes(event, changes, event_type);
    }
    // Fallback: a partial frame carrying bids/asks arrays directly, with
    // only the sides present in the payload replaced.
    let token_id = token_id_of(event).ok_or_else(|| DropReason {
        reason: "missing_token_id",
        event_type: event_type.to_string(),
    })?;
    let bids = event.get("bids").map(|v| parse_levels(Some(v)));
    let asks = event.get("asks").map(|v| parse_levels(Some(v)));
    if bids.is_none() && asks.is_none() {
        return Err(DropReason {
            reason: "missing_sides",
            event_type: event_type.to_string(),
        });
    }
    Ok(vec![BookEvent::Partial {
        token_id,
        bids,
        asks,
    }])
}

fn parse_changes(
    event: &Value,
    changes: &[Value],
    event_type: &str,
) -> Result<Vec<BookEvent>, DropReason> {
    let token_id = token_id_of(event).ok_or_else(|| DropReason {
        reason: "missing_token_id",
        event_type: event_type.to_string(),
    })?;
    let mut bids = Vec::new();
    let mut asks = Vec::new();
    for change in changes {
        let side = change.get("side").and_then(Value::as_str).unwrap_or("");
        let Some(level) = parse_level(change) else {
            continue;
        };
        match side.to_ascii_lowercase().as_str() {
            "buy" | "bid" | "bids" => bids.push(level),
            "sell" | "ask" | "asks" => asks.push(level),
            _ => {}
        }
    }
    Ok(vec![BookEvent::Partial {
        token_id,
        bids: (!bids.is_empty()).then_some(bids),
        asks: (!asks.is_empty()).then_some(asks),
    }])
}

/// New-schema flat per-asset summary: `{asset_id, best_bid, best_ask,
/// best_bid_size, best_ask_size, timestamp}`, possibly batched as an array
/// under `price_changes` alongside the single `price_change` envelope.
fn parse_price_change(event: &Value) -> Result<Vec<BookEvent>, DropReason> {
    if let Some(batch) = event.get("price_changes").and_then(Value::as_array) {
        let mut out = Vec::with_capacity(batch.len());
        for item in batch {
            out.extend(parse_price_change_summary(item)?);
        }
        return Ok(out);
    }
    if event.get("changes").is_some() {
        return parse_update(event, "price_change");
    }
    parse_price_change_summary(event)
}

fn parse_price_change_summary(event: &Value) -> Result<Vec<BookEvent>, DropReason> {
    let token_id = token_id_of(event).ok_or_else(|| DropReason {
        reason: "missing_token_id",
        event_type: "price_change".to_string(),
    })?;
    let best_bid = event.get("best_bid").and_then(decimal_from_value);
    let best_ask = event.get("best_ask").and_then(decimal_from_value);
    let best_bid_size = event
        .get("best_bid_size")
        .and_then(decimal_from_value)
        .unwrap_or(Decimal::ONE);
    let best_ask_size = event
        .get("best_ask_size")
        .and_then(decimal_from_value)
        .unwrap_or(Decimal::ONE);

    if best_bid.is_none() && best_ask.is_none() {
        return Err(DropReason {
            reason: "missing_sides",
            event_type: "price_change".to_string(),
        });
    }

    let bids = best_bid
        .filter(|p| p.is_sign_positive() && !p.is_zero())
        .map(|p| vec![(Price::new(p), Size::new(best_bid_size))]);
    let asks = best_ask
        .filter(|p| p.is_sign_positive() && !p.is_zero())
        .map(|p| vec![(Price::new(p), Size::new(best_ask_size))]);

    Ok(vec![BookEvent::Partial {
        token_id,
        bids,
        asks,
    }])
}

fn parse_tick_size_change(event: &Value) -> Result<Vec<BookEvent>, DropReason> {
    let token_id = token_id_of(event).ok_or_else(|| DropReason {
        reason: "missing_token_id",
        event_type: "tick_size_change".to_string(),
    })?;
    let tick_size = event
        .get("new_tick_size")
        .or_else(|| event.get("tick_size"))
        .and_then(decimal_from_value)
        .ok_or_else(|| DropReason {
            reason: "missing_tick_size",
            event_type: "tick_size_change".to_string(),
        })?;
    Ok(vec![BookEvent::TickSizeChange {
        token_id,
        tick_size,
    }])
}

fn parse_levels(value: Option<&Value>) -> Vec<Level> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items.iter().filter_map(parse_level).collect()
}

/// A level as a `[price, size]` tuple or `{price, size}` object.
fn parse_level(value: &Value) -> Option<Level> {
    let (price, size) = match value {
        Value::Array(tuple) => (tuple.first()?, tuple.get(1)?),
        Value::Object(obj) => (obj.get("price")?, obj.get("size")?),
        _ => return None,
    };
    let price = decimal_from_value(price)?;
    let size = decimal_from_value(size)?;
    if !price.is_sign_positive() || price.is_zero() || !size.is_sign_positive() || size.is_zero()
    {
        return None;
    }
    Some((Price::new(price), Size::new(size)))
}

fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.as_f64().and_then(|f| Decimal::try_from(f).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Applies a parsed event to shared book state.
pub fn apply_event(state: &BookState, event: BookEvent) {
    match event {
        BookEvent::Snapshot {
            token_id,
            bids,
            asks,
        } => {
            state.apply_snapshot(&token_id, bids, asks);
        }
        BookEvent::Partial {
            token_id,
            bids,
            asks,
        } => {
            state.apply_partial(&token_id, bids, asks);
        }
        BookEvent::TickSizeChange {
            token_id,
            tick_size,
        } => {
            state.set_tick_size(&token_id, tick_size);
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Builds the book stream's subscribe frame for a token set (§6: `{"assets_ids":[…],"type":"market"}`).
pub fn subscribe_frame(token_ids: &[String]) -> Value {
    serde_json::json!({ "assets_ids": token_ids, "type": "market" })
}

impl From<DropReason> for FeedError {
    fn from(drop: DropReason) -> Self {
        FeedError::UnrecognizedEventType(format!("{} ({})", drop.event_type, drop.reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_snapshot_with_array_levels() {
        let frame = json!({
            "event_type": "book",
            "asset_id": "token-a",
            "bids": [["0.44", "100"]],
            "asks": [["0.45", "50"]],
        });
        let (events, drops) = parse_frame(&frame);
        assert!(drops.is_empty());
        assert_eq!(events.len(), 1);
        match &events[0] {
            BookEvent::Snapshot { token_id, bids, asks } => {
                assert_eq!(token_id, "token-a");
                assert_eq!(bids.len(), 1);
                assert_eq!(asks.len(), 1);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn parses_snapshot_with_object_levels() {
        let frame = json!({
            "event_type": "snapshot",
            "asset_id": "token-a",
            "bids": [{"price": "0.44", "size": "100"}],
            "asks": [{"price": "0.45", "size": "50"}],
        });
        let (events, _) = parse_frame(&frame);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn parses_legacy_changes_array() {
        let frame = json!({
            "event_type": "price_change",
            "asset_id": "token-a",
            "changes": [
                {"side": "buy", "price": "0.46", "size": "10"},
                {"side": "sell", "price": "0.47", "size": "20"},
            ],
        });
        let (events, drops) = parse_frame(&frame);
        assert!(drops.is_empty());
        match &events[0] {
            BookEvent::Partial { bids, asks, .. } => {
                assert!(bids.is_some());
                assert!(asks.is_some());
            }
            other => panic!("expected partial, got {other:?}"),
        }
    }

    #[test]
    fn parses_new_schema_price_change() {
        let frame = json!({
            "event_type": "price_change",
            "asset_id": "token-b",
            "best_bid": "0.52",
            "best_ask": "0.53",
            "best_bid_size": "10",
            "best_ask_size": "12",
            "timestamp": 1_700_000_000,
        });
        let (events, _) = parse_frame(&frame);
        assert_eq!(events.len(), 1);
        match &events[0] {
            BookEvent::Partial { token_id, bids, asks } => {
                assert_eq!(token_id, "token-b");
                assert!(bids.is_some());
                assert!(asks.is_some());
            }
            other => panic!("expected partial, got {other:?}"),
        }
    }

    #[test]
    fn parses_array_of_events() {
        let frame = json!([
            {"event_type": "book", "asset_id": "a", "bids": [], "asks": []},
            {"event_type": "tick_size_change", "asset_id": "a", "new_tick_size": "0.01"},
        ]);
        let (events, drops) = parse_frame(&frame);
        assert!(drops.is_empty());
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn drops_unrecognized_event_type() {
        let frame = json!({"event_type": "mystery", "asset_id": "token-z"});
        let (events, drops) = parse_frame(&frame);
        assert!(events.is_empty());
        assert_eq!(drops[0].reason, "unrecognized_event_type");
        assert_eq!(drops[0].event_type, "mystery");
    }

    #[test]
    fn drops_non_object_non_array_frame() {
        let frame = json!(1);
        let (events, drops) = parse_frame(&frame);
        assert!(events.is_empty());
        assert_eq!(drops[0].reason, "message_not_object_or_array");
    }

    #[test]
    fn drops_non_positive_levels() {
        let frame = json!({
            "event_type": "book",
            "asset_id": "token-a",
            "bids": [["0", "100"], ["0.44", "0"], ["0.45", "10"]],
            "asks": [],
        });
        let (events, _) = parse_frame(&frame);
        match &events[0] {
            BookEvent::Snapshot { bids, .. } => assert_eq!(bids.len(), 1),
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn applying_partial_to_state_preserves_other_side() {
        let state = BookState::new();
        let (snapshot_events, _) = parse_frame(&json!({
            "event_type": "book",
            "asset_id": "token-a",
            "bids": [["0.44", "100"]],
            "asks": [["0.45", "50"]],
        }));
        apply_event(&state, snapshot_events.into_iter().next().unwrap());

        let (partial_events, _) = parse_frame(&json!({
            "event_type": "update",
            "asset_id": "token-a",
            "bids": [["0.46", "100"]],
        }));
        apply_event(&state, partial_events.into_iter().next().unwrap());

        let top = state.get("token-a").unwrap();
        assert_eq!(top.bbo.bid_price.to_string(), "0.46");
        assert_eq!(top.bbo.ask_price.to_string(), "0.45");
    }
}
