//! WebSocket wire frame types.
//!
//! This crate's message layer is intentionally thin: a raw JSON "bag" at the
//! boundary (see `WsMessage::Data`), projected into typed records by each
//! feed's own parser. Heartbeat frames are the only shape recognized here.

use serde::{Deserialize, Serialize};

/// Outgoing request: ping, subscribe, or unsubscribe.
///
/// Subscribe/unsubscribe payloads are venue-specific JSON values built by the
/// caller (e.g. the oracle feed's `{"action":"subscribe","subscriptions":[...]}`
/// or the book feed's `{"assets_ids":[...],"type":"market"}`) and passed
/// through unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WsRequest {
    Raw(serde_json::Value),
}

impl WsRequest {
    pub fn ping() -> Self {
        Self::Raw(serde_json::json!({"method": "ping"}))
    }

    pub fn subscribe(subscription: serde_json::Value) -> Self {
        Self::Raw(subscription)
    }
}

/// Application-level pong frame. Distinguished from a data frame by
/// `deny_unknown_fields` so an untagged enum can discriminate reliably.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PongMessage {
    pub channel: String,
}

impl PongMessage {
    pub fn is_pong(&self) -> bool {
        self.channel == "pong"
    }
}

/// Any inbound text frame: either a recognized pong, or an opaque data bag
/// that the feed-specific parser is responsible for interpreting.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WsMessage {
    Pong(PongMessage),
    Data(serde_json::Value),
}

impl WsMessage {
    pub fn is_pong(&self) -> bool {
        matches!(self, Self::Pong(p) if p.is_pong())
    }

    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Data(v) => Some(v),
            Self::Pong(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pong_is_recognized() {
        let msg: WsMessage = serde_json::from_str(r#"{"channel":"pong"}"#).unwrap();
        assert!(msg.is_pong());
    }

    #[test]
    fn data_frame_is_opaque_bag() {
        let msg: WsMessage =
            serde_json::from_str(r#"{"topic":"oracle","price":"50000.1"}"#).unwrap();
        assert!(!msg.is_pong());
        assert!(msg.as_value().is_some());
    }

    #[test]
    fn subscribe_request_passes_payload_through() {
        let req = WsRequest::subscribe(serde_json::json!({
            "assets_ids": ["t1", "t2"],
            "type": "market",
        }));
        let encoded = serde_json::to_string(&req).unwrap();
        assert!(encoded.contains("assets_ids"));
    }
}
