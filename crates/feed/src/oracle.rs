//! Oracle feed client (§4.1): the execution-authoritative price stream, plus
//! a companion spot topic on the same connection used only to attach
//! divergence metadata to oracle ticks.

use crate::parse::parse_price_frame;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use updown_core::{normalize_timestamp, Price, PriceSource, PriceTick, TickMetadata};
use updown_ws::{ConnectionConfig, ConnectionManager, WsMessage, WsResult};

#[derive(Debug, Clone)]
pub struct OracleFeedConfig {
    pub url: String,
    pub symbol: String,
    pub oracle_topic: String,
    pub spot_topic: String,
    pub subscribe_filters: String,
    pub spot_max_age_seconds: f64,
    pub price_staleness_threshold: Duration,
    pub reconnect_delay_min: Duration,
    pub reconnect_delay_max: Duration,
    pub reconnect_stability_duration: Duration,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

struct SpotSample {
    price: Decimal,
    event_time_seconds: f64,
}

/// Connects, subscribes, and yields normalized oracle ticks one at a time.
pub struct OracleFeedClient {
    config: OracleFeedConfig,
    connection: Arc<ConnectionManager>,
    rx: tokio::sync::Mutex<mpsc::Receiver<WsMessage>>,
    last_spot: RwLock<Option<SpotSample>>,
    last_tick_at: RwLock<Option<Instant>>,
}

impl OracleFeedClient {
    pub fn new(config: OracleFeedConfig) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let conn_config = ConnectionConfig {
            url: config.url.clone(),
            subscribe_frames: vec![subscribe_frame(&config.oracle_topic, &config.subscribe_filters)],
            reconnect_delay_min: config.reconnect_delay_min,
            reconnect_delay_max: config.reconnect_delay_max,
            reconnect_stability_duration: config.reconnect_stability_duration,
            ping_interval: config.ping_interval,
            pong_timeout: config.pong_timeout,
        };
        let connection = Arc::new(ConnectionManager::new(conn_config, tx));
        Self {
            config,
            connection,
            rx: tokio::sync::Mutex::new(rx),
            last_spot: RwLock::new(None),
            last_tick_at: RwLock::new(None),
        }
    }

    /// Runs the reconnect loop; intended to be spawned alongside `next_tick`.
    pub async fn run(&self) -> WsResult<()> {
        self.connection.run().await
    }

    /// Awaits and parses the next oracle tick, skipping companion spot
    /// frames (after caching them for divergence attachment) and dropping
    /// unparseable or off-topic frames with a warning.
    pub async fn next_tick(&self) -> Option<PriceTick> {
        let mut rx = self.rx.lock().await;
        loop {
            let msg = rx.recv().await?;
            let Some(value) = msg.as_value() else {
                continue;
            };

            match topic_of(value) {
                Some(t) if t == self.config.spot_topic => {
                    self.observe_spot(value);
                    continue;
                }
                Some(t) if t == self.config.oracle_topic => {}
                other => {
                    warn!(topic = ?other, "dropped frame on unexpected topic");
                    continue;
                }
            }

            match parse_price_frame(value, &self.config.symbol) {
                Ok(parsed) => {
                    let mut metadata =
                        TickMetadata::new(PriceSource::Oracle, parsed.event_time_seconds);
                    self.attach_divergence(
                        &mut metadata,
                        parsed.event_time_seconds,
                        parsed.price.inner(),
                    );
                    *self.last_tick_at.write() = Some(Instant::now());
                    return Some(PriceTick::new(
                        parsed.event_time_seconds,
                        parsed.price,
                        metadata,
                    ));
                }
                Err(e) => {
                    debug!(error = %e, "dropped unparseable oracle frame");
                    continue;
                }
            }
        }
    }

    fn observe_spot(&self, value: &Value) {
        match parse_price_frame(value, &self.config.symbol) {
            Ok(parsed) => {
                *self.last_spot.write() = Some(SpotSample {
                    price: parsed.price.inner(),
                    event_time_seconds: parsed.event_time_seconds,
                });
            }
            Err(e) => debug!(error = %e, "dropped unparseable companion spot frame"),
        }
    }

    fn attach_divergence(&self, metadata: &mut TickMetadata, event_time: f64, oracle_price: Decimal) {
        let spot = self
            .last_spot
            .read()
            .as_ref()
            .map(|s| (s.price, s.event_time_seconds));
        let Some((spot_price, spot_ts)) = spot else {
            return;
        };
        if (event_time - spot_ts).abs() > self.config.spot_max_age_seconds {
            return;
        }
        let denom = spot_price.abs().max(Decimal::new(1, 8));
        let divergence = ((oracle_price - spot_price) / denom * Decimal::from(100)).abs();
        metadata.divergence_pct = Some(divergence);
        metadata.spot_price = Some(Price::new(spot_price));
    }

    /// Wall-clock age of the last produced tick, for the staleness warning
    /// (§4.1's `price_staleness_threshold`). `None` before the first tick.
    pub fn is_stale(&self) -> bool {
        match *self.last_tick_at.read() {
            Some(at) => at.elapsed() > self.config.price_staleness_threshold,
            None => false,
        }
    }
}

fn topic_of(value: &Value) -> Option<&str> {
    value.get("topic").and_then(Value::as_str)
}

fn subscribe_frame(topic: &str, filters: &str) -> Value {
    serde_json::json!({
        "action": "subscribe",
        "subscriptions": [{"topic": topic, "type": "*", "filters": filters}],
    })
}

/// Normalizes the oracle's own nested-timestamp convention ahead of
/// passing a raw timestamp to `PriceTick`/`TickMetadata` construction in
/// callers that don't go through `parse_price_frame` (e.g. REST fallbacks).
pub fn normalize_oracle_timestamp(raw: f64) -> f64 {
    normalize_timestamp(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_carries_topic_and_filters() {
        let frame = subscribe_frame("oracle.btc", "{}");
        assert_eq!(frame["action"], "subscribe");
        assert_eq!(frame["subscriptions"][0]["topic"], "oracle.btc");
    }

    #[test]
    fn normalize_oracle_timestamp_matches_core_rule() {
        assert_eq!(normalize_oracle_timestamp(1_700_000_000_000.0), 1_700_000_000.0);
    }
}
