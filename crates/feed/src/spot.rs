//! Spot feed client (§4.2): an optional authenticated WebSocket to a second
//! venue, used exclusively to feed quorum cross-checks. Never drives the
//! strategy directly.

use crate::parse::parse_bid_ask_frame;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use updown_core::{Price, PriceSource, PriceTick, TickMetadata};
use updown_ws::{ConnectionConfig, ConnectionManager, WsMessage, WsResult};

#[derive(Debug, Clone)]
pub struct SpotFeedConfig {
    pub url: String,
    pub feed_name: String,
    pub symbol: String,
    pub auth_frame: Option<serde_json::Value>,
    pub subscribe_frame: serde_json::Value,
    pub reconnect_delay_min: Duration,
    pub reconnect_delay_max: Duration,
    pub reconnect_stability_duration: Duration,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

pub struct SpotFeedClient {
    config: SpotFeedConfig,
    connection: ConnectionManager,
    rx: tokio::sync::Mutex<mpsc::Receiver<WsMessage>>,
}

impl SpotFeedClient {
    pub fn new(config: SpotFeedConfig) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let mut subscribe_frames = Vec::new();
        if let Some(auth) = &config.auth_frame {
            subscribe_frames.push(auth.clone());
        }
        subscribe_frames.push(config.subscribe_frame.clone());

        let conn_config = ConnectionConfig {
            url: config.url.clone(),
            subscribe_frames,
            reconnect_delay_min: config.reconnect_delay_min,
            reconnect_delay_max: config.reconnect_delay_max,
            reconnect_stability_duration: config.reconnect_stability_duration,
            ping_interval: config.ping_interval,
            pong_timeout: config.pong_timeout,
        };
        let connection = ConnectionManager::new(conn_config, tx);
        Self {
            config,
            connection,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    pub async fn run(&self) -> WsResult<()> {
        self.connection.run().await
    }

    /// Feed name this client reports to the quorum (§4.7 `update_spot(feed, ...)`).
    pub fn feed_name(&self) -> &str {
        &self.config.feed_name
    }

    /// Awaits and parses the next (bid, ask) frame into a mid-price tick.
    pub async fn next_tick(&self) -> Option<PriceTick> {
        let mut rx = self.rx.lock().await;
        loop {
            let msg = rx.recv().await?;
            let Some(value) = msg.as_value() else {
                continue;
            };
            match parse_bid_ask_frame(value, &self.config.symbol) {
                Ok(parsed) => {
                    let mid = (parsed.bid.inner() + parsed.ask.inner()) / Decimal::TWO;
                    let metadata =
                        TickMetadata::new(PriceSource::Spot, parsed.event_time_seconds);
                    return Some(PriceTick::new(
                        parsed.event_time_seconds,
                        Price::new(mid),
                        metadata,
                    ));
                }
                Err(e) => {
                    debug!(error = %e, feed = %self.config.feed_name, "dropped unparseable spot frame");
                    continue;
                }
            }
        }
    }
}
