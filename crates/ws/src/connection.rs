//! Generic reconnecting WebSocket transport.
//!
//! Handles connection lifecycle, automatic reconnection with exponential
//! backoff and jitter, subscription restoration after reconnect, and
//! protocol-level ping/pong heartbeat monitoring (§4.1, shared by the oracle,
//! spot, and book feed clients). Inbound frames are forwarded to the caller
//! as an opaque `WsMessage::Data` bag; feed-specific parsing happens upstream.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::WsMessage;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Connection configuration shared by every feed client built on this crate.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    /// Minimum reconnect backoff.
    pub reconnect_delay_min: Duration,
    /// Maximum reconnect backoff.
    pub reconnect_delay_max: Duration,
    /// Backoff resets to `reconnect_delay_min` only after the connection has
    /// stayed up this long.
    pub reconnect_stability_duration: Duration,
    /// Interval between protocol-level pings.
    pub ping_interval: Duration,
    /// How long to wait for a pong before counting a failure.
    pub pong_timeout: Duration,
    /// Subscribe frames sent (in order) on connect and on every reconnect.
    pub subscribe_frames: Vec<serde_json::Value>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_delay_min: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(60),
            reconnect_stability_duration: Duration::from_secs(60),
            ping_interval: Duration::from_secs(45),
            pong_timeout: Duration::from_secs(10),
            subscribe_frames: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Drives one logical feed connection: connect, subscribe, stream frames,
/// reconnect with backoff on any error or heartbeat failure.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    heartbeat: Arc<HeartbeatManager>,
    message_tx: mpsc::Sender<WsMessage>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, message_tx: mpsc::Sender<WsMessage>) -> Self {
        let heartbeat = Arc::new(HeartbeatManager::new(
            config.ping_interval.as_millis() as u64,
            config.pong_timeout.as_millis() as u64,
        ));
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            heartbeat,
            message_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Run the reconnect loop forever (or until a fatal error). Returns only
    /// on a non-retryable condition.
    pub async fn run(&self) -> WsResult<()> {
        let mut attempt: u32 = 0;

        loop {
            *self.state.write() = if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            };

            let connected_at = Instant::now();
            match self.run_one_connection().await {
                Ok(()) => info!("WebSocket connection closed normally"),
                Err(e) => error!(?e, "WebSocket connection error"),
            }

            if connected_at.elapsed() >= self.config.reconnect_stability_duration {
                attempt = 0;
            } else {
                attempt = attempt.saturating_add(1);
            }

            let delay = self.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis(), "Reconnecting");
            tokio::time::sleep(delay).await;
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let min = self.config.reconnect_delay_min.as_millis() as u64;
        let max = self.config.reconnect_delay_max.as_millis() as u64;
        let exponent = attempt.min(10);
        let delay = min.saturating_mul(1u64 << exponent).min(max);
        Duration::from_millis(delay + jitter_ms())
    }

    async fn run_one_connection(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to WebSocket");
        let (ws_stream, _response) = connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        *self.state.write() = ConnectionState::Connected;
        info!("WebSocket connected");
        self.heartbeat.reset();

        for frame in &self.config.subscribe_frames {
            let text = serde_json::to_string(frame)?;
            write.send(Message::Text(text)).await?;
        }

        let mut ping_tick = tokio::time::interval(self.config.ping_interval);
        ping_tick.tick().await; // first tick fires immediately; discard

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.heartbeat.record_message();
                            self.handle_text(&text).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                _ = ping_tick.tick() => {
                    if self.heartbeat.is_timed_out() {
                        let failures = self.heartbeat.record_timeout();
                        if failures >= 2 {
                            error!("Two consecutive heartbeat failures, forcing reconnect");
                            return Err(WsError::HeartbeatTimeout);
                        }
                    }
                    write.send(Message::Ping(Vec::new())).await?;
                    self.heartbeat.record_ping();
                    debug!("Sent heartbeat ping");
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) -> WsResult<()> {
        let msg: WsMessage = serde_json::from_str(text)?;
        if msg.is_pong() {
            self.heartbeat.record_pong();
            return Ok(());
        }
        if self.message_tx.send(msg).await.is_err() {
            warn!("Message receiver dropped");
        }
        Ok(())
    }
}

fn jitter_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    (nanos % 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(45));
        assert_eq!(config.reconnect_delay_min, Duration::from_secs(1));
    }

    #[test]
    fn backoff_doubles_and_caps_at_max() {
        let config = ConnectionConfig {
            reconnect_delay_min: Duration::from_millis(100),
            reconnect_delay_max: Duration::from_millis(1000),
            ..Default::default()
        };
        let (tx, _rx) = mpsc::channel(1);
        let manager = ConnectionManager::new(config, tx);

        let d0 = manager.backoff_delay(0).as_millis();
        let d1 = manager.backoff_delay(1).as_millis();
        let d_big = manager.backoff_delay(20).as_millis();

        assert!(d0 >= 100 && d0 < 1100);
        assert!(d1 >= 200 && d1 < 1200);
        assert!(d_big <= 2000);
    }
}
