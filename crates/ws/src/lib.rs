//! Generic reconnecting WebSocket transport shared by the oracle, spot, and
//! book feed clients.
//!
//! Provides:
//! - Automatic reconnection with exponential backoff and jitter
//! - Protocol-level ping/pong heartbeat with two-strikes termination
//! - Subscription-set tracking for token-set rolls
//! - A thin, opaque-bag message layer (feeds own their parsing)

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod subscription;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use error::{WsError, WsResult};
pub use message::{PongMessage, WsMessage, WsRequest};
pub use subscription::SubscriptionManager;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider. Must be called before any connection
/// is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
