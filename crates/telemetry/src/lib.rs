//! Prometheus metrics and structured logging for the hammer-window bot.
//!
//! Provides observability from Day 1:
//! - Prometheus metrics for watch/hammer signals, trades, and risk/quorum state
//! - Structured JSON logging with tracing

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, init_logging_with_format};
pub use metrics::Metrics;
