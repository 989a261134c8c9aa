//! Structured logging initialization.

use crate::error::TelemetryResult;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging, picking JSON vs. pretty output from the
/// `RUST_ENV` environment variable (`production` selects JSON).
pub fn init_logging() -> TelemetryResult<()> {
    let is_production = std::env::var("RUST_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);
    init_logging_with_format(is_production)
}

/// Initialize structured logging with an explicit format choice, overriding
/// the `RUST_ENV`-based default. `json = true` selects production-style JSON
/// output; otherwise human-readable pretty output is used.
pub fn init_logging_with_format(json: bool) -> TelemetryResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,updown=debug"));

    if json {
        // JSON format for production
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .init();
    } else {
        // Pretty format for development
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .init();
    }

    Ok(())
}
