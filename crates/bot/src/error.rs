//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] updown_core::CoreError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] updown_ws::WsError),

    #[error("Feed error: {0}")]
    Feed(#[from] updown_feed::FeedError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] updown_catalog::CatalogError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] updown_strategy::StrategyError),

    #[error("Risk error: {0}")]
    Risk(#[from] updown_risk::RiskError),

    #[error("Trader error: {0}")]
    Trader(#[from] updown_trader::TraderError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] updown_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] updown_persistence::PersistenceError),

    #[error("Supervisor error: {0}")]
    Supervisor(String),

    #[error("Preflight error: {0}")]
    Preflight(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown requested")]
    Shutdown,
}

pub type AppResult<T> = Result<T, AppError>;
