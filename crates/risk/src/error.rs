//! Risk error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Risk state persist failed: {0}")]
    PersistFailed(String),

    #[error("Risk state load failed: {0}")]
    LoadFailed(String),

    #[error("Equity unavailable for live-mode risk check")]
    EquityUnavailable,
}

pub type RiskResult<T> = Result<T, RiskError>;
