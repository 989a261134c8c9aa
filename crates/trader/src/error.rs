//! Trader error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraderError {
    #[error("invalid trader configuration: {0}")]
    Config(String),

    #[error("order submission timed out after {0}s")]
    Timeout(u64),

    #[error("order submission failed: {0}")]
    SubmissionFailed(String),

    #[error("venue client is not configured (missing base URL or credentials)")]
    VenueNotConfigured,
}

pub type TraderResult<T> = Result<T, TraderError>;
