//! Catalog error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("No market found for slug {0}")]
    NotFound(String),

    #[error("Invalid market row: {0}")]
    Invalid(String),

    /// Rate-limited or timed out; the supervisor should retry neighboring
    /// epochs before giving up (§4.5).
    #[error("Retryable catalog error: {0}")]
    Retryable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
