//! Venue order submission: builds and posts a FOK order over HTTP, and
//! classifies failures into `{timeout, auth, allowance, network, error}`
//! so the trader can label its trades counter (§4.10 step 7).

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use updown_core::decimal::{Price, Size};

use crate::error::{TraderError, TraderResult};

#[derive(Debug, Clone, Serialize)]
pub struct OrderArgs {
    pub token_id: String,
    pub price: Price,
    pub size: Size,
    pub side: &'static str,
    pub time_in_force: &'static str,
}

impl OrderArgs {
    pub fn buy_fok(token_id: impl Into<String>, price: Price, size: Size) -> Self {
        Self {
            token_id: token_id.into(),
            price,
            size,
            side: "BUY",
            time_in_force: "FOK",
        }
    }
}

/// Adapter over a concrete CLOB venue. A trait object so tests can swap in a
/// stub that returns canned responses without touching the network.
#[async_trait]
pub trait VenueClient: Send + Sync {
    async fn create_and_post_order(&self, args: OrderArgs) -> TraderResult<Value>;
}

/// One of the five exception buckets the trader's trade metric is labeled
/// with on a submission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitFailure {
    Timeout,
    Auth,
    Allowance,
    Network,
    Error,
}

impl SubmitFailure {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Auth => "auth",
            Self::Allowance => "allowance",
            Self::Network => "network",
            Self::Error => "error",
        }
    }
}

/// Mirrors the venue's own exception-text sniffing: no typed error surface
/// is guaranteed, so classification is keyword-based on the error's
/// `Display` text.
pub fn classify_submit_exception(err: &TraderError) -> SubmitFailure {
    if matches!(err, TraderError::Timeout(_)) {
        return SubmitFailure::Timeout;
    }

    let text = err.to_string().to_lowercase();
    if text.contains("401")
        || text.contains("403")
        || text.contains("unauthorized")
        || text.contains("forbidden")
        || text.contains("invalid api")
        || text.contains("auth")
    {
        return SubmitFailure::Auth;
    }
    if text.contains("allowance") || text.contains("insufficient allowance") {
        return SubmitFailure::Allowance;
    }
    if text.contains("connection")
        || text.contains("network")
        || text.contains("dns")
        || text.contains("socket")
        || text.contains("refused")
        || text.contains("unreachable")
    {
        return SubmitFailure::Network;
    }
    SubmitFailure::Error
}

/// Real HTTP adapter against a CLOB-style venue exposing `POST {base}/order`.
pub struct HttpVenueClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpVenueClient {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> TraderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TraderError::Config(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl VenueClient for HttpVenueClient {
    async fn create_and_post_order(&self, args: OrderArgs) -> TraderResult<Value> {
        let url = format!("{}/order", self.base_url.trim_end_matches('/'));
        let mut request = self.http.post(&url).json(&args);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TraderError::Timeout(0)
            } else {
                TraderError::SubmissionFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, %url, "order submission rejected by venue");
            return Err(TraderError::SubmissionFailed(format!("HTTP {status}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| TraderError::SubmissionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classifies_as_timeout() {
        assert_eq!(
            classify_submit_exception(&TraderError::Timeout(10)),
            SubmitFailure::Timeout
        );
    }

    #[test]
    fn auth_keywords_classify_as_auth() {
        let err = TraderError::SubmissionFailed("401 unauthorized".to_string());
        assert_eq!(classify_submit_exception(&err), SubmitFailure::Auth);
    }

    #[test]
    fn allowance_keyword_classifies_as_allowance() {
        let err = TraderError::SubmissionFailed("insufficient allowance for spender".to_string());
        assert_eq!(classify_submit_exception(&err), SubmitFailure::Allowance);
    }

    #[test]
    fn network_keywords_classify_as_network() {
        let err = TraderError::SubmissionFailed("connection refused".to_string());
        assert_eq!(classify_submit_exception(&err), SubmitFailure::Network);
    }

    #[test]
    fn unrecognized_text_classifies_as_error() {
        let err = TraderError::SubmissionFailed("order book crossed".to_string());
        assert_eq!(classify_submit_exception(&err), SubmitFailure::Error);
    }
}
