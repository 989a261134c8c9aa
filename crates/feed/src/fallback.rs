//! Fallback feed client (§4.3): HTTP polling liveness source, used only
//! while the primary oracle stream is stale. Never execution-authoritative.

use crate::error::{FeedError, FeedResult};
use crate::parse::parse_price_frame;
use std::time::Duration;
use updown_core::{PriceSource, PriceTick, TickMetadata};

#[derive(Debug, Clone)]
pub struct FallbackFeedConfig {
    pub url: String,
    pub symbol: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

pub struct FallbackFeedClient {
    config: FallbackFeedConfig,
    http: reqwest::Client,
}

impl FallbackFeedClient {
    pub fn new(config: FallbackFeedConfig) -> FeedResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(FeedError::Http)?;
        Ok(Self { config, http })
    }

    /// Polls once and parses the liveness price, tagged
    /// `PriceSource::SpotLivenessFallback`.
    pub async fn poll_once(&self) -> FeedResult<PriceTick> {
        let body: serde_json::Value = self
            .http
            .get(&self.config.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let parsed = parse_price_frame(&body, &self.config.symbol)?;
        let metadata = TickMetadata::new(PriceSource::SpotLivenessFallback, parsed.event_time_seconds);
        Ok(PriceTick::new(parsed.event_time_seconds, parsed.price, metadata))
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_construction_applies_timeout() {
        let config = FallbackFeedConfig {
            url: "https://example.invalid/spot".to_string(),
            symbol: "BTC".to_string(),
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(2),
        };
        let client = FallbackFeedClient::new(config).unwrap();
        assert_eq!(client.poll_interval(), Duration::from_secs(5));
    }
}
