//! Fee-rate HTTP-backed TTL cache (§4.6): `warm(token_ids)` fetches any cold
//! token concurrently; only fresh entries are reported, expired entries
//! report "unknown" and callers must fall back to a flat bps.

use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Deserialize)]
struct FeeRateResponse {
    #[serde(alias = "feeRateBps")]
    fee_rate_bps: Option<u32>,
}

struct CacheEntry {
    fee_rate_bps: Option<u32>,
    updated_at: Instant,
}

pub struct FeeRateCache {
    http: reqwest::Client,
    base_url: String,
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

impl FeeRateCache {
    pub fn new(base_url: impl Into<String>, ttl: Duration, request_timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            ttl,
            entries: DashMap::new(),
        })
    }

    fn is_fresh(&self, token_id: &str) -> bool {
        self.entries
            .get(token_id)
            .is_some_and(|e| e.updated_at.elapsed() <= self.ttl)
    }

    /// Fetches any token in `token_ids` whose cache entry has expired or
    /// never existed, concurrently.
    pub async fn warm(&self, token_ids: impl IntoIterator<Item = impl Into<String>>) {
        let unique: HashSet<String> = token_ids.into_iter().map(Into::into).collect();
        let cold: Vec<String> = unique.into_iter().filter(|t| !self.is_fresh(t)).collect();
        if cold.is_empty() {
            return;
        }

        let fetches = cold.iter().map(|token_id| self.fetch_one(token_id));
        let results = join_all(fetches).await;
        let now = Instant::now();
        for (token_id, fee_rate_bps) in cold.into_iter().zip(results) {
            self.entries.insert(
                token_id,
                CacheEntry {
                    fee_rate_bps,
                    updated_at: now,
                },
            );
        }
    }

    async fn fetch_one(&self, token_id: &str) -> Option<u32> {
        let url = format!("{}/fee-rate", self.base_url.trim_end_matches('/'));
        let response = match self.http.get(&url).query(&[("token_id", token_id)]).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(%token_id, error = %e, "fee_rate_fetch_failed");
                return None;
            }
        };
        let parsed: FeeRateResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(%token_id, error = %e, "fee_rate_parse_failed");
                return None;
            }
        };
        parsed.fee_rate_bps
    }

    /// `None` means "unknown" — either never warmed or TTL-expired.
    pub fn get_fee_rate_bps(&self, token_id: &str) -> Option<u32> {
        if !self.is_fresh(token_id) {
            return None;
        }
        self.entries.get(token_id).and_then(|e| e.fee_rate_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwarmed_token_reports_unknown() {
        let cache = FeeRateCache::new("https://example.invalid", Duration::from_secs(60), Duration::from_secs(5))
            .unwrap();
        assert_eq!(cache.get_fee_rate_bps("token-a"), None);
    }
}
