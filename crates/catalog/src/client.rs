//! Market catalog HTTP client (§4.5): resolves `(horizon_minutes, start_epoch)`
//! into a validated `Market`, cached by slug until the market's end_epoch.

use crate::error::{CatalogError, CatalogResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};
use updown_core::{Horizon, Market, MarketKey};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub base_url: String,
    /// Categories whose markets are filtered from downstream use.
    pub banned_categories: HashSet<String>,
    /// Both must appear (case-insensitively) in question+description.
    pub underlying_keywords: (String, String),
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            banned_categories: HashSet::new(),
            underlying_keywords: ("btc".to_string(), "usd".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    slug: String,
    #[serde(rename = "startDate")]
    start_date: Option<String>,
    #[serde(rename = "startTime")]
    start_time: Option<String>,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
    #[serde(rename = "endTime")]
    end_time: Option<String>,
    #[serde(default)]
    outcomes: serde_json::Value,
    #[serde(rename = "clobTokenIds", default)]
    clob_token_ids: serde_json::Value,
    #[serde(default)]
    question: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    resolved: bool,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

struct CacheEntry {
    market: Market,
    end_epoch: i64,
}

/// HTTP client + slug-keyed expiry cache for market resolution.
pub struct MarketCatalogClient {
    http: reqwest::Client,
    config: CatalogConfig,
    cache: DashMap<String, CacheEntry>,
}

impl MarketCatalogClient {
    pub fn new(config: CatalogConfig) -> CatalogResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            config,
            cache: DashMap::new(),
        })
    }

    /// Resolves a market by horizon + start epoch, serving from cache until
    /// the market's end_epoch elapses.
    pub async fn get_market(&self, horizon: Horizon, start_epoch: i64) -> CatalogResult<Market> {
        let key = MarketKey::new(horizon, start_epoch);
        let slug = key.slug();
        let now = Utc::now().timestamp();

        if let Some(entry) = self.cache.get(&slug) {
            if entry.end_epoch > now {
                debug!(%slug, "catalog cache hit");
                return Ok(entry.market.clone());
            }
        }

        let market = self.fetch_market(&key, &slug).await?;
        self.cache.insert(
            slug.clone(),
            CacheEntry {
                market: market.clone(),
                end_epoch: market.end_epoch(),
            },
        );
        info!(%slug, up_token = %market.up_token_id, down_token = %market.down_token_id, "catalog market resolved");
        Ok(market)
    }

    async fn fetch_market(&self, key: &MarketKey, slug: &str) -> CatalogResult<Market> {
        let url = format!("{}/markets", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(&[("slug", slug)])
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CatalogError::Retryable(format!("rate limited: {slug}")));
        }
        if !status.is_success() {
            return Err(CatalogError::Invalid(format!("HTTP {status} for slug {slug}")));
        }

        let rows: Vec<CatalogRow> = response.json().await?;
        if rows.is_empty() {
            return Err(CatalogError::NotFound(slug.to_string()));
        }
        if rows.len() > 1 {
            return Err(CatalogError::Invalid(format!(
                "multiple markets returned for slug {slug}"
            )));
        }

        self.validate_and_build(&rows[0], key, slug)
    }

    fn validate_and_build(&self, row: &CatalogRow, key: &MarketKey, slug: &str) -> CatalogResult<Market> {
        if row.slug != slug {
            return Err(CatalogError::Invalid(format!(
                "slug mismatch: expected {slug} got {}",
                row.slug
            )));
        }
        if !key.is_aligned() {
            return Err(CatalogError::Invalid(format!(
                "start_epoch not aligned to {}m boundary: {}",
                key.horizon.minutes(),
                key.start_epoch
            )));
        }

        let start_raw = row
            .start_date
            .as_ref()
            .or(row.start_time.as_ref())
            .ok_or_else(|| CatalogError::Invalid("missing start time".to_string()))?;
        let end_raw = row
            .end_date
            .as_ref()
            .or(row.end_time.as_ref())
            .ok_or_else(|| CatalogError::Invalid("missing end time".to_string()))?;

        let start = parse_timestamp(start_raw)?;
        let end = parse_timestamp(end_raw)?;

        if start != key.start_epoch {
            return Err(CatalogError::Invalid(format!(
                "start time mismatch: expected {} got {start}",
                key.start_epoch
            )));
        }
        let expected_end = key.end_epoch();
        if end != expected_end {
            return Err(CatalogError::Invalid(format!(
                "invalid market duration: expected_end={expected_end} got={end}"
            )));
        }

        let now = Utc::now().timestamp();
        if end <= now {
            return Err(CatalogError::Invalid("market expired".to_string()));
        }
        if row.closed || row.resolved {
            return Err(CatalogError::Invalid("market not active".to_string()));
        }

        let haystack = format!("{} {}", row.question, row.description).to_lowercase();
        let (a, b) = &self.config.underlying_keywords;
        if !haystack.contains(&a.to_lowercase()) || !haystack.contains(&b.to_lowercase()) {
            return Err(CatalogError::Invalid("underlying does not match".to_string()));
        }

        let outcomes = parse_string_list(&row.outcomes)?;
        let clob_ids = parse_string_list(&row.clob_token_ids)?;
        let mut up_token_id = None;
        let mut down_token_id = None;
        for (outcome, token_id) in outcomes.iter().zip(clob_ids.iter()) {
            match outcome.to_lowercase().as_str() {
                "up" => up_token_id = Some(token_id.clone()),
                "down" => down_token_id = Some(token_id.clone()),
                _ => {}
            }
        }
        let (up_token_id, down_token_id) = match (up_token_id, down_token_id) {
            (Some(u), Some(d)) => (u, d),
            _ => {
                return Err(CatalogError::Invalid(format!(
                    "missing up/down outcomes for slug {slug}"
                )))
            }
        };

        let category = classify_category(row);
        if self.config.banned_categories.contains(&category) {
            return Err(CatalogError::Invalid(format!(
                "category {category} is banned"
            )));
        }

        Ok(Market {
            key: key.clone(),
            up_token_id,
            down_token_id,
            category,
        })
    }
}

fn classify_error_retryable(status: Option<StatusCode>) -> bool {
    matches!(status, Some(StatusCode::TOO_MANY_REQUESTS) | Some(StatusCode::REQUEST_TIMEOUT))
        || status.is_none()
}

fn classify_transport_error(err: reqwest::Error) -> CatalogError {
    if err.is_timeout() || classify_error_retryable(err.status()) {
        CatalogError::Retryable(err.to_string())
    } else {
        CatalogError::Http(err)
    }
}

fn classify_category(row: &CatalogRow) -> String {
    row.category
        .clone()
        .or_else(|| row.tags.as_ref().and_then(|t| t.first().cloned()))
        .unwrap_or_else(|| "uncategorized".to_string())
}

fn parse_timestamp(raw: &str) -> CatalogResult<i64> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).timestamp())
        .map_err(|e| CatalogError::Invalid(format!("unparseable timestamp {raw}: {e}")))
}

/// Outcomes/clobTokenIds may arrive as a native JSON array or as a
/// JSON-encoded list string.
fn parse_string_list(value: &serde_json::Value) -> CatalogResult<Vec<String>> {
    match value {
        serde_json::Value::Array(items) => Ok(items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_default())
            .collect()),
        serde_json::Value::String(s) => {
            let parsed: Vec<String> = serde_json::from_str(s)?;
            Ok(parsed)
        }
        _ => Err(CatalogError::Invalid("expected list or JSON-list string".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_encoded_list_string() {
        let value = serde_json::Value::String(r#"["Up","Down"]"#.to_string());
        let parsed = parse_string_list(&value).unwrap();
        assert_eq!(parsed, vec!["Up".to_string(), "Down".to_string()]);
    }

    #[test]
    fn parses_native_list() {
        let value = serde_json::json!(["Up", "Down"]);
        let parsed = parse_string_list(&value).unwrap();
        assert_eq!(parsed, vec!["Up".to_string(), "Down".to_string()]);
    }

    #[test]
    fn classifies_category_from_tags_fallback() {
        let row = CatalogRow {
            slug: "btc-updown-5m-300".to_string(),
            start_date: None,
            start_time: None,
            end_date: None,
            end_time: None,
            outcomes: serde_json::Value::Null,
            clob_token_ids: serde_json::Value::Null,
            question: String::new(),
            description: String::new(),
            closed: false,
            resolved: false,
            category: None,
            tags: Some(vec!["crypto".to_string()]),
        };
        assert_eq!(classify_category(&row), "crypto");
    }
}
