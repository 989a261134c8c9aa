//! Runtime configuration: aggregates every crate's own config type into one
//! TOML-loadable tree, shared immutably (`Arc<RuntimeConfig>`) once loaded.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use updown_catalog::CatalogConfig;
use updown_feed::{FallbackFeedConfig, OracleFeedConfig, QuorumConfig, SpotFeedConfig};
use updown_persistence::RecorderConfig;
use updown_risk::RiskConfig;
use updown_strategy::{CalibrationMethod, StrategyConfig};
use updown_trader::TraderConfig;

/// Log output format (§6 `--log-format`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Duration-bearing oracle feed settings as they appear in TOML (plain
/// seconds), converted into `updown_feed::OracleFeedConfig` at startup —
/// mirrors the teacher's `WsConfig -> ConnectionConfig` split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleFeedSettings {
    pub url: String,
    pub oracle_topic: String,
    pub spot_topic: String,
    #[serde(default = "default_subscribe_filters")]
    pub subscribe_filters: String,
    #[serde(default = "default_spot_max_age_seconds")]
    pub spot_max_age_seconds: f64,
    #[serde(default = "default_price_staleness_threshold_seconds")]
    pub price_staleness_threshold_seconds: f64,
    #[serde(default = "default_reconnect_delay_min_seconds")]
    pub reconnect_delay_min_seconds: f64,
    #[serde(default = "default_reconnect_delay_max_seconds")]
    pub reconnect_delay_max_seconds: f64,
    #[serde(default = "default_reconnect_stability_seconds")]
    pub reconnect_stability_seconds: f64,
    #[serde(default = "default_ping_interval_seconds")]
    pub ping_interval_seconds: f64,
    #[serde(default = "default_pong_timeout_seconds")]
    pub pong_timeout_seconds: f64,
}

fn default_subscribe_filters() -> String {
    "{}".to_string()
}
fn default_spot_max_age_seconds() -> f64 {
    2.0
}
fn default_price_staleness_threshold_seconds() -> f64 {
    10.0
}
fn default_reconnect_delay_min_seconds() -> f64 {
    1.0
}
fn default_reconnect_delay_max_seconds() -> f64 {
    60.0
}
fn default_reconnect_stability_seconds() -> f64 {
    60.0
}
fn default_ping_interval_seconds() -> f64 {
    45.0
}
fn default_pong_timeout_seconds() -> f64 {
    10.0
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

impl OracleFeedSettings {
    pub fn into_config(self, symbol: String) -> OracleFeedConfig {
        OracleFeedConfig {
            url: self.url,
            symbol,
            oracle_topic: self.oracle_topic,
            spot_topic: self.spot_topic,
            subscribe_filters: self.subscribe_filters,
            spot_max_age_seconds: self.spot_max_age_seconds,
            price_staleness_threshold: secs(self.price_staleness_threshold_seconds),
            reconnect_delay_min: secs(self.reconnect_delay_min_seconds),
            reconnect_delay_max: secs(self.reconnect_delay_max_seconds),
            reconnect_stability_duration: secs(self.reconnect_stability_seconds),
            ping_interval: secs(self.ping_interval_seconds),
            pong_timeout: secs(self.pong_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotFeedSettings {
    pub url: String,
    pub feed_name: String,
    #[serde(default)]
    pub auth_frame: Option<serde_json::Value>,
    pub subscribe_frame: serde_json::Value,
    #[serde(default = "default_reconnect_delay_min_seconds")]
    pub reconnect_delay_min_seconds: f64,
    #[serde(default = "default_reconnect_delay_max_seconds")]
    pub reconnect_delay_max_seconds: f64,
    #[serde(default = "default_reconnect_stability_seconds")]
    pub reconnect_stability_seconds: f64,
    #[serde(default = "default_ping_interval_seconds")]
    pub ping_interval_seconds: f64,
    #[serde(default = "default_pong_timeout_seconds")]
    pub pong_timeout_seconds: f64,
}

impl SpotFeedSettings {
    pub fn into_config(self, symbol: String) -> SpotFeedConfig {
        SpotFeedConfig {
            url: self.url,
            feed_name: self.feed_name,
            symbol,
            auth_frame: self.auth_frame,
            subscribe_frame: self.subscribe_frame,
            reconnect_delay_min: secs(self.reconnect_delay_min_seconds),
            reconnect_delay_max: secs(self.reconnect_delay_max_seconds),
            reconnect_stability_duration: secs(self.reconnect_stability_seconds),
            ping_interval: secs(self.ping_interval_seconds),
            pong_timeout: secs(self.pong_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackFeedSettings {
    pub url: String,
    #[serde(default = "default_fallback_poll_interval_seconds")]
    pub poll_interval_seconds: f64,
    #[serde(default = "default_fallback_request_timeout_seconds")]
    pub request_timeout_seconds: f64,
}

fn default_fallback_poll_interval_seconds() -> f64 {
    5.0
}
fn default_fallback_request_timeout_seconds() -> f64 {
    3.0
}

impl FallbackFeedSettings {
    pub fn into_config(self, symbol: String) -> FallbackFeedConfig {
        FallbackFeedConfig {
            url: self.url,
            symbol,
            poll_interval: secs(self.poll_interval_seconds),
            request_timeout: secs(self.request_timeout_seconds),
        }
    }
}

/// Connection settings for the per-token order book WebSocket, which has no
/// dedicated feed-crate client of its own — `bot` drives the `updown_ws`
/// connection manager directly (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookFeedSettings {
    pub url: String,
    #[serde(default = "default_reconnect_delay_min_seconds")]
    pub reconnect_delay_min_seconds: f64,
    #[serde(default = "default_reconnect_delay_max_seconds")]
    pub reconnect_delay_max_seconds: f64,
    #[serde(default = "default_reconnect_stability_seconds")]
    pub reconnect_stability_seconds: f64,
    #[serde(default = "default_ping_interval_seconds")]
    pub ping_interval_seconds: f64,
    #[serde(default = "default_pong_timeout_seconds")]
    pub pong_timeout_seconds: f64,
    /// How long the book consumer debounces a resubscribe signal while the
    /// live token set keeps changing, before committing to it (§4.11).
    #[serde(default = "default_resubscribe_debounce_seconds")]
    pub resubscribe_debounce_seconds: f64,
}

fn default_resubscribe_debounce_seconds() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    pub symbol: String,
    pub oracle: OracleFeedSettings,
    #[serde(default)]
    pub spot: Option<SpotFeedSettings>,
    #[serde(default)]
    pub fallback: Option<FallbackFeedSettings>,
    pub book: BookFeedSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    #[serde(flatten)]
    pub catalog: CatalogConfig,
    pub fee_rate_base_url: String,
    #[serde(default = "default_token_cache_ttl_seconds")]
    pub token_cache_ttl_seconds: u64,
    #[serde(default = "default_fee_cache_ttl_seconds")]
    pub fee_cache_ttl_seconds: u64,
    #[serde(default = "default_catalog_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// How often (seconds of wall-clock granularity) the supervisor checks
    /// for a whole-minute boundary crossing that triggers a market refresh.
    #[serde(default = "default_market_refresh_poll_seconds")]
    pub market_refresh_poll_seconds: u64,
}

fn default_token_cache_ttl_seconds() -> u64 {
    300
}
fn default_fee_cache_ttl_seconds() -> u64 {
    300
}
fn default_catalog_request_timeout_seconds() -> u64 {
    10
}
fn default_market_refresh_poll_seconds() -> u64 {
    1
}

/// Which calibrator to build for the strategy's EV estimate, and where its
/// fitted parameters live on disk (§4.8, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationSettings {
    #[serde(default = "default_calibration_method")]
    pub method: CalibrationMethod,
    #[serde(default)]
    pub params_path: Option<String>,
    #[serde(default = "default_logistic_coef")]
    pub logistic_coef: f64,
    #[serde(default)]
    pub logistic_intercept: f64,
}

fn default_calibration_method() -> CalibrationMethod {
    CalibrationMethod::None
}
fn default_logistic_coef() -> f64 {
    1.0
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            method: default_calibration_method(),
            params_path: None,
            logistic_coef: default_logistic_coef(),
            logistic_intercept: 0.0,
        }
    }
}

/// Everything needed to drive one run of the agent, loaded once from TOML
/// (with `UPDOWN_`-prefixed environment overrides) and shared read-only
/// across every supervised task as `Arc<RuntimeConfig>` (§3.1, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub feeds: FeedsConfig,
    pub catalog: CatalogSettings,
    #[serde(default)]
    pub quorum: QuorumConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub calibration: CalibrationSettings,
    pub risk: RiskConfig,
    pub trader: TraderConfig,
    #[serde(default)]
    pub persistence: RecorderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Forces dry-run trading regardless of `trader.dry_run` (`--dry-run`).
    #[serde(default)]
    pub force_dry_run: bool,
}

impl RuntimeConfig {
    /// Loads from the `UPDOWN_CONFIG` env var or a default path, falling
    /// back to an error rather than silent defaults: this agent has no
    /// connectivity-free configuration that makes sense to trade on.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("UPDOWN_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
        Self::from_file(&config_path)
    }

    pub fn from_file(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            return Err(AppError::Config(format!("config file not found: {path}")));
        }
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("UPDOWN").separator("__"))
            .build()
            .map_err(|e| AppError::Config(format!("failed to read config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("failed to parse config: {e}")))
    }

    /// Fatal-on-error validation of every nested section (§3.1, §7).
    pub fn validate(&self) -> AppResult<()> {
        self.strategy
            .validate()
            .map_err(|e| AppError::Config(format!("strategy: {e}")))?;
        self.risk
            .validate()
            .map_err(|e| AppError::Config(format!("risk: {e}")))?;
        self.trader
            .validate()
            .map_err(|e| AppError::Config(format!("trader: {e}")))?;
        if self.feeds.symbol.trim().is_empty() {
            return Err(AppError::Config("feeds.symbol must not be empty".to_string()));
        }
        if self.catalog.catalog.base_url.trim().is_empty() {
            return Err(AppError::Config("catalog.base_url must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn dry_run(&self) -> bool {
        self.force_dry_run || self.trader.dry_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_is_forced_by_cli_flag_even_if_config_says_live() {
        let mut trader = TraderConfig::default();
        trader.dry_run = false;
        let config = RuntimeConfig {
            feeds: FeedsConfig {
                symbol: "BTC".to_string(),
                oracle: OracleFeedSettings {
                    url: "wss://example.invalid".to_string(),
                    oracle_topic: "oracle".to_string(),
                    spot_topic: "spot".to_string(),
                    subscribe_filters: default_subscribe_filters(),
                    spot_max_age_seconds: default_spot_max_age_seconds(),
                    price_staleness_threshold_seconds: default_price_staleness_threshold_seconds(),
                    reconnect_delay_min_seconds: default_reconnect_delay_min_seconds(),
                    reconnect_delay_max_seconds: default_reconnect_delay_max_seconds(),
                    reconnect_stability_seconds: default_reconnect_stability_seconds(),
                    ping_interval_seconds: default_ping_interval_seconds(),
                    pong_timeout_seconds: default_pong_timeout_seconds(),
                },
                spot: None,
                fallback: None,
                book: BookFeedSettings {
                    url: "wss://example.invalid/book".to_string(),
                    reconnect_delay_min_seconds: default_reconnect_delay_min_seconds(),
                    reconnect_delay_max_seconds: default_reconnect_delay_max_seconds(),
                    reconnect_stability_seconds: default_reconnect_stability_seconds(),
                    ping_interval_seconds: default_ping_interval_seconds(),
                    pong_timeout_seconds: default_pong_timeout_seconds(),
                    resubscribe_debounce_seconds: default_resubscribe_debounce_seconds(),
                },
            },
            catalog: CatalogSettings {
                catalog: CatalogConfig {
                    base_url: "https://example.invalid".to_string(),
                    ..Default::default()
                },
                fee_rate_base_url: "https://example.invalid".to_string(),
                token_cache_ttl_seconds: default_token_cache_ttl_seconds(),
                fee_cache_ttl_seconds: default_fee_cache_ttl_seconds(),
                request_timeout_seconds: default_catalog_request_timeout_seconds(),
                market_refresh_poll_seconds: default_market_refresh_poll_seconds(),
            },
            quorum: QuorumConfig::default(),
            strategy: StrategyConfig::default(),
            calibration: CalibrationSettings::default(),
            risk: RiskConfig::default(),
            trader,
            persistence: RecorderConfig::default(),
            logging: LoggingConfig::default(),
            force_dry_run: true,
        };
        assert!(config.dry_run());
    }
}
