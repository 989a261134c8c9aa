//! Trader configuration: Kelly-sizing parameters, submission timeout, and
//! the dry-run/venue switches (§4.10).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderConfig {
    #[serde(default = "default_risk_pct_per_trade")]
    pub risk_pct_per_trade: f64,
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: f64,
    #[serde(default = "default_max_risk_pct_cap")]
    pub max_risk_pct_cap: f64,

    #[serde(default = "default_order_submit_timeout_seconds")]
    pub order_submit_timeout_seconds: u64,

    #[serde(default)]
    pub dry_run: bool,

    pub venue_base_url: String,
    #[serde(default)]
    pub venue_api_key: Option<String>,
}

fn default_risk_pct_per_trade() -> f64 {
    0.01
}
fn default_kelly_fraction() -> f64 {
    0.25
}
fn default_max_risk_pct_cap() -> f64 {
    0.02
}
fn default_order_submit_timeout_seconds() -> u64 {
    10
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            risk_pct_per_trade: default_risk_pct_per_trade(),
            kelly_fraction: default_kelly_fraction(),
            max_risk_pct_cap: default_max_risk_pct_cap(),
            order_submit_timeout_seconds: default_order_submit_timeout_seconds(),
            dry_run: true,
            venue_base_url: String::new(),
            venue_api_key: None,
        }
    }
}

impl TraderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.risk_pct_per_trade <= 0.0 {
            return Err("risk_pct_per_trade must be positive".to_string());
        }
        if self.kelly_fraction < 0.0 || self.kelly_fraction > 1.0 {
            return Err("kelly_fraction must be in [0, 1]".to_string());
        }
        if self.max_risk_pct_cap < self.risk_pct_per_trade {
            return Err("max_risk_pct_cap must be >= risk_pct_per_trade".to_string());
        }
        if self.order_submit_timeout_seconds == 0 {
            return Err("order_submit_timeout_seconds must be at least 1".to_string());
        }
        if !self.dry_run && self.venue_base_url.is_empty() {
            return Err("venue_base_url must be set when dry_run is false".to_string());
        }
        Ok(())
    }
}
