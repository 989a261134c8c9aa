//! Risk ledger configuration: per-trade/daily/hourly/exposure caps, cooldown
//! thresholds, and the equity-cache refresh interval (§4.9).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_usd_per_trade: f64,

    pub max_daily_loss_usd: f64,
    #[serde(default)]
    pub max_daily_loss_pct: f64,

    #[serde(default = "default_max_trades_per_hour")]
    pub max_trades_per_hour: u32,

    pub max_open_exposure_per_market_usd: f64,
    #[serde(default)]
    pub max_open_exposure_per_market_pct: f64,

    pub max_total_open_exposure_usd: f64,
    #[serde(default)]
    pub max_total_open_exposure_pct: f64,

    #[serde(default = "default_cooldown_consecutive_losses")]
    pub cooldown_consecutive_losses: u32,
    #[serde(default = "default_cooldown_drawdown_pct")]
    pub cooldown_drawdown_pct: f64,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,

    /// Configured fallback equity (dry-run mode, or live mode when a fresh
    /// balance fetch has never succeeded).
    #[serde(default = "default_equity_usd")]
    pub equity_usd: f64,
    #[serde(default = "default_equity_refresh_seconds")]
    pub equity_refresh_seconds: i64,

    #[serde(default = "default_exposure_reconcile_every_n_trades")]
    pub exposure_reconcile_every_n_trades: u32,

    pub risk_state_path: String,
}

fn default_max_trades_per_hour() -> u32 {
    20
}
fn default_cooldown_consecutive_losses() -> u32 {
    5
}
fn default_cooldown_drawdown_pct() -> f64 {
    0.1
}
fn default_cooldown_minutes() -> i64 {
    30
}
fn default_equity_usd() -> f64 {
    1000.0
}
fn default_equity_refresh_seconds() -> i64 {
    60
}
fn default_exposure_reconcile_every_n_trades() -> u32 {
    20
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_usd_per_trade: 50.0,
            max_daily_loss_usd: 200.0,
            max_daily_loss_pct: 0.0,
            max_trades_per_hour: default_max_trades_per_hour(),
            max_open_exposure_per_market_usd: 300.0,
            max_open_exposure_per_market_pct: 0.0,
            max_total_open_exposure_usd: 1000.0,
            max_total_open_exposure_pct: 0.0,
            cooldown_consecutive_losses: default_cooldown_consecutive_losses(),
            cooldown_drawdown_pct: default_cooldown_drawdown_pct(),
            cooldown_minutes: default_cooldown_minutes(),
            equity_usd: default_equity_usd(),
            equity_refresh_seconds: default_equity_refresh_seconds(),
            exposure_reconcile_every_n_trades: default_exposure_reconcile_every_n_trades(),
            risk_state_path: "risk_state.json".to_string(),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_usd_per_trade <= 0.0 {
            return Err("max_usd_per_trade must be positive".to_string());
        }
        if self.max_daily_loss_usd <= 0.0 {
            return Err("max_daily_loss_usd must be positive".to_string());
        }
        if self.equity_refresh_seconds < 1 {
            return Err("equity_refresh_seconds must be at least 1".to_string());
        }
        if self.risk_state_path.is_empty() {
            return Err("risk_state_path must not be empty".to_string());
        }
        Ok(())
    }
}

/// Caps after applying the `min(absolute USD, pct * equity)` rule (§4.9).
/// A `0.0` pct field is treated as "no percentage constraint configured".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveRiskCaps {
    pub daily_loss_cap_usd: f64,
    pub exposure_per_market_cap_usd: f64,
    pub total_exposure_cap_usd: f64,
}

impl RiskConfig {
    pub fn effective_caps(&self, equity_usd: f64) -> EffectiveRiskCaps {
        EffectiveRiskCaps {
            daily_loss_cap_usd: pct_capped(self.max_daily_loss_usd, self.max_daily_loss_pct, equity_usd),
            exposure_per_market_cap_usd: pct_capped(
                self.max_open_exposure_per_market_usd,
                self.max_open_exposure_per_market_pct,
                equity_usd,
            ),
            total_exposure_cap_usd: pct_capped(
                self.max_total_open_exposure_usd,
                self.max_total_open_exposure_pct,
                equity_usd,
            ),
        }
    }
}

fn pct_capped(absolute_usd: f64, pct: f64, equity_usd: f64) -> f64 {
    if pct <= 0.0 {
        absolute_usd
    } else {
        absolute_usd.min(pct * equity_usd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(RiskConfig::default().validate().is_ok());
    }

    #[test]
    fn non_positive_trade_cap_rejected() {
        let config = RiskConfig {
            max_usd_per_trade: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn effective_caps_adjust_with_equity() {
        let config = RiskConfig {
            max_daily_loss_usd: 200.0,
            max_daily_loss_pct: 0.05,
            max_open_exposure_per_market_usd: 300.0,
            max_open_exposure_per_market_pct: 0.10,
            max_total_open_exposure_usd: 500.0,
            max_total_open_exposure_pct: 0.20,
            ..Default::default()
        };

        let low = config.effective_caps(1_000.0);
        assert_eq!(low.daily_loss_cap_usd, 50.0);
        assert_eq!(low.exposure_per_market_cap_usd, 100.0);
        assert_eq!(low.total_exposure_cap_usd, 200.0);

        let high = config.effective_caps(10_000.0);
        assert_eq!(high.daily_loss_cap_usd, 200.0);
        assert_eq!(high.exposure_per_market_cap_usd, 300.0);
        assert_eq!(high.total_exposure_cap_usd, 500.0);
    }

    #[test]
    fn zero_pct_disables_percentage_constraint() {
        let config = RiskConfig {
            max_daily_loss_usd: 200.0,
            max_daily_loss_pct: 0.0,
            ..Default::default()
        };
        assert_eq!(config.effective_caps(1.0).daily_loss_cap_usd, 200.0);
    }
}
