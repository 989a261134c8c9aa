//! Persisted risk ledger state: daily/hourly counters, per-market exposure,
//! cooldown and drawdown tracking (§4.9).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use updown_core::Direction;

use crate::error::{RiskError, RiskResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub daily_realized_pnl: f64,
    pub trades_this_hour: u32,
    pub last_trade_hour: i32,
    pub last_pnl_reset_date_utc: String,
    pub open_exposure_usd_by_market: HashMap<String, f64>,
    pub total_open_notional_usd: f64,
    pub trades_since_reconcile: u32,
    pub cumulative_realized_pnl: f64,
    pub consecutive_losses: u32,
    pub peak_equity_usd: f64,
    pub cooldown_until_ts: i64,
}

impl Default for RiskState {
    fn default() -> Self {
        Self {
            daily_realized_pnl: 0.0,
            trades_this_hour: 0,
            last_trade_hour: -1,
            last_pnl_reset_date_utc: String::new(),
            open_exposure_usd_by_market: HashMap::new(),
            total_open_notional_usd: 0.0,
            trades_since_reconcile: 0,
            cumulative_realized_pnl: 0.0,
            consecutive_losses: 0,
            peak_equity_usd: 0.0,
            cooldown_until_ts: 0,
        }
    }
}

/// Builds a four-field exposure key: `token_id|horizon_label|direction|end_epoch`.
pub fn exposure_key(token_id: &str, horizon_label: &str, direction: Direction, end_epoch: i64) -> String {
    format!("{token_id}|{horizon_label}|{direction}|{end_epoch}")
}

/// A legacy three-field key (`token_id|horizon|direction`, no trailing
/// end-epoch) migrates by appending a `|legacy` suffix so it keeps its own
/// slot instead of colliding with a freshly-keyed exposure bucket, at the
/// cost of never being purged by the end-epoch sweep.
fn migrate_key(key: &str) -> String {
    if key.split('|').count() == 3 {
        format!("{key}|legacy")
    } else {
        key.to_string()
    }
}

impl RiskState {
    pub fn load(path: &Path) -> Self {
        let Ok(raw) = fs::read_to_string(path) else {
            return Self::default();
        };
        let Ok(payload): Result<Value, _> = serde_json::from_str(&raw) else {
            warn!(path = %path.display(), "risk_state_load_failed");
            return Self::default();
        };

        let mut state = Self {
            daily_realized_pnl: payload
                .get("daily_realized_pnl")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            trades_this_hour: payload
                .get("trades_this_hour")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            last_trade_hour: payload
                .get("last_trade_hour")
                .and_then(Value::as_i64)
                .unwrap_or(-1) as i32,
            last_pnl_reset_date_utc: payload
                .get("last_pnl_reset_date_utc")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            open_exposure_usd_by_market: Self::load_exposure_map(&payload),
            total_open_notional_usd: payload
                .get("total_open_notional_usd")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            trades_since_reconcile: payload
                .get("trades_since_reconcile")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            cumulative_realized_pnl: payload
                .get("cumulative_realized_pnl")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            consecutive_losses: payload
                .get("consecutive_losses")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            peak_equity_usd: payload
                .get("peak_equity_usd")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            cooldown_until_ts: payload
                .get("cooldown_until_ts")
                .and_then(Value::as_i64)
                .unwrap_or(0),
        };

        if state.total_open_notional_usd <= 0.0 && !state.open_exposure_usd_by_market.is_empty() {
            state.total_open_notional_usd = state.open_exposure_usd_by_market.values().sum();
        }
        state
    }

    fn load_exposure_map(payload: &Value) -> HashMap<String, f64> {
        let Some(raw) = payload.get("open_exposure_usd_by_market").and_then(Value::as_object) else {
            return HashMap::new();
        };

        let mut normalized = HashMap::new();
        for (key, value) in raw {
            let Some(notional) = value.as_f64() else {
                continue;
            };
            normalized.insert(migrate_key(key), notional.max(0.0));
        }
        normalized
    }

    pub fn persist(&self, path: &Path) -> RiskResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| RiskError::PersistFailed(e.to_string()))?;
            }
        }

        let tmp_path = path.with_extension("json.tmp");
        let payload = serde_json::to_vec(self).map_err(|e| RiskError::PersistFailed(e.to_string()))?;
        fs::write(&tmp_path, payload).map_err(|e| RiskError::PersistFailed(e.to_string()))?;
        fs::rename(&tmp_path, path).map_err(|e| RiskError::PersistFailed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_returns_default_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("risk_state.json");
        let state = RiskState::load(&path);
        assert_eq!(state.trades_this_hour, 0);
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("risk_state.json");

        let mut state = RiskState::default();
        state.daily_realized_pnl = -12.5;
        state.trades_this_hour = 3;
        state.open_exposure_usd_by_market.insert("t1|5m|UP|100".to_string(), 60.0);
        state.persist(&path).unwrap();

        let reloaded = RiskState::load(&path);
        assert_eq!(reloaded.daily_realized_pnl, -12.5);
        assert_eq!(reloaded.trades_this_hour, 3);
        assert_eq!(reloaded.open_exposure_usd_by_market.get("t1|5m|UP|100"), Some(&60.0));
    }

    #[test]
    fn legacy_three_field_keys_migrate_with_legacy_suffix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("risk_state.json");
        fs::write(
            &path,
            r#"{"daily_realized_pnl":0.0,"open_exposure_usd_by_market":{"t1|5m|BUY":42.0}}"#,
        )
        .unwrap();

        let state = RiskState::load(&path);
        assert_eq!(state.open_exposure_usd_by_market.get("t1|5m|BUY|legacy"), Some(&42.0));
        assert!(!state.open_exposure_usd_by_market.contains_key("t1|5m|BUY"));
    }

    #[test]
    fn corrupt_file_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("risk_state.json");
        fs::write(&path, "not json").unwrap();
        let state = RiskState::load(&path);
        assert_eq!(state.trades_this_hour, 0);
    }
}
