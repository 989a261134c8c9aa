//! Risk ledger: reset/refresh bookkeeping, the pre-trade block check, and
//! post-trade PnL/exposure/cooldown updates (§4.9).

use std::path::PathBuf;

use chrono::{Datelike, TimeZone, Utc};
use serde_json::Value;
use tracing::{info, warn};
use updown_core::Direction;

use crate::config::RiskConfig;
use crate::state::{exposure_key, RiskState};

/// Result of a pre-trade risk check, naming which cap (if any) blocked it.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Allow,
    Block(&'static str),
}

impl RiskDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Summary of a completed trade fed into [`RiskLedger::record_post_trade`].
pub struct TradeOutcome<'a> {
    pub token_id: &'a str,
    pub horizon_label: &'a str,
    pub direction: Direction,
    pub end_epoch: i64,
    pub fallback_notional_usd: f64,
    /// Raw fill/settlement response to mine for `realized_pnl`-shaped fields.
    pub response: &'a Value,
}

pub struct RiskLedger {
    config: RiskConfig,
    state: RiskState,
    state_path: PathBuf,
    dry_run: bool,
    equity_cache_usd: f64,
    equity_cache_refreshed_at: Option<i64>,
    equity_refresh_failed: bool,
}

impl RiskLedger {
    pub fn new(config: RiskConfig, dry_run: bool) -> Self {
        let state_path = PathBuf::from(&config.risk_state_path);
        let state = RiskState::load(&state_path);
        let equity_cache_usd = config.equity_usd;
        Self {
            config,
            state,
            state_path,
            dry_run,
            equity_cache_usd,
            equity_cache_refreshed_at: None,
            equity_refresh_failed: false,
        }
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn equity_refresh_failed(&self) -> bool {
        self.equity_refresh_failed
    }

    fn persist(&self) {
        if let Err(e) = self.state.persist(&self.state_path) {
            warn!(error = %e, path = %self.state_path.display(), "risk_state_persist_failed");
        }
    }

    fn today_utc(now_ts: i64) -> String {
        Utc.timestamp_opt(now_ts, 0)
            .single()
            .map(|dt| format!("{:04}-{:02}-{:02}", dt.year(), dt.month(), dt.day()))
            .unwrap_or_default()
    }

    pub fn reset_daily_pnl_if_needed(&mut self, now_ts: i64) {
        let today = Self::today_utc(now_ts);
        if self.state.last_pnl_reset_date_utc == today {
            return;
        }
        self.state.daily_realized_pnl = 0.0;
        self.state.last_pnl_reset_date_utc = today.clone();
        self.persist();
        info!(reset_date_utc = %today, "risk_daily_pnl_reset");
    }

    pub fn refresh_hourly_counter(&mut self, now_ts: i64) {
        let now_hour = ((now_ts.div_euclid(3600)) % 24) as i32;
        if now_hour == self.state.last_trade_hour {
            return;
        }
        self.state.last_trade_hour = now_hour;
        self.state.trades_this_hour = 0;
        self.persist();
    }

    /// Drops exposure keys whose trailing `end_epoch` segment has passed;
    /// legacy-migrated keys (`...|legacy`) aren't parseable as an epoch and
    /// are left untouched.
    pub fn purge_expired_exposure_keys(&mut self, now_ts: i64) {
        let expired: Vec<String> = self
            .state
            .open_exposure_usd_by_market
            .keys()
            .filter(|key| {
                key.rsplit('|')
                    .next()
                    .and_then(|s| s.parse::<i64>().ok())
                    .is_some_and(|end_epoch| end_epoch <= now_ts)
            })
            .cloned()
            .collect();

        if expired.is_empty() {
            return;
        }
        for key in &expired {
            self.state.open_exposure_usd_by_market.remove(key);
        }
        self.state.total_open_notional_usd = self.state.open_exposure_usd_by_market.values().sum::<f64>().max(0.0);
        self.persist();
    }

    /// Refreshes the cached equity figure used for percentage-based caps.
    ///
    /// `live_fetch_usd` is the caller's best-effort live-balance query
    /// result (`None` on failure); in dry-run mode it's ignored in favor of
    /// the configured equity plus cumulative realized PnL. Returns the
    /// (possibly still-stale) cached value either way, per the fail-closed
    /// policy: a failed live refresh keeps the last known figure but flips
    /// `equity_refresh_failed`, which `check_risk` uses to block new live
    /// trades.
    pub fn refresh_equity_cache(&mut self, now_ts: i64, live_fetch_usd: Option<f64>, force: bool) -> f64 {
        if !force {
            if let Some(last) = self.equity_cache_refreshed_at {
                if now_ts - last < self.config.equity_refresh_seconds {
                    return self.equity_cache_usd;
                }
            }
        }

        let effective = if self.dry_run {
            Some(self.config.equity_usd + self.state.cumulative_realized_pnl)
        } else {
            live_fetch_usd
        };

        match effective {
            Some(value) if value > 0.0 => {
                self.equity_cache_usd = value;
                self.equity_refresh_failed = false;
            }
            _ => {
                self.equity_refresh_failed = true;
                if self.equity_cache_usd <= 0.0 {
                    self.equity_cache_usd = self.config.equity_usd;
                }
            }
        }
        self.equity_cache_refreshed_at = Some(now_ts);
        self.equity_cache_usd
    }

    fn cooldown_active(&self, now_ts: i64) -> bool {
        self.state.cooldown_until_ts > now_ts
    }

    /// The pre-trade block check (§4.9): caller should already have called
    /// `reset_daily_pnl_if_needed`/`refresh_hourly_counter`/
    /// `purge_expired_exposure_keys` for `now_ts`.
    pub fn check_risk(
        &self,
        now_ts: i64,
        notional_usd: f64,
        token_id: &str,
        horizon_label: &str,
        direction: Direction,
        end_epoch: i64,
    ) -> RiskDecision {
        if !self.dry_run && self.equity_refresh_failed {
            return RiskDecision::Block("equity_refresh_failed");
        }
        if notional_usd > self.config.max_usd_per_trade {
            return RiskDecision::Block("max_usd_per_trade");
        }

        let caps = self.config.effective_caps(self.equity_cache_usd);

        if self.state.daily_realized_pnl <= -caps.daily_loss_cap_usd.abs() {
            return RiskDecision::Block("max_daily_loss");
        }
        if self.cooldown_active(now_ts) {
            return RiskDecision::Block("cooldown_active");
        }
        if self.state.trades_this_hour >= self.config.max_trades_per_hour {
            return RiskDecision::Block("max_trades_per_hour");
        }

        let key = exposure_key(token_id, horizon_label, direction, end_epoch);
        let next_market_exposure = self.state.open_exposure_usd_by_market.get(&key).unwrap_or(&0.0) + notional_usd;
        if next_market_exposure > caps.exposure_per_market_cap_usd {
            return RiskDecision::Block("max_open_exposure_per_market");
        }
        if (self.state.total_open_notional_usd + notional_usd) > caps.total_exposure_cap_usd {
            return RiskDecision::Block("max_total_open_exposure");
        }

        RiskDecision::Allow
    }

    pub fn record_trade_attempt(&mut self, now_ts: i64) {
        self.refresh_hourly_counter(now_ts);
        self.state.trades_this_hour += 1;
        self.persist();
    }

    fn extract_realized_pnl(payload: &Value) -> f64 {
        match payload {
            Value::Array(items) => items.iter().map(Self::extract_realized_pnl).sum(),
            Value::Object(map) => {
                let mut pnl = 0.0;
                for key in ["realized_pnl", "realizedPnl", "pnl", "settlement_pnl", "settlementPnl"] {
                    if let Some(value) = map.get(key) {
                        pnl += value_as_f64(value).unwrap_or(0.0);
                    }
                }
                if let Some(fills) = map.get("fills") {
                    pnl += Self::extract_realized_pnl(fills);
                }
                if let Some(settlements) = map.get("settlements") {
                    pnl += Self::extract_realized_pnl(settlements);
                }
                pnl
            }
            _ => 0.0,
        }
    }

    /// Returns `(notional, all_fills_had_complete_details)`.
    fn extract_fill_notional(payload: &Value) -> (f64, bool) {
        let Some(fills) = payload.get("fills").and_then(Value::as_array) else {
            return (0.0, false);
        };
        if fills.is_empty() {
            return (0.0, false);
        }

        let mut notional = 0.0;
        let mut complete = true;
        for fill in fills {
            let Some(fill) = fill.as_object() else {
                complete = false;
                continue;
            };
            if let Some(explicit) = fill.get("notional").and_then(value_as_f64) {
                notional += explicit.abs();
                continue;
            }
            match (fill.get("price").and_then(value_as_f64), fill.get("size").and_then(value_as_f64)) {
                (Some(price), Some(size)) => notional += (price * size).abs(),
                _ => complete = false,
            }
        }
        (notional, complete)
    }

    fn apply_open_exposure_delta(&mut self, key: &str, delta_usd: f64) {
        if delta_usd == 0.0 {
            return;
        }
        let current = *self.state.open_exposure_usd_by_market.get(key).unwrap_or(&0.0);
        let updated = (current + delta_usd).max(0.0);
        if updated == 0.0 {
            self.state.open_exposure_usd_by_market.remove(key);
        } else {
            self.state.open_exposure_usd_by_market.insert(key.to_string(), updated);
        }
        self.state.total_open_notional_usd = self.state.open_exposure_usd_by_market.values().sum::<f64>().max(0.0);
    }

    /// `equity_now` is the freshest equity figure known to the caller
    /// (typically the just-refreshed equity cache), used for the
    /// peak-equity drawdown cooldown trigger.
    ///
    /// Returns `true` if the caller should trigger an exchange-position
    /// reconciliation (every Nth trade, or whenever a fill's details were
    /// incomplete).
    pub fn record_post_trade(&mut self, now_ts: i64, equity_now: f64, outcome: &TradeOutcome<'_>) -> bool {
        self.reset_daily_pnl_if_needed(now_ts);

        let realized_pnl = Self::extract_realized_pnl(outcome.response);
        if realized_pnl != 0.0 {
            self.state.daily_realized_pnl += realized_pnl;
            self.state.cumulative_realized_pnl += realized_pnl;
            if realized_pnl < 0.0 {
                self.state.consecutive_losses += 1;
            } else {
                self.state.consecutive_losses = 0;
            }
        }

        if equity_now > self.state.peak_equity_usd {
            self.state.peak_equity_usd = equity_now;
        }
        let drawdown_pct = if self.state.peak_equity_usd > 0.0 {
            ((self.state.peak_equity_usd - equity_now) / self.state.peak_equity_usd).max(0.0)
        } else {
            0.0
        };
        if self.state.consecutive_losses >= self.config.cooldown_consecutive_losses
            || drawdown_pct >= self.config.cooldown_drawdown_pct
        {
            self.state.cooldown_until_ts = now_ts + self.config.cooldown_minutes * 60;
            warn!(
                consecutive_losses = self.state.consecutive_losses,
                drawdown_pct, "risk_cooldown_triggered"
            );
        }

        let (filled_notional, complete_fill_details) = Self::extract_fill_notional(outcome.response);
        let applied_notional = if filled_notional > 0.0 {
            filled_notional
        } else {
            outcome.fallback_notional_usd
        };
        let key = exposure_key(outcome.token_id, outcome.horizon_label, outcome.direction, outcome.end_epoch);
        self.apply_open_exposure_delta(&key, applied_notional);

        self.state.trades_since_reconcile += 1;
        let needs_reconcile = !complete_fill_details
            || self.state.trades_since_reconcile >= self.config.exposure_reconcile_every_n_trades;
        if needs_reconcile {
            self.state.trades_since_reconcile = 0;
        }

        self.persist();
        needs_reconcile
    }

    /// Overwrites the exposure map with a freshly-fetched snapshot from the
    /// venue (called by the caller after `record_post_trade` signals a
    /// reconciliation is due).
    pub fn apply_reconciled_exposure(&mut self, exposure_usd_by_market: std::collections::HashMap<String, f64>) {
        self.state.total_open_notional_usd = exposure_usd_by_market.values().sum::<f64>().max(0.0);
        self.state.open_exposure_usd_by_market = exposure_usd_by_market;
        self.persist();
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> RiskConfig {
        RiskConfig {
            risk_state_path: dir.path().join("risk_state.json").to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn daily_loss_blocks_new_orders() {
        let dir = TempDir::new().unwrap();
        let mut ledger = RiskLedger::new(
            RiskConfig {
                max_daily_loss_usd: 100.0,
                equity_usd: 1_000.0,
                max_usd_per_trade: 100.0,
                ..config(&dir)
            },
            true,
        );
        ledger.refresh_equity_cache(0, None, true);
        ledger.state.daily_realized_pnl = -60.0;
        assert_eq!(
            ledger.check_risk(0, 10.0, "t1", "5m", Direction::Up, 300),
            RiskDecision::Allow
        );
        ledger.state.daily_realized_pnl = -100.0;
        assert!(!ledger.check_risk(0, 10.0, "t1", "5m", Direction::Up, 300).is_allowed());
    }

    #[test]
    fn exposure_caps_block_per_market_and_total() {
        let dir = TempDir::new().unwrap();
        let mut ledger = RiskLedger::new(
            RiskConfig {
                max_usd_per_trade: 100.0,
                max_open_exposure_per_market_usd: 100.0,
                max_total_open_exposure_usd: 150.0,
                equity_usd: 1_000.0,
                ..config(&dir)
            },
            true,
        );
        ledger.refresh_equity_cache(0, None, true);

        ledger.apply_open_exposure_delta(&exposure_key("t1", "5m", Direction::Up, 300), 90.0);
        assert!(!ledger.check_risk(0, 20.0, "t1", "5m", Direction::Up, 300).is_allowed());

        ledger.apply_open_exposure_delta(&exposure_key("t2", "15m", Direction::Up, 900), 50.0);
        assert!(!ledger.check_risk(0, 20.0, "t3", "30m", Direction::Up, 1800).is_allowed());
    }

    #[test]
    fn live_mode_fails_closed_when_equity_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut ledger = RiskLedger::new(
            RiskConfig {
                max_usd_per_trade: 100.0,
                ..config(&dir)
            },
            false,
        );
        ledger.refresh_equity_cache(0, None, true);
        assert!(!ledger.check_risk(0, 10.0, "t1", "5m", Direction::Up, 300).is_allowed());
    }

    #[test]
    fn successful_refresh_clears_failure_flag() {
        let dir = TempDir::new().unwrap();
        let mut ledger = RiskLedger::new(config(&dir), false);

        ledger.refresh_equity_cache(0, None, true);
        assert!(ledger.equity_refresh_failed());

        let refreshed = ledger.refresh_equity_cache(1, Some(1_500.0), true);
        assert_eq!(refreshed, 1_500.0);
        assert!(!ledger.equity_refresh_failed());
    }

    #[test]
    fn trader_resets_daily_pnl_on_utc_rollover() {
        let dir = TempDir::new().unwrap();
        let mut ledger = RiskLedger::new(config(&dir), true);
        ledger.state.daily_realized_pnl = -100.0;
        ledger.state.last_pnl_reset_date_utc = "2020-01-01".to_string();

        ledger.reset_daily_pnl_if_needed(1_700_000_000);
        assert_eq!(ledger.state.daily_realized_pnl, 0.0);
        assert_ne!(ledger.state.last_pnl_reset_date_utc, "2020-01-01");
    }

    #[test]
    fn extract_realized_pnl_from_nested_response() {
        let response = json!({
            "status": "ok",
            "realized_pnl": "2.5",
            "fills": [{"pnl": -1.0}, {"realizedPnl": "0.75"}],
            "settlements": [{"settlement_pnl": "1.25"}],
        });
        assert_eq!(RiskLedger::extract_realized_pnl(&response), 3.5);
    }

    #[test]
    fn post_trade_applies_exposure_and_triggers_reconcile_on_incomplete_fill() {
        let dir = TempDir::new().unwrap();
        let mut ledger = RiskLedger::new(config(&dir), true);
        let response = json!({ "fills": [{"price": 0.5, "size": "bad"}] });
        let outcome = TradeOutcome {
            token_id: "t1",
            horizon_label: "5m",
            direction: Direction::Up,
            end_epoch: 300,
            fallback_notional_usd: 20.0,
            response: &response,
        };
        let needs_reconcile = ledger.record_post_trade(0, 1_000.0, &outcome);
        assert!(needs_reconcile);
        assert_eq!(
            ledger.state.open_exposure_usd_by_market.get(&exposure_key("t1", "5m", Direction::Up, 300)),
            Some(&20.0)
        );
    }

    #[test]
    fn cooldown_triggers_after_consecutive_losses() {
        let dir = TempDir::new().unwrap();
        let mut ledger = RiskLedger::new(
            RiskConfig {
                cooldown_consecutive_losses: 2,
                cooldown_minutes: 10,
                ..config(&dir)
            },
            true,
        );
        let losing_fill = json!({ "fills": [{"price": 1.0, "size": 1.0, "pnl": -5.0}] });
        let outcome = TradeOutcome {
            token_id: "t1",
            horizon_label: "5m",
            direction: Direction::Up,
            end_epoch: 300,
            fallback_notional_usd: 5.0,
            response: &losing_fill,
        };
        ledger.record_post_trade(0, 1_000.0, &outcome);
        assert!(!ledger.cooldown_active(0));
        ledger.record_post_trade(1, 1_000.0, &outcome);
        assert!(ledger.cooldown_active(1));
    }

    #[test]
    fn purge_drops_only_expired_non_legacy_keys() {
        let dir = TempDir::new().unwrap();
        let mut ledger = RiskLedger::new(config(&dir), true);
        ledger.apply_open_exposure_delta(&exposure_key("t1", "5m", Direction::Up, 100), 10.0);
        ledger.apply_open_exposure_delta(&exposure_key("t2", "5m", Direction::Up, 999_999), 10.0);
        ledger.state.open_exposure_usd_by_market.insert("t3|5m|UP|legacy".to_string(), 10.0);

        ledger.purge_expired_exposure_keys(500);

        assert!(!ledger.state.open_exposure_usd_by_market.contains_key(&exposure_key("t1", "5m", Direction::Up, 100)));
        assert!(ledger.state.open_exposure_usd_by_market.contains_key(&exposure_key("t2", "5m", Direction::Up, 999_999)));
        assert!(ledger.state.open_exposure_usd_by_market.contains_key("t3|5m|UP|legacy"));
    }
}
