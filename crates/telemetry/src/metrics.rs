//! Prometheus metrics for the hammer-window bot.
//!
//! Covers the full trading lifecycle: watch-mode entry, hammer attempts and
//! fills, guardrail rejections, feed staleness, trade outcomes, CLOB parse
//! drops, and the gauges the supervisor publishes for dashboards (current
//! best EV, daily realized PnL, risk/kill-switch/quorum state).
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_int_counter,
    register_int_gauge, CounterVec, Gauge, GaugeVec, IntCounter, IntGauge,
};

/// Number of watch-mode entries (rolling-window zscore crossed threshold).
pub static WATCH_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("updown_watch_events_total", "Number of watch triggers").unwrap()
});

/// Number of watch-mode trigger events that escalated toward a hammer attempt.
pub static WATCH_TRIGGERED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "updown_watch_triggered_total",
        "Number of watch mode trigger events"
    )
    .unwrap()
});

/// Number of hammer order attempts submitted to the venue.
pub static HAMMER_ATTEMPTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "updown_hammer_attempted_total",
        "Number of hammer order attempts"
    )
    .unwrap()
});

/// Number of hammer orders that filled.
pub static HAMMER_FILLED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("updown_hammer_filled_total", "Number of hammer order fills").unwrap()
});

/// Candidates rejected by the max-entry-price guardrail.
pub static REJECTED_MAX_ENTRY_PRICE: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "updown_rejected_max_entry_price_total",
        "Number of candidates rejected due to max entry price guardrail"
    )
    .unwrap()
});

/// Feed staleness events detected by the quorum monitor.
pub static STALE_FEED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "updown_stale_feed_total",
        "Number of stale feed/staleness events detected"
    )
    .unwrap()
});

/// Trades placed. Labels: status (filled/rejected/dry_run/timeout/error/...), side, horizon.
pub static TRADES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_trades_total",
        "Trades placed",
        &["status", "side", "horizon"]
    )
    .unwrap()
});

/// CLOB websocket payloads dropped during parsing. Labels: reason, event_type.
pub static CLOB_DROPPED_MESSAGES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_clob_dropped_messages_total",
        "Number of CLOB websocket payloads dropped during parsing",
        &["reason", "event_type"]
    )
    .unwrap()
});

/// Best EV at the most recent decision point.
pub static CURRENT_EV: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("updown_current_best_ev", "Best EV at decision point").unwrap()
});

/// Daily realized PnL in USD (UTC-rolling).
pub static DAILY_REALIZED_PNL: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "updown_daily_realized_pnl_usd",
        "Daily realized PnL in USD"
    )
    .unwrap()
});

/// 1 if trading is currently blocked by a risk cap, else 0.
pub static RISK_LIMIT_BLOCKED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "updown_risk_limit_blocked",
        "1 if trading is blocked by risk limits"
    )
    .unwrap()
});

/// 1 if the oracle/spot divergence kill-switch is active, else 0.
pub static KILL_SWITCH_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "updown_kill_switch_active",
        "1 if divergence kill-switch is active"
    )
    .unwrap()
});

/// Absolute percentage divergence between the oracle/chainlink price and the spot median.
pub static ORACLE_SPOT_DIVERGENCE_PCT: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "updown_oracle_spot_divergence_pct",
        "Absolute percentage divergence between chainlink and spot median"
    )
    .unwrap()
});

/// Lag between now and the latest payload timestamp, by feed.
pub static FEED_LAG_SECONDS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "updown_feed_lag_seconds",
        "Lag between now and latest payload timestamp by feed",
        &["feed"]
    )
    .unwrap()
});

/// 1 when quorum health permits trading, else 0.
pub static TRADING_ALLOWED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("updown_trading_allowed", "1 when quorum health permits trading").unwrap()
});

/// Convenience facade wrapping the static metric registry.
pub struct Metrics;

impl Metrics {
    pub fn watch_event() {
        WATCH_EVENTS.inc();
    }

    pub fn watch_triggered() {
        WATCH_TRIGGERED.inc();
    }

    pub fn hammer_attempted() {
        HAMMER_ATTEMPTED.inc();
    }

    pub fn hammer_filled() {
        HAMMER_FILLED.inc();
    }

    pub fn rejected_max_entry_price() {
        REJECTED_MAX_ENTRY_PRICE.inc();
    }

    pub fn stale_feed() {
        STALE_FEED.inc();
    }

    pub fn trade(status: &str, side: &str, horizon: &str) {
        TRADES.with_label_values(&[status, side, horizon]).inc();
    }

    pub fn clob_dropped_message(reason: &str, event_type: &str) {
        CLOB_DROPPED_MESSAGES
            .with_label_values(&[reason, event_type])
            .inc();
    }

    pub fn current_ev_set(ev: f64) {
        CURRENT_EV.set(ev);
    }

    pub fn daily_realized_pnl_set(pnl_usd: f64) {
        DAILY_REALIZED_PNL.set(pnl_usd);
    }

    pub fn risk_limit_blocked_set(blocked: bool) {
        RISK_LIMIT_BLOCKED.set(blocked as i64);
    }

    pub fn kill_switch_active_set(active: bool) {
        KILL_SWITCH_ACTIVE.set(active as i64);
    }

    pub fn oracle_spot_divergence_pct_set(pct: f64) {
        ORACLE_SPOT_DIVERGENCE_PCT.set(pct);
    }

    pub fn feed_lag_seconds_set(feed: &str, lag_seconds: f64) {
        FEED_LAG_SECONDS.with_label_values(&[feed]).set(lag_seconds);
    }

    pub fn trading_allowed_set(allowed: bool) {
        TRADING_ALLOWED.set(allowed as i64);
    }
}
