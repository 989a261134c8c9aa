//! Quorum health fusion (§4.7): decides whether the oracle price is trusted
//! enough to trade on, by cross-checking it against a quorum of spot feeds.
//!
//! Mirrors the reason-code sequencing and divergence-timer semantics of the
//! original implementation's `QuorumHealth` almost exactly: staleness is
//! checked first, then quorum size, then sustained divergence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One feed's most recent observation.
#[derive(Debug, Clone, Copy)]
pub struct FeedSample {
    pub price: f64,
    pub payload_ts: f64,
    pub received_ts: f64,
}

pub const REASON_ORACLE_MISSING: &str = "CHAINLINK_MISSING";
pub const REASON_ORACLE_STALE: &str = "CHAINLINK_STALE";
pub const REASON_SPOT_QUORUM_UNAVAILABLE: &str = "SPOT_QUORUM_UNAVAILABLE";
pub const REASON_SPOT_DIVERGENCE_SUSTAINED: &str = "SPOT_DIVERGENCE_SUSTAINED";

#[derive(Debug, Clone)]
pub struct QuorumDecision {
    pub trading_allowed: bool,
    pub reason_codes: Vec<&'static str>,
    pub oracle_stale: bool,
    pub spot_quorum_divergence_pct: Option<f64>,
    pub feed_lag_seconds: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumConfig {
    pub oracle_max_lag_seconds: f64,
    pub spot_max_lag_seconds: f64,
    pub divergence_threshold_pct: f64,
    pub divergence_sustain_seconds: f64,
    pub min_spot_sources: usize,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            oracle_max_lag_seconds: 5.0,
            spot_max_lag_seconds: 5.0,
            divergence_threshold_pct: 0.5,
            divergence_sustain_seconds: 5.0,
            min_spot_sources: 2,
        }
    }
}

/// Tracks the freshest oracle sample and one sample per spot feed, and
/// evaluates trading-allowed status on demand.
pub struct QuorumHealth {
    config: QuorumConfig,
    oracle_sample: Option<FeedSample>,
    spot_samples: HashMap<String, FeedSample>,
    divergence_started_at: Option<f64>,
}

impl QuorumHealth {
    pub fn new(config: QuorumConfig) -> Self {
        Self {
            config,
            oracle_sample: None,
            spot_samples: HashMap::new(),
            divergence_started_at: None,
        }
    }

    pub fn update_oracle(&mut self, price: f64, payload_ts: f64, received_ts: Option<f64>) {
        self.oracle_sample = Some(FeedSample {
            price,
            payload_ts,
            received_ts: received_ts.unwrap_or_else(now_seconds),
        });
    }

    pub fn update_spot(
        &mut self,
        feed: &str,
        price: f64,
        payload_ts: f64,
        received_ts: Option<f64>,
    ) {
        self.spot_samples.insert(
            feed.to_string(),
            FeedSample {
                price,
                payload_ts,
                received_ts: received_ts.unwrap_or_else(now_seconds),
            },
        );
    }

    /// Evaluates trading-allowed status as of `now` (defaults to wall clock).
    pub fn evaluate(&mut self, now: Option<f64>) -> QuorumDecision {
        let now = now.unwrap_or_else(now_seconds);
        let mut reasons = Vec::new();
        let mut feed_lag_seconds = HashMap::new();

        let oracle_stale;
        match self.oracle_sample {
            None => {
                reasons.push(REASON_ORACLE_MISSING);
                oracle_stale = true;
            }
            Some(sample) => {
                let lag = (now - sample.payload_ts).max(0.0);
                feed_lag_seconds.insert("oracle".to_string(), lag);
                oracle_stale = lag > self.config.oracle_max_lag_seconds;
                if oracle_stale {
                    reasons.push(REASON_ORACLE_STALE);
                }
            }
        }

        let mut fresh_spot_prices: Vec<f64> = Vec::new();
        for (feed, sample) in &self.spot_samples {
            let lag = (now - sample.payload_ts).max(0.0);
            feed_lag_seconds.insert(feed.clone(), lag);
            if lag <= self.config.spot_max_lag_seconds {
                fresh_spot_prices.push(sample.price);
            }
        }

        let mut spot_quorum_divergence_pct = None;

        if fresh_spot_prices.len() < self.config.min_spot_sources {
            reasons.push(REASON_SPOT_QUORUM_UNAVAILABLE);
            self.divergence_started_at = None;
        } else if let Some(oracle) = self.oracle_sample {
            let spot_median = median(&mut fresh_spot_prices);
            if oracle.price != 0.0 {
                let divergence_pct = ((oracle.price - spot_median) / oracle.price).abs() * 100.0;
                spot_quorum_divergence_pct = Some(divergence_pct);

                if divergence_pct >= self.config.divergence_threshold_pct {
                    let started_at = *self.divergence_started_at.get_or_insert(now);
                    if now - started_at >= self.config.divergence_sustain_seconds {
                        reasons.push(REASON_SPOT_DIVERGENCE_SUSTAINED);
                    }
                } else {
                    self.divergence_started_at = None;
                }
            }
        }

        QuorumDecision {
            trading_allowed: reasons.is_empty(),
            reason_codes: reasons,
            oracle_stale,
            spot_quorum_divergence_pct,
            feed_lag_seconds,
        }
    }
}

fn now_seconds() -> f64 {
    Utc::now()
        .signed_duration_since(DateTime::<Utc>::from_timestamp(0, 0).unwrap())
        .num_milliseconds() as f64
        / 1000.0
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> QuorumConfig {
        QuorumConfig::default()
    }

    #[test]
    fn missing_oracle_blocks_trading() {
        let mut q = QuorumHealth::new(config());
        let decision = q.evaluate(Some(100.0));
        assert!(!decision.trading_allowed);
        assert!(decision.reason_codes.contains(&REASON_ORACLE_MISSING));
    }

    #[test]
    fn stale_oracle_blocks_trading() {
        let mut q = QuorumHealth::new(config());
        q.update_oracle(50000.0, 0.0, Some(0.0));
        let decision = q.evaluate(Some(100.0));
        assert!(decision.oracle_stale);
        assert!(decision.reason_codes.contains(&REASON_ORACLE_STALE));
    }

    #[test]
    fn insufficient_spot_sources_blocks_trading() {
        let mut q = QuorumHealth::new(config());
        q.update_oracle(50000.0, 100.0, Some(100.0));
        q.update_spot("venue_a", 50010.0, 100.0, Some(100.0));
        let decision = q.evaluate(Some(100.0));
        assert!(decision
            .reason_codes
            .contains(&REASON_SPOT_QUORUM_UNAVAILABLE));
    }

    #[test]
    fn quorum_met_with_low_divergence_allows_trading() {
        let mut q = QuorumHealth::new(config());
        q.update_oracle(50000.0, 100.0, Some(100.0));
        q.update_spot("venue_a", 50010.0, 100.0, Some(100.0));
        q.update_spot("venue_b", 49995.0, 100.0, Some(100.0));
        let decision = q.evaluate(Some(100.0));
        assert!(decision.trading_allowed);
        assert!(decision.spot_quorum_divergence_pct.unwrap() < config().divergence_threshold_pct);
    }

    #[test]
    fn sustained_divergence_blocks_after_sustain_window() {
        let mut q = QuorumHealth::new(config());
        q.update_oracle(50000.0, 100.0, Some(100.0));
        q.update_spot("venue_a", 51000.0, 100.0, Some(100.0));
        q.update_spot("venue_b", 51000.0, 100.0, Some(100.0));

        let first = q.evaluate(Some(100.0));
        assert!(first.trading_allowed, "divergence just started, not yet sustained");

        let second = q.evaluate(Some(106.0));
        assert!(!second.trading_allowed);
        assert!(second
            .reason_codes
            .contains(&REASON_SPOT_DIVERGENCE_SUSTAINED));
    }

    #[test]
    fn divergence_recovery_resets_timer() {
        let mut q = QuorumHealth::new(config());
        q.update_oracle(50000.0, 100.0, Some(100.0));
        q.update_spot("venue_a", 51000.0, 100.0, Some(100.0));
        q.update_spot("venue_b", 51000.0, 100.0, Some(100.0));
        q.evaluate(Some(100.0));

        q.update_oracle(50000.0, 102.0, Some(102.0));
        q.update_spot("venue_a", 50010.0, 102.0, Some(102.0));
        q.update_spot("venue_b", 49995.0, 102.0, Some(102.0));
        let recovered = q.evaluate(Some(102.0));
        assert!(recovered.trading_allowed);

        q.update_oracle(50000.0, 104.0, Some(104.0));
        q.update_spot("venue_a", 51000.0, 104.0, Some(104.0));
        q.update_spot("venue_b", 51000.0, 104.0, Some(104.0));
        let re_diverged = q.evaluate(Some(104.0));
        assert!(
            re_diverged.trading_allowed,
            "divergence timer should have restarted, not resumed"
        );
    }
}
