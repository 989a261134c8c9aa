//! Strategy state machine configuration.

use crate::calibration::CalibrationInput;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Configuration for the hammer-window strategy state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Rolling-window absolute return fraction that triggers watch mode
    /// (e.g. `0.003` = 30 bps of movement over `rolling_window_seconds`).
    pub threshold: f64,

    /// Width, in seconds, of the window before a horizon's `end_epoch`
    /// during which candidates may be picked ("the hammer window").
    pub hammer_secs: i64,

    /// Minimum `|current - horizon_start|` distance required before a
    /// candidate is considered at all. Filters out near-zero-distance
    /// markets where the binary outcome is close to a coin flip and the
    /// EV estimate is dominated by noise.
    pub d_min: f64,

    /// Reject any ask above this price (in probability/price units,
    /// i.e. `[0, 1]`); guards against buying at prices that leave no
    /// room for profit even in the best case.
    pub max_entry_price: f64,

    /// Flat taker fee in basis points, used when no per-token fee rate
    /// is known from the catalog or token metadata cache.
    pub fee_bps: f64,

    /// Exponent applied to `p * (1 - p)` in the per-share fee formula;
    /// `1.0` is the original linear-in-variance form. See `fee::buy_fee_cost_per_share`.
    #[serde(default = "default_fee_formula_exponent")]
    pub fee_formula_exponent: f64,

    /// Target notional (USD) used to size the VWAP walk when no explicit
    /// size is supplied to a candidate.
    #[serde(default = "default_expected_notional_usd")]
    pub expected_notional_usd: f64,

    /// Reserved for future depth-aware EV penalties; currently
    /// multiplies no term but is threaded through so a richer slippage
    /// model can be dropped in without a config shape change.
    #[serde(default = "default_depth_penalty_coeff")]
    pub depth_penalty_coeff: f64,

    /// A price tick older than this, by either the event clock or the
    /// wall clock, is rejected as stale (§4.1, §4.8).
    #[serde(default = "default_price_stale_after_seconds")]
    pub price_stale_after_seconds: f64,

    /// Which quantity is fed into the probability calibrator: the raw
    /// directional probability estimate, or the directional z-score.
    #[serde(default)]
    pub calibration_input: CalibrationInput,

    /// Width, in seconds, of the rolling 1-second price window used for
    /// the watch-mode return trigger.
    #[serde(default = "default_rolling_window_seconds")]
    pub rolling_window_seconds: i64,

    /// Additional watch-mode trigger: the latest 1-second return's
    /// z-score against the rolling return distribution. `0.0` disables
    /// this trigger and leaves only the `threshold` return trigger.
    #[serde(default)]
    pub watch_zscore_threshold: f64,

    /// Seconds after entering watch mode before it is force-cleared and
    /// the rolling window reset, even without a trigger-off event.
    #[serde(default = "default_watch_mode_expiry_seconds")]
    pub watch_mode_expiry_seconds: i64,
}

fn default_fee_formula_exponent() -> f64 {
    1.0
}

fn default_expected_notional_usd() -> f64 {
    1.0
}

fn default_depth_penalty_coeff() -> f64 {
    1.0
}

fn default_price_stale_after_seconds() -> f64 {
    2.0
}

fn default_rolling_window_seconds() -> i64 {
    60
}

fn default_watch_mode_expiry_seconds() -> i64 {
    60
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            threshold: 0.003,
            hammer_secs: 30,
            d_min: 0.0,
            max_entry_price: 0.97,
            fee_bps: 200.0,
            fee_formula_exponent: default_fee_formula_exponent(),
            expected_notional_usd: default_expected_notional_usd(),
            depth_penalty_coeff: default_depth_penalty_coeff(),
            price_stale_after_seconds: default_price_stale_after_seconds(),
            calibration_input: CalibrationInput::default(),
            rolling_window_seconds: default_rolling_window_seconds(),
            watch_zscore_threshold: 0.0,
            watch_mode_expiry_seconds: default_watch_mode_expiry_seconds(),
        }
    }
}

impl StrategyConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.threshold < 0.0 {
            return Err(format!("threshold ({}) must be non-negative", self.threshold));
        }
        if self.hammer_secs < 0 {
            return Err(format!("hammer_secs ({}) must be non-negative", self.hammer_secs));
        }
        if !(0.0..=1.0).contains(&self.max_entry_price) {
            return Err(format!(
                "max_entry_price ({}) must be within [0, 1]",
                self.max_entry_price
            ));
        }
        if self.rolling_window_seconds < 2 {
            return Err(format!(
                "rolling_window_seconds ({}) must be at least 2",
                self.rolling_window_seconds
            ));
        }
        if self.watch_mode_expiry_seconds < 1 {
            return Err(format!(
                "watch_mode_expiry_seconds ({}) must be at least 1",
                self.watch_mode_expiry_seconds
            ));
        }
        Ok(())
    }

    pub fn fee_rate(&self) -> Decimal {
        Decimal::try_from(self.fee_bps / 10_000.0).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(StrategyConfig::default().validate().is_ok());
    }

    #[test]
    fn negative_threshold_rejected() {
        let config = StrategyConfig {
            threshold: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn max_entry_price_out_of_range_rejected() {
        let config = StrategyConfig {
            max_entry_price: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rolling_window_too_small_rejected() {
        let config = StrategyConfig {
            rolling_window_seconds: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
