//! Candidate hammer-window entries and their EV breakdown.

use crate::fee::FeeMetadata;
use serde::{Deserialize, Serialize};
use updown_core::{Direction, MarketKey};

/// A scored hammer-window entry opportunity for one outcome token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub market_key: MarketKey,
    pub direction: Direction,
    pub token_id: String,
    /// Ask price at evaluation time (probability units, `[0, 1]`).
    pub ask: f64,
    /// Calibrated directional probability estimate.
    pub p_hat: f64,
    /// Probability the order fills, from the book feed's fill-probability
    /// hint or this state machine's own stability estimator.
    pub fill_prob: f64,
    /// Per-share taker fee cost.
    pub fee_cost: f64,
    /// Per-share slippage cost from walking the ask-side VWAP.
    pub slippage_cost: f64,
    /// `p_hat - ask - fee_cost - slippage_cost`: EV conditional on a fill.
    pub ev_exec: f64,
    /// `ev_exec * fill_prob`: fill-probability-weighted EV, the ranking key.
    pub ev: f64,
    /// `|current_price - horizon_start_price|`, the distance driving `p_hat`.
    pub d: f64,
    pub fee_metadata: FeeMetadata,
}

impl Candidate {
    pub fn notional(&self, size: f64) -> f64 {
        self.ask * size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use updown_core::Horizon;

    fn sample() -> Candidate {
        Candidate {
            market_key: MarketKey::new(Horizon::FiveMin, 0),
            direction: Direction::Up,
            token_id: "tok".to_string(),
            ask: 0.6,
            p_hat: 0.7,
            fill_prob: 0.9,
            fee_cost: 0.01,
            slippage_cost: 0.005,
            ev_exec: 0.7 - 0.6 - 0.01 - 0.005,
            ev: (0.7 - 0.6 - 0.01 - 0.005) * 0.9,
            d: 10.0,
            fee_metadata: FeeMetadata {
                fee_rate_bps: Some(100),
                fee_formula_exponent: 1.0,
                fee_cost_per_share: 0.01,
            },
        }
    }

    #[test]
    fn notional_scales_by_size() {
        let candidate = sample();
        assert_eq!(candidate.notional(2.0), 1.2);
    }
}
