//! Per-share taker fee cost for a binary Up/Down entry.
//!
//! Binary-option taker fees scale with the probability-shaped price: a fee
//! schedule quoted as a flat rate in bps is applied against `p * (1 - p)^a`
//! rather than notional, so fees are largest near a 50/50 price and taper
//! toward the extremes. `fee_formula_exponent` (`a`) is configurable per
//! `StrategyConfig`; `1.0` reproduces the reference formula.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fee calculation metadata for audit trail, mirroring what a candidate's
/// EV computation actually charged against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeMetadata {
    /// Fee rate applied, in basis points. `None` when no per-token rate was
    /// known and the flat `fee_bps` fallback was used instead.
    pub fee_rate_bps: Option<u32>,
    /// Exponent applied to `p * (1 - p)`.
    pub fee_formula_exponent: f64,
    /// Resulting per-share fee cost, in price units.
    pub fee_cost_per_share: f64,
}

/// Per-share taker fee cost at ask price `ask` (a probability in `(0, 1)`).
///
/// `fee_rate_bps` is clamped to avoid a degenerate cost at the price
/// extremes: `ask` is floored/ceiled to `[1e-9, 1 - 1e-9]` before use.
pub fn buy_fee_cost_per_share(ask: f64, fee_rate_bps: u32, fee_formula_exponent: f64) -> f64 {
    let fee_rate = fee_rate_bps as f64 / 10_000.0;
    let p = ask.clamp(1e-9, 1.0 - 1e-9);
    p * fee_rate * (p * (1.0 - p)).powf(fee_formula_exponent)
}

/// Resolves the effective per-share fee cost and its audit metadata for a
/// candidate: prefer a known per-token rate (formula-based cost), else
/// fall back to the config's flat `fee_bps` charged directly as cost.
pub fn resolve_fee_cost(
    ask: f64,
    known_fee_rate_bps: Option<u32>,
    flat_fee_bps: f64,
    fee_formula_exponent: f64,
) -> (f64, FeeMetadata) {
    match known_fee_rate_bps {
        Some(bps) => {
            let cost = buy_fee_cost_per_share(ask, bps, fee_formula_exponent);
            (
                cost,
                FeeMetadata {
                    fee_rate_bps: Some(bps),
                    fee_formula_exponent,
                    fee_cost_per_share: cost,
                },
            )
        }
        None => {
            let cost = flat_fee_bps / 10_000.0;
            (
                cost,
                FeeMetadata {
                    fee_rate_bps: None,
                    fee_formula_exponent,
                    fee_cost_per_share: cost,
                },
            )
        }
    }
}

pub fn fee_rate_decimal(fee_rate_bps: u32) -> Decimal {
    Decimal::from(fee_rate_bps) / Decimal::from(10_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_cost_peaks_near_midpoint() {
        let at_half = buy_fee_cost_per_share(0.5, 200, 1.0);
        let at_extreme = buy_fee_cost_per_share(0.97, 200, 1.0);
        assert!(at_half > at_extreme);
    }

    #[test]
    fn fee_cost_clamps_degenerate_prices() {
        let at_zero = buy_fee_cost_per_share(0.0, 200, 1.0);
        let at_one = buy_fee_cost_per_share(1.0, 200, 1.0);
        assert!(at_zero.is_finite());
        assert!(at_one.is_finite());
    }

    #[test]
    fn resolve_fee_cost_falls_back_to_flat_bps_when_unknown() {
        let (cost, meta) = resolve_fee_cost(0.6, None, 200.0, 1.0);
        assert_eq!(cost, 0.02);
        assert!(meta.fee_rate_bps.is_none());
    }

    #[test]
    fn resolve_fee_cost_uses_formula_when_known() {
        let (cost, meta) = resolve_fee_cost(0.6, Some(150), 200.0, 1.0);
        assert_eq!(meta.fee_rate_bps, Some(150));
        assert_eq!(cost, buy_fee_cost_per_share(0.6, 150, 1.0));
    }
}
