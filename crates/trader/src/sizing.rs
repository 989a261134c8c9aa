//! Kelly-capped position sizing (§4.10 steps 2-4): pure functions, no I/O.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use updown_core::decimal::{Price, Size};
use updown_core::market::TokenConstraints;

/// Keeps the effective cost strictly inside (0, 1) so the Kelly ratio below
/// never divides by zero or yields a suggestion outside [0, 1].
const EPSILON: f64 = 1e-6;

/// `clip(ask + fee_cost + slippage_cost, [eps, 1-eps])`.
pub fn effective_cost(ask: f64, fee_cost: f64, slippage_cost: f64) -> f64 {
    (ask + fee_cost + slippage_cost).clamp(EPSILON, 1.0 - EPSILON)
}

/// `k = max(0, min(1, (p_hat - cost) / (1 - cost)))`, or 0 without a p_hat.
pub fn kelly_suggestion(p_hat: Option<f64>, cost: f64) -> f64 {
    let Some(p_hat) = p_hat else {
        return 0.0;
    };
    ((p_hat - cost) / (1.0 - cost)).clamp(0.0, 1.0)
}

/// `min(max_risk_pct_cap, max(risk_pct_per_trade, k * kelly_fraction))`.
pub fn dynamic_risk_pct(
    risk_pct_per_trade: f64,
    kelly_fraction: f64,
    kelly_suggestion: f64,
    max_risk_pct_cap: f64,
) -> f64 {
    let k_scaled = kelly_suggestion * kelly_fraction;
    risk_pct_per_trade.max(k_scaled).min(max_risk_pct_cap)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizedOrder {
    pub price: Price,
    pub size: Size,
    pub notional_usd: f64,
}

/// Steps 3-4: size down to the lot step, round the price up to the tick,
/// then bump an under-minimum size up to exactly `min_order_size` once.
pub fn size_order(
    equity_usd: f64,
    dynamic_risk_pct: f64,
    max_usd_per_trade: f64,
    ask: Price,
    constraints: &TokenConstraints,
) -> SizedOrder {
    let quote_usd = max_usd_per_trade.min(equity_usd * dynamic_risk_pct).max(0.0);
    let price = ask.round_up_to_tick(constraints.tick_size);

    let quote = Decimal::try_from(quote_usd).unwrap_or(Decimal::ZERO);
    let mut size = if ask.is_positive() {
        Size::new(quote / ask.inner()).round_to_lot(constraints.min_order_size)
    } else {
        Size::ZERO
    };

    if size < constraints.min_order_size {
        size = constraints.min_order_size;
    }

    let notional_usd = size.notional(price).to_f64().unwrap_or(0.0);

    SizedOrder {
        price,
        size,
        notional_usd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn constraints() -> TokenConstraints {
        TokenConstraints {
            tick_size: Price::new(dec!(0.001)),
            min_order_size: Size::new(dec!(0.1)),
            fee_rate_bps: None,
        }
    }

    #[test]
    fn effective_cost_clips_to_open_interval() {
        assert!(effective_cost(1.0, 0.0, 0.0) < 1.0);
        assert!(effective_cost(-1.0, 0.0, 0.0) > 0.0);
    }

    #[test]
    fn kelly_suggestion_is_zero_without_p_hat() {
        assert_eq!(kelly_suggestion(None, 0.5), 0.0);
    }

    #[test]
    fn kelly_suggestion_is_clamped_to_unit_interval() {
        let cost = 0.4;
        let k = kelly_suggestion(Some(0.99), cost);
        assert!((0.0..=1.0).contains(&k));
        assert!(k > 0.9);
    }

    #[test]
    fn dynamic_risk_pct_respects_floor_and_cap() {
        let pct = dynamic_risk_pct(0.01, 0.25, 0.0, 0.02);
        assert_eq!(pct, 0.01);

        let pct_capped = dynamic_risk_pct(0.01, 0.25, 1.0, 0.02);
        assert_eq!(pct_capped, 0.02);
    }

    #[test]
    fn size_order_rounds_price_up_and_size_down() {
        let sized = size_order(
            1000.0,
            0.01,
            50.0,
            Price::new(dec!(0.601)),
            &constraints(),
        );
        assert_eq!(sized.price.inner(), dec!(0.601));
        assert!(sized.size.inner() >= dec!(0.1));
    }

    #[test]
    fn size_order_bumps_undersized_quote_to_min_order_size() {
        let sized = size_order(
            10.0,
            0.001,
            50.0,
            Price::new(dec!(0.5)),
            &constraints(),
        );
        assert_eq!(sized.size, constraints().min_order_size);
    }
}
