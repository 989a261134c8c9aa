//! Market identification and token constraint types.
//!
//! A `Market` is one 5- or 15-minute binary Up/Down contract on the
//! underlying; its `slug` bijectively encodes `(horizon_minutes, start_epoch)`.
//! Each outcome (`up_token_id` / `down_token_id`) carries its own
//! `TokenConstraints` (tick size, min order size, fee rate).

use crate::error::{CoreError, Result};
use crate::{Price, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two supported market horizons, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Horizon {
    FiveMin,
    FifteenMin,
}

impl Horizon {
    pub fn minutes(&self) -> i64 {
        match self {
            Self::FiveMin => 5,
            Self::FifteenMin => 15,
        }
    }

    pub fn seconds(&self) -> i64 {
        self.minutes() * 60
    }

    pub fn from_minutes(minutes: i64) -> Option<Self> {
        match minutes {
            5 => Some(Self::FiveMin),
            15 => Some(Self::FifteenMin),
            _ => None,
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.minutes())
    }
}

/// Unique key for a market: `slug = "btc-updown-{horizon}m-{start_epoch}"`.
///
/// Invariant: the slug bijectively decodes `(horizon_minutes, start_epoch)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    pub horizon: Horizon,
    pub start_epoch: i64,
}

impl MarketKey {
    pub fn new(horizon: Horizon, start_epoch: i64) -> Self {
        Self {
            horizon,
            start_epoch,
        }
    }

    pub fn end_epoch(&self) -> i64 {
        self.start_epoch + self.horizon.seconds()
    }

    pub fn slug(&self) -> String {
        format!(
            "btc-updown-{}m-{}",
            self.horizon.minutes(),
            self.start_epoch
        )
    }

    /// Parse a slug back into a `MarketKey`. The inverse of `slug()`.
    pub fn from_slug(slug: &str) -> Result<Self> {
        let rest = slug
            .strip_prefix("btc-updown-")
            .ok_or_else(|| CoreError::InvalidMarketKey(slug.to_string()))?;
        let (horizon_part, start_part) = rest
            .split_once("m-")
            .ok_or_else(|| CoreError::InvalidMarketKey(slug.to_string()))?;
        let minutes: i64 = horizon_part
            .parse()
            .map_err(|_| CoreError::InvalidMarketKey(slug.to_string()))?;
        let horizon = Horizon::from_minutes(minutes)
            .ok_or_else(|| CoreError::InvalidMarketKey(slug.to_string()))?;
        let start_epoch: i64 = start_part
            .parse()
            .map_err(|_| CoreError::InvalidMarketKey(slug.to_string()))?;
        Ok(Self::new(horizon, start_epoch))
    }

    /// Aligns `start_epoch` to the horizon boundary per §3's invariant.
    pub fn is_aligned(&self) -> bool {
        self.start_epoch % self.horizon.seconds() == 0
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

/// A validated Up/Down market definition, resolved from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub key: MarketKey,
    pub up_token_id: String,
    pub down_token_id: String,
    pub category: String,
}

impl Market {
    pub fn slug(&self) -> String {
        self.key.slug()
    }

    pub fn horizon_minutes(&self) -> i64 {
        self.key.horizon.minutes()
    }

    pub fn end_epoch(&self) -> i64 {
        self.key.end_epoch()
    }

    /// True when `end_epoch <= now`; expired markets must not be traded.
    pub fn is_expired(&self, now_epoch: i64) -> bool {
        self.end_epoch() <= now_epoch
    }

    pub fn token_id(&self, direction: crate::order::Direction) -> &str {
        match direction {
            crate::order::Direction::Up => &self.up_token_id,
            crate::order::Direction::Down => &self.down_token_id,
        }
    }
}

/// Per-token order constraints, discovered from the catalog and/or the book
/// feed's `tick_size_change` events; the union is TTL-cached with
/// last-write-wins on a field basis (§3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConstraints {
    pub tick_size: Price,
    pub min_order_size: Size,
    pub fee_rate_bps: Option<u32>,
}

/// Maximum significant figures shared across venues in this corpus.
pub const MAX_SIG_FIGS: u8 = 5;

impl TokenConstraints {
    /// Merge another, newer observation in, field by field, last-write-wins
    /// (so a partial update never clobbers fields it didn't observe).
    pub fn merge(&mut self, other: &PartialTokenConstraints) {
        if let Some(tick) = other.tick_size {
            self.tick_size = tick;
        }
        if let Some(min_size) = other.min_order_size {
            self.min_order_size = min_size;
        }
        if let Some(fee) = other.fee_rate_bps {
            self.fee_rate_bps = Some(fee);
        }
    }

    pub fn taker_fee_rate(&self) -> Option<Decimal> {
        self.fee_rate_bps
            .map(|bps| Decimal::from(bps) / Decimal::from(10_000))
    }

    /// Round a price toward the unfavorable direction for a buy (ceil to tick).
    pub fn round_price_for_buy(&self, price: Price) -> Price {
        if self.tick_size.is_zero() {
            return price;
        }
        let tick = self.tick_size.inner();
        let rounded = (price.inner() / tick).ceil() * tick;
        Price::new(rounded)
    }

    /// Round a size down to the min-order-size step (never oversize).
    pub fn round_size_down(&self, size: Size) -> Size {
        size.round_to_lot(self.min_order_size)
    }

    pub fn format_price(&self, price: Price, max_decimals: u8) -> String {
        format_decimal_with_constraints(price.inner(), MAX_SIG_FIGS, max_decimals)
    }
}

impl Default for TokenConstraints {
    fn default() -> Self {
        Self {
            tick_size: Price::new(rust_decimal_macros::dec!(0.001)),
            min_order_size: Size::new(rust_decimal_macros::dec!(0.1)),
            fee_rate_bps: None,
        }
    }
}

/// A partial observation of token constraints, e.g. from a single catalog
/// row or a single `tick_size_change` event; `None` fields were not observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialTokenConstraints {
    pub tick_size: Option<Price>,
    pub min_order_size: Option<Size>,
    pub fee_rate_bps: Option<u32>,
}

/// Format a Decimal with max significant figures and max decimal places.
/// Truncates (floors) to constraints; never rounds up. Strips trailing zeros.
pub fn format_decimal_with_constraints(value: Decimal, max_sig_figs: u8, max_decimals: u8) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let abs_value = value.abs();
    let sign = if value.is_sign_negative() { "-" } else { "" };

    let truncated_sig = truncate_to_sig_figs(abs_value, max_sig_figs);
    let truncated = truncate_to_decimals(truncated_sig, max_decimals);
    let formatted = format_without_trailing_zeros(truncated);

    format!("{sign}{formatted}")
}

fn truncate_to_sig_figs(value: Decimal, max_sig_figs: u8) -> Decimal {
    if value.is_zero() || max_sig_figs == 0 {
        return Decimal::ZERO;
    }

    let abs_value = value.abs();
    let magnitude = calculate_magnitude(abs_value);
    let scale = (max_sig_figs as i32) - magnitude - 1;

    if scale >= 0 {
        truncate_to_decimals(abs_value, scale as u8)
    } else {
        let factor = Decimal::from(10i64.pow((-scale) as u32));
        (abs_value / factor).trunc() * factor
    }
}

fn truncate_to_decimals(value: Decimal, max_decimals: u8) -> Decimal {
    let factor = Decimal::from(10i64.pow(max_decimals as u32));
    (value * factor).trunc() / factor
}

fn calculate_magnitude(value: Decimal) -> i32 {
    if value.is_zero() {
        return 0;
    }

    let abs_value = value.abs();
    let int_part = abs_value.trunc();

    if !int_part.is_zero() {
        let int_str = int_part.to_string();
        (int_str.len() as i32) - 1
    } else {
        let s = abs_value.to_string();
        let mut magnitude: i32 = 0;
        let mut after_decimal = false;

        for c in s.chars() {
            if c == '.' {
                after_decimal = true;
                continue;
            }
            if after_decimal {
                magnitude -= 1;
                if c != '0' {
                    break;
                }
            }
        }
        magnitude
    }
}

fn format_without_trailing_zeros(value: Decimal) -> String {
    let s = value.to_string();

    if !s.contains('.') {
        return s;
    }

    let trimmed = s.trim_end_matches('0');
    trimmed.trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn slug_round_trips() {
        let key = MarketKey::new(Horizon::FiveMin, 1_700_000_100);
        let slug = key.slug();
        assert_eq!(slug, "btc-updown-5m-1700000100");
        let parsed = MarketKey::from_slug(&slug).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn end_epoch_matches_horizon_invariant() {
        let key = MarketKey::new(Horizon::FifteenMin, 900);
        assert_eq!(key.end_epoch() - key.start_epoch, 15 * 60);
    }

    #[test]
    fn alignment_check() {
        assert!(MarketKey::new(Horizon::FiveMin, 300).is_aligned());
        assert!(!MarketKey::new(Horizon::FiveMin, 301).is_aligned());
    }

    #[test]
    fn market_expiry() {
        let market = Market {
            key: MarketKey::new(Horizon::FiveMin, 1000),
            up_token_id: "up".into(),
            down_token_id: "down".into(),
            category: "crypto".into(),
        };
        assert!(!market.is_expired(1000));
        assert!(market.is_expired(1300));
        assert!(market.is_expired(1301));
    }

    #[test]
    fn constraints_merge_is_last_write_wins_per_field() {
        let mut constraints = TokenConstraints::default();
        constraints.merge(&PartialTokenConstraints {
            tick_size: Some(Price::new(dec!(0.001))),
            min_order_size: None,
            fee_rate_bps: Some(50),
        });
        assert_eq!(constraints.tick_size, Price::new(dec!(0.001)));
        assert_eq!(constraints.fee_rate_bps, Some(50));
        assert_eq!(constraints.min_order_size, Size::new(dec!(0.1)));
    }

    #[test]
    fn round_price_for_buy_rounds_up() {
        let constraints = TokenConstraints {
            tick_size: Price::new(dec!(0.01)),
            ..Default::default()
        };
        assert_eq!(
            constraints.round_price_for_buy(Price::new(dec!(0.471))),
            Price::new(dec!(0.48))
        );
    }

    #[test]
    fn format_price_truncates_to_sig_figs_and_decimals() {
        assert_eq!(
            format_decimal_with_constraints(dec!(0.123456), 5, 4),
            "0.1234"
        );
        assert_eq!(format_decimal_with_constraints(dec!(1.0), 5, 2), "1");
    }
}
