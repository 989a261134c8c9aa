//! Shared market data types: best bid/offer and book-top-with-depth.

use crate::{Price, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a `Bbo`'s tradeability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BboState {
    /// Both bid and ask are present and valid (bid < ask).
    Valid,
    /// No bid side (bid price is zero or missing).
    NoBid,
    /// No ask side (ask price is zero or missing).
    NoAsk,
    /// Both sides missing.
    Empty,
    /// Invalid (bid >= ask, i.e. a crossed book).
    Invalid,
}

impl BboState {
    pub fn is_tradeable(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn should_exclude(&self) -> bool {
        !self.is_tradeable()
    }
}

impl std::fmt::Display for BboState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "VALID"),
            Self::NoBid => write!(f, "NO_BID"),
            Self::NoAsk => write!(f, "NO_ASK"),
            Self::Empty => write!(f, "EMPTY"),
            Self::Invalid => write!(f, "INVALID"),
        }
    }
}

/// Best Bid and Offer for one outcome token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bbo {
    pub bid_price: Price,
    pub bid_size: Size,
    pub ask_price: Price,
    pub ask_size: Size,
    pub received_at: DateTime<Utc>,
}

impl Bbo {
    pub fn new(bid_price: Price, bid_size: Size, ask_price: Price, ask_size: Size) -> Self {
        Self {
            bid_price,
            bid_size,
            ask_price,
            ask_size,
            received_at: Utc::now(),
        }
    }

    pub fn mid_price(&self) -> Option<Price> {
        if self.state() != BboState::Valid {
            return None;
        }
        Some(Price::new(
            (self.bid_price.inner() + self.ask_price.inner()) / rust_decimal::Decimal::TWO,
        ))
    }

    pub fn spread(&self) -> Price {
        self.ask_price - self.bid_price
    }

    pub fn spread_bps(&self) -> Option<rust_decimal::Decimal> {
        let mid = self.mid_price()?;
        if mid.is_zero() {
            return None;
        }
        Some(self.spread().inner() / mid.inner() * rust_decimal::Decimal::from(10000))
    }

    /// Classifies which sides are present and whether the book is crossed.
    pub fn state(&self) -> BboState {
        let has_bid = self.bid_price.is_positive() && self.bid_size.is_positive();
        let has_ask = self.ask_price.is_positive() && self.ask_size.is_positive();

        match (has_bid, has_ask) {
            (false, false) => BboState::Empty,
            (true, false) => BboState::NoAsk,
            (false, true) => BboState::NoBid,
            (true, true) => {
                if self.bid_price < self.ask_price {
                    BboState::Valid
                } else {
                    BboState::Invalid
                }
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state() == BboState::Valid
    }

    pub fn is_null(&self) -> bool {
        self.state().should_exclude()
    }

    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.received_at).num_milliseconds()
    }
}

/// Which stream a price tick came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// The execution-authoritative oracle feed.
    Oracle,
    /// A public spot venue used only for quorum cross-checks.
    Spot,
    /// HTTP liveness fallback, used only while the oracle stream is stale.
    SpotLivenessFallback,
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oracle => write!(f, "oracle"),
            Self::Spot => write!(f, "spot"),
            Self::SpotLivenessFallback => write!(f, "spot_liveness_fallback"),
        }
    }
}

/// Per-tick provenance metadata (§3 "Price tick").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickMetadata {
    pub source: PriceSource,
    /// Timestamp as carried on the wire, normalized to seconds.
    pub payload_timestamp: f64,
    pub received_timestamp: DateTime<Utc>,
    pub divergence_pct: Option<rust_decimal::Decimal>,
    pub spot_price: Option<Price>,
}

impl TickMetadata {
    pub fn new(source: PriceSource, payload_timestamp: f64) -> Self {
        Self {
            source,
            payload_timestamp,
            received_timestamp: Utc::now(),
            divergence_pct: None,
            spot_price: None,
        }
    }

    pub fn is_oracle(&self) -> bool {
        self.source == PriceSource::Oracle
    }
}

/// A normalized price observation (§3 "Price tick"). `event_time_seconds` is
/// monotone per-source but not across sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub event_time_seconds: f64,
    pub price: Price,
    pub metadata: TickMetadata,
}

impl PriceTick {
    pub fn new(event_time_seconds: f64, price: Price, metadata: TickMetadata) -> Self {
        Self {
            event_time_seconds,
            price,
            metadata,
        }
    }
}

/// Normalizes a raw wire timestamp: divides by 1000 if it looks like
/// milliseconds (§3: "> 1e12").
pub fn normalize_timestamp(raw: f64) -> f64 {
    if raw > 1e12 {
        raw / 1000.0
    } else {
        raw
    }
}

/// One ladder level: (price, size). Non-positive entries are removals and
/// are dropped by parsers before levels reach this type.
pub type Level = (Price, Size);

/// Per-token book top plus up to N ladder levels per side (§3 "Book top /
/// depth"). A partial update that mentions only one side must be merged
/// into the previous snapshot rather than replacing it wholesale — see
/// `merge_partial` in the feed crate's book parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookTop {
    pub token_id: String,
    pub bbo: Bbo,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub event_time: DateTime<Utc>,
    /// Venue-provided fill-probability hint, when present on the frame.
    pub fill_prob_hint: Option<rust_decimal::Decimal>,
}

impl BookTop {
    pub fn state(&self) -> BboState {
        self.bbo.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bbo_mid_price() {
        let bbo = Bbo::new(
            Price::new(dec!(0.40)),
            Size::new(dec!(1)),
            Price::new(dec!(0.42)),
            Size::new(dec!(1)),
        );
        assert_eq!(bbo.mid_price().unwrap().inner(), dec!(0.41));
    }

    #[test]
    fn bbo_state_valid() {
        let bbo = Bbo::new(
            Price::new(dec!(0.40)),
            Size::new(dec!(1)),
            Price::new(dec!(0.42)),
            Size::new(dec!(1)),
        );
        assert_eq!(bbo.state(), BboState::Valid);
        assert!(bbo.is_valid());
        assert!(!bbo.is_null());
    }

    #[test]
    fn bbo_state_no_bid() {
        let bbo = Bbo::new(
            Price::ZERO,
            Size::ZERO,
            Price::new(dec!(0.42)),
            Size::new(dec!(1)),
        );
        assert_eq!(bbo.state(), BboState::NoBid);
        assert!(bbo.is_null());
    }

    #[test]
    fn bbo_state_empty() {
        let bbo = Bbo::new(Price::ZERO, Size::ZERO, Price::ZERO, Size::ZERO);
        assert_eq!(bbo.state(), BboState::Empty);
    }

    #[test]
    fn bbo_state_invalid_crossed() {
        let bbo = Bbo::new(
            Price::new(dec!(0.50)),
            Size::new(dec!(1)),
            Price::new(dec!(0.40)),
            Size::new(dec!(1)),
        );
        assert_eq!(bbo.state(), BboState::Invalid);
        assert!(bbo.is_null());
    }

    #[test]
    fn bbo_null_mid_price_is_none() {
        let bbo = Bbo::new(
            Price::ZERO,
            Size::ZERO,
            Price::new(dec!(0.42)),
            Size::new(dec!(1)),
        );
        assert!(bbo.mid_price().is_none());
    }

    #[test]
    fn bbo_state_display() {
        assert_eq!(BboState::Valid.to_string(), "VALID");
        assert_eq!(BboState::NoBid.to_string(), "NO_BID");
        assert_eq!(BboState::Invalid.to_string(), "INVALID");
    }

    #[test]
    fn normalize_timestamp_divides_millis() {
        assert_eq!(normalize_timestamp(1_700_000_000_000.0), 1_700_000_000.0);
        assert_eq!(normalize_timestamp(1_700_000_000.0), 1_700_000_000.0);
    }

    #[test]
    fn price_source_display_matches_wire_tags() {
        assert_eq!(PriceSource::Oracle.to_string(), "oracle");
        assert_eq!(
            PriceSource::SpotLivenessFallback.to_string(),
            "spot_liveness_fallback"
        );
    }
}
