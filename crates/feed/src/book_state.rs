//! Per-token book-top state with partial-update merge semantics (§4.4): a
//! partial update that only carries one side must preserve the other side's
//! most recent levels rather than wipe it.

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use updown_core::{Bbo, BookTop, Level, Price, Size};

/// Concurrent per-token book cache, keyed by token_id. Levels within each
/// side are expected sorted best-first by the parser that produced them.
#[derive(Clone)]
pub struct BookState {
    tokens: Arc<DashMap<String, BookTop>>,
    tick_sizes: Arc<DashMap<String, Decimal>>,
}

impl BookState {
    pub fn new() -> Self {
        Self {
            tokens: Arc::new(DashMap::new()),
            tick_sizes: Arc::new(DashMap::new()),
        }
    }

    pub fn get(&self, token_id: &str) -> Option<BookTop> {
        self.tokens.get(token_id).map(|e| e.clone())
    }

    pub fn token_ids(&self) -> Vec<String> {
        self.tokens.iter().map(|e| e.key().clone()).collect()
    }

    pub fn remove(&self, token_id: &str) {
        self.tokens.remove(token_id);
    }

    /// Replaces both sides wholesale (`book` / `snapshot` events).
    pub fn apply_snapshot(&self, token_id: &str, bids: Vec<Level>, asks: Vec<Level>) -> BookTop {
        let top = BookTop {
            token_id: token_id.to_string(),
            bbo: bbo_from_levels(&bids, &asks),
            bids,
            asks,
            event_time: Utc::now(),
            fill_prob_hint: None,
        };
        self.tokens.insert(token_id.to_string(), top.clone());
        top
    }

    /// Merges a partial update: a `None` side leaves the previous side's
    /// levels untouched.
    pub fn apply_partial(
        &self,
        token_id: &str,
        bids: Option<Vec<Level>>,
        asks: Option<Vec<Level>>,
    ) -> BookTop {
        let mut entry = self
            .tokens
            .entry(token_id.to_string())
            .or_insert_with(|| empty_book(token_id));
        if let Some(bids) = bids {
            entry.bids = bids;
        }
        if let Some(asks) = asks {
            entry.asks = asks;
        }
        entry.bbo = bbo_from_levels(&entry.bids, &entry.asks);
        entry.event_time = Utc::now();
        entry.clone()
    }

    pub fn set_tick_size(&self, token_id: &str, tick_size: Decimal) {
        self.tick_sizes.insert(token_id.to_string(), tick_size);
    }

    pub fn tick_size(&self, token_id: &str) -> Option<Decimal> {
        self.tick_sizes.get(token_id).map(|v| *v)
    }
}

impl Default for BookState {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_book(token_id: &str) -> BookTop {
    BookTop {
        token_id: token_id.to_string(),
        bbo: Bbo::new(Price::ZERO, Size::ZERO, Price::ZERO, Size::ZERO),
        bids: Vec::new(),
        asks: Vec::new(),
        event_time: Utc::now(),
        fill_prob_hint: None,
    }
}

fn bbo_from_levels(bids: &[Level], asks: &[Level]) -> Bbo {
    let (bid_price, bid_size) = bids.first().copied().unwrap_or((Price::ZERO, Size::ZERO));
    let (ask_price, ask_size) = asks.first().copied().unwrap_or((Price::ZERO, Size::ZERO));
    Bbo::new(bid_price, bid_size, ask_price, ask_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: &str, size: &str) -> Level {
        (Price::new(price.parse().unwrap()), Size::new(size.parse().unwrap()))
    }

    #[test]
    fn snapshot_sets_both_sides() {
        let state = BookState::new();
        let top = state.apply_snapshot("token-a", vec![level("0.44", "100")], vec![level("0.45", "50")]);
        assert_eq!(top.bbo.bid_price.inner(), dec!(0.44));
        assert_eq!(top.bbo.ask_price.inner(), dec!(0.45));
    }

    #[test]
    fn partial_update_preserves_missing_side() {
        let state = BookState::new();
        state.apply_snapshot("token-a", vec![level("0.44", "100")], vec![level("0.45", "50")]);
        let top = state.apply_partial("token-a", Some(vec![level("0.46", "100")]), None);
        assert_eq!(top.bbo.bid_price.inner(), dec!(0.46));
        assert_eq!(top.bbo.ask_price.inner(), dec!(0.45), "ask side must be preserved");
    }

    #[test]
    fn partial_update_on_unknown_token_starts_empty() {
        let state = BookState::new();
        let top = state.apply_partial("token-z", Some(vec![level("0.10", "1")]), None);
        assert_eq!(top.bbo.bid_price.inner(), dec!(0.10));
        assert_eq!(top.bbo.ask_price, Price::ZERO);
    }

    #[test]
    fn tick_size_is_tracked_independently_of_book_top() {
        let state = BookState::new();
        state.set_tick_size("token-a", dec!(0.01));
        assert_eq!(state.tick_size("token-a"), Some(dec!(0.01)));
        assert_eq!(state.tick_size("token-b"), None);
    }
}
