//! Token metadata TTL cache (§4.6): keyed by token_id, tracks the freshest
//! known tick size / min order size / fee rate, and a stale/allow-stale read
//! mode for best-effort rounding when the catalog hasn't refreshed recently.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use updown_core::{PartialTokenConstraints, TokenConstraints};

struct CacheEntry {
    constraints: TokenConstraints,
    updated_at: Instant,
}

pub struct TokenMetadataCache {
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

impl TokenMetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Merges a partial observation in, field by field (last-write-wins),
    /// refreshing the entry's age regardless of which fields changed.
    pub fn put(&self, token_id: &str, partial: &PartialTokenConstraints) {
        let mut entry = self.entries.entry(token_id.to_string()).or_insert_with(|| CacheEntry {
            constraints: TokenConstraints::default(),
            updated_at: Instant::now(),
        });
        entry.constraints.merge(partial);
        entry.updated_at = Instant::now();
    }

    /// Returns the freshest value; with `allow_stale` returns the last
    /// observed value even past TTL (§4.6).
    pub fn get(&self, token_id: &str, allow_stale: bool) -> Option<TokenConstraints> {
        let entry = self.entries.get(token_id)?;
        if allow_stale || entry.updated_at.elapsed() <= self.ttl {
            Some(entry.constraints)
        } else {
            None
        }
    }

    pub fn is_fresh(&self, token_id: &str) -> bool {
        self.entries
            .get(token_id)
            .is_some_and(|e| e.updated_at.elapsed() <= self.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use updown_core::Price;

    #[test]
    fn put_then_get_allow_stale_returns_value_after_ttl() {
        let cache = TokenMetadataCache::new(Duration::from_millis(0));
        cache.put(
            "token-a",
            &PartialTokenConstraints {
                tick_size: Some(Price::new(dec!(0.01))),
                ..Default::default()
            },
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("token-a", false).is_none());
        assert_eq!(
            cache.get("token-a", true).unwrap().tick_size,
            Price::new(dec!(0.01))
        );
    }

    #[test]
    fn merge_is_last_write_wins_per_field() {
        let cache = TokenMetadataCache::new(Duration::from_secs(300));
        cache.put(
            "token-a",
            &PartialTokenConstraints {
                tick_size: Some(Price::new(dec!(0.01))),
                fee_rate_bps: Some(50),
                ..Default::default()
            },
        );
        cache.put(
            "token-a",
            &PartialTokenConstraints {
                min_order_size: Some(updown_core::Size::new(dec!(5))),
                ..Default::default()
            },
        );
        let constraints = cache.get("token-a", false).unwrap();
        assert_eq!(constraints.tick_size, Price::new(dec!(0.01)));
        assert_eq!(constraints.fee_rate_bps, Some(50));
        assert_eq!(constraints.min_order_size, updown_core::Size::new(dec!(5)));
    }

    #[test]
    fn missing_token_returns_none() {
        let cache = TokenMetadataCache::new(Duration::from_secs(300));
        assert!(cache.get("missing", true).is_none());
    }
}
