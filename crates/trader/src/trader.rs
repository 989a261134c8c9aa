//! `Trader::buy_fok`: Kelly-capped sizing, risk-gated submission, and
//! post-trade ledger updates for a single FOK order (§4.10).

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Value};
use tracing::{info, warn};
use updown_catalog::TokenMetadataCache;
use updown_core::decimal::Price;
use updown_core::Direction;
use updown_risk::{RiskLedger, TradeOutcome};
use updown_telemetry::Metrics;

use crate::config::TraderConfig;
use crate::sizing::{dynamic_risk_pct, effective_cost, kelly_suggestion, size_order};
use crate::venue::{classify_submit_exception, OrderArgs, VenueClient};

/// Orchestrates one `buy_fok` call against the risk ledger, token metadata
/// cache, and venue adapter. Owns the risk ledger so every accepted trade
/// updates the same persisted state it was checked against.
pub struct Trader {
    config: TraderConfig,
    risk: RiskLedger,
    token_cache: Arc<TokenMetadataCache>,
    venue: Option<Arc<dyn VenueClient>>,
}

impl Trader {
    pub fn new(
        config: TraderConfig,
        risk: RiskLedger,
        token_cache: Arc<TokenMetadataCache>,
        venue: Option<Arc<dyn VenueClient>>,
    ) -> Self {
        Self {
            config,
            risk,
            token_cache,
            venue,
        }
    }

    pub fn risk(&self) -> &RiskLedger {
        &self.risk
    }

    /// `buy_fok(token_id, ask, horizon, p_hat?, fee_cost, slippage_cost,
    /// market_slug?, market_start_epoch?)` plus `now_ts` (the caller's single
    /// clock source, never read from the system clock in here — see the
    /// injected-clock design note) and the `direction` the risk ledger needs
    /// to key this token's exposure bucket: the token itself is one outcome
    /// side of a binary market, so the caller (which already picked the
    /// winning candidate) always knows it.
    #[allow(clippy::too_many_arguments)]
    pub async fn buy_fok(
        &mut self,
        now_ts: i64,
        token_id: &str,
        ask: Price,
        horizon: &str,
        direction: Direction,
        p_hat: Option<f64>,
        fee_cost: f64,
        slippage_cost: f64,
        _market_slug: Option<&str>,
        market_start_epoch: Option<i64>,
    ) -> bool {
        self.risk.reset_daily_pnl_if_needed(now_ts);
        self.risk.refresh_hourly_counter(now_ts);

        let constraints = self.token_cache.get(token_id, true).unwrap_or_default();

        let ask_f64 = ask.inner().to_f64().unwrap_or(0.0);
        let cost = effective_cost(ask_f64, fee_cost, slippage_cost);
        let k = kelly_suggestion(p_hat, cost);
        let risk_pct = dynamic_risk_pct(
            self.config.risk_pct_per_trade,
            self.config.kelly_fraction,
            k,
            self.config.max_risk_pct_cap,
        );

        let equity_usd = self.risk.refresh_equity_cache(now_ts, None, false);
        let max_usd_per_trade = self.risk.config().max_usd_per_trade;
        let sized = size_order(equity_usd, risk_pct, max_usd_per_trade, ask, &constraints);

        let horizon_minutes: i64 = horizon.parse().unwrap_or(5);
        // No known market_start_epoch means this exposure bucket should
        // never be auto-purged by the end-epoch sweep (same tradeoff as a
        // legacy key): use a sentinel far in the future instead of 0.
        let end_epoch = market_start_epoch
            .map(|start| start + horizon_minutes * 60)
            .unwrap_or(i64::MAX);

        if !self
            .risk
            .check_risk(
                now_ts,
                sized.notional_usd,
                token_id,
                horizon,
                direction,
                end_epoch,
            )
            .is_allowed()
        {
            Metrics::trade("rejected", "buy", horizon);
            return false;
        }

        self.risk.record_trade_attempt(now_ts);
        Metrics::hammer_attempted();

        if self.config.dry_run {
            let response = json!({
                "fills": [{
                    "price": sized.price.inner().to_string(),
                    "size": sized.size.inner().to_string(),
                }]
            });
            self.risk.record_post_trade(
                now_ts,
                equity_usd,
                &TradeOutcome {
                    token_id,
                    horizon_label: horizon,
                    direction,
                    end_epoch,
                    fallback_notional_usd: sized.notional_usd,
                    response: &response,
                },
            );
            Metrics::trade("dry_run", "buy", horizon);
            Metrics::hammer_filled();
            info!(%token_id, price = %sized.price, size = %sized.size, "dry_run order recorded");
            return true;
        }

        let Some(venue) = self.venue.clone() else {
            warn!(%token_id, "live trade requested but no venue client is configured");
            Metrics::trade("error", "buy", horizon);
            return false;
        };

        let args = OrderArgs::buy_fok(token_id, sized.price, sized.size);
        let submit = tokio::time::timeout(
            Duration::from_secs(self.config.order_submit_timeout_seconds),
            venue.create_and_post_order(args),
        )
        .await;

        let response = match submit {
            Err(_) => {
                warn!(%token_id, "order submission timed out");
                Metrics::trade("timeout", "buy", horizon);
                return false;
            }
            Ok(Err(e)) => {
                let failure = classify_submit_exception(&e);
                warn!(%token_id, error = %e, label = failure.as_label(), "order submission failed");
                Metrics::trade(failure.as_label(), "buy", horizon);
                return false;
            }
            Ok(Ok(response)) => response,
        };

        let ok = response_indicates_fill(&response);
        if ok {
            self.risk.record_post_trade(
                now_ts,
                equity_usd,
                &TradeOutcome {
                    token_id,
                    horizon_label: horizon,
                    direction,
                    end_epoch,
                    fallback_notional_usd: sized.notional_usd,
                    response: &response,
                },
            );
            Metrics::trade("filled", "buy", horizon);
            Metrics::hammer_filled();
        } else {
            Metrics::trade("rejected", "buy", horizon);
        }

        ok
    }
}

fn response_indicates_fill(response: &Value) -> bool {
    response
        .get("fills")
        .and_then(Value::as_array)
        .map(|fills| !fills.is_empty())
        .unwrap_or_else(|| response.as_bool().unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;
    use updown_risk::RiskConfig;

    struct StubVenue {
        calls: AtomicUsize,
        ok: bool,
    }

    #[async_trait]
    impl VenueClient for StubVenue {
        async fn create_and_post_order(
            &self,
            args: OrderArgs,
        ) -> crate::error::TraderResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ok {
                Ok(json!({"fills": [{"price": args.price.inner().to_string(), "size": args.size.inner().to_string()}]}))
            } else {
                Ok(json!(false))
            }
        }
    }

    fn risk_ledger(dir: &std::path::Path, dry_run: bool) -> RiskLedger {
        let mut config = RiskConfig::default();
        config.risk_state_path = dir.join("risk_state.json").to_string_lossy().to_string();
        RiskLedger::new(config, dry_run)
    }

    #[tokio::test]
    async fn dry_run_buy_fok_records_a_synthetic_fill() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Arc::new(TokenMetadataCache::new(StdDuration::from_secs(60)));
        let mut trader = Trader::new(
            TraderConfig {
                dry_run: true,
                ..TraderConfig::default()
            },
            risk_ledger(dir.path(), true),
            cache,
            None,
        );

        let ok = trader
            .buy_fok(
                1_700_000_000,
                "token-a",
                Price::new(rust_decimal_macros::dec!(0.5)),
                "5",
                Direction::Up,
                Some(0.7),
                0.01,
                0.0,
                None,
                None,
            )
            .await;

        assert!(ok);
        assert_eq!(trader.risk().state().trades_this_hour, 1);
    }

    #[tokio::test]
    async fn live_mode_without_venue_client_fails_closed() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Arc::new(TokenMetadataCache::new(StdDuration::from_secs(60)));
        let mut trader = Trader::new(
            TraderConfig {
                dry_run: false,
                venue_base_url: "http://example.invalid".to_string(),
                ..TraderConfig::default()
            },
            risk_ledger(dir.path(), false),
            cache,
            None,
        );

        let ok = trader
            .buy_fok(
                1_700_000_000,
                "token-a",
                Price::new(rust_decimal_macros::dec!(0.5)),
                "5",
                Direction::Up,
                None,
                0.01,
                0.0,
                None,
                None,
            )
            .await;

        assert!(!ok);
    }

    #[tokio::test]
    async fn live_mode_submits_through_the_venue_and_records_fill() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Arc::new(TokenMetadataCache::new(StdDuration::from_secs(60)));
        let venue = Arc::new(StubVenue {
            calls: AtomicUsize::new(0),
            ok: true,
        });
        let mut trader = Trader::new(
            TraderConfig {
                dry_run: false,
                venue_base_url: "http://example.invalid".to_string(),
                ..TraderConfig::default()
            },
            risk_ledger(dir.path(), false),
            cache,
            Some(venue.clone()),
        );

        let ok = trader
            .buy_fok(
                1_700_000_000,
                "token-a",
                Price::new(rust_decimal_macros::dec!(0.5)),
                "5",
                Direction::Up,
                None,
                0.01,
                0.0,
                None,
                None,
            )
            .await;

        assert!(ok);
        assert_eq!(venue.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn venue_rejection_does_not_update_the_ledger() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Arc::new(TokenMetadataCache::new(StdDuration::from_secs(60)));
        let venue = Arc::new(StubVenue {
            calls: AtomicUsize::new(0),
            ok: false,
        });
        let mut trader = Trader::new(
            TraderConfig {
                dry_run: false,
                venue_base_url: "http://example.invalid".to_string(),
                ..TraderConfig::default()
            },
            risk_ledger(dir.path(), false),
            cache,
            Some(venue),
        );

        let ok = trader
            .buy_fok(
                1_700_000_000,
                "token-a",
                Price::new(rust_decimal_macros::dec!(0.5)),
                "5",
                Direction::Up,
                None,
                0.01,
                0.0,
                None,
                None,
            )
            .await;

        assert!(!ok);
        assert_eq!(trader.risk().state().cumulative_realized_pnl, 0.0);
    }
}
