//! Application supervisor (§4.11): owns every feed client, the quorum,
//! strategy state machine, trader, and event recorder, and drives them from
//! a single task. I/O-bound reconnect loops run as spawned background
//! tasks that only ever push bytes into channels; every piece of mutable
//! strategy/risk state is touched exclusively from `run`'s main loop
//! (§5) — no lock is needed between them.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use serde_json::json;
use tracing::{info, warn};
use updown_catalog::{FeeRateCache, MarketCatalogClient, TokenMetadataCache};
use updown_core::{Horizon, Market, PartialTokenConstraints, Price, PriceTick};
use updown_feed::book::subscribe_frame as book_subscribe_frame;
use updown_feed::{
    apply_event as apply_book_event, parse_book_frame, BookEvent, BookState, FallbackFeedClient,
    OracleFeedClient, QuorumHealth, SpotFeedClient,
};
use updown_persistence::EventRecorder;
use updown_risk::RiskLedger;
use updown_strategy::{load_probability_calibrator, StrategyStateMachine};
use updown_trader::{HttpVenueClient, Trader, VenueClient};
use updown_ws::{ConnectionConfig, ConnectionManager, WsMessage};

use crate::config::RuntimeConfig;
use crate::error::{AppError, AppResult};
use crate::supervisor::{crossed_minute_boundary, run_resilient};

/// Horizons the agent trades; every market refresh resolves both (§3).
const HORIZONS: [Horizon; 2] = [Horizon::FiveMin, Horizon::FifteenMin];

pub struct Application {
    config: Arc<RuntimeConfig>,
    catalog: MarketCatalogClient,
    token_cache: Arc<TokenMetadataCache>,
    fee_cache: FeeRateCache,
    oracle: Arc<OracleFeedClient>,
    spot: Option<Arc<SpotFeedClient>>,
    fallback: Option<Arc<FallbackFeedClient>>,
    book_state: BookState,
    quorum: QuorumHealth,
    strategy: StrategyStateMachine,
    trader: Trader,
    recorder: EventRecorder,
    markets: Vec<Market>,
    book_tokens: Vec<String>,
    book_tokens_tx: tokio::sync::watch::Sender<Vec<String>>,
    book_tokens_rx: Option<tokio::sync::watch::Receiver<Vec<String>>>,
}

impl Application {
    pub fn new(config: RuntimeConfig) -> AppResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let catalog = MarketCatalogClient::new(config.catalog.catalog.clone())?;
        let token_cache_ttl = Duration::from_secs(config.catalog.token_cache_ttl_seconds);
        let token_cache = Arc::new(TokenMetadataCache::new(token_cache_ttl));
        let strategy_token_cache = TokenMetadataCache::new(token_cache_ttl);
        let fee_cache = FeeRateCache::new(
            config.catalog.fee_rate_base_url.clone(),
            Duration::from_secs(config.catalog.fee_cache_ttl_seconds),
            Duration::from_secs(config.catalog.request_timeout_seconds),
        )
        .map_err(updown_catalog::CatalogError::Http)?;

        let oracle = Arc::new(OracleFeedClient::new(
            config
                .feeds
                .oracle
                .clone()
                .into_config(config.feeds.symbol.clone()),
        ));
        let spot = config.feeds.spot.clone().map(|settings| {
            Arc::new(SpotFeedClient::new(
                settings.into_config(config.feeds.symbol.clone()),
            ))
        });
        let fallback = match config.feeds.fallback.clone() {
            Some(settings) => Some(Arc::new(FallbackFeedClient::new(
                settings.into_config(config.feeds.symbol.clone()),
            )?)),
            None => None,
        };

        let quorum = QuorumHealth::new(config.quorum.clone());

        let calibrator = load_probability_calibrator(
            config.calibration.method,
            config.calibration.params_path.as_deref().map(Path::new),
            config.calibration.logistic_coef,
            config.calibration.logistic_intercept,
        );
        let strategy = StrategyStateMachine::with_calibrator(
            config.strategy.clone(),
            calibrator,
            Some(strategy_token_cache),
        );

        let dry_run = config.dry_run();
        let venue: Option<Arc<dyn VenueClient>> = if dry_run {
            None
        } else {
            Some(Arc::new(HttpVenueClient::new(
                config.trader.venue_base_url.clone(),
                config.trader.venue_api_key.clone(),
                Duration::from_secs(config.trader.order_submit_timeout_seconds),
            )?))
        };
        let risk = RiskLedger::new(config.risk.clone(), dry_run);
        let trader = Trader::new(config.trader.clone(), risk, token_cache.clone(), venue);

        let recorder = EventRecorder::start(&config.persistence)?;
        let (book_tokens_tx, book_tokens_rx) = tokio::sync::watch::channel(Vec::new());

        Ok(Self {
            config,
            catalog,
            token_cache,
            fee_cache,
            oracle,
            spot,
            fallback,
            book_state: BookState::new(),
            quorum,
            strategy,
            trader,
            recorder,
            markets: Vec::new(),
            book_tokens: Vec::new(),
            book_tokens_tx,
            book_tokens_rx: Some(book_tokens_rx),
        })
    }

    /// Resolves the current markets and warms caches once before `run`
    /// spawns any network task, so a catalog or DNS failure surfaces as a
    /// clean startup error instead of a silent empty-markets run.
    pub async fn run_preflight(&mut self) -> AppResult<()> {
        let now = chrono::Utc::now().timestamp();
        self.refresh_markets(now)
            .await
            .map_err(|e| AppError::Preflight(e.to_string()))?;
        if self.markets.is_empty() {
            warn!("preflight found no live markets for the configured horizons");
        }
        info!(
            markets = self.markets.len(),
            tokens = self.book_tokens.len(),
            dry_run = self.config.dry_run(),
            "preflight complete"
        );
        Ok(())
    }

    pub async fn run(mut self) -> AppResult<()> {
        let oracle_conn = self.oracle.clone();
        tokio::spawn(async move {
            run_resilient("oracle_ws", || {
                let conn = oracle_conn.clone();
                async move { conn.run().await }
            })
            .await;
        });

        if let Some(spot) = self.spot.clone() {
            tokio::spawn(async move {
                run_resilient("spot_ws", || {
                    let conn = spot.clone();
                    async move { conn.run().await }
                })
                .await;
            });
        }

        let (fallback_tx, mut fallback_rx) = tokio::sync::mpsc::channel(8);
        if let Some(fallback) = self.fallback.clone() {
            let poll_interval = self
                .config
                .feeds
                .fallback
                .as_ref()
                .map_or(Duration::from_secs(5), |f| {
                    Duration::from_secs_f64(f.poll_interval_seconds)
                });
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(poll_interval).await;
                    match fallback.poll_once().await {
                        Ok(tick) => {
                            if fallback_tx.send(tick).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "fallback feed poll failed"),
                    }
                }
            });
        }

        let mut book_rx = self.spawn_book_consumer();

        let mut oracle_is_stale = false;
        let mut tick_interval = tokio::time::interval(Duration::from_secs(1));
        let mut last_refresh_epoch = chrono::Utc::now().timestamp();

        loop {
            tokio::select! {
                Some(tick) = self.oracle.next_tick() => {
                    oracle_is_stale = false;
                    self.ingest_price_tick(&tick, "oracle");
                }
                Some(tick) = fallback_rx.recv() => {
                    if oracle_is_stale {
                        self.ingest_price_tick(&tick, "fallback");
                    }
                }
                Some((feed, price, payload_ts)) = Self::next_spot_sample(&self.spot) => {
                    self.quorum.update_spot(&feed, price, payload_ts, None);
                }
                Some(msg) = book_rx.recv() => {
                    self.ingest_book_message(&msg);
                }
                _ = tick_interval.tick() => {
                    let now = chrono::Utc::now().timestamp();
                    let was_stale = oracle_is_stale;
                    oracle_is_stale = self.oracle.is_stale();
                    if oracle_is_stale && !was_stale {
                        updown_telemetry::Metrics::stale_feed();
                    }
                    self.evaluate_quorum(now);

                    if crossed_minute_boundary(last_refresh_epoch, now) {
                        last_refresh_epoch = now;
                        if let Err(e) = self.refresh_markets(now).await {
                            warn!(error = %e, "market refresh failed, keeping previous market set");
                        }
                    }

                    self.maybe_trade(now).await;
                }
                else => break,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(self) {
        info!("shutting down, flushing event recorder");
        self.recorder.stop().await;
    }

    /// Spawns the book-feed connection task. The task rebuilds its
    /// `ConnectionManager` (and thus its `subscribe_frames`) every time the
    /// live token set changes: it races the connection against
    /// `book_tokens_rx`, debounced by `resubscribe_debounce_seconds` so a
    /// burst of market rolls collapses into a single reconnect, then returns
    /// `Ok(())` so `run_resilient` immediately restarts it with the new
    /// tokens baked into a fresh subscribe frame (§4.11).
    fn spawn_book_consumer(&mut self) -> tokio::sync::mpsc::Receiver<WsMessage> {
        let (tx, rx) = tokio::sync::mpsc::channel(1024);
        let config = self.config.clone();
        let tokens_rx = self
            .book_tokens_rx
            .take()
            .expect("spawn_book_consumer called more than once");
        tokio::spawn(async move {
            run_resilient("book_ws", || {
                let config = config.clone();
                let tx = tx.clone();
                let mut tokens_rx = tokens_rx.clone();
                async move {
                    let tokens = tokens_rx.borrow_and_update().clone();
                    let (conn_tx, mut conn_rx) = tokio::sync::mpsc::channel(1024);
                    let conn_config = ConnectionConfig {
                        url: config.feeds.book.url.clone(),
                        subscribe_frames: vec![book_subscribe_frame(&tokens)],
                        reconnect_delay_min: Duration::from_secs_f64(
                            config.feeds.book.reconnect_delay_min_seconds,
                        ),
                        reconnect_delay_max: Duration::from_secs_f64(
                            config.feeds.book.reconnect_delay_max_seconds,
                        ),
                        reconnect_stability_duration: Duration::from_secs_f64(
                            config.feeds.book.reconnect_stability_seconds,
                        ),
                        ping_interval: Duration::from_secs_f64(
                            config.feeds.book.ping_interval_seconds,
                        ),
                        pong_timeout: Duration::from_secs_f64(
                            config.feeds.book.pong_timeout_seconds,
                        ),
                    };
                    let manager = ConnectionManager::new(conn_config, conn_tx);
                    let forward = async {
                        while let Some(msg) = conn_rx.recv().await {
                            if tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                    };
                    let debounce = Duration::from_secs_f64(
                        config.feeds.book.resubscribe_debounce_seconds,
                    );
                    let await_resubscribe = async {
                        tokens_rx.changed().await.ok()?;
                        loop {
                            tokio::select! {
                                _ = tokio::time::sleep(debounce) => return Some(()),
                                changed = tokens_rx.changed() => {
                                    changed.ok()?;
                                }
                            }
                        }
                    };
                    tokio::select! {
                        result = manager.run() => result,
                        _ = forward => Ok(()),
                        _ = await_resubscribe => {
                            info!("book token set changed, reconnecting to resubscribe");
                            Ok(())
                        }
                    }
                }
            })
            .await;
        });
        rx
    }

    fn ingest_book_message(&mut self, msg: &WsMessage) {
        let Some(value) = msg.as_value() else {
            return;
        };
        let (events, drops) = parse_book_frame(value);
        for drop in drops {
            updown_telemetry::Metrics::clob_dropped_message(drop.reason, &drop.event_type);
        }
        for event in events {
            let token_id = match &event {
                BookEvent::Snapshot { token_id, .. }
                | BookEvent::Partial { token_id, .. }
                | BookEvent::TickSizeChange { token_id, .. } => token_id.clone(),
            };
            apply_book_event(&self.book_state, event);
            if let Some(top) = self.book_state.get(&token_id) {
                let asks_levels: Vec<(f64, f64)> = top
                    .asks
                    .iter()
                    .filter_map(|(p, s)| Some((p.inner().to_f64()?, s.inner().to_f64()?)))
                    .collect();
                self.strategy.on_book(
                    &token_id,
                    top.bbo.bid_price.inner().to_f64(),
                    top.bbo.ask_price.inner().to_f64(),
                    top.bbo.bid_size.inner().to_f64(),
                    top.bbo.ask_size.inner().to_f64(),
                    None,
                    Some(top.event_time.timestamp() as f64),
                    Some(asks_levels),
                );
                self.recorder.record(
                    "book_top",
                    top.event_time.timestamp(),
                    json!({"token_id": token_id}),
                );
            }
        }
    }

    fn ingest_price_tick(&mut self, tick: &PriceTick, source: &'static str) {
        let price_f64 = tick.price.inner().to_f64().unwrap_or(0.0);
        self.quorum
            .update_oracle(price_f64, tick.metadata.payload_timestamp, None);
        self.strategy.on_price(tick);
        self.recorder.record(
            "oracle_price",
            tick.event_time_seconds as i64,
            json!({"price": price_f64, "source": source}),
        );
    }

    /// Awaits the next spot tick, if a spot feed is configured, returning
    /// `(feed_name, mid_price, payload_timestamp)` for the quorum.
    async fn next_spot_sample(spot: &Option<Arc<SpotFeedClient>>) -> Option<(String, f64, f64)> {
        let spot = spot.as_ref()?;
        let tick = spot.next_tick().await?;
        Some((
            spot.feed_name().to_string(),
            tick.price.inner().to_f64().unwrap_or(0.0),
            tick.metadata.payload_timestamp,
        ))
    }

    fn evaluate_quorum(&mut self, now: i64) {
        let decision = self.quorum.evaluate(Some(now as f64));
        updown_telemetry::Metrics::trading_allowed_set(decision.trading_allowed);
        if let Some(divergence) = decision.spot_quorum_divergence_pct {
            updown_telemetry::Metrics::oracle_spot_divergence_pct_set(divergence);
        }
        for (feed, lag) in &decision.feed_lag_seconds {
            updown_telemetry::Metrics::feed_lag_seconds_set(feed, *lag);
        }
        if !decision.trading_allowed {
            warn!(reasons = ?decision.reason_codes, "trading blocked by quorum health");
        }
    }

    async fn refresh_markets(&mut self, now: i64) -> AppResult<()> {
        let mut markets = Vec::new();
        for horizon in HORIZONS {
            let current_start = floor_to_boundary(now, horizon.seconds());
            for start_epoch in [current_start, current_start + horizon.seconds()] {
                match self.catalog.get_market(horizon, start_epoch).await {
                    Ok(market) => markets.push(market),
                    Err(e) => {
                        info!(horizon = ?horizon, start_epoch, error = %e, "market not available");
                    }
                }
            }
        }

        let mut token_ids: Vec<String> = Vec::new();
        for market in &markets {
            token_ids.push(market.up_token_id.clone());
            token_ids.push(market.down_token_id.clone());
        }
        token_ids.sort();
        token_ids.dedup();

        self.fee_cache.warm(token_ids.clone()).await;
        for token_id in &token_ids {
            if let Some(tick_size) = self.book_state.tick_size(token_id) {
                let fee_rate_bps = self.fee_cache.get_fee_rate_bps(token_id);
                let partial = PartialTokenConstraints {
                    tick_size: Some(Price::new(tick_size)),
                    min_order_size: None,
                    fee_rate_bps,
                };
                self.token_cache.put(token_id, &partial);
            }
        }

        if token_ids != self.book_tokens {
            info!(
                old_tokens = self.book_tokens.len(),
                new_tokens = token_ids.len(),
                "clob_token_set_changed_resubscribing"
            );
            let _ = self.book_tokens_tx.send(token_ids.clone());
        }

        self.markets = markets;
        self.book_tokens = token_ids;
        Ok(())
    }

    async fn maybe_trade(&mut self, now: i64) {
        if self.strategy.price_is_stale() {
            return;
        }
        let Some(candidate) = self.strategy.pick_best(now, &self.markets) else {
            return;
        };
        let Some(market) = self
            .markets
            .iter()
            .find(|m| m.key == candidate.market_key)
            .cloned()
        else {
            return;
        };

        let ask = Price::new(rust_decimal::Decimal::try_from(candidate.ask).unwrap_or_default());
        let horizon_label = market.horizon_minutes().to_string();
        self.recorder.record(
            "decision",
            now,
            json!({
                "token_id": candidate.token_id,
                "direction": candidate.direction.to_string(),
                "ev": candidate.ev,
                "p_hat": candidate.p_hat,
            }),
        );

        self.recorder.record(
            "order_attempt",
            now,
            json!({"token_id": candidate.token_id, "ask": candidate.ask}),
        );

        let filled = self
            .trader
            .buy_fok(
                now,
                &candidate.token_id,
                ask,
                &horizon_label,
                candidate.direction,
                Some(candidate.p_hat),
                candidate.fee_cost,
                candidate.slippage_cost,
                Some(market.slug().as_str()),
                Some(market.key.start_epoch),
            )
            .await;

        self.recorder.record(
            "order_result",
            now,
            json!({"token_id": candidate.token_id, "filled": filled}),
        );
    }
}

/// Aligns `epoch` down to the nearest `horizon_seconds` boundary, matching
/// `MarketKey::is_aligned`'s invariant.
fn floor_to_boundary(epoch: i64, horizon_seconds: i64) -> i64 {
    epoch - epoch.rem_euclid(horizon_seconds)
}
