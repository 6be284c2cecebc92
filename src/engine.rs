//! Engine - wires the stream, tracker, signal, alert, and outcome
//! components together and drives the event loop
//!
//! One `tokio::select!` loop owns all state transitions: stream events,
//! recheck ticks, the eviction sweep, and the snapshot timer. Alert
//! enrichment and delivery are spawned off the loop so a slow collaborator
//! never stalls trade processing.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertBook, AlertEngine, AlertTrigger};
use crate::config::Config;
use crate::enrichment::{HttpRiskAnalyzer, NoopRiskAnalyzer, RiskAnalyzer};
use crate::error::Result;
use crate::notify::{LogSink, NotificationSink, WebhookSink};
use crate::outcome::OutcomeTracker;
use crate::persistence::{self, Snapshot, TokenSummary};
use crate::scheduler::{RecheckScheduler, RecheckTick};
use crate::signal;
use crate::stream::{StreamClient, StreamEvent, StreamHandle, TokenMigrated, TradeExecuted};
use crate::tracker::TokenTracker;

/// Volume that must have traded before a market-cap collapse counts as a
/// rug pull rather than a token that never went anywhere.
const RUG_PRIOR_VOLUME_SOL: f64 = 10.0;

pub struct Engine {
    config: Config,
    tracker: Arc<TokenTracker>,
    book: Arc<AlertBook>,
    alerts: Arc<AlertEngine>,
    outcome: Arc<OutcomeTracker>,
    stream: StreamHandle,
    smart_wallets: HashSet<String>,
    snapshot_path: PathBuf,
}

impl Engine {
    /// Build the pipeline and run until ctrl-c
    pub async fn run(config: Config, dry_run: bool) -> Result<()> {
        let tracker = Arc::new(TokenTracker::new(config.tracker.clone()));
        let book = Arc::new(AlertBook::new());

        let sink: Arc<dyn NotificationSink> = if dry_run || config.notifier.webhook_url.is_empty()
        {
            Arc::new(LogSink)
        } else {
            Arc::new(WebhookSink::new(&config.notifier))
        };

        let analyzer: Arc<dyn RiskAnalyzer> = if config.enrichment.enabled && !dry_run {
            Arc::new(HttpRiskAnalyzer::new(&config.enrichment))
        } else {
            Arc::new(NoopRiskAnalyzer)
        };

        let (scheduler, recheck_rx) = RecheckScheduler::new(1024);

        let outcome = Arc::new(OutcomeTracker::new(
            config.outcome.clone(),
            Arc::clone(&book),
            Arc::clone(&sink),
        ));

        let alerts = Arc::new(AlertEngine::new(
            config.alerts.clone(),
            config.outcome.check_offsets_mins.clone(),
            Arc::clone(&tracker),
            Arc::clone(&book),
            analyzer,
            sink,
            scheduler,
        ));

        let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(4096);
        let (mut client, stream) = StreamClient::new(config.stream.clone(), event_tx);

        let snapshot_path = PathBuf::from(&config.persistence.path);

        // Warm restart: restore dedup state and replay subscriptions
        if config.persistence.enabled {
            if let Some(snapshot) = persistence::load(&snapshot_path).await {
                for token in &snapshot.tokens {
                    tracker
                        .restore(
                            &token.mint,
                            &token.symbol,
                            token.created_at,
                            token.market_cap_sol,
                            token.has_alerted,
                            token.baseline_market_cap,
                            token.last_alert_price,
                            token.rugged,
                        )
                        .await;
                }
                book.restore(snapshot.alerts);
                outcome.restore_stats(snapshot.stats);
                client.preload_subscriptions(tracker.tracked_mints().await);
            }
        }

        let smart_wallets: HashSet<String> = if config.smart_money.enabled {
            config.smart_money.wallets.iter().cloned().collect()
        } else {
            HashSet::new()
        };
        if !smart_wallets.is_empty() {
            client.preload_accounts(smart_wallets.iter().cloned().collect());
        }

        tokio::spawn(client.run());

        let engine = Self {
            config,
            tracker,
            book,
            alerts,
            outcome,
            stream,
            smart_wallets,
            snapshot_path,
        };
        engine.event_loop(event_rx, recheck_rx).await
    }

    async fn event_loop(
        &self,
        mut event_rx: mpsc::Receiver<StreamEvent>,
        mut recheck_rx: mpsc::Receiver<RecheckTick>,
    ) -> Result<()> {
        let mut sweep = tokio::time::interval(Duration::from_secs(
            self.config.tracker.sweep_interval_secs.max(1),
        ));
        sweep.tick().await; // immediate first tick discarded
        let mut snapshot = tokio::time::interval(Duration::from_secs(
            self.config.persistence.interval_secs.max(1),
        ));
        snapshot.tick().await;

        info!("Engine started");

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_stream_event(event).await,
                        None => {
                            error!("Stream channel closed, shutting down");
                            break;
                        }
                    }
                }
                Some(tick) = recheck_rx.recv() => {
                    self.handle_recheck(tick).await;
                }
                _ = sweep.tick() => {
                    let now = Utc::now();
                    let evicted = self.tracker.evict_expired(now).await;
                    for mint in evicted {
                        self.stream.unsubscribe(&mint).await;
                    }
                    // Resolved records and stale cooldowns age out with the
                    // tokens they belonged to
                    let cutoff = now
                        - chrono::Duration::seconds(self.config.tracker.max_token_age_secs as i64);
                    let pruned = self.book.prune_resolved(cutoff);
                    if pruned > 0 {
                        debug!(pruned, "Dropped aged-out resolved alert records");
                    }
                    self.alerts.prune_cooldowns(now);
                }
                _ = snapshot.tick() => {
                    if self.config.persistence.enabled {
                        if let Err(e) = self.save_snapshot().await {
                            warn!(error = %e, "Snapshot save failed");
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        if self.config.persistence.enabled {
            if let Err(e) = self.save_snapshot().await {
                warn!(error = %e, "Final snapshot save failed");
            }
        }
        self.stream.shutdown().await;
        Ok(())
    }

    async fn handle_stream_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::TokenCreated(created) => {
                if self.tracker.register(&created).await {
                    self.stream.subscribe(&created.mint).await;
                }
            }
            StreamEvent::Trade(trade) => self.handle_trade(trade).await,
            StreamEvent::Migration(migration) => self.handle_migration(migration).await,
            StreamEvent::Connected => {
                info!("Stream connected");
            }
            StreamEvent::Disconnected => {
                warn!("Stream disconnected, reconnect scheduled");
            }
        }
    }

    async fn handle_trade(&self, trade: TradeExecuted) {
        let now = Utc::now();

        if self.tracker.apply_trade(&trade).await {
            self.stream.subscribe(&trade.mint).await;
        }
        self.tracker.compute_metrics(&trade.mint).await;

        let state = match self.tracker.get(&trade.mint).await {
            Some(s) => s,
            None => return,
        };

        // Collapse below the floor after real volume is a rug, permanently
        if !state.rugged
            && state.market_cap_sol < self.config.outcome.rug_floor_sol
            && state.total_volume_sol >= RUG_PRIOR_VOLUME_SOL
        {
            self.tracker.mark_rugged(&trade.mint).await;
        }

        if self.smart_wallets.contains(&trade.trader) {
            self.tracker
                .record_smart_money(&trade.mint, &trade.trader, trade.is_buy, trade.sol_amount)
                .await;
            if trade.is_buy {
                self.emit(
                    &trade.mint,
                    AlertTrigger::SmartMoney {
                        wallet: trade.trader.clone(),
                    },
                )
                .await;
            }
        }

        // Re-read so the signal sees smart-money and rug updates
        if let Some(state) = self.tracker.get(&trade.mint).await {
            let score = signal::score_token(&state, &self.config.signal, now);
            debug!(mint = %trade.mint, score = score.score, category = ?score.category, "Scored");
            if score.category.alert_eligible() {
                self.emit(&trade.mint, AlertTrigger::Signal(score)).await;
            }
        }

        // Opportunistic outcome check on every trade
        self.outcome
            .check_mint(&trade.mint, trade.market_cap_sol, now)
            .await;
    }

    async fn handle_migration(&self, migration: TokenMigrated) {
        self.tracker.mark_migrated(&migration.mint).await;
        self.emit(&migration.mint, AlertTrigger::Migration).await;
    }

    async fn emit(&self, mint: &str, trigger: AlertTrigger) {
        if self.alerts.evaluate(mint, trigger, Utc::now()).await.is_some() {
            self.outcome.record_alert_emitted();
        }
    }

    /// Scheduled recheck: a missing token or record is a no-op
    async fn handle_recheck(&self, tick: RecheckTick) {
        if let Some(state) = self.tracker.get(&tick.mint).await {
            self.outcome
                .check(&tick.alert_id, state.market_cap_sol, Utc::now())
                .await;
        } else {
            debug!(mint = %tick.mint, "Recheck for evicted token skipped");
        }
    }

    /// Operator reset: clears tracked tokens, the alert table, statistics,
    /// quota and cooldowns. Each component clears behind its own lock, so
    /// readers see the old state or the cleared state, never a torn mix.
    pub async fn reset_all(&self) {
        self.tracker.clear().await;
        self.book.clear();
        self.outcome.reset();
        self.alerts.reset();
        info!("All in-memory state cleared");
    }

    async fn save_snapshot(&self) -> Result<()> {
        let mut tokens = Vec::new();
        for mint in self.tracker.tracked_mints().await {
            if let Some(state) = self.tracker.get(&mint).await {
                tokens.push(TokenSummary::from(&state));
            }
        }
        let snapshot = Snapshot {
            saved_at: Utc::now(),
            tokens,
            alerts: self.book.all_records(),
            stats: self.outcome.stats(),
        };
        persistence::save(&self.snapshot_path, &snapshot).await
    }
}
