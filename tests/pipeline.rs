//! End-to-end pipeline tests: trades in, alerts and outcomes out, with no
//! live stream. Events are fed straight into the tracker and the alert and
//! outcome engines are driven the way the event loop drives them.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use pumpwatch::alerts::{AlertBook, AlertEngine, AlertOutcome, AlertTrigger};
use pumpwatch::config::{AlertConfig, OutcomeConfig, SignalConfig, TrackerConfig};
use pumpwatch::enrichment::NoopRiskAnalyzer;
use pumpwatch::error::Result;
use pumpwatch::notify::{AlertNotification, NotificationKind, NotificationSink};
use pumpwatch::outcome::OutcomeTracker;
use pumpwatch::scheduler::RecheckScheduler;
use pumpwatch::signal::{self, SignalCategory, SignalFactors, SignalScore};
use pumpwatch::stream::events::TradeExecuted;
use pumpwatch::tracker::TokenTracker;

struct CaptureSink {
    sent: Mutex<Vec<AlertNotification>>,
}

impl CaptureSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    fn taken(&self) -> Vec<AlertNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for CaptureSink {
    async fn send(&self, notification: &AlertNotification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

const T0: i64 = 1_700_000_000;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(T0 + secs, 0).unwrap()
}

fn trade(mint: &str, trader: &str, is_buy: bool, sol: f64, tokens: f64, mcap: f64, secs: i64) -> TradeExecuted {
    TradeExecuted {
        mint: mint.to_string(),
        trader: trader.to_string(),
        is_buy,
        token_amount: tokens,
        sol_amount: sol,
        market_cap_sol: mcap,
        v_sol_reserve: 40.0,
        v_token_reserve: 900_000_000.0,
        timestamp: Utc.timestamp_opt(T0 + secs, 0).unwrap(),
    }
}

struct Pipeline {
    tracker: Arc<TokenTracker>,
    book: Arc<AlertBook>,
    alerts: AlertEngine,
    outcome: OutcomeTracker,
    sink: Arc<CaptureSink>,
}

fn pipeline() -> Pipeline {
    let tracker = Arc::new(TokenTracker::new(TrackerConfig::default()));
    let book = Arc::new(AlertBook::new());
    let sink = CaptureSink::new();
    let (scheduler, _rx) = RecheckScheduler::new(64);

    let alerts = AlertEngine::new(
        AlertConfig::default(),
        vec![],
        Arc::clone(&tracker),
        Arc::clone(&book),
        Arc::new(NoopRiskAnalyzer),
        sink.clone() as Arc<dyn NotificationSink>,
        scheduler,
    );
    let outcome = OutcomeTracker::new(
        OutcomeConfig::default(),
        Arc::clone(&book),
        sink.clone() as Arc<dyn NotificationSink>,
    );

    Pipeline {
        tracker,
        book,
        alerts,
        outcome,
        sink,
    }
}

fn strong_signal() -> AlertTrigger {
    AlertTrigger::Signal(SignalScore {
        score: 91.0,
        category: SignalCategory::VeryBullish,
        factors: SignalFactors::default(),
    })
}

#[tokio::test]
async fn alert_then_milestones_then_win() {
    let p = pipeline();

    // Organic-looking early flow
    for i in 0..20i64 {
        p.tracker
            .apply_trade(&trade("m1", &format!("t{}", i), true, 0.8, 8_000.0, 100.0, i * 13))
            .await;
        p.tracker.compute_metrics("m1").await;
    }

    // Alert fires once the token is old enough
    let alert_id = p.alerts.evaluate("m1", strong_signal(), at(600)).await.unwrap();
    let record = p.book.get(&alert_id).unwrap();
    assert!((record.baseline_market_cap - 100.0).abs() < 1e-9);

    // Trades push the market cap through 2x and into a win
    p.tracker.apply_trade(&trade("m1", "t99", true, 5.0, 10_000.0, 210.0, 900)).await;
    p.outcome.check_mint("m1", 210.0, at(900)).await;

    let record = p.book.get(&alert_id).unwrap();
    assert_eq!(record.outcome, AlertOutcome::Win);
    assert!(record.milestones_hit.contains(&2));

    let kinds: Vec<NotificationKind> = p.sink.taken().iter().map(|n| n.kind).collect();
    assert!(kinds.contains(&NotificationKind::Milestone));
    assert!(kinds.contains(&NotificationKind::Outcome));

    let stats = p.outcome.stats();
    assert_eq!(stats.wins, 1);
    assert_eq!(stats.milestone_counts.get(&2), Some(&1));
}

#[tokio::test]
async fn repeated_updates_produce_one_alert() {
    let p = pipeline();
    p.tracker.apply_trade(&trade("m1", "a", true, 1.0, 10_000.0, 120.0, 0)).await;

    let mut emitted = 0;
    for i in 0..10 {
        if p.alerts.evaluate("m1", strong_signal(), at(600 + i)).await.is_some() {
            emitted += 1;
        }
    }
    assert_eq!(emitted, 1);
    assert_eq!(p.book.len(), 1);
}

#[tokio::test]
async fn rugged_token_never_alerts_again() {
    let p = pipeline();
    p.tracker.apply_trade(&trade("m1", "a", true, 20.0, 100_000.0, 120.0, 0)).await;

    // Collapse after real volume
    p.tracker.mark_rugged("m1").await;

    // Metrics can look great afterwards; the flag still suppresses
    p.tracker.apply_trade(&trade("m1", "b", true, 5.0, 10_000.0, 200.0, 60)).await;
    p.tracker.compute_metrics("m1").await;
    assert!(p.alerts.evaluate("m1", strong_signal(), at(600)).await.is_none());
    assert!(p.book.is_empty());
}

#[tokio::test]
async fn scoring_is_driven_by_tracked_state() {
    let p = pipeline();
    let config = SignalConfig::default();

    // Heavy one-sided buying from many wallets
    for i in 0..60i64 {
        p.tracker
            .apply_trade(&trade("m1", &format!("w{}", i), true, 1.5, 10_000.0, 150.0, i * 7))
            .await;
    }
    p.tracker.compute_metrics("m1").await;
    let strong = p.tracker.get("m1").await.unwrap();
    let strong_score = signal::score_token(&strong, &config, at(420));

    // A token with two tiny trades
    p.tracker.apply_trade(&trade("m2", "x", true, 0.05, 500.0, 31.0, 0)).await;
    p.tracker.apply_trade(&trade("m2", "y", false, 0.05, 500.0, 31.0, 30)).await;
    p.tracker.compute_metrics("m2").await;
    let weak = p.tracker.get("m2").await.unwrap();
    let weak_score = signal::score_token(&weak, &config, at(420));

    assert!(strong_score.score > weak_score.score);
}

#[tokio::test]
async fn history_stays_bounded_under_load() {
    let tracker = TokenTracker::new(TrackerConfig {
        max_price_points: 1000,
        max_trades: 1000,
        ..TrackerConfig::default()
    });
    for i in 0..2_500i64 {
        tracker
            .apply_trade(&trade("m1", &format!("t{}", i % 40), true, 0.2, 2_000.0, 80.0, i))
            .await;
    }
    let state = tracker.get("m1").await.unwrap();
    assert_eq!(state.trades.len(), 1000);
    assert_eq!(state.prices.len(), 1000);
    assert_eq!(state.holders.len(), 40);
}
