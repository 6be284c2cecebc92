//! Outcome and milestone tracker
//!
//! Every check funnels through the record's own guards: milestones check
//! the record's achieved set, outcomes check the resolved flag. Scheduled
//! rechecks and opportunistic per-trade checks are therefore idempotent
//! with respect to each other, and a resolved record is immutable no matter
//! how the price moves afterwards.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::alerts::{AlertBook, AlertOutcome, AlertType};
use crate::config::OutcomeConfig;
use crate::notify::{AlertNotification, NotificationKind, NotificationSink};

/// How long after the alert a win landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinTiming {
    Under1Hour,
    Under6Hours,
    Under24Hours,
    Over24Hours,
}

impl WinTiming {
    fn bucket(elapsed_secs: i64) -> Self {
        if elapsed_secs <= 3600 {
            Self::Under1Hour
        } else if elapsed_secs <= 6 * 3600 {
            Self::Under6Hours
        } else if elapsed_secs <= 24 * 3600 {
            Self::Under24Hours
        } else {
            Self::Over24Hours
        }
    }
}

/// Global alerting statistics, persisted across restarts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalStats {
    pub alerts_emitted: u64,
    pub wins: u64,
    pub losses: u64,
    pub wins_by_type: BTreeMap<String, u64>,
    #[serde(default)]
    pub losses_by_type: BTreeMap<String, u64>,
    pub wins_by_timing: BTreeMap<WinTiming, u64>,
    pub milestone_counts: BTreeMap<u32, u64>,
    pub max_win_gain_pct: f64,
    pub total_win_gain_pct: f64,
}

impl GlobalStats {
    pub fn win_rate(&self) -> f64 {
        let resolved = self.wins + self.losses;
        if resolved == 0 {
            0.0
        } else {
            self.wins as f64 / resolved as f64 * 100.0
        }
    }

    pub fn average_win_gain_pct(&self) -> f64 {
        if self.wins == 0 {
            0.0
        } else {
            self.total_win_gain_pct / self.wins as f64
        }
    }
}

enum Resolution {
    Win { gain_pct: f64, timing: WinTiming },
    Loss,
}

pub struct OutcomeTracker {
    config: OutcomeConfig,
    book: Arc<AlertBook>,
    sink: Arc<dyn NotificationSink>,
    stats: RwLock<GlobalStats>,
}

impl OutcomeTracker {
    pub fn new(config: OutcomeConfig, book: Arc<AlertBook>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            config,
            book,
            sink,
            stats: RwLock::new(GlobalStats::default()),
        }
    }

    pub fn record_alert_emitted(&self) {
        self.write_stats(|s| s.alerts_emitted += 1);
    }

    /// Check one alert record against the current market cap. Safe to call
    /// from the scheduled path and the per-trade path concurrently; a
    /// missing record is a no-op.
    pub async fn check(&self, alert_id: &Uuid, current_market_cap: f64, now: DateTime<Utc>) {
        // Mutate under the book shard lock, collect notifications, send
        // after release.
        let mut notifications = Vec::new();

        let updated = self.book.with_record_mut(alert_id, |record| {
            if record.baseline_market_cap <= 0.0 {
                return None;
            }
            let multiple = record.multiple_of_baseline(current_market_cap);

            // Milestones continue after resolution; a resolved WIN can
            // still climb the ladder.
            for &m in &self.config.milestones {
                if multiple >= m as f64 && record.milestones_hit.insert(m) {
                    record.highest_multiple = record.highest_multiple.max(m);
                    notifications.push(milestone_notification(record, m, current_market_cap));
                }
            }

            if record.is_resolved() {
                return None;
            }

            let gain_pct = (current_market_cap - record.baseline_market_cap)
                / record.baseline_market_cap
                * 100.0;

            if gain_pct >= self.config.win_threshold_pct {
                let elapsed = (now - record.created_at).num_seconds();
                let timing = WinTiming::bucket(elapsed);
                record.outcome = AlertOutcome::Win;
                record.outcome_gain_pct = Some(gain_pct);
                record.resolved_at = Some(now);
                notifications.push(outcome_notification(record, current_market_cap, true, gain_pct));
                Some((record.alert_type, Resolution::Win { gain_pct, timing }))
            } else if current_market_cap < self.config.rug_floor_sol {
                record.outcome = AlertOutcome::Loss;
                record.outcome_gain_pct = Some(gain_pct);
                record.resolved_at = Some(now);
                notifications.push(outcome_notification(record, current_market_cap, false, gain_pct));
                Some((record.alert_type, Resolution::Loss))
            } else {
                None
            }
        });

        // Record id no longer in the book: evicted or never existed
        let resolution = match updated {
            Some(r) => r,
            None => return,
        };

        if let Some((alert_type, resolution)) = resolution {
            match resolution {
                Resolution::Win { gain_pct, timing } => {
                    info!(%alert_id, gain_pct, "Alert resolved WIN");
                    self.write_stats(|s| {
                        s.wins += 1;
                        *s.wins_by_type.entry(alert_type.to_string()).or_insert(0) += 1;
                        *s.wins_by_timing.entry(timing).or_insert(0) += 1;
                        s.total_win_gain_pct += gain_pct;
                        if gain_pct > s.max_win_gain_pct {
                            s.max_win_gain_pct = gain_pct;
                        }
                    });
                }
                Resolution::Loss => {
                    info!(%alert_id, "Alert resolved LOSS");
                    self.write_stats(|s| {
                        s.losses += 1;
                        *s.losses_by_type.entry(alert_type.to_string()).or_insert(0) += 1;
                    });
                }
            }
        }

        if !notifications.is_empty() {
            self.write_stats(|s| {
                for n in &notifications {
                    if let Some(m) = n.multiple {
                        *s.milestone_counts.entry(m).or_insert(0) += 1;
                    }
                }
            });
        }

        for notification in notifications {
            if let Err(e) = self.sink.send(&notification).await {
                warn!(mint = %notification.mint, error = %e, "Notification delivery failed");
            }
        }
    }

    /// Opportunistic per-trade check: routes through the open record for
    /// the mint, if any, then through the same guards as the scheduled path.
    pub async fn check_mint(&self, mint: &str, current_market_cap: f64, now: DateTime<Utc>) {
        if let Some(id) = self.book.open_alert_for(mint) {
            self.check(&id, current_market_cap, now).await;
        }
    }

    pub fn stats(&self) -> GlobalStats {
        match self.stats.read() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Reload statistics from a snapshot (warm restart)
    pub fn restore_stats(&self, stats: GlobalStats) {
        self.write_stats(|s| *s = stats.clone());
    }

    pub fn reset(&self) {
        self.write_stats(|s| *s = GlobalStats::default());
    }

    fn write_stats(&self, f: impl FnOnce(&mut GlobalStats)) {
        let mut stats = match self.stats.write() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut stats);
    }
}

fn milestone_notification(
    record: &crate::alerts::AlertRecord,
    multiple: u32,
    market_cap_sol: f64,
) -> AlertNotification {
    AlertNotification {
        kind: NotificationKind::Milestone,
        alert_type: record.alert_type,
        mint: record.mint.clone(),
        symbol: record.symbol.clone(),
        title: format!("{}x milestone: {}", multiple, record.symbol),
        body: format!(
            "market cap {:.1} SOL, baseline {:.1} SOL",
            market_cap_sol, record.baseline_market_cap
        ),
        market_cap_sol,
        score: None,
        multiple: Some(multiple),
        risk: None,
        link: AlertNotification::link_for(&record.mint),
    }
}

fn outcome_notification(
    record: &crate::alerts::AlertRecord,
    market_cap_sol: f64,
    win: bool,
    gain_pct: f64,
) -> AlertNotification {
    let title = if win {
        format!("WIN: {} up {:.0}%", record.symbol, gain_pct)
    } else {
        format!("LOSS: {} fell below the rug floor", record.symbol)
    };
    AlertNotification {
        kind: NotificationKind::Outcome,
        alert_type: record.alert_type,
        mint: record.mint.clone(),
        symbol: record.symbol.clone(),
        title,
        body: format!(
            "market cap {:.1} SOL, baseline {:.1} SOL ({:+.1}%)",
            market_cap_sol, record.baseline_market_cap, gain_pct
        ),
        market_cap_sol,
        score: None,
        multiple: None,
        risk: None,
        link: AlertNotification::link_for(&record.mint),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertRecord;
    use crate::error::Result;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

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

    fn at(secs_after: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(T0 + secs_after, 0).unwrap()
    }

    fn open_alert(book: &AlertBook, mint: &str, baseline: f64) -> Uuid {
        let record = AlertRecord::new(
            mint.to_string(),
            "TEST".to_string(),
            AlertType::Bullish,
            baseline,
            0.0001,
            Some(91.0),
            at(0),
        );
        let id = record.id;
        book.insert(record);
        id
    }

    struct Harness {
        tracker: OutcomeTracker,
        book: Arc<AlertBook>,
        sink: Arc<CaptureSink>,
    }

    fn harness() -> Harness {
        let book = Arc::new(AlertBook::new());
        let sink = CaptureSink::new();
        let tracker = OutcomeTracker::new(
            OutcomeConfig::default(),
            Arc::clone(&book),
            sink.clone() as Arc<dyn NotificationSink>,
        );
        Harness { tracker, book, sink }
    }

    #[tokio::test]
    async fn test_win_at_51_pct_under_6_hours() {
        let h = harness();
        let id = open_alert(&h.book, "m1", 100.0);

        // 10 minutes after the alert, market cap 151
        h.tracker.check(&id, 151.0, at(600)).await;

        let record = h.book.get(&id).unwrap();
        assert_eq!(record.outcome, AlertOutcome::Win);
        assert!((record.outcome_gain_pct.unwrap() - 51.0).abs() < 1e-9);

        let stats = h.tracker.stats();
        assert_eq!(stats.wins, 1);
        // 10 minutes lands in the tightest bucket, which 6h also covers
        assert_eq!(stats.wins_by_timing.get(&WinTiming::Under1Hour), Some(&1));
        assert!((stats.max_win_gain_pct - 51.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_resolved_win_is_immutable() {
        let h = harness();
        let id = open_alert(&h.book, "m1", 100.0);
        h.tracker.check(&id, 151.0, at(600)).await;

        // Later collapse below the rug floor: no effect on the record
        h.tracker.check(&id, 30.0, at(1200)).await;

        let record = h.book.get(&id).unwrap();
        assert_eq!(record.outcome, AlertOutcome::Win);
        assert!((record.outcome_gain_pct.unwrap() - 51.0).abs() < 1e-9);
        let stats = h.tracker.stats();
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 0);
    }

    #[tokio::test]
    async fn test_loss_below_rug_floor() {
        let h = harness();
        let id = open_alert(&h.book, "m1", 100.0);
        h.tracker.check(&id, 30.0, at(600)).await;

        let record = h.book.get(&id).unwrap();
        assert_eq!(record.outcome, AlertOutcome::Loss);
        let stats = h.tracker.stats();
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.losses_by_type.get("bullish"), Some(&1));
    }

    #[tokio::test]
    async fn test_resolutions_counted_per_type() {
        let h = harness();

        let smart = AlertRecord::new(
            "m1".to_string(),
            "SM".to_string(),
            AlertType::SmartMoney,
            100.0,
            0.0001,
            None,
            at(0),
        );
        let smart_id = smart.id;
        h.book.insert(smart);
        let bullish_id = open_alert(&h.book, "m2", 100.0);

        h.tracker.check(&smart_id, 30.0, at(600)).await; // LOSS
        h.tracker.check(&bullish_id, 200.0, at(600)).await; // WIN

        let stats = h.tracker.stats();
        assert_eq!(stats.losses_by_type.get("smart_money"), Some(&1));
        assert_eq!(stats.losses_by_type.get("bullish"), None);
        assert_eq!(stats.wins_by_type.get("bullish"), Some(&1));
    }

    #[tokio::test]
    async fn test_no_loss_without_alert() {
        let h = harness();
        // Nothing open for this mint
        h.tracker.check_mint("never_alerted", 20.0, at(600)).await;
        let stats = h.tracker.stats();
        assert_eq!(stats.losses, 0);
        assert!(h.sink.taken().is_empty());
    }

    #[tokio::test]
    async fn test_milestones_exactly_once() {
        let h = harness();
        let id = open_alert(&h.book, "m1", 100.0);

        // 5x, then 10x, then repeated checks at 10x
        h.tracker.check(&id, 500.0, at(600)).await;
        h.tracker.check(&id, 1000.0, at(900)).await;
        h.tracker.check(&id, 1000.0, at(1200)).await;
        h.tracker.check(&id, 1000.0, at(1500)).await;

        let milestones: Vec<u32> = h
            .sink
            .taken()
            .iter()
            .filter(|n| n.kind == NotificationKind::Milestone)
            .filter_map(|n| n.multiple)
            .collect();
        // 500 crosses 2,3,5; 1000 adds 10. Each exactly once.
        assert_eq!(milestones, vec![2, 3, 5, 10]);

        let stats = h.tracker.stats();
        assert_eq!(stats.milestone_counts.get(&5), Some(&1));
        assert_eq!(stats.milestone_counts.get(&10), Some(&1));
        let record = h.book.get(&id).unwrap();
        assert_eq!(record.highest_multiple, 10);
    }

    #[tokio::test]
    async fn test_milestones_continue_after_win() {
        let h = harness();
        let id = open_alert(&h.book, "m1", 100.0);

        h.tracker.check(&id, 151.0, at(600)).await; // WIN
        h.tracker.check(&id, 2000.0, at(3600)).await; // 20x later

        let record = h.book.get(&id).unwrap();
        assert_eq!(record.outcome, AlertOutcome::Win);
        assert!(record.milestones_hit.contains(&20));
        // Outcome gain stays at the resolution value
        assert!((record.outcome_gain_pct.unwrap() - 51.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_record_is_noop() {
        let h = harness();
        h.tracker.check(&Uuid::new_v4(), 500.0, at(600)).await;
        assert!(h.sink.taken().is_empty());
        assert_eq!(h.tracker.stats().wins, 0);
    }

    #[tokio::test]
    async fn test_win_timing_buckets() {
        let h = harness();
        let id_1h = open_alert(&h.book, "m1", 100.0);
        let id_24h = open_alert(&h.book, "m2", 100.0);

        h.tracker.check(&id_1h, 200.0, at(1800)).await; // 30 min
        h.tracker.check(&id_24h, 200.0, at(10 * 3600)).await; // 10h

        let stats = h.tracker.stats();
        assert_eq!(stats.wins_by_timing.get(&WinTiming::Under1Hour), Some(&1));
        assert_eq!(stats.wins_by_timing.get(&WinTiming::Under24Hours), Some(&1));
        assert!((stats.win_rate() - 100.0).abs() < 1e-9);
    }
}
