//! Alert decision engine
//!
//! Gates every trigger through a short-circuit chain (rug flag, age, market
//! cap floor, type-specific gate, dedup/re-arm, cooldown, quota). Each gate
//! failure is a silent skip with a debug log, never an error.
//!
//! Dedup state is committed synchronously before the enrichment call
//! suspends: `has_alerted`, the baseline, the record, quota and cooldown are
//! all written first, then the enrichment+delivery continuation is spawned.
//! Interleaved trades for the same token observe consistent dedup state and
//! a slow enrichment service can never delay or duplicate an alert.

pub mod types;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AlertConfig;
use crate::enrichment::{RiskAnalysis, RiskAnalyzer};
use crate::notify::{AlertNotification, NotificationKind, NotificationSink};
use crate::scheduler::RecheckScheduler;
use crate::signal::SignalScore;
use crate::tracker::TokenTracker;

pub use types::{AlertOutcome, AlertRecord, AlertType};

/// What prompted an alert evaluation
#[derive(Debug, Clone)]
pub enum AlertTrigger {
    Signal(SignalScore),
    SmartMoney { wallet: String },
    Migration,
}

impl AlertTrigger {
    fn alert_type(&self) -> AlertType {
        match self {
            Self::Signal(_) => AlertType::Bullish,
            Self::SmartMoney { .. } => AlertType::SmartMoney,
            Self::Migration => AlertType::Migration,
        }
    }
}

/// Shared alert record table. The decision engine writes new records; the
/// outcome tracker resolves them. At most one open record per mint unless
/// re-armed, in which case the previous record stays in the table (it keeps
/// its own milestone and outcome history) and the open pointer moves on.
#[derive(Default)]
pub struct AlertBook {
    records: DashMap<Uuid, AlertRecord>,
    open_by_mint: DashMap<String, Uuid>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: AlertRecord) {
        self.open_by_mint.insert(record.mint.clone(), record.id);
        self.records.insert(record.id, record);
    }

    pub fn get(&self, id: &Uuid) -> Option<AlertRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    pub fn open_alert_for(&self, mint: &str) -> Option<Uuid> {
        self.open_by_mint.get(mint).map(|id| *id)
    }

    /// Mutate a record in place under the map shard lock
    pub fn with_record_mut<T>(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut AlertRecord) -> T,
    ) -> Option<T> {
        self.records.get_mut(id).map(|mut r| f(&mut r))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn all_records(&self) -> Vec<AlertRecord> {
        self.records.iter().map(|r| r.clone()).collect()
    }

    /// Drop resolved records that resolved before the cutoff, then drop any
    /// open pointer left dangling by the removal. Returns how many records
    /// were pruned. Unresolved records are never touched.
    pub fn prune_resolved(&self, resolved_before: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| match r.resolved_at {
            Some(at) => at >= resolved_before,
            None => true,
        });
        self.open_by_mint.retain(|_, id| self.records.contains_key(id));
        before - self.records.len()
    }

    /// Reload records from a snapshot (warm restart)
    pub fn restore(&self, records: Vec<AlertRecord>) {
        for record in records {
            if !record.is_resolved() {
                self.open_by_mint.insert(record.mint.clone(), record.id);
            }
            self.records.insert(record.id, record);
        }
    }

    pub fn clear(&self) {
        self.records.clear();
        self.open_by_mint.clear();
    }
}

struct QuotaState {
    day: NaiveDate,
    count: u32,
}

pub struct AlertEngine {
    config: AlertConfig,
    check_offsets_mins: Vec<u64>,
    tracker: Arc<TokenTracker>,
    book: Arc<AlertBook>,
    analyzer: Arc<dyn RiskAnalyzer>,
    sink: Arc<dyn NotificationSink>,
    scheduler: RecheckScheduler,
    quota: Mutex<QuotaState>,
    cooldowns: DashMap<(String, AlertType), DateTime<Utc>>,
}

impl AlertEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AlertConfig,
        check_offsets_mins: Vec<u64>,
        tracker: Arc<TokenTracker>,
        book: Arc<AlertBook>,
        analyzer: Arc<dyn RiskAnalyzer>,
        sink: Arc<dyn NotificationSink>,
        scheduler: RecheckScheduler,
    ) -> Self {
        Self {
            config,
            check_offsets_mins,
            tracker,
            book,
            analyzer,
            sink,
            scheduler,
            quota: Mutex::new(QuotaState {
                day: Utc::now().date_naive(),
                count: 0,
            }),
            cooldowns: DashMap::new(),
        }
    }

    /// Evaluate a trigger against the gate chain. Returns the new record id
    /// on emission, `None` on any gate skip or unknown mint.
    pub async fn evaluate(
        &self,
        mint: &str,
        trigger: AlertTrigger,
        now: DateTime<Utc>,
    ) -> Option<Uuid> {
        let state = self.tracker.get(mint).await?;
        let alert_type = trigger.alert_type();

        if state.rugged {
            debug!(%mint, "Skip: rug flag set");
            return None;
        }

        if state.age(now).num_seconds() < self.config.min_token_age_secs as i64 {
            debug!(%mint, "Skip: below minimum age");
            return None;
        }

        if state.market_cap_sol < self.config.min_market_cap_sol {
            debug!(%mint, market_cap_sol = state.market_cap_sol, "Skip: below market cap floor");
            return None;
        }

        let score = match &trigger {
            AlertTrigger::Signal(signal) => {
                if !signal.category.alert_eligible() {
                    return None;
                }
                Some(signal.score)
            }
            AlertTrigger::SmartMoney { .. } | AlertTrigger::Migration => None,
        };

        // Dedup, or re-arm on a large enough gain since the last alert price
        if state.has_alerted {
            let rearm_price = match state.last_alert_price {
                Some(p) if p > 0.0 => p * (1.0 + self.config.rearm_gain_pct / 100.0),
                _ => 0.0,
            };
            if rearm_price <= 0.0 || state.price_sol < rearm_price {
                debug!(%mint, "Skip: already alerted, re-arm threshold not met");
                return None;
            }
            info!(%mint, price = state.price_sol, "Re-armed after price gain");
        }

        let cooldown_key = (mint.to_string(), alert_type);
        if let Some(last) = self.cooldowns.get(&cooldown_key) {
            if (now - *last).num_seconds() < self.config.cooldown_secs as i64 {
                debug!(%mint, %alert_type, "Skip: cooldown active");
                return None;
            }
        }

        // Quota is consumed last: a skip on any other gate must not burn a
        // slot another token could use today.
        if !self.try_consume_quota(now) {
            warn!(%mint, quota = self.config.daily_quota, "Skip: daily alert quota exhausted");
            return None;
        }

        // All gates passed: commit every piece of dedup state before any
        // await that leaves the alerting path.
        let cycle = self.tracker.begin_alert_cycle(mint).await?;
        let record = AlertRecord::new(
            mint.to_string(),
            state.symbol.clone(),
            alert_type,
            cycle.baseline_market_cap,
            cycle.alert_price,
            score,
            now,
        );
        let record_id = record.id;
        self.book.insert(record.clone());
        self.cooldowns.insert(cooldown_key, now);
        self.scheduler.schedule(record_id, mint, &self.check_offsets_mins);

        info!(
            %mint,
            symbol = %state.symbol,
            %alert_type,
            baseline_market_cap = cycle.baseline_market_cap,
            score = ?score,
            "Alert emitted"
        );

        self.spawn_delivery(record, trigger, state.market_cap_sol);
        Some(record_id)
    }

    fn try_consume_quota(&self, now: DateTime<Utc>) -> bool {
        let mut quota = match self.quota.lock() {
            Ok(q) => q,
            Err(poisoned) => poisoned.into_inner(),
        };
        let today = now.date_naive();
        if quota.day != today {
            quota.day = today;
            quota.count = 0;
        }
        if quota.count >= self.config.daily_quota {
            return false;
        }
        quota.count += 1;
        true
    }

    /// Enrichment and delivery run off the event loop. Enrichment is raced
    /// against a hard timeout; on timeout or error the alert goes out with
    /// the neutral fallback. Sink failures are logged only.
    fn spawn_delivery(&self, record: AlertRecord, trigger: AlertTrigger, market_cap_sol: f64) {
        let analyzer = Arc::clone(&self.analyzer);
        let sink = Arc::clone(&self.sink);
        let timeout = Duration::from_millis(self.config.enrichment_timeout_ms);

        tokio::spawn(async move {
            let risk = match tokio::time::timeout(
                timeout,
                analyzer.fetch_risk_analysis(&record.mint),
            )
            .await
            {
                Ok(Ok(analysis)) => analysis,
                Ok(Err(e)) => {
                    warn!(mint = %record.mint, error = %e, "Enrichment failed, using fallback");
                    RiskAnalysis::unknown()
                }
                Err(_) => {
                    warn!(mint = %record.mint, timeout_ms = timeout.as_millis() as u64, "Enrichment timed out");
                    RiskAnalysis::unknown()
                }
            };

            let notification = build_notification(&record, &trigger, market_cap_sol, risk);
            if let Err(e) = sink.send(&notification).await {
                warn!(mint = %record.mint, error = %e, "Notification delivery failed");
            }
        });
    }

    /// Drop cooldown entries whose window has elapsed. Runs on the eviction
    /// sweep so cooldowns for long-gone mints do not accumulate.
    pub fn prune_cooldowns(&self, now: DateTime<Utc>) {
        let window = self.config.cooldown_secs as i64;
        self.cooldowns
            .retain(|_, last| (now - *last).num_seconds() < window);
    }

    pub fn active_cooldowns(&self) -> usize {
        self.cooldowns.len()
    }

    /// Daily quota remaining (stats surface)
    pub fn quota_remaining(&self, now: DateTime<Utc>) -> u32 {
        let quota = match self.quota.lock() {
            Ok(q) => q,
            Err(poisoned) => poisoned.into_inner(),
        };
        if quota.day != now.date_naive() {
            self.config.daily_quota
        } else {
            self.config.daily_quota.saturating_sub(quota.count)
        }
    }

    /// Operator reset: clears cooldowns and today's quota usage
    pub fn reset(&self) {
        self.cooldowns.clear();
        let mut quota = match self.quota.lock() {
            Ok(q) => q,
            Err(poisoned) => poisoned.into_inner(),
        };
        quota.count = 0;
    }
}

fn build_notification(
    record: &AlertRecord,
    trigger: &AlertTrigger,
    market_cap_sol: f64,
    risk: RiskAnalysis,
) -> AlertNotification {
    let symbol = if record.symbol.is_empty() {
        record.mint.chars().take(8).collect::<String>()
    } else {
        record.symbol.clone()
    };

    let (title, body) = match trigger {
        AlertTrigger::Signal(signal) => (
            format!("Bullish signal: {}", symbol),
            format!(
                "score {:.0} ({}), market cap {:.1} SOL",
                signal.score,
                signal.category.label(),
                market_cap_sol
            ),
        ),
        AlertTrigger::SmartMoney { wallet } => (
            format!("Smart money activity: {}", symbol),
            format!("wallet {} traded, market cap {:.1} SOL", wallet, market_cap_sol),
        ),
        AlertTrigger::Migration => (
            format!("Migration: {}", symbol),
            format!("bonding curve complete, market cap {:.1} SOL", market_cap_sol),
        ),
    };

    AlertNotification {
        kind: NotificationKind::Alert,
        alert_type: record.alert_type,
        mint: record.mint.clone(),
        symbol,
        title,
        body,
        market_cap_sol,
        score: record.score,
        multiple: None,
        risk: Some(risk),
        link: AlertNotification::link_for(&record.mint),
    }
}
