//! Token tracker - single source of truth for per-token aggregates
//!
//! Unbounded token cardinality with strictly bounded per-token memory:
//! price and trade histories are ring-buffered, volume buckets are pruned
//! beyond the retention window, and a periodic sweep evicts tokens past the
//! maximum tracking age. The tracker is an explicit keyed store constructed
//! per instance so tests build their own.

pub mod analysis;

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::stream::events::{TokenCreated, TradeExecuted};

pub use analysis::{CheckResult, NaturalnessReport, Trend, TrendSignal, VolumeHealth};

/// A single retained trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trader: String,
    pub is_buy: bool,
    pub sol_amount: f64,
    pub token_amount: f64,
    /// SOL per token at execution
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// A retained price observation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Fixed-interval volume bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolumeBucket {
    pub start: DateTime<Utc>,
    pub volume_sol: f64,
    pub buy_volume_sol: f64,
    pub trade_count: u32,
}

/// Smart-money activity observed on a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartMoneyActivity {
    pub wallet: String,
    pub is_buy: bool,
    pub sol_amount: f64,
    pub timestamp: DateTime<Utc>,
}

/// Recomputed metrics; never mutated independently of the inputs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DerivedMetrics {
    /// buy volume / sell volume; +INF when sells are zero but buys exist
    pub buy_sell_ratio: f64,
    /// % change from first to latest retained price point
    pub price_change_pct: f64,
    /// SOL per minute over the most recent volume bucket
    pub volume_velocity: f64,
    pub holder_count: usize,
    pub trend: TrendSignal,
    pub volume_health: VolumeHealth,
    pub naturalness: NaturalnessReport,
}

/// Full per-token state
#[derive(Debug, Clone)]
pub struct TokenState {
    // Identity
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,

    // Market snapshot
    pub price_sol: f64,
    pub market_cap_sol: f64,
    pub v_sol_reserve: f64,
    pub v_token_reserve: f64,

    // Bounded history
    pub prices: VecDeque<PricePoint>,
    pub trades: VecDeque<TradeRecord>,
    pub volume_buckets: VecDeque<VolumeBucket>,

    // Aggregates
    pub total_volume_sol: f64,
    pub buy_volume_sol: f64,
    pub sell_volume_sol: f64,
    pub holders: HashSet<String>,
    pub whale_trades: u32,
    pub smart_money_log: Vec<SmartMoneyActivity>,

    // Derived
    pub metrics: DerivedMetrics,

    // Alert/dedup state
    pub has_alerted: bool,
    /// Set exactly once per alert cycle
    pub baseline_market_cap: Option<f64>,
    pub last_alert_price: Option<f64>,
    /// Monotonic: once true, never cleared
    pub rugged: bool,
    pub migrated: bool,
}

impl TokenState {
    fn new(mint: String, name: String, symbol: String, creator: String, created_at: DateTime<Utc>) -> Self {
        Self {
            mint,
            name,
            symbol,
            creator,
            created_at,
            price_sol: 0.0,
            market_cap_sol: 0.0,
            v_sol_reserve: 0.0,
            v_token_reserve: 0.0,
            prices: VecDeque::new(),
            trades: VecDeque::new(),
            volume_buckets: VecDeque::new(),
            total_volume_sol: 0.0,
            buy_volume_sol: 0.0,
            sell_volume_sol: 0.0,
            holders: HashSet::new(),
            whale_trades: 0,
            smart_money_log: Vec::new(),
            metrics: DerivedMetrics::default(),
            has_alerted: false,
            baseline_market_cap: None,
            last_alert_price: None,
            rugged: false,
            migrated: false,
        }
    }

    /// Age of the token since first observation
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }
}

/// Baseline committed when an alert cycle opens
#[derive(Debug, Clone, Copy)]
pub struct AlertCycle {
    pub baseline_market_cap: f64,
    pub alert_price: f64,
    /// True when an earlier cycle existed for this token
    pub rearmed: bool,
}

/// Keyed per-token state store with bounded memory
pub struct TokenTracker {
    config: TrackerConfig,
    tokens: RwLock<HashMap<String, TokenState>>,
}

impl TokenTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new token. No-op if already present; returns true when
    /// newly registered (caller subscribes the stream on true).
    pub async fn register(&self, event: &TokenCreated) -> bool {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&event.mint) {
            return false;
        }

        let mut state = TokenState::new(
            event.mint.clone(),
            event.name.clone(),
            event.symbol.clone(),
            event.creator.clone(),
            event.timestamp,
        );
        state.market_cap_sol = event.market_cap_sol;
        state.v_sol_reserve = event.v_sol_reserve;
        state.v_token_reserve = event.v_token_reserve;

        debug!(mint = %event.mint, symbol = %event.symbol, "Registered token");
        tokens.insert(event.mint.clone(), state);
        true
    }

    /// Apply a trade. Auto-registers unknown mints; returns true when the
    /// mint was newly registered by this trade.
    pub async fn apply_trade(&self, trade: &TradeExecuted) -> bool {
        let mut tokens = self.tokens.write().await;

        let auto_registered = !tokens.contains_key(&trade.mint);
        if auto_registered {
            debug!(mint = %trade.mint, "Auto-registered token from trade");
        }
        let state = tokens.entry(trade.mint.clone()).or_insert_with(|| {
            TokenState::new(
                trade.mint.clone(),
                String::new(),
                String::new(),
                String::new(),
                trade.timestamp,
            )
        });

        let price = if trade.token_amount > 0.0 {
            trade.sol_amount / trade.token_amount
        } else {
            state.price_sol
        };

        state.price_sol = price;
        state.market_cap_sol = trade.market_cap_sol;
        state.v_sol_reserve = trade.v_sol_reserve;
        state.v_token_reserve = trade.v_token_reserve;

        state.prices.push_back(PricePoint {
            price,
            timestamp: trade.timestamp,
        });
        while state.prices.len() > self.config.max_price_points {
            state.prices.pop_front();
        }

        state.trades.push_back(TradeRecord {
            trader: trade.trader.clone(),
            is_buy: trade.is_buy,
            sol_amount: trade.sol_amount,
            token_amount: trade.token_amount,
            price,
            timestamp: trade.timestamp,
        });
        while state.trades.len() > self.config.max_trades {
            state.trades.pop_front();
        }

        state.total_volume_sol += trade.sol_amount;
        if trade.is_buy {
            state.buy_volume_sol += trade.sol_amount;
        } else {
            state.sell_volume_sol += trade.sol_amount;
        }
        state.holders.insert(trade.trader.clone());
        if trade.sol_amount >= self.config.whale_trade_sol {
            state.whale_trades += 1;
        }

        // Volume bucket: fixed-interval, pruned past the retention window
        let bucket_secs = self.config.volume_bucket_secs as i64;
        let bucket_start_secs = (trade.timestamp.timestamp() / bucket_secs) * bucket_secs;
        let bucket_start = DateTime::<Utc>::from_timestamp(bucket_start_secs, 0)
            .unwrap_or(trade.timestamp);

        match state.volume_buckets.back_mut() {
            Some(bucket) if bucket.start == bucket_start => {
                bucket.volume_sol += trade.sol_amount;
                if trade.is_buy {
                    bucket.buy_volume_sol += trade.sol_amount;
                }
                bucket.trade_count += 1;
            }
            _ => {
                state.volume_buckets.push_back(VolumeBucket {
                    start: bucket_start,
                    volume_sol: trade.sol_amount,
                    buy_volume_sol: if trade.is_buy { trade.sol_amount } else { 0.0 },
                    trade_count: 1,
                });
            }
        }
        let retention = Duration::seconds(self.config.volume_retention_secs as i64);
        while let Some(front) = state.volume_buckets.front() {
            if trade.timestamp - front.start > retention {
                state.volume_buckets.pop_front();
            } else {
                break;
            }
        }

        auto_registered
    }

    /// Record smart-money activity on a token
    pub async fn record_smart_money(&self, mint: &str, wallet: &str, is_buy: bool, sol_amount: f64) {
        let mut tokens = self.tokens.write().await;
        if let Some(state) = tokens.get_mut(mint) {
            state.smart_money_log.push(SmartMoneyActivity {
                wallet: wallet.to_string(),
                is_buy,
                sol_amount,
                timestamp: Utc::now(),
            });
        }
    }

    /// Recompute derived metrics from retained history. Idempotent; safe to
    /// call any number of times per trade.
    pub async fn compute_metrics(&self, mint: &str) {
        let mut tokens = self.tokens.write().await;
        let state = match tokens.get_mut(mint) {
            Some(s) => s,
            None => return,
        };

        let buy_sell_ratio = if state.sell_volume_sol > 0.0 {
            state.buy_volume_sol / state.sell_volume_sol
        } else if state.buy_volume_sol > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let price_change_pct = match (state.prices.front(), state.prices.back()) {
            (Some(first), Some(last)) if first.price > 0.0 => {
                (last.price - first.price) / first.price * 100.0
            }
            _ => 0.0,
        };

        let volume_velocity = state
            .volume_buckets
            .back()
            .map(|b| b.volume_sol / (self.config.volume_bucket_secs as f64 / 60.0))
            .unwrap_or(0.0);

        let prices: Vec<f64> = state.prices.iter().map(|p| p.price).collect();
        let trades: Vec<TradeRecord> = state.trades.iter().cloned().collect();

        state.metrics = DerivedMetrics {
            buy_sell_ratio,
            price_change_pct,
            volume_velocity,
            holder_count: state.holders.len(),
            trend: analysis::detect_trend(&prices),
            volume_health: analysis::volume_profile_health(&trades),
            naturalness: analysis::assess_naturalness(&trades),
        };
    }

    /// Snapshot a token's state
    pub async fn get(&self, mint: &str) -> Option<TokenState> {
        self.tokens.read().await.get(mint).cloned()
    }

    /// Commit alert-cycle dedup state. The caller's dedup gate blocks every
    /// trigger between alert and re-arm, so each call here opens a cycle
    /// (first alert or re-arm) and takes a fresh baseline.
    pub async fn begin_alert_cycle(&self, mint: &str) -> Option<AlertCycle> {
        let mut tokens = self.tokens.write().await;
        let state = tokens.get_mut(mint)?;

        let rearmed = state.has_alerted;
        state.has_alerted = true;
        state.last_alert_price = Some(state.price_sol);
        state.baseline_market_cap = Some(state.market_cap_sol);

        Some(AlertCycle {
            baseline_market_cap: state.market_cap_sol,
            alert_price: state.price_sol,
            rearmed,
        })
    }

    /// Set the monotonic rug flag
    pub async fn mark_rugged(&self, mint: &str) {
        let mut tokens = self.tokens.write().await;
        if let Some(state) = tokens.get_mut(mint) {
            if !state.rugged {
                warn!(mint = %mint, symbol = %state.symbol, "Token flagged as rug pull");
                state.rugged = true;
            }
        }
    }

    pub async fn mark_migrated(&self, mint: &str) {
        let mut tokens = self.tokens.write().await;
        if let Some(state) = tokens.get_mut(mint) {
            state.migrated = true;
        }
    }

    /// Remove a token entirely. Returns true when it existed (caller
    /// unsubscribes the stream on true).
    pub async fn evict(&self, mint: &str) -> bool {
        let removed = self.tokens.write().await.remove(mint).is_some();
        if removed {
            debug!(mint = %mint, "Evicted token");
        }
        removed
    }

    /// Sweep tokens past the maximum tracking age. Returns the evicted
    /// mints so the caller can unsubscribe them.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let max_age = Duration::seconds(self.config.max_token_age_secs as i64);
        let mut tokens = self.tokens.write().await;
        let mut evicted = Vec::new();

        tokens.retain(|mint, state| {
            if now - state.created_at > max_age {
                evicted.push(mint.clone());
                false
            } else {
                true
            }
        });

        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted expired tokens");
        }
        evicted
    }

    pub async fn tracked_count(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn tracked_mints(&self) -> Vec<String> {
        self.tokens.read().await.keys().cloned().collect()
    }

    /// Restore dedup-relevant state from a snapshot summary (warm restart)
    pub async fn restore(
        &self,
        mint: &str,
        symbol: &str,
        created_at: DateTime<Utc>,
        market_cap_sol: f64,
        has_alerted: bool,
        baseline_market_cap: Option<f64>,
        last_alert_price: Option<f64>,
        rugged: bool,
    ) {
        let mut tokens = self.tokens.write().await;
        let state = tokens.entry(mint.to_string()).or_insert_with(|| {
            TokenState::new(
                mint.to_string(),
                String::new(),
                symbol.to_string(),
                String::new(),
                created_at,
            )
        });
        state.market_cap_sol = market_cap_sol;
        state.has_alerted = has_alerted;
        state.baseline_market_cap = baseline_market_cap;
        state.last_alert_price = last_alert_price;
        state.rugged = rugged;
    }

    /// Clear every tracked token (operator reset)
    pub async fn clear(&self) {
        self.tokens.write().await.clear();
    }
}
