//! Signal engine - pure composite scoring over a token state snapshot
//!
//! Deterministic and side-effect-free: same snapshot, same score. Factors
//! are ratio-to-threshold, individually capped so no single dimension can
//! dominate; flat boosts cover binary observations (whale trades, smart
//! money, trend, volume health). Age and momentum bonuses scale the raw
//! total, which is then rescaled linearly into [0, 100].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SignalConfig;
use crate::tracker::{Trend, TokenState, VolumeHealth};

const BUY_PRESSURE_CAP: f64 = 2.0;
const VELOCITY_CAP: f64 = 2.5;
const HOLDER_CAP: f64 = 2.0;
const PRICE_CAP: f64 = 2.0;

/// Category tier derived from the composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalCategory {
    ExtremelyBullish,
    VeryBullish,
    Bullish,
    Neutral,
    NotPromising,
}

impl SignalCategory {
    pub fn from_score(score: f64) -> Self {
        if score >= 95.0 {
            Self::ExtremelyBullish
        } else if score >= 85.0 {
            Self::VeryBullish
        } else if score >= 75.0 {
            Self::Bullish
        } else if score >= 65.0 {
            Self::Neutral
        } else {
            Self::NotPromising
        }
    }

    /// Only the top two tiers qualify for a bullish-signal alert
    pub fn alert_eligible(&self) -> bool {
        matches!(self, Self::ExtremelyBullish | Self::VeryBullish)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ExtremelyBullish => "extremely bullish",
            Self::VeryBullish => "very bullish",
            Self::Bullish => "bullish",
            Self::Neutral => "neutral",
            Self::NotPromising => "not promising",
        }
    }
}

/// Individual capped factors, kept for alert payloads and logging
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SignalFactors {
    pub buy_pressure: f64,
    pub volume_velocity: f64,
    pub holder_growth: f64,
    pub price_change: f64,
    pub whale_boost: f64,
    pub smart_money_boost: f64,
    pub trend_boost: f64,
    pub volume_health_boost: f64,
    pub age_bonus: f64,
    pub momentum_bonus: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalScore {
    pub score: f64,
    pub category: SignalCategory,
    pub factors: SignalFactors,
}

/// Ratio to threshold, capped; non-finite inputs saturate the cap,
/// negatives floor at zero.
fn capped_factor(value: f64, threshold: f64, cap: f64) -> f64 {
    if threshold <= 0.0 {
        return 0.0;
    }
    if value.is_nan() {
        return 0.0;
    }
    if value.is_infinite() {
        return if value > 0.0 { cap } else { 0.0 };
    }
    (value / threshold).clamp(0.0, cap)
}

/// Score a token state snapshot
pub fn score_token(state: &TokenState, config: &SignalConfig, now: DateTime<Utc>) -> SignalScore {
    let m = &state.metrics;

    let buy_pressure = capped_factor(m.buy_sell_ratio, config.buy_sell_ratio_threshold, BUY_PRESSURE_CAP);
    let volume_velocity = capped_factor(m.volume_velocity, config.volume_velocity_threshold, VELOCITY_CAP);
    let holder_growth = capped_factor(m.holder_count as f64, config.holder_target as f64, HOLDER_CAP);
    let price_change = capped_factor(m.price_change_pct, config.price_change_target_pct, PRICE_CAP);

    let whale_boost = if state.whale_trades > 0 { config.whale_boost } else { 0.0 };
    let smart_money_boost = if !state.smart_money_log.is_empty() {
        config.smart_money_boost
    } else {
        0.0
    };
    let trend_boost = match m.trend.trend {
        Trend::StrongUptrend => config.strong_trend_boost,
        Trend::Uptrend => config.trend_boost,
        _ => 0.0,
    };
    let volume_health_boost = if m.volume_health == VolumeHealth::Healthy {
        config.volume_health_boost
    } else {
        0.0
    };

    // Newer tokens score higher; linear decay over the bonus window
    let age_secs = (now - state.created_at).num_seconds().max(0) as f64;
    let age_bonus = if config.age_bonus_window_secs > 0 {
        (config.age_bonus_max * (1.0 - age_secs / config.age_bonus_window_secs as f64))
            .clamp(0.0, config.age_bonus_max)
    } else {
        0.0
    };

    // Trade frequency relative to age
    let age_mins = (age_secs / 60.0).max(1.0);
    let trades_per_min = state.trades.len() as f64 / age_mins;
    let momentum_bonus = if config.momentum_trades_per_min > 0.0 {
        (trades_per_min / config.momentum_trades_per_min).min(1.0) * config.momentum_bonus_max
    } else {
        0.0
    };

    let raw = (config.weight_buy_pressure * buy_pressure
        + config.weight_volume * volume_velocity
        + config.weight_holders * holder_growth
        + config.weight_price * price_change
        + whale_boost
        + smart_money_boost
        + trend_boost
        + volume_health_boost)
        * (1.0 + age_bonus)
        * (1.0 + momentum_bonus);

    let max_raw = (config.weight_buy_pressure * BUY_PRESSURE_CAP
        + config.weight_volume * VELOCITY_CAP
        + config.weight_holders * HOLDER_CAP
        + config.weight_price * PRICE_CAP
        + config.whale_boost
        + config.smart_money_boost
        + config.strong_trend_boost
        + config.volume_health_boost)
        * (1.0 + config.age_bonus_max)
        * (1.0 + config.momentum_bonus_max);

    let mut score = if max_raw > 0.0 {
        raw / max_raw * 100.0
    } else {
        0.0
    };
    if score.is_nan() {
        score = 0.0;
    }
    score = score.clamp(0.0, 100.0);

    SignalScore {
        score,
        category: SignalCategory::from_score(score),
        factors: SignalFactors {
            buy_pressure,
            volume_velocity,
            holder_growth,
            price_change,
            whale_boost,
            smart_money_boost,
            trend_boost,
            volume_health_boost,
            age_bonus,
            momentum_bonus,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{DerivedMetrics, SmartMoneyActivity, TradeRecord, TrendSignal, Trend};
    use chrono::TimeZone;
    use std::collections::{HashSet, VecDeque};

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_600, 0).unwrap()
    }

    fn snapshot(metrics: DerivedMetrics) -> TokenState {
        TokenState {
            mint: "Mint111".to_string(),
            name: "Test".to_string(),
            symbol: "TEST".to_string(),
            creator: "Creator".to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            price_sol: 0.0001,
            market_cap_sol: 120.0,
            v_sol_reserve: 40.0,
            v_token_reserve: 900_000_000.0,
            prices: VecDeque::new(),
            trades: VecDeque::new(),
            volume_buckets: VecDeque::new(),
            total_volume_sol: 50.0,
            buy_volume_sol: 40.0,
            sell_volume_sol: 10.0,
            holders: HashSet::new(),
            whale_trades: 0,
            smart_money_log: Vec::new(),
            metrics,
            has_alerted: false,
            baseline_market_cap: None,
            last_alert_price: None,
            rugged: false,
            migrated: false,
        }
    }

    fn strong_metrics() -> DerivedMetrics {
        DerivedMetrics {
            buy_sell_ratio: 10.0,
            price_change_pct: 200.0,
            volume_velocity: 5.0,
            holder_count: 80,
            trend: TrendSignal {
                trend: Trend::StrongUptrend,
                strength: 8,
                change_pct: 120.0,
            },
            volume_health: VolumeHealth::Healthy,
            naturalness: Default::default(),
        }
    }

    #[test]
    fn test_determinism() {
        let state = snapshot(strong_metrics());
        let config = SignalConfig::default();
        let a = score_token(&state, &config, now());
        let b = score_token(&state, &config, now());
        assert_eq!(a.score, b.score);
        assert_eq!(a.category, b.category);
    }

    #[test]
    fn test_empty_state_scores_low() {
        let state = snapshot(DerivedMetrics::default());
        let result = score_token(&state, &SignalConfig::default(), now());
        assert!(result.score < 10.0);
        assert_eq!(result.category, SignalCategory::NotPromising);
    }

    #[test]
    fn test_strong_snapshot_is_alert_eligible() {
        let mut state = snapshot(strong_metrics());
        state.whale_trades = 2;
        state.smart_money_log.push(SmartMoneyActivity {
            wallet: "Smart111".to_string(),
            is_buy: true,
            sol_amount: 10.0,
            timestamp: now(),
        });
        // High trade frequency for the momentum bonus
        for i in 0..120 {
            state.trades.push_back(TradeRecord {
                trader: format!("t{}", i),
                is_buy: true,
                sol_amount: 0.5,
                token_amount: 1000.0,
                price: 0.0005,
                timestamp: now(),
            });
        }
        let result = score_token(&state, &SignalConfig::default(), now());
        assert!(result.score >= 85.0, "score was {}", result.score);
        assert!(result.category.alert_eligible());
    }

    #[test]
    fn test_factors_are_capped() {
        let state = snapshot(DerivedMetrics {
            buy_sell_ratio: f64::INFINITY,
            price_change_pct: 100_000.0,
            volume_velocity: 10_000.0,
            holder_count: 100_000,
            ..DerivedMetrics::default()
        });
        let result = score_token(&state, &SignalConfig::default(), now());
        assert!((result.factors.buy_pressure - 2.0).abs() < f64::EPSILON);
        assert!((result.factors.volume_velocity - 2.5).abs() < f64::EPSILON);
        assert!((result.factors.holder_growth - 2.0).abs() < f64::EPSILON);
        assert!((result.factors.price_change - 2.0).abs() < f64::EPSILON);
        assert!(result.score <= 100.0);
    }

    #[test]
    fn test_negative_price_change_floors_at_zero() {
        let state = snapshot(DerivedMetrics {
            price_change_pct: -80.0,
            ..DerivedMetrics::default()
        });
        let result = score_token(&state, &SignalConfig::default(), now());
        assert_eq!(result.factors.price_change, 0.0);
    }

    #[test]
    fn test_nan_input_clamps_to_zero() {
        let state = snapshot(DerivedMetrics {
            buy_sell_ratio: f64::NAN,
            volume_velocity: f64::NAN,
            ..DerivedMetrics::default()
        });
        let result = score_token(&state, &SignalConfig::default(), now());
        assert!(result.score >= 0.0 && result.score <= 100.0);
        assert_eq!(result.factors.buy_pressure, 0.0);
    }

    #[test]
    fn test_age_bonus_decays() {
        let state = snapshot(strong_metrics());
        let config = SignalConfig::default();
        let fresh = score_token(&state, &config, Utc.timestamp_opt(1_700_000_060, 0).unwrap());
        let old = score_token(&state, &config, Utc.timestamp_opt(1_700_000_000 + 7200, 0).unwrap());
        assert!(fresh.factors.age_bonus > old.factors.age_bonus);
        assert_eq!(old.factors.age_bonus, 0.0);
        assert!(fresh.score > old.score);
    }

    #[test]
    fn test_category_thresholds() {
        assert_eq!(SignalCategory::from_score(96.0), SignalCategory::ExtremelyBullish);
        assert_eq!(SignalCategory::from_score(95.0), SignalCategory::ExtremelyBullish);
        assert_eq!(SignalCategory::from_score(90.0), SignalCategory::VeryBullish);
        assert_eq!(SignalCategory::from_score(80.0), SignalCategory::Bullish);
        assert_eq!(SignalCategory::from_score(70.0), SignalCategory::Neutral);
        assert_eq!(SignalCategory::from_score(10.0), SignalCategory::NotPromising);
        assert!(!SignalCategory::Bullish.alert_eligible());
        assert!(SignalCategory::VeryBullish.alert_eligible());
    }
}
