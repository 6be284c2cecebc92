//! Pure analytics over retained per-token history
//!
//! Trend detection via smoothed local extrema, volume-profile health over
//! fixed time buckets, and a four-factor trading-naturalness heuristic.
//! Everything here is a pure function over slices so it can be tested
//! against fixed fixtures.

use serde::{Deserialize, Serialize};

use super::TradeRecord;

/// Trend classification over the retained price sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    StrongUptrend,
    Uptrend,
    Downtrend,
    #[default]
    Sideways,
}

/// Trend classification plus a 0-10 strength scale
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrendSignal {
    pub trend: Trend,
    pub strength: u8,
    pub change_pct: f64,
}

impl TrendSignal {
    pub fn is_uptrend(&self) -> bool {
        matches!(self.trend, Trend::Uptrend | Trend::StrongUptrend)
    }
}

/// Volume-profile health over fixed 10-minute buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VolumeHealth {
    Healthy,
    Weak,
    #[default]
    InsufficientData,
}

/// Result of one naturalness sub-check. Insufficient data reads as natural
/// by default: a quiet token is not evidence of manipulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckResult {
    Natural,
    Suspicious,
    #[default]
    InsufficientData,
}

impl CheckResult {
    pub fn passes(self) -> bool {
        !matches!(self, CheckResult::Suspicious)
    }
}

/// Combined naturalness assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaturalnessReport {
    pub natural: bool,
    /// pass count x 25
    pub score: u8,
    pub volume_distribution: CheckResult,
    pub counterparty_diversity: CheckResult,
    pub timing_regularity: CheckResult,
    pub price_pattern: CheckResult,
}

impl Default for NaturalnessReport {
    fn default() -> Self {
        Self {
            natural: true,
            score: 100,
            volume_distribution: CheckResult::InsufficientData,
            counterparty_diversity: CheckResult::InsufficientData,
            timing_regularity: CheckResult::InsufficientData,
            price_pattern: CheckResult::InsufficientData,
        }
    }
}

const MIN_TREND_POINTS: usize = 5;
const VOLUME_HEALTH_MIN_TRADES: usize = 10;
const VOLUME_HEALTH_BUCKET_SECS: i64 = 600;
const NATURALNESS_MIN_TRADES: usize = 30;
const DIVERSITY_MIN_TRADES: usize = 20;
const PRICE_PATTERN_MIN_POINTS: usize = 10;

/// Detect trend on a price sequence: smooth with a symmetric moving window,
/// find strict local extrema, and compare rising vs falling extrema counts.
pub fn detect_trend(prices: &[f64]) -> TrendSignal {
    if prices.len() < MIN_TREND_POINTS {
        return TrendSignal::default();
    }

    let n = prices.len();
    let window = (n / 3).min(3).max(1);
    let smoothed = moving_average(prices, window);

    let (maxima, minima) = local_extrema(&smoothed);
    let (rising_max, falling_max) = rising_falling(&maxima);
    let (rising_min, falling_min) = rising_falling(&minima);

    let first = prices[0];
    let last = prices[n - 1];
    let change_pct = if first > 0.0 {
        (last - first) / first * 100.0
    } else {
        0.0
    };

    let comparisons = maxima.len().saturating_sub(1) + minima.len().saturating_sub(1);
    let rising_ratio = if comparisons > 0 {
        (rising_max + rising_min) as f64 / comparisons as f64
    } else {
        0.0
    };

    let trend = if change_pct > 20.0 && rising_ratio > 0.5 {
        Trend::StrongUptrend
    } else if (rising_max > falling_max || rising_min > falling_min) && change_pct > 0.0 {
        Trend::Uptrend
    } else if change_pct < 0.0 && (falling_max > rising_max || falling_min > rising_min) {
        Trend::Downtrend
    } else {
        Trend::Sideways
    };

    let bonus = if change_pct > 50.0 {
        3
    } else if change_pct > 20.0 {
        2
    } else if change_pct > 0.0 {
        1
    } else {
        0
    };
    let strength = ((rising_max + rising_min + bonus) as u8).min(10);

    TrendSignal {
        trend,
        strength,
        change_pct,
    }
}

/// Volume-profile health: the moving average of per-bucket volume must be
/// non-decreasing across more steps than decreasing, and the per-bucket
/// buy-ratio trend must be non-decreasing.
pub fn volume_profile_health(trades: &[TradeRecord]) -> VolumeHealth {
    if trades.len() < VOLUME_HEALTH_MIN_TRADES {
        return VolumeHealth::InsufficientData;
    }

    let start = trades[0].timestamp;
    let mut buckets: Vec<(f64, f64)> = Vec::new(); // (volume, buy_volume)
    for trade in trades {
        let idx = ((trade.timestamp - start).num_seconds() / VOLUME_HEALTH_BUCKET_SECS).max(0) as usize;
        if buckets.len() <= idx {
            buckets.resize(idx + 1, (0.0, 0.0));
        }
        buckets[idx].0 += trade.sol_amount;
        if trade.is_buy {
            buckets[idx].1 += trade.sol_amount;
        }
    }

    // Keep only traded buckets; gaps carry no signal
    let active: Vec<(f64, f64)> = buckets.into_iter().filter(|(v, _)| *v > 0.0).collect();
    if active.len() < 3 {
        return VolumeHealth::InsufficientData;
    }

    let volumes: Vec<f64> = active.iter().map(|(v, _)| *v).collect();
    let buy_ratios: Vec<f64> = active.iter().map(|(v, b)| b / v).collect();

    let ma = moving_average(&volumes, 3);
    let (vol_up, vol_down) = step_counts(&ma);
    let (ratio_up, ratio_down) = step_counts(&buy_ratios);

    if vol_up > vol_down && ratio_up >= ratio_down {
        VolumeHealth::Healthy
    } else {
        VolumeHealth::Weak
    }
}

/// Four-factor trading-naturalness heuristic. Natural iff at least 3 of 4
/// sub-checks pass; sub-checks without enough data pass by default.
pub fn assess_naturalness(trades: &[TradeRecord]) -> NaturalnessReport {
    let volume_distribution = check_volume_distribution(trades);
    let counterparty_diversity = check_counterparty_diversity(trades);
    let timing_regularity = check_timing_regularity(trades);
    let price_pattern = check_price_pattern(trades);

    let checks = [
        volume_distribution,
        counterparty_diversity,
        timing_regularity,
        price_pattern,
    ];
    let passes = checks.iter().filter(|c| c.passes()).count();

    NaturalnessReport {
        natural: passes >= 3,
        score: (passes * 25) as u8,
        volume_distribution,
        counterparty_diversity,
        timing_regularity,
        price_pattern,
    }
}

/// Organic volume is bursty: coefficient of variation of per-minute volume
/// above 0.5 reads natural.
fn check_volume_distribution(trades: &[TradeRecord]) -> CheckResult {
    if trades.len() < NATURALNESS_MIN_TRADES {
        return CheckResult::InsufficientData;
    }

    let start = trades[0].timestamp;
    let mut per_minute: Vec<f64> = Vec::new();
    for trade in trades {
        let idx = ((trade.timestamp - start).num_seconds() / 60).max(0) as usize;
        if per_minute.len() <= idx {
            per_minute.resize(idx + 1, 0.0);
        }
        per_minute[idx] += trade.sol_amount;
    }
    let active: Vec<f64> = per_minute.into_iter().filter(|v| *v > 0.0).collect();
    if active.len() < 2 {
        return CheckResult::InsufficientData;
    }

    match coefficient_of_variation(&active) {
        Some(cv) if cv > 0.5 => CheckResult::Natural,
        Some(_) => CheckResult::Suspicious,
        None => CheckResult::InsufficientData,
    }
}

/// Natural iff enough distinct counterparties, no top-3 dominance, and no
/// circular pattern in the most recent trades.
fn check_counterparty_diversity(trades: &[TradeRecord]) -> CheckResult {
    if trades.len() < DIVERSITY_MIN_TRADES {
        return CheckResult::InsufficientData;
    }

    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for trade in trades {
        *counts.entry(trade.trader.as_str()).or_insert(0) += 1;
    }

    if counts.len() < 10 {
        return CheckResult::Suspicious;
    }

    let mut sorted: Vec<usize> = counts.values().copied().collect();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let top3: usize = sorted.iter().take(3).sum();
    if top3 as f64 / trades.len() as f64 >= 0.6 {
        return CheckResult::Suspicious;
    }

    // Circular pattern: the same few wallets cycling through recent trades
    let recent = &trades[trades.len().saturating_sub(20)..];
    let recent_unique: std::collections::HashSet<&str> =
        recent.iter().map(|t| t.trader.as_str()).collect();
    if recent_unique.len() < 5 {
        return CheckResult::Suspicious;
    }

    CheckResult::Natural
}

/// Bot schedules tick with machine regularity; organic intervals are highly
/// variable and rarely sub-second-fast in bulk.
fn check_timing_regularity(trades: &[TradeRecord]) -> CheckResult {
    if trades.len() < NATURALNESS_MIN_TRADES {
        return CheckResult::InsufficientData;
    }

    let intervals: Vec<f64> = trades
        .windows(2)
        .map(|w| ((w[1].timestamp - w[0].timestamp).num_milliseconds() as f64 / 1000.0).max(0.0))
        .collect();
    if intervals.is_empty() {
        return CheckResult::InsufficientData;
    }

    let fast = intervals.iter().filter(|i| **i < 2.0).count();
    let fast_fraction = fast as f64 / intervals.len() as f64;

    match coefficient_of_variation(&intervals) {
        Some(cv) if cv >= 0.7 && fast_fraction < 0.3 => CheckResult::Natural,
        Some(_) => CheckResult::Suspicious,
        None => CheckResult::InsufficientData,
    }
}

/// A too-smooth monotonic climb is the signature of a price-walking bot:
/// stair-step increases with near-identical ratios, few direction changes.
fn check_price_pattern(trades: &[TradeRecord]) -> CheckResult {
    let prices: Vec<f64> = trades.iter().map(|t| t.price).filter(|p| *p > 0.0).collect();
    if prices.len() < PRICE_PATTERN_MIN_POINTS {
        return CheckResult::InsufficientData;
    }

    // Stair-step: three consecutive increases with near-identical ratios
    let ratios: Vec<f64> = prices.windows(2).map(|w| w[1] / w[0]).collect();
    let has_stair_step = ratios.windows(3).any(|w| {
        w.iter().all(|r| *r > 1.0)
            && (w[0] - w[1]).abs() < 0.01
            && (w[1] - w[2]).abs() < 0.01
    });
    if has_stair_step {
        return CheckResult::Suspicious;
    }

    let direction_changes = prices
        .windows(2)
        .map(|w| (w[1] - w[0]).signum())
        .collect::<Vec<f64>>()
        .windows(2)
        .filter(|w| w[0] != 0.0 && w[1] != 0.0 && w[0] != w[1])
        .count();
    if (direction_changes as f64) < prices.len() as f64 * 0.15 {
        return CheckResult::Suspicious;
    }

    CheckResult::Natural
}

/// Symmetric moving average with the given window width
fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

/// Strict local maxima and minima values, in sequence order
fn local_extrema(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut maxima = Vec::new();
    let mut minima = Vec::new();
    for i in 1..values.len().saturating_sub(1) {
        if values[i] > values[i - 1] && values[i] > values[i + 1] {
            maxima.push(values[i]);
        } else if values[i] < values[i - 1] && values[i] < values[i + 1] {
            minima.push(values[i]);
        }
    }
    (maxima, minima)
}

/// Count rising and falling steps between consecutive extrema
fn rising_falling(extrema: &[f64]) -> (usize, usize) {
    let mut rising = 0;
    let mut falling = 0;
    for w in extrema.windows(2) {
        if w[1] > w[0] {
            rising += 1;
        } else if w[1] < w[0] {
            falling += 1;
        }
    }
    (rising, falling)
}

/// Count non-decreasing and decreasing steps across a sequence
fn step_counts(values: &[f64]) -> (usize, usize) {
    let mut up = 0;
    let mut down = 0;
    for w in values.windows(2) {
        if w[1] >= w[0] {
            up += 1;
        } else {
            down += 1;
        }
    }
    (up, down)
}

fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt() / mean)
}
