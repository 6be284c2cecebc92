//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub outcome: OutcomeConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub smart_money: SmartMoneyConfig,
}

/// WebSocket stream connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Fixed delay before each reconnect attempt
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Force-terminate a CONNECTING attempt stuck longer than this
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// No inbound traffic for this long marks the session stale
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Grace window after the liveness probe before force-closing
    #[serde(default = "default_ping_grace_secs")]
    pub ping_grace_secs: u64,
    /// Keep-alive ping interval
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Maximum keys per subscription request (upstream message-size limit)
    #[serde(default = "default_subscribe_batch_size")]
    pub subscribe_batch_size: usize,
}

fn default_ws_url() -> String {
    "wss://pumpportal.fun/api/data".into()
}
fn default_reconnect_delay_ms() -> u64 {
    5000
}
fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_stale_after_secs() -> u64 {
    300
}
fn default_ping_grace_secs() -> u64 {
    10
}
fn default_ping_interval_secs() -> u64 {
    30
}
fn default_subscribe_batch_size() -> usize {
    50
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            stale_after_secs: default_stale_after_secs(),
            ping_grace_secs: default_ping_grace_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            subscribe_batch_size: default_subscribe_batch_size(),
        }
    }
}

/// Per-token state tracking settings
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Retained price points per token (oldest evicted)
    #[serde(default = "default_max_price_points")]
    pub max_price_points: usize,
    /// Retained trades per token (oldest evicted)
    #[serde(default = "default_max_trades")]
    pub max_trades: usize,
    /// Volume bucket width in seconds
    #[serde(default = "default_volume_bucket_secs")]
    pub volume_bucket_secs: u64,
    /// Volume bucket retention window in seconds
    #[serde(default = "default_volume_retention_secs")]
    pub volume_retention_secs: u64,
    /// Tokens older than this are evicted by the sweep
    #[serde(default = "default_max_token_age_secs")]
    pub max_token_age_secs: u64,
    /// How often the eviction sweep runs
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Single trade at or above this size counts as a whale trade
    #[serde(default = "default_whale_trade_sol")]
    pub whale_trade_sol: f64,
}

fn default_max_price_points() -> usize {
    1000
}
fn default_max_trades() -> usize {
    1000
}
fn default_volume_bucket_secs() -> u64 {
    300
}
fn default_volume_retention_secs() -> u64 {
    86400
}
fn default_max_token_age_secs() -> u64 {
    86400
}
fn default_sweep_interval_secs() -> u64 {
    3600
}
fn default_whale_trade_sol() -> f64 {
    5.0
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_price_points: default_max_price_points(),
            max_trades: default_max_trades(),
            volume_bucket_secs: default_volume_bucket_secs(),
            volume_retention_secs: default_volume_retention_secs(),
            max_token_age_secs: default_max_token_age_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            whale_trade_sol: default_whale_trade_sol(),
        }
    }
}

/// Composite signal scoring weights and thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
    /// Buy/sell ratio considered strong (factor capped at 2x this)
    #[serde(default = "default_buy_sell_ratio_threshold")]
    pub buy_sell_ratio_threshold: f64,
    /// Volume velocity (SOL/min) considered strong (factor capped at 2.5x)
    #[serde(default = "default_volume_velocity_threshold")]
    pub volume_velocity_threshold: f64,
    /// Holder count considered strong (factor capped at 2x)
    #[serde(default = "default_holder_target")]
    pub holder_target: usize,
    /// Price change % considered strong (factor capped at 2x)
    #[serde(default = "default_price_change_target_pct")]
    pub price_change_target_pct: f64,
    #[serde(default = "default_weight_buy_pressure")]
    pub weight_buy_pressure: f64,
    #[serde(default = "default_weight_volume")]
    pub weight_volume: f64,
    #[serde(default = "default_weight_holders")]
    pub weight_holders: f64,
    #[serde(default = "default_weight_price")]
    pub weight_price: f64,
    /// Flat boost when at least one whale trade was seen
    #[serde(default = "default_whale_boost")]
    pub whale_boost: f64,
    /// Flat boost when smart-money activity was seen
    #[serde(default = "default_smart_money_boost")]
    pub smart_money_boost: f64,
    /// Flat boost for uptrend / strong uptrend
    #[serde(default = "default_trend_boost")]
    pub trend_boost: f64,
    #[serde(default = "default_strong_trend_boost")]
    pub strong_trend_boost: f64,
    /// Flat boost for a healthy volume profile
    #[serde(default = "default_volume_health_boost")]
    pub volume_health_boost: f64,
    /// Age bonus multiplier decays to zero over this window
    #[serde(default = "default_age_bonus_window_secs")]
    pub age_bonus_window_secs: u64,
    /// Maximum age bonus (applied multiplicatively as 1 + bonus)
    #[serde(default = "default_age_bonus_max")]
    pub age_bonus_max: f64,
    /// Trades per minute considered high momentum
    #[serde(default = "default_momentum_trades_per_min")]
    pub momentum_trades_per_min: f64,
    /// Maximum momentum bonus (applied multiplicatively as 1 + bonus)
    #[serde(default = "default_momentum_bonus_max")]
    pub momentum_bonus_max: f64,
}

fn default_buy_sell_ratio_threshold() -> f64 {
    2.0
}
fn default_volume_velocity_threshold() -> f64 {
    1.0
}
fn default_holder_target() -> usize {
    30
}
fn default_price_change_target_pct() -> f64 {
    50.0
}
fn default_weight_buy_pressure() -> f64 {
    25.0
}
fn default_weight_volume() -> f64 {
    20.0
}
fn default_weight_holders() -> f64 {
    20.0
}
fn default_weight_price() -> f64 {
    15.0
}
fn default_whale_boost() -> f64 {
    8.0
}
fn default_smart_money_boost() -> f64 {
    12.0
}
fn default_trend_boost() -> f64 {
    6.0
}
fn default_strong_trend_boost() -> f64 {
    12.0
}
fn default_volume_health_boost() -> f64 {
    8.0
}
fn default_age_bonus_window_secs() -> u64 {
    3600
}
fn default_age_bonus_max() -> f64 {
    0.25
}
fn default_momentum_trades_per_min() -> f64 {
    10.0
}
fn default_momentum_bonus_max() -> f64 {
    0.15
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            buy_sell_ratio_threshold: default_buy_sell_ratio_threshold(),
            volume_velocity_threshold: default_volume_velocity_threshold(),
            holder_target: default_holder_target(),
            price_change_target_pct: default_price_change_target_pct(),
            weight_buy_pressure: default_weight_buy_pressure(),
            weight_volume: default_weight_volume(),
            weight_holders: default_weight_holders(),
            weight_price: default_weight_price(),
            whale_boost: default_whale_boost(),
            smart_money_boost: default_smart_money_boost(),
            trend_boost: default_trend_boost(),
            strong_trend_boost: default_strong_trend_boost(),
            volume_health_boost: default_volume_health_boost(),
            age_bonus_window_secs: default_age_bonus_window_secs(),
            age_bonus_max: default_age_bonus_max(),
            momentum_trades_per_min: default_momentum_trades_per_min(),
            momentum_bonus_max: default_momentum_bonus_max(),
        }
    }
}

/// Alert gating, dedup and delivery settings
#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// Minimum token age before any alert
    #[serde(default = "default_min_token_age_secs")]
    pub min_token_age_secs: u64,
    /// Minimum market cap floor in SOL
    #[serde(default = "default_min_market_cap_sol")]
    pub min_market_cap_sol: f64,
    /// Price gain % since last alert required to re-arm an alerted token
    #[serde(default = "default_rearm_gain_pct")]
    pub rearm_gain_pct: f64,
    /// Maximum alerts per UTC day
    #[serde(default = "default_daily_quota")]
    pub daily_quota: u32,
    /// Cooldown between same-type alerts for the same token
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Hard timeout on the enrichment call
    #[serde(default = "default_enrichment_timeout_ms")]
    pub enrichment_timeout_ms: u64,
}

fn default_min_token_age_secs() -> u64 {
    180
}
fn default_min_market_cap_sol() -> f64 {
    90.0
}
fn default_rearm_gain_pct() -> f64 {
    200.0
}
fn default_daily_quota() -> u32 {
    50
}
fn default_cooldown_secs() -> u64 {
    1800
}
fn default_enrichment_timeout_ms() -> u64 {
    2500
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            min_token_age_secs: default_min_token_age_secs(),
            min_market_cap_sol: default_min_market_cap_sol(),
            rearm_gain_pct: default_rearm_gain_pct(),
            daily_quota: default_daily_quota(),
            cooldown_secs: default_cooldown_secs(),
            enrichment_timeout_ms: default_enrichment_timeout_ms(),
        }
    }
}

/// Outcome resolution and milestone settings
#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeConfig {
    /// Gain % over baseline market cap that resolves a WIN
    #[serde(default = "default_win_threshold_pct")]
    pub win_threshold_pct: f64,
    /// Market cap floor in SOL below which an alerted token resolves a LOSS
    #[serde(default = "default_rug_floor_sol")]
    pub rug_floor_sol: f64,
    /// Milestone multiples of the baseline market cap
    #[serde(default = "default_milestones")]
    pub milestones: Vec<u32>,
    /// Scheduled recheck offsets after alert time, in minutes
    #[serde(default = "default_check_offsets_mins")]
    pub check_offsets_mins: Vec<u64>,
}

fn default_win_threshold_pct() -> f64 {
    50.0
}
fn default_rug_floor_sol() -> f64 {
    32.0
}
fn default_milestones() -> Vec<u32> {
    vec![2, 3, 5, 10, 20, 50, 100, 500, 1000]
}
fn default_check_offsets_mins() -> Vec<u64> {
    vec![1, 5, 15, 30, 60, 120, 240, 480, 720, 1440, 2880, 4320]
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            win_threshold_pct: default_win_threshold_pct(),
            rug_floor_sol: default_rug_floor_sol(),
            milestones: default_milestones(),
            check_offsets_mins: default_check_offsets_mins(),
        }
    }
}

/// Risk-analysis enrichment collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            api_key: String::new(),
        }
    }
}

/// Notification sink settings
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Webhook URL; empty falls back to the log sink
    #[serde(default)]
    pub webhook_url: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
        }
    }
}

/// Best-effort snapshot persistence
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_snapshot_path")]
    pub path: String,
    #[serde(default = "default_snapshot_interval_secs")]
    pub interval_secs: u64,
}

fn default_snapshot_path() -> String {
    "pumpwatch_state.json".into()
}
fn default_snapshot_interval_secs() -> u64 {
    300
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_snapshot_path(),
            interval_secs: default_snapshot_interval_secs(),
        }
    }
}

/// Smart-money wallet watch list
#[derive(Debug, Clone, Deserialize)]
pub struct SmartMoneyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub wallets: Vec<String>,
}

impl Default for SmartMoneyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wallets: vec![],
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix PUMPWATCH_)
            .add_source(
                config::Environment::with_prefix("PUMPWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.stream.subscribe_batch_size == 0 {
            anyhow::bail!("subscribe_batch_size must be at least 1");
        }

        if self.stream.stale_after_secs == 0 {
            anyhow::bail!("stale_after_secs must be positive");
        }

        if self.tracker.max_price_points == 0 || self.tracker.max_trades == 0 {
            anyhow::bail!("history caps must be at least 1");
        }

        if self.tracker.volume_bucket_secs == 0 {
            anyhow::bail!("volume_bucket_secs must be positive");
        }

        if self.alerts.min_market_cap_sol <= 0.0 {
            anyhow::bail!("min_market_cap_sol must be positive");
        }

        if self.alerts.rearm_gain_pct <= 0.0 {
            anyhow::bail!("rearm_gain_pct must be positive");
        }

        if self.outcome.win_threshold_pct <= 0.0 {
            anyhow::bail!("win_threshold_pct must be positive");
        }

        if self.outcome.rug_floor_sol >= self.alerts.min_market_cap_sol {
            anyhow::bail!(
                "rug_floor_sol ({}) must be below min_market_cap_sol ({})",
                self.outcome.rug_floor_sol,
                self.alerts.min_market_cap_sol
            );
        }

        if self.outcome.milestones.is_empty() {
            anyhow::bail!("milestones must not be empty");
        }

        let mut sorted = self.outcome.milestones.clone();
        sorted.sort_unstable();
        if sorted != self.outcome.milestones {
            anyhow::bail!("milestones must be sorted ascending");
        }

        if self.enrichment.enabled && self.enrichment.base_url.is_empty() {
            anyhow::bail!("enrichment.base_url required when enrichment is enabled");
        }

        for wallet in &self.smart_money.wallets {
            if wallet.len() < 32 || wallet.len() > 44 {
                anyhow::bail!("Invalid smart-money wallet address: {}", wallet);
            }
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Stream:
    ws_url: {}
    reconnect_delay: {}ms
    stale_after: {}s
    batch_size: {}
  Tracker:
    history caps: {} prices / {} trades
    max_token_age: {}s
  Alerts:
    min_age: {}s
    min_market_cap: {} SOL
    re-arm gain: {}%
    daily_quota: {}
    enrichment_timeout: {}ms
  Outcome:
    win_threshold: {}%
    rug_floor: {} SOL
    milestones: {:?}
  Enrichment:
    enabled: {}
    base_url: {}
    api_key: {}
  Notifier:
    webhook: {}
  Persistence:
    enabled: {}
    path: {}
  Smart money:
    wallets: {}
"#,
            self.stream.ws_url,
            self.stream.reconnect_delay_ms,
            self.stream.stale_after_secs,
            self.stream.subscribe_batch_size,
            self.tracker.max_price_points,
            self.tracker.max_trades,
            self.tracker.max_token_age_secs,
            self.alerts.min_token_age_secs,
            self.alerts.min_market_cap_sol,
            self.alerts.rearm_gain_pct,
            self.alerts.daily_quota,
            self.alerts.enrichment_timeout_ms,
            self.outcome.win_threshold_pct,
            self.outcome.rug_floor_sol,
            self.outcome.milestones,
            self.enrichment.enabled,
            mask_url(&self.enrichment.base_url),
            if self.enrichment.api_key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            if self.notifier.webhook_url.is_empty() {
                "(log sink)".to_string()
            } else {
                mask_url(&self.notifier.webhook_url)
            },
            self.persistence.enabled,
            self.persistence.path,
            self.smart_money.wallets.len(),
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            tracker: TrackerConfig::default(),
            signal: SignalConfig::default(),
            alerts: AlertConfig::default(),
            outcome: OutcomeConfig::default(),
            enrichment: EnrichmentConfig::default(),
            notifier: NotifierConfig::default(),
            persistence: PersistenceConfig::default(),
            smart_money: SmartMoneyConfig::default(),
        }
    }
}
