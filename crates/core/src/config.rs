use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub exchange: ExchangeConfig,
    pub decision: DecisionConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    pub assets: Vec<AssetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub api_url: String,
    /// Candle interval for the snapshot history window (exchange notation,
    /// e.g. "60" for hourly minute-candles).
    #[serde(default = "default_candle_unit")]
    pub candle_unit: u32,
    #[serde(default = "default_history_count")]
    pub history_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub api_url: String,
    pub model: String,
    #[serde(default = "default_decision_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_news_limit")]
    pub limit: usize,
    /// Minimum seconds between fetches per asset; the provider serves an
    /// empty context inside the window.
    #[serde(default = "default_news_min_interval")]
    pub min_interval_secs: u64,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: default_news_limit(),
            min_interval_secs: default_news_min_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SlackConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// Per-asset trading parameters. Immutable for the lifetime of the asset's
/// scheduler; changing them requires restarting that scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Short identifier, e.g. "BTC".
    pub asset_id: String,
    /// Exchange trading pair, e.g. "KRW-BTC".
    pub pair: String,
    /// Seconds between cycle ticks.
    pub interval_secs: u64,
    /// Cap on a single buy as a fraction of total portfolio value.
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,
    /// Orders below this quote-currency notional are downgraded to HOLD.
    #[serde(default = "default_min_notional")]
    pub min_notional: Decimal,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// How the decision service's magnitude is interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MagnitudeMode {
    /// Magnitude is a fraction of available funds/holdings in [0, 1].
    #[default]
    PortfolioFraction,
    /// Magnitude is an absolute quote-currency amount.
    Absolute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry attempts per remote step before the cycle fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff base: delay = base * 2^attempt, capped.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Bound on any single collaborator call.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default)]
    pub magnitude_mode: MagnitudeMode,
    /// Upper bound on magnitude in absolute mode (quote currency).
    #[serde(default = "default_absolute_magnitude_cap")]
    pub absolute_magnitude_cap: Decimal,
    /// Fraction of quote balance actually spendable on a buy, leaving room
    /// for taker fees.
    #[serde(default = "default_fee_headroom")]
    pub fee_headroom: Decimal,
    /// How many recent ledger records the decision prompt sees.
    #[serde(default = "default_recent_trades_window")]
    pub recent_trades_window: u32,
    #[serde(default)]
    pub monitor: StalenessConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            step_timeout_secs: default_step_timeout_secs(),
            magnitude_mode: MagnitudeMode::default(),
            absolute_magnitude_cap: default_absolute_magnitude_cap(),
            fee_headroom: default_fee_headroom(),
            recent_trades_window: default_recent_trades_window(),
            monitor: StalenessConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StalenessConfig {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_aging_hours")]
    pub aging_hours: f64,
    #[serde(default = "default_stale_hours")]
    pub stale_hours: f64,
    /// Minimum hours between repeated alerts for the same stale episode.
    #[serde(default = "default_alert_suppression_hours")]
    pub alert_suppression_hours: f64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            aging_hours: default_aging_hours(),
            stale_hours: default_stale_hours(),
            alert_suppression_hours: default_alert_suppression_hours(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

const fn default_candle_unit() -> u32 {
    60
}

const fn default_history_count() -> u32 {
    24
}

const fn default_decision_max_tokens() -> u32 {
    1024
}

const fn default_news_limit() -> usize {
    4
}

const fn default_news_min_interval() -> u64 {
    3600
}

const fn default_max_position_pct() -> f64 {
    0.20
}

fn default_min_notional() -> Decimal {
    // Upbit's minimum market order is 5000 KRW.
    Decimal::from(5000)
}

const fn default_enabled() -> bool {
    true
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_backoff_base_ms() -> u64 {
    2000
}

const fn default_backoff_cap_ms() -> u64 {
    60_000
}

const fn default_step_timeout_secs() -> u64 {
    30
}

fn default_absolute_magnitude_cap() -> Decimal {
    Decimal::from(1_000_000)
}

fn default_fee_headroom() -> Decimal {
    Decimal::new(9995, 4) // 0.9995
}

const fn default_recent_trades_window() -> u32 {
    4
}

const fn default_check_interval_secs() -> u64 {
    600
}

const fn default_aging_hours() -> f64 {
    2.0
}

const fn default_stale_hours() -> f64 {
    5.0
}

const fn default_alert_suppression_hours() -> f64 {
    24.0
}
