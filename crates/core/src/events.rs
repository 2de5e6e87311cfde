use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV candle from the exchange's history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// A news headline attached to a snapshot as decision context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub date: Option<String>,
    pub link: Option<String>,
}

/// Market state for one asset at one cycle. Created fresh each cycle and
/// discarded once the cycle's ledger record is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub asset_id: String,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub history: Vec<Candle>,
    pub context: Vec<NewsItem>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
            Self::Hold => write!(f, "hold"),
        }
    }
}

/// Who produced a decision's final form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionSource {
    /// Decision service response, validated and accepted as-is.
    DecisionService,
    /// Risk gate rewrote the decision service's proposal.
    RiskGateOverride,
    /// Synthesized by the scheduler for a cycle that failed before any
    /// decision existed.
    Engine,
}

/// A validated buy/sell/hold decision for one cycle. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub asset_id: String,
    pub cycle_ts: DateTime<Utc>,
    pub action: TradeAction,
    /// Fraction of portfolio in [0, 1], or an absolute amount depending on
    /// the configured magnitude mode.
    pub magnitude: Decimal,
    pub rationale: String,
    /// Original decision-service rationale, preserved when the risk gate
    /// rewrites the decision.
    pub original_rationale: Option<String>,
    pub source: DecisionSource,
}

impl Decision {
    /// Creates a HOLD decision attributed to the engine itself, used when a
    /// cycle fails before the decision service has been consulted.
    #[must_use]
    pub fn engine_hold(asset_id: &str, cycle_ts: DateTime<Utc>, rationale: String) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            cycle_ts,
            action: TradeAction::Hold,
            magnitude: Decimal::ZERO,
            rationale,
            original_rationale: None,
            source: DecisionSource::Engine,
        }
    }

    /// True if this decision requires no exchange interaction.
    #[must_use]
    pub fn is_hold(&self) -> bool {
        self.action == TradeAction::Hold || self.magnitude == Decimal::ZERO
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Executed,
    Partial,
    Skipped,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Executed => write!(f, "EXECUTED"),
            Self::Partial => write!(f, "PARTIAL"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Outcome of executing one gated decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub filled_quantity: Decimal,
    pub avg_price: Option<Decimal>,
    pub order_ids: Vec<String>,
    pub error: Option<String>,
}

impl ExecutionResult {
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            status: ExecutionStatus::Skipped,
            filled_quantity: Decimal::ZERO,
            avg_price: None,
            order_ids: Vec::new(),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: String) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            filled_quantity: Decimal::ZERO,
            avg_price: None,
            order_ids: Vec::new(),
            error: Some(error),
        }
    }
}

/// One durable record per (asset, cycle). The balance and price columns
/// mirror what the decision prompt and the dashboard consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub asset_id: String,
    pub cycle_ts: DateTime<Utc>,
    pub decision: Decision,
    pub result: ExecutionResult,
    pub crypto_balance: Decimal,
    pub quote_balance: Decimal,
    pub price: Decimal,
}

/// Ledger-age classification used by the staleness monitor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Freshness {
    Fresh,
    Aging,
    Stale,
}

/// Per-asset pipeline health, derived from ledger timestamps. Owned by the
/// staleness monitor; never written by the trading path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetHealth {
    pub asset_id: String,
    pub last_record: Option<DateTime<Utc>>,
    pub freshness: Freshness,
    pub last_alert: Option<DateTime<Utc>>,
}

/// Exchange balances scoped to one asset's trading pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountBalances {
    /// Quote currency available to spend (e.g. KRW).
    pub quote: Decimal,
    /// Units of the asset currently held.
    pub holdings: Decimal,
}

impl AccountBalances {
    /// Total portfolio value at the given asset price.
    #[must_use]
    pub fn portfolio_value(&self, price: Decimal) -> Decimal {
        self.quote + self.holdings * price
    }
}

/// Everything the decision service sees for one cycle: the fresh snapshot,
/// current balances, and a short window of recent outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionContext {
    pub snapshot: MarketSnapshot,
    pub balances: AccountBalances,
    pub portfolio_value: Decimal,
    pub recent: Vec<LedgerRecord>,
}

/// Fill report from the exchange for a single placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub status: OrderFillStatus,
    pub filled_quantity: Decimal,
    pub avg_price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderFillStatus {
    Filled,
    PartiallyFilled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}
