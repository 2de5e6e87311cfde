use crate::config::AssetConfig;
use crate::error::ApiError;
use crate::events::{
    AccountBalances, Decision, DecisionContext, LedgerRecord, MarketSnapshot, NewsItem,
    OrderResult, OrderSide,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Fetches current price plus the configured history window for one asset.
    async fn get_snapshot(&self, asset: &AssetConfig) -> Result<MarketSnapshot, ApiError>;

    /// Fetches quote and asset balances for one asset's trading pair.
    async fn get_balances(&self, asset: &AssetConfig) -> Result<AccountBalances, ApiError>;

    /// Places a market order. `amount` is quote currency to spend for buys
    /// and asset quantity for sells, matching the exchange's convention.
    async fn place_order(
        &self,
        pair: &str,
        side: OrderSide,
        amount: Decimal,
    ) -> Result<OrderResult, ApiError>;
}

#[async_trait]
pub trait DecisionService: Send + Sync {
    /// Returns a fully validated decision. Malformed or out-of-bounds
    /// service responses are coerced to HOLD inside the implementation and
    /// never surface as errors; only transport failures do.
    async fn decide(&self, ctx: &DecisionContext) -> Result<Decision, ApiError>;
}

/// Optional auxiliary source of textual market context.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn latest(&self, asset_id: &str, limit: usize) -> Result<Vec<NewsItem>, ApiError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persists one cycle's record. Idempotent: calling again with the same
    /// (asset, cycle_ts) overwrites, never duplicates.
    async fn record_cycle(&self, record: &LedgerRecord) -> Result<()>;

    /// Most recent records for one asset, newest first.
    async fn read_recent(&self, asset_id: &str, limit: u32) -> Result<Vec<LedgerRecord>>;

    /// Timestamp of the newest record for one asset, if any.
    async fn last_timestamp(&self, asset_id: &str) -> Result<Option<DateTime<Utc>>>;
}

/// Human-readable alert payload. Rendering to the channel's wire format is
/// the channel implementation's concern.
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Best-effort delivery. Callers treat failure as log-and-discard.
    async fn send(&self, notification: &Notification) -> Result<(), ApiError>;
}
