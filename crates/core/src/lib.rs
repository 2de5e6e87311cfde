pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod traits;
pub mod validation;

pub use config::{
    AppConfig, AssetConfig, DatabaseConfig, DecisionConfig, EngineConfig, ExchangeConfig,
    MagnitudeMode, NewsConfig, ServerConfig, SlackConfig, StalenessConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{ApiError, ConfigError};
pub use events::{
    AccountBalances, AssetHealth, Candle, Decision, DecisionContext, DecisionSource,
    ExecutionResult, ExecutionStatus, Freshness, LedgerRecord, MarketSnapshot, NewsItem,
    OrderFillStatus, OrderResult, OrderSide, TradeAction,
};
pub use traits::{
    DecisionService, ExchangeClient, LedgerStore, NewsProvider, Notification, NotificationChannel,
};
