//! Wire types for the Upbit REST API responses we consume.

use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct UpbitCandle {
    pub candle_date_time_utc: String,
    pub opening_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub trade_price: Decimal,
    pub candle_acc_trade_volume: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpbitTicker {
    pub trade_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpbitAccount {
    pub currency: String,
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpbitOrderAck {
    pub uuid: String,
}

#[derive(Debug, Deserialize)]
pub struct UpbitOrder {
    pub uuid: String,
    pub state: String,
    pub executed_volume: Decimal,
    #[serde(default)]
    pub trades: Vec<UpbitTrade>,
}

#[derive(Debug, Deserialize)]
pub struct UpbitTrade {
    pub price: Decimal,
    pub volume: Decimal,
}
