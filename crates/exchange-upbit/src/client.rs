use crate::models::{UpbitAccount, UpbitCandle, UpbitOrder, UpbitOrderAck, UpbitTicker};
use crate::signing::UpbitCredentials;
use async_trait::async_trait;
use auto_trade_core::config::{AssetConfig, ExchangeConfig};
use auto_trade_core::error::ApiError;
use auto_trade_core::events::{
    AccountBalances, Candle, MarketSnapshot, OrderFillStatus, OrderResult, OrderSide,
};
use auto_trade_core::traits::ExchangeClient;
use chrono::{DateTime, NaiveDateTime, Utc};
use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use reqwest::Client;
use rust_decimal::Decimal;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const FILL_POLL_ATTEMPTS: u32 = 10;
const FILL_POLL_DELAY_MS: u64 = 500;

pub struct UpbitClient {
    http: Client,
    base_url: String,
    candle_unit: u32,
    history_count: u32,
    credentials: Option<UpbitCredentials>,
    rate_limiter: Arc<RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>>,
}

impl UpbitClient {
    /// Creates an unauthenticated client (public market data only).
    #[must_use]
    pub fn new(config: &ExchangeConfig) -> Self {
        // Upbit allows 10 requests per second per endpoint group.
        let quota = Quota::per_second(NonZeroU32::new(10).unwrap());

        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            base_url: config.api_url.clone(),
            candle_unit: config.candle_unit,
            history_count: config.history_count,
            credentials: None,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Creates an authenticated client for balance and order endpoints.
    #[must_use]
    pub fn with_credentials(config: &ExchangeConfig, credentials: UpbitCredentials) -> Self {
        let mut client = Self::new(config);
        client.credentials = Some(credentials);
        client
    }

    fn credentials(&self) -> Result<&UpbitCredentials, ApiError> {
        self.credentials
            .as_ref()
            .ok_or_else(|| ApiError::Auth("Upbit credentials not configured".to_string()))
    }

    async fn get_public<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode_response(response).await
    }

    async fn get_private<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.rate_limiter.until_ready().await;
        let query_string = encode_query(query);
        let token = self
            .credentials()?
            .bearer_token(&query_string)
            .map_err(|e| ApiError::Auth(e.to_string()))?;

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode_response(response).await
    }

    async fn post_private<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.rate_limiter.until_ready().await;
        let query_string = encode_query(params);
        let token = self
            .credentials()?
            .bearer_token(&query_string)
            .map_err(|e| ApiError::Auth(e.to_string()))?;

        let body: serde_json::Map<String, serde_json::Value> = params
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::Value::String(v.clone())))
            .collect();

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, token)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode_response(response).await
    }

    /// Polls the order endpoint until the exchange reports a terminal state
    /// or the bounded poll budget runs out. Never re-places the order.
    async fn await_fill(&self, order_uuid: &str) -> Result<UpbitOrder, ApiError> {
        let mut last: Option<UpbitOrder> = None;

        for attempt in 0..FILL_POLL_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(FILL_POLL_DELAY_MS)).await;
            }

            let order: UpbitOrder = self
                .get_private("/v1/order", &[("uuid", order_uuid.to_string())])
                .await?;

            if order.state == "done" || order.state == "cancel" {
                return Ok(order);
            }
            last = Some(order);
        }

        last.ok_or_else(|| ApiError::InvalidResponse("order poll returned nothing".to_string()))
    }
}

#[async_trait]
impl ExchangeClient for UpbitClient {
    async fn get_snapshot(&self, asset: &AssetConfig) -> Result<MarketSnapshot, ApiError> {
        let candles: Vec<UpbitCandle> = self
            .get_public(
                &format!("/v1/candles/minutes/{}", self.candle_unit),
                &[
                    ("market", asset.pair.clone()),
                    ("count", self.history_count.to_string()),
                ],
            )
            .await?;

        let tickers: Vec<UpbitTicker> = self
            .get_public("/v1/ticker", &[("markets", asset.pair.clone())])
            .await?;
        let price = tickers
            .first()
            .map(|t| t.trade_price)
            .ok_or_else(|| ApiError::InvalidResponse("empty ticker response".to_string()))?;

        let mut history = candles
            .into_iter()
            .map(candle_from_wire)
            .collect::<Result<Vec<_>, ApiError>>()?;
        // Upbit returns newest-first; the decision prompt reads oldest-first.
        history.reverse();

        Ok(MarketSnapshot {
            asset_id: asset.asset_id.clone(),
            timestamp: Utc::now(),
            price,
            history,
            // News context is attached by the snapshot fetcher, not here.
            context: Vec::new(),
        })
    }

    async fn get_balances(&self, asset: &AssetConfig) -> Result<AccountBalances, ApiError> {
        let accounts: Vec<UpbitAccount> = self.get_private("/v1/accounts", &[]).await?;

        let quote_currency = asset.pair.split('-').next().unwrap_or("KRW");
        let balance_of = |currency: &str| {
            accounts
                .iter()
                .find(|a| a.currency == currency)
                .map_or(Decimal::ZERO, |a| a.balance)
        };

        Ok(AccountBalances {
            quote: balance_of(quote_currency),
            holdings: balance_of(&asset.asset_id),
        })
    }

    async fn place_order(
        &self,
        pair: &str,
        side: OrderSide,
        amount: Decimal,
    ) -> Result<OrderResult, ApiError> {
        // Market buys spend quote currency (ord_type=price); market sells
        // specify asset volume (ord_type=market).
        let params: Vec<(&str, String)> = match side {
            OrderSide::Buy => vec![
                ("market", pair.to_string()),
                ("side", "bid".to_string()),
                ("ord_type", "price".to_string()),
                ("price", amount.to_string()),
            ],
            OrderSide::Sell => vec![
                ("market", pair.to_string()),
                ("side", "ask".to_string()),
                ("ord_type", "market".to_string()),
                ("volume", amount.to_string()),
            ],
        };

        let ack: UpbitOrderAck = self.post_private("/v1/orders", &params).await?;
        tracing::debug!(order_uuid = %ack.uuid, %pair, "order accepted, awaiting fill");

        let order = self.await_fill(&ack.uuid).await?;

        let status = match order.state.as_str() {
            "done" => OrderFillStatus::Filled,
            _ if order.executed_volume > Decimal::ZERO => OrderFillStatus::PartiallyFilled,
            _ => {
                return Err(ApiError::Rejected(format!(
                    "order {} ended {} with no fill",
                    order.uuid, order.state
                )))
            }
        };

        Ok(OrderResult {
            order_id: order.uuid.clone(),
            status,
            filled_quantity: order.executed_volume,
            avg_price: weighted_avg_price(&order),
        })
    }
}

fn candle_from_wire(candle: UpbitCandle) -> Result<Candle, ApiError> {
    let timestamp = NaiveDateTime::parse_from_str(&candle.candle_date_time_utc, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| ApiError::InvalidResponse(format!("bad candle timestamp: {e}")))?;

    Ok(Candle {
        timestamp: DateTime::from_naive_utc_and_offset(timestamp, Utc),
        open: candle.opening_price,
        high: candle.high_price,
        low: candle.low_price,
        close: candle.trade_price,
        volume: candle.candle_acc_trade_volume,
    })
}

fn weighted_avg_price(order: &UpbitOrder) -> Option<Decimal> {
    let total_volume: Decimal = order.trades.iter().map(|t| t.volume).sum();
    if total_volume == Decimal::ZERO {
        return None;
    }
    let total_funds: Decimal = order.trades.iter().map(|t| t.price * t.volume).sum();
    Some(total_funds / total_volume)
}

fn encode_query(params: &[(&str, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
        .finish()
}

fn map_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    } else if err.is_connect() {
        ApiError::Unavailable(err.to_string())
    } else {
        ApiError::InvalidResponse(err.to_string())
    }
}

async fn decode_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ApiError::RateLimited(format!("HTTP {status}")));
    }
    if status.is_server_error() {
        return Err(ApiError::Unavailable(format!("HTTP {status}")));
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ApiError::Auth(format!("HTTP {status}")));
    }
    if status.is_client_error() {
        // Order rejections arrive as 4xx with an error body; keep it verbatim.
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Rejected(body));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpbitTrade;
    use rust_decimal_macros::dec;

    #[test]
    fn candle_timestamp_parses_upbit_format() {
        let candle = UpbitCandle {
            candle_date_time_utc: "2025-06-01T09:00:00".to_string(),
            opening_price: dec!(100),
            high_price: dec!(110),
            low_price: dec!(95),
            trade_price: dec!(105),
            candle_acc_trade_volume: dec!(12.5),
        };

        let parsed = candle_from_wire(candle).unwrap();
        assert_eq!(parsed.close, dec!(105));
        assert_eq!(parsed.timestamp.to_rfc3339(), "2025-06-01T09:00:00+00:00");
    }

    #[test]
    fn weighted_avg_price_weights_by_volume() {
        let order = UpbitOrder {
            uuid: "x".to_string(),
            state: "done".to_string(),
            executed_volume: dec!(3),
            trades: vec![
                UpbitTrade {
                    price: dec!(100),
                    volume: dec!(1),
                },
                UpbitTrade {
                    price: dec!(130),
                    volume: dec!(2),
                },
            ],
        };

        assert_eq!(weighted_avg_price(&order), Some(dec!(120)));
    }

    #[test]
    fn weighted_avg_price_none_without_trades() {
        let order = UpbitOrder {
            uuid: "x".to_string(),
            state: "cancel".to_string(),
            executed_volume: dec!(0),
            trades: vec![],
        };

        assert_eq!(weighted_avg_price(&order), None);
    }

    #[test]
    fn query_encoding_is_stable() {
        let query = encode_query(&[
            ("market", "KRW-BTC".to_string()),
            ("side", "bid".to_string()),
        ]);
        assert_eq!(query, "market=KRW-BTC&side=bid");
    }
}
