//! Order executor: turns a gated decision into exchange orders.

use crate::gate::{buy_spend, sell_quantity};
use crate::retry::{with_backoff, RetryPolicy};
use auto_trade_core::config::EngineConfig;
use auto_trade_core::error::ApiError;
use auto_trade_core::events::{
    AccountBalances, Decision, ExecutionResult, ExecutionStatus, OrderFillStatus, OrderResult,
    OrderSide, TradeAction,
};
use auto_trade_core::traits::ExchangeClient;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;

/// Executes one gated decision.
///
/// HOLD returns `SKIPPED` without touching the exchange. Transient exchange
/// failures are retried under `policy`; a rejection (the gate raced another
/// spender) is recorded FAILED with the exchange's message verbatim.
/// A partial fill is reported as-is; the remainder is deliberately NOT
/// retried this cycle, the next cycle re-evaluates from fresh state.
pub async fn execute(
    exchange: &Arc<dyn ExchangeClient>,
    decision: &Decision,
    balances: AccountBalances,
    pair: &str,
    engine: &EngineConfig,
    policy: RetryPolicy,
    stop: &watch::Receiver<bool>,
) -> ExecutionResult {
    if decision.is_hold() {
        return ExecutionResult::skipped();
    }

    let (side, amount) = match decision.action {
        TradeAction::Buy => (OrderSide::Buy, buy_spend(decision, balances, engine)),
        TradeAction::Sell => (OrderSide::Sell, sell_quantity(decision, balances, engine)),
        TradeAction::Hold => return ExecutionResult::skipped(),
    };

    if amount <= Decimal::ZERO {
        return ExecutionResult::skipped();
    }

    let placed = with_backoff(policy, stop, "place_order", || {
        exchange.place_order(pair, side, amount)
    })
    .await;

    match placed {
        Ok(order) => from_order(&order),
        Err(ApiError::Rejected(message)) => {
            tracing::warn!(%pair, %message, "exchange rejected order");
            ExecutionResult::failed(message)
        }
        Err(err) => {
            tracing::error!(%pair, error = %err, "order placement failed");
            ExecutionResult::failed(err.to_string())
        }
    }
}

fn from_order(order: &OrderResult) -> ExecutionResult {
    let status = match order.status {
        OrderFillStatus::Filled => ExecutionStatus::Executed,
        OrderFillStatus::PartiallyFilled => ExecutionStatus::Partial,
    };

    ExecutionResult {
        status,
        filled_quantity: order.filled_quantity,
        avg_price: order.avg_price,
        order_ids: vec![order.order_id.clone()],
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use auto_trade_core::config::AssetConfig;
    use auto_trade_core::events::MarketSnapshot;
    use auto_trade_core::events::{DecisionSource, TradeAction};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct ScriptedExchange {
        fail_first: u32,
        calls: AtomicU32,
        result: OrderResult,
    }

    #[async_trait]
    impl ExchangeClient for ScriptedExchange {
        async fn get_snapshot(&self, _asset: &AssetConfig) -> Result<MarketSnapshot, ApiError> {
            unimplemented!("not used by executor tests")
        }

        async fn get_balances(&self, _asset: &AssetConfig) -> Result<AccountBalances, ApiError> {
            unimplemented!("not used by executor tests")
        }

        async fn place_order(
            &self,
            _pair: &str,
            _side: OrderSide,
            _amount: Decimal,
        ) -> Result<OrderResult, ApiError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(ApiError::Unavailable("503".to_string()));
            }
            Ok(OrderResult {
                order_id: self.result.order_id.clone(),
                status: self.result.status,
                filled_quantity: self.result.filled_quantity,
                avg_price: self.result.avg_price,
            })
        }
    }

    fn decision(action: TradeAction, magnitude: Decimal) -> Decision {
        Decision {
            asset_id: "BTC".to_string(),
            cycle_ts: Utc::now(),
            action,
            magnitude,
            rationale: "test".to_string(),
            original_rationale: None,
            source: DecisionSource::DecisionService,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            step_timeout: Duration::from_secs(1),
        }
    }

    fn balances() -> AccountBalances {
        AccountBalances {
            quote: dec!(1000000),
            holdings: dec!(1),
        }
    }

    #[tokio::test]
    async fn hold_skips_without_exchange_call() {
        let exchange: Arc<dyn ExchangeClient> = Arc::new(ScriptedExchange {
            fail_first: 0,
            calls: AtomicU32::new(0),
            result: OrderResult {
                order_id: "o1".to_string(),
                status: OrderFillStatus::Filled,
                filled_quantity: dec!(1),
                avg_price: None,
            },
        });
        let stop = watch::channel(false).1;

        let result = execute(
            &exchange,
            &decision(TradeAction::Hold, Decimal::ZERO),
            balances(),
            "KRW-BTC",
            &EngineConfig::default(),
            policy(),
            &stop,
        )
        .await;

        assert_eq!(result.status, ExecutionStatus::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_then_success_yields_executed() {
        let exchange = Arc::new(ScriptedExchange {
            fail_first: 2,
            calls: AtomicU32::new(0),
            result: OrderResult {
                order_id: "o2".to_string(),
                status: OrderFillStatus::Filled,
                filled_quantity: dec!(0.01),
                avg_price: Some(dec!(50000000)),
            },
        });
        let as_trait: Arc<dyn ExchangeClient> = exchange.clone();
        let stop = watch::channel(false).1;

        let result = execute(
            &as_trait,
            &decision(TradeAction::Buy, dec!(0.5)),
            balances(),
            "KRW-BTC",
            &EngineConfig::default(),
            policy(),
            &stop,
        )
        .await;

        assert_eq!(result.status, ExecutionStatus::Executed);
        assert_eq!(result.order_ids, vec!["o2".to_string()]);
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn partial_fill_maps_to_partial() {
        let exchange: Arc<dyn ExchangeClient> = Arc::new(ScriptedExchange {
            fail_first: 0,
            calls: AtomicU32::new(0),
            result: OrderResult {
                order_id: "o3".to_string(),
                status: OrderFillStatus::PartiallyFilled,
                filled_quantity: dec!(0.004),
                avg_price: Some(dec!(49000000)),
            },
        });
        let stop = watch::channel(false).1;

        let result = execute(
            &exchange,
            &decision(TradeAction::Sell, dec!(0.5)),
            balances(),
            "KRW-BTC",
            &EngineConfig::default(),
            policy(),
            &stop,
        )
        .await;

        assert_eq!(result.status, ExecutionStatus::Partial);
        assert_eq!(result.filled_quantity, dec!(0.004));
    }

    struct RejectingExchange;

    #[async_trait]
    impl ExchangeClient for RejectingExchange {
        async fn get_snapshot(&self, _asset: &AssetConfig) -> Result<MarketSnapshot, ApiError> {
            unimplemented!()
        }

        async fn get_balances(&self, _asset: &AssetConfig) -> Result<AccountBalances, ApiError> {
            unimplemented!()
        }

        async fn place_order(
            &self,
            _pair: &str,
            _side: OrderSide,
            _amount: Decimal,
        ) -> Result<OrderResult, ApiError> {
            Err(ApiError::Rejected("InsufficientFundsBid".to_string()))
        }
    }

    #[tokio::test]
    async fn rejection_captured_verbatim_as_failed() {
        let exchange: Arc<dyn ExchangeClient> = Arc::new(RejectingExchange);
        let stop = watch::channel(false).1;

        let result = execute(
            &exchange,
            &decision(TradeAction::Buy, dec!(0.5)),
            balances(),
            "KRW-BTC",
            &EngineConfig::default(),
            policy(),
            &stop,
        )
        .await;

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("InsufficientFundsBid"));
    }
}
