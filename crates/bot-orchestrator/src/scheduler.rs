//! Per-asset scheduler actor.
//!
//! Owns one asset's cycle state machine: Idle -> Fetching -> Deciding ->
//! Gating -> Executing -> Persisting -> Idle, with a Failed branch that
//! still persists a record. Commands arrive over an mpsc channel exactly as
//! in a conventional actor; a stop request is honored between cycle steps,
//! never inside an in-flight exchange call, so an order can never be left
//! without its ledger record.

use crate::commands::{AssetCommand, AssetState, AssetStatus, CyclePhase};
use crate::executor;
use crate::gate;
use crate::notifier::Notifier;
use crate::retry::{with_backoff, RetryPolicy};
use anyhow::Result;
use auto_trade_core::config::{AssetConfig, EngineConfig};
use auto_trade_core::events::{
    AccountBalances, Decision, ExecutionResult, ExecutionStatus, LedgerRecord,
};
use auto_trade_core::traits::{DecisionService, ExchangeClient, LedgerStore, NewsProvider};
use auto_trade_core::DecisionContext;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// External collaborators one scheduler drives. All shared, all consumed
/// through the narrow core traits.
#[derive(Clone)]
pub struct Collaborators {
    pub exchange: Arc<dyn ExchangeClient>,
    pub decision: Arc<dyn DecisionService>,
    pub news: Option<Arc<dyn NewsProvider>>,
    pub ledger: Arc<dyn LedgerStore>,
}

/// What one cycle produced, ready to persist.
struct CycleOutcome {
    decision: Decision,
    result: ExecutionResult,
    balances: AccountBalances,
    price: Decimal,
}

pub struct AssetScheduler {
    config: AssetConfig,
    engine: EngineConfig,
    deps: Collaborators,
    notifier: Notifier,
    news_limit: usize,
    rx: mpsc::Receiver<AssetCommand>,
    status_tx: watch::Sender<AssetStatus>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    state: AssetState,
    phase: CyclePhase,
    last_cycle: Option<DateTime<Utc>>,
    last_error: Option<String>,
    shutdown_requested: bool,
}

impl AssetScheduler {
    #[must_use]
    pub fn new(
        config: AssetConfig,
        engine: EngineConfig,
        deps: Collaborators,
        notifier: Notifier,
        news_limit: usize,
        rx: mpsc::Receiver<AssetCommand>,
        status_tx: watch::Sender<AssetStatus>,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            config,
            engine,
            deps,
            notifier,
            news_limit,
            rx,
            status_tx,
            stop_tx,
            stop_rx,
            state: AssetState::Stopped,
            phase: CyclePhase::Idle,
            last_cycle: None,
            last_error: None,
            shutdown_requested: false,
        }
    }

    /// Runs the actor's command loop until shutdown.
    ///
    /// # Errors
    /// Returns an error if command processing fails.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(asset = %self.config.asset_id, "scheduler started");

        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                AssetCommand::Start => {
                    if self.state == AssetState::Running {
                        tracing::warn!(asset = %self.config.asset_id, "already running, ignoring start");
                        continue;
                    }
                    self.state = AssetState::Running;
                    self.broadcast_status();
                    tracing::info!(asset = %self.config.asset_id, "trading loop starting");

                    self.trading_loop().await;

                    self.state = AssetState::Stopped;
                    self.set_phase(CyclePhase::Idle);
                    tracing::info!(asset = %self.config.asset_id, "trading loop parked");
                    if self.shutdown_requested {
                        break;
                    }
                }
                AssetCommand::Stop => {
                    tracing::warn!(asset = %self.config.asset_id, "not running, ignoring stop");
                }
                AssetCommand::GetStatus(tx) => {
                    let _ = tx.send(self.status());
                }
                AssetCommand::Shutdown => break,
            }
        }

        tracing::info!(asset = %self.config.asset_id, "scheduler stopped");
        Ok(())
    }

    async fn trading_loop(&mut self) {
        let _ = self.stop_tx.send(false);
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle(Utc::now()).await;
                    if *self.stop_rx.borrow() {
                        return;
                    }
                }
                cmd = self.rx.recv() => match cmd {
                    Some(AssetCommand::Stop) => return,
                    Some(AssetCommand::Shutdown) | None => {
                        self.shutdown_requested = true;
                        return;
                    }
                    Some(AssetCommand::GetStatus(tx)) => {
                        let _ = tx.send(self.status());
                    }
                    Some(AssetCommand::Start) => {
                        tracing::warn!(asset = %self.config.asset_id, "already running, ignoring start");
                    }
                },
            }
        }
    }

    /// One complete cycle. Always ends in exactly one persistence attempt,
    /// whatever happened before it.
    async fn run_cycle(&mut self, cycle_ts: DateTime<Utc>) {
        let outcome = self.drive_cycle(cycle_ts).await;

        self.set_phase(CyclePhase::Persisting);
        let record = LedgerRecord {
            asset_id: self.config.asset_id.clone(),
            cycle_ts,
            decision: outcome.decision,
            result: outcome.result,
            crypto_balance: outcome.balances.holdings,
            quote_balance: outcome.balances.quote,
            price: outcome.price,
        };

        match self.persist(&record).await {
            Ok(()) => {
                self.last_cycle = Some(cycle_ts);
                self.last_error = record.result.error.clone();
                self.notifier.notify_cycle(&record);
            }
            Err(err) => {
                // The one failure mode that cannot produce a record; the
                // staleness monitor is the backstop.
                tracing::error!(
                    asset = %self.config.asset_id,
                    error = %err,
                    "failed to persist cycle record"
                );
                self.last_error = Some(err.to_string());
            }
        }

        self.set_phase(CyclePhase::Idle);
    }

    /// Fetch -> decide -> gate -> execute, with stop checks between steps.
    async fn drive_cycle(&mut self, cycle_ts: DateTime<Utc>) -> CycleOutcome {
        let policy = RetryPolicy::from_engine(&self.engine);
        let asset_id = self.config.asset_id.clone();
        let no_balances = AccountBalances {
            quote: Decimal::ZERO,
            holdings: Decimal::ZERO,
        };

        // FETCHING
        self.set_phase(CyclePhase::Fetching);
        let stop = self.stop_rx.clone();
        let snapshot = with_backoff(policy, &stop, "get_snapshot", || {
            self.deps.exchange.get_snapshot(&self.config)
        })
        .await;
        let mut snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(err) => {
                return self.fail_cycle(cycle_ts, "snapshot fetch", &err.to_string(), no_balances, Decimal::ZERO)
            }
        };
        // The scheduler's tick is the cycle identity; the snapshot adopts it
        // so every artifact of this cycle carries the same timestamp.
        snapshot.timestamp = cycle_ts;

        let balances = match with_backoff(policy, &stop, "get_balances", || {
            self.deps.exchange.get_balances(&self.config)
        })
        .await
        {
            Ok(balances) => balances,
            Err(err) => {
                return self.fail_cycle(cycle_ts, "balance fetch", &err.to_string(), no_balances, snapshot.price)
            }
        };

        if let Some(news) = &self.deps.news {
            // Context is optional; a news failure degrades to none.
            match news.latest(&asset_id, self.news_limit).await {
                Ok(items) => snapshot.context = items,
                Err(err) => {
                    tracing::warn!(asset = %asset_id, error = %err, "news fetch failed, continuing without context");
                }
            }
        }

        let price = snapshot.price;
        if self.stop_requested() {
            return self.halt_cycle(cycle_ts, "before deciding", balances, price);
        }

        // DECIDING
        self.set_phase(CyclePhase::Deciding);
        let recent = match self
            .deps
            .ledger
            .read_recent(&asset_id, self.engine.recent_trades_window)
            .await
        {
            Ok(recent) => recent,
            Err(err) => {
                tracing::warn!(asset = %asset_id, error = %err, "recent-trade lookup failed, deciding without history");
                Vec::new()
            }
        };
        let ctx = DecisionContext {
            portfolio_value: balances.portfolio_value(price),
            snapshot,
            balances,
            recent,
        };

        let decision = match with_backoff(policy, &stop, "decide", || self.deps.decision.decide(&ctx)).await {
            Ok(decision) => decision,
            Err(err) => {
                return self.fail_cycle(cycle_ts, "decision service", &err.to_string(), balances, price)
            }
        };

        if self.stop_requested() {
            return self.halt_cycle(cycle_ts, "before executing", balances, price);
        }

        // GATING: synchronous, local, infallible.
        self.set_phase(CyclePhase::Gating);
        let gated = gate::apply(decision, balances, price, &self.config, &self.engine);

        // EXECUTING
        self.set_phase(CyclePhase::Executing);
        let result = executor::execute(
            &self.deps.exchange,
            &gated,
            balances,
            &self.config.pair,
            &self.engine,
            policy,
            &stop,
        )
        .await;

        // Post-trade balances make the record reflect where the portfolio
        // actually landed; on failure the pre-trade view stands.
        let balances = if matches!(result.status, ExecutionStatus::Executed | ExecutionStatus::Partial)
        {
            match with_backoff(policy, &stop, "get_balances", || {
                self.deps.exchange.get_balances(&self.config)
            })
            .await
            {
                Ok(updated) => updated,
                Err(err) => {
                    tracing::warn!(asset = %asset_id, error = %err, "post-trade balance refresh failed");
                    balances
                }
            }
        } else {
            balances
        };

        CycleOutcome {
            decision: gated,
            result,
            balances,
            price,
        }
    }

    /// Terminal branch for a cycle whose step retries were exhausted. The
    /// cycle still produces its one record, carrying the error detail.
    fn fail_cycle(
        &mut self,
        cycle_ts: DateTime<Utc>,
        step: &str,
        error: &str,
        balances: AccountBalances,
        price: Decimal,
    ) -> CycleOutcome {
        tracing::error!(
            asset = %self.config.asset_id,
            %step,
            %error,
            "cycle failed after exhausting retries"
        );
        self.set_phase(CyclePhase::Failed);

        CycleOutcome {
            decision: Decision::engine_hold(
                &self.config.asset_id,
                cycle_ts,
                format!("{step} failed: {error}"),
            ),
            result: ExecutionResult::failed(format!("{step}: {error}")),
            balances,
            price,
        }
    }

    /// Cooperative-stop branch: the current step finished, the rest of the
    /// cycle is abandoned, and a record is still written.
    fn halt_cycle(
        &mut self,
        cycle_ts: DateTime<Utc>,
        point: &str,
        balances: AccountBalances,
        price: Decimal,
    ) -> CycleOutcome {
        tracing::info!(asset = %self.config.asset_id, %point, "stop requested mid-cycle");

        CycleOutcome {
            decision: Decision::engine_hold(
                &self.config.asset_id,
                cycle_ts,
                format!("stopped {point}"),
            ),
            result: ExecutionResult::skipped(),
            balances,
            price,
        }
    }

    /// Persistence with its own bounded retry; the store's upsert keying
    /// makes repeats harmless.
    async fn persist(&self, record: &LedgerRecord) -> Result<()> {
        let policy = RetryPolicy::from_engine(&self.engine);
        let mut attempt = 0;

        loop {
            match self.deps.ledger.record_cycle(record).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt + 1 < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        asset = %record.asset_id,
                        attempt = attempt + 1,
                        ?delay,
                        error = %err,
                        "ledger write failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Drains queued commands without blocking and reports whether a stop
    /// was requested. Called between cycle steps.
    fn stop_requested(&mut self) -> bool {
        while let Ok(cmd) = self.rx.try_recv() {
            match cmd {
                AssetCommand::Stop => {
                    let _ = self.stop_tx.send(true);
                }
                AssetCommand::Shutdown => {
                    self.shutdown_requested = true;
                    let _ = self.stop_tx.send(true);
                }
                AssetCommand::GetStatus(tx) => {
                    let _ = tx.send(self.status());
                }
                AssetCommand::Start => {
                    tracing::warn!(asset = %self.config.asset_id, "already running, ignoring start");
                }
            }
        }
        *self.stop_rx.borrow()
    }

    fn set_phase(&mut self, phase: CyclePhase) {
        self.phase = phase;
        self.broadcast_status();
    }

    fn status(&self) -> AssetStatus {
        AssetStatus {
            asset_id: self.config.asset_id.clone(),
            state: self.state.clone(),
            phase: self.phase,
            last_heartbeat: Utc::now(),
            last_cycle: self.last_cycle,
            error: self.last_error.clone(),
        }
    }

    fn broadcast_status(&self) {
        let _ = self.status_tx.send(self.status());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::AssetStatus;
    use rust_decimal_macros::dec;

    use async_trait::async_trait;
    use auto_trade_core::error::ApiError;
    use auto_trade_core::events::{MarketSnapshot, OrderResult, OrderSide};

    struct NullExchange;

    #[async_trait]
    impl ExchangeClient for NullExchange {
        async fn get_snapshot(&self, asset: &AssetConfig) -> Result<MarketSnapshot, ApiError> {
            Ok(MarketSnapshot {
                asset_id: asset.asset_id.clone(),
                timestamp: Utc::now(),
                price: dec!(100),
                history: Vec::new(),
                context: Vec::new(),
            })
        }

        async fn get_balances(&self, _asset: &AssetConfig) -> Result<AccountBalances, ApiError> {
            Ok(AccountBalances {
                quote: dec!(10000),
                holdings: Decimal::ZERO,
            })
        }

        async fn place_order(
            &self,
            _pair: &str,
            _side: OrderSide,
            _amount: Decimal,
        ) -> Result<OrderResult, ApiError> {
            Err(ApiError::Rejected("no trading in this test".to_string()))
        }
    }

    struct HoldDecision;

    #[async_trait]
    impl DecisionService for HoldDecision {
        async fn decide(&self, ctx: &DecisionContext) -> Result<Decision, ApiError> {
            Ok(Decision::engine_hold(
                &ctx.snapshot.asset_id,
                ctx.snapshot.timestamp,
                "test hold".to_string(),
            ))
        }
    }

    struct NullLedger;

    #[async_trait]
    impl LedgerStore for NullLedger {
        async fn record_cycle(&self, _record: &LedgerRecord) -> Result<()> {
            Ok(())
        }

        async fn read_recent(&self, _asset_id: &str, _limit: u32) -> Result<Vec<LedgerRecord>> {
            Ok(Vec::new())
        }

        async fn last_timestamp(&self, _asset_id: &str) -> Result<Option<DateTime<Utc>>> {
            Ok(None)
        }
    }

    fn asset() -> AssetConfig {
        AssetConfig {
            asset_id: "BTC".to_string(),
            pair: "KRW-BTC".to_string(),
            interval_secs: 3600,
            max_position_pct: 0.2,
            min_notional: dec!(5000),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn scheduler_reports_stopped_before_start() {
        let deps = Collaborators {
            exchange: Arc::new(NullExchange),
            decision: Arc::new(HoldDecision),
            news: None,
            ledger: Arc::new(NullLedger),
        };
        let (tx, rx) = mpsc::channel(8);
        let (status_tx, status_rx) = watch::channel(AssetStatus::stopped("BTC"));

        let scheduler = AssetScheduler::new(
            asset(),
            EngineConfig::default(),
            deps,
            Notifier::disabled(),
            4,
            rx,
            status_tx,
        );
        let task = tokio::spawn(scheduler.run());

        assert_eq!(status_rx.borrow().state, AssetState::Stopped);

        tx.send(AssetCommand::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
    }
}
