//! Best-effort notification fan-out.
//!
//! The trading path enqueues with `try_send` and moves on: a full queue, a
//! closed channel, or a delivery failure is logged and discarded. Nothing
//! here can block or fail a cycle.

use auto_trade_core::events::{AssetHealth, LedgerRecord};
use auto_trade_core::traits::{Notification, NotificationChannel};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const QUEUE_CAPACITY: usize = 64;

/// Cloneable front half of the notification pipeline.
#[derive(Clone)]
pub struct Notifier {
    tx: Option<mpsc::Sender<Notification>>,
}

impl Notifier {
    /// Creates a notifier backed by `channel` and spawns the delivery
    /// worker. With no channel configured, every notify is a no-op.
    #[must_use]
    pub fn spawn(channel: Option<Arc<dyn NotificationChannel>>) -> (Self, Option<JoinHandle<()>>) {
        let Some(channel) = channel else {
            return (Self { tx: None }, None);
        };

        let (tx, mut rx) = mpsc::channel::<Notification>(QUEUE_CAPACITY);
        let worker = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if let Err(err) = channel.send(&notification).await {
                    tracing::warn!(
                        title = %notification.title,
                        error = %err,
                        "notification delivery failed, dropping"
                    );
                }
            }
        });

        (Self { tx: Some(tx) }, Some(worker))
    }

    /// Disconnected notifier for tests and notification-less runs.
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn notify(&self, notification: Notification) {
        let Some(tx) = &self.tx else { return };
        if let Err(err) = tx.try_send(notification) {
            tracing::warn!(error = %err, "notification queue full or closed, dropping");
        }
    }

    /// One summary per completed cycle: decision plus execution outcome.
    pub fn notify_cycle(&self, record: &LedgerRecord) {
        self.notify(cycle_notification(record));
    }

    /// One alert per staleness transition.
    pub fn notify_stale(&self, health: &AssetHealth, hours_stale: f64) {
        self.notify(Notification {
            title: format!("{} pipeline stale", health.asset_id),
            body: format!(
                "No ledger update for {hours_stale:.1} hours (last record: {}).",
                health
                    .last_record
                    .map_or_else(|| "never".to_string(), |ts| ts.to_rfc3339()),
            ),
        });
    }
}

fn cycle_notification(record: &LedgerRecord) -> Notification {
    let total_value = record.quote_balance + record.crypto_balance * record.price;

    Notification {
        title: format!(
            "{} {} {}",
            record.asset_id,
            record.decision.action.to_string().to_uppercase(),
            record.result.status
        ),
        body: format!(
            "Decision: {} {} ({})\nStatus: {}{}\nHoldings: {} | Quote: {} | Total value: {}",
            record.decision.action,
            record.decision.magnitude,
            record.decision.rationale,
            record.result.status,
            record
                .result
                .error
                .as_deref()
                .map_or_else(String::new, |e| format!(" — {e}")),
            record.crypto_balance,
            record.quote_balance,
            total_value,
        ),
    }
}
