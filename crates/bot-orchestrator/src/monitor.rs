//! Staleness monitor.
//!
//! Runs on its own timer, decoupled from every trading loop, and classifies
//! each asset purely from ledger timestamps. Because it reads only the
//! durable store, it detects a fully crashed scheduler exactly as well as a
//! merely idle one.

use crate::notifier::Notifier;
use auto_trade_core::config::StalenessConfig;
use auto_trade_core::events::{AssetHealth, Freshness};
use auto_trade_core::traits::LedgerStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

pub type HealthMap = Arc<RwLock<HashMap<String, AssetHealth>>>;

/// Classifies ledger age in hours against the configured thresholds.
#[must_use]
pub fn classify(hours_since_last_record: f64, config: &StalenessConfig) -> Freshness {
    if hours_since_last_record >= config.stale_hours {
        Freshness::Stale
    } else if hours_since_last_record >= config.aging_hours {
        Freshness::Aging
    } else {
        Freshness::Fresh
    }
}

pub struct StalenessMonitor {
    ledger: Arc<dyn LedgerStore>,
    asset_ids: Vec<String>,
    config: StalenessConfig,
    notifier: Notifier,
    health: HealthMap,
    /// Reference point for assets that have never written a record.
    started_at: DateTime<Utc>,
}

impl StalenessMonitor {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        asset_ids: Vec<String>,
        config: StalenessConfig,
        notifier: Notifier,
    ) -> Self {
        Self {
            ledger,
            asset_ids,
            config,
            notifier,
            health: Arc::new(RwLock::new(HashMap::new())),
            started_at: Utc::now(),
        }
    }

    /// Shared view of the health map for the read-only API.
    #[must_use]
    pub fn health(&self) -> HealthMap {
        self.health.clone()
    }

    /// Runs the check loop until the shutdown signal is raised.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.check_interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("staleness monitor shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// One pass over every monitored asset at time `now`.
    pub async fn check_all(&self, now: DateTime<Utc>) {
        for asset_id in &self.asset_ids {
            if let Err(err) = self.check_asset(asset_id, now).await {
                tracing::error!(%asset_id, error = %err, "staleness check failed");
            }
        }
    }

    async fn check_asset(&self, asset_id: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
        let last_record = self.ledger.last_timestamp(asset_id).await?;

        let reference = last_record.unwrap_or(self.started_at);
        let hours = (now - reference).num_seconds() as f64 / 3600.0;
        let freshness = classify(hours, &self.config);

        let mut health = self.health.write().await;
        let entry = health.entry(asset_id.to_string()).or_insert_with(|| AssetHealth {
            asset_id: asset_id.to_string(),
            last_record,
            freshness: Freshness::Fresh,
            last_alert: None,
        });
        entry.last_record = last_record;

        let was = entry.freshness;
        entry.freshness = freshness;

        match freshness {
            Freshness::Stale => {
                let suppressed = entry.last_alert.is_some_and(|sent| {
                    (now - sent).num_seconds() as f64 / 3600.0 < self.config.alert_suppression_hours
                });
                if !suppressed {
                    entry.last_alert = Some(now);
                    let snapshot = entry.clone();
                    drop(health);
                    tracing::warn!(%asset_id, hours_stale = hours, "asset ledger is stale");
                    self.notifier.notify_stale(&snapshot, hours);
                }
            }
            Freshness::Fresh | Freshness::Aging => {
                // Leaving a stale episode resets suppression, so the next
                // episode alerts immediately.
                if was == Freshness::Stale {
                    tracing::info!(%asset_id, "asset ledger recovered from stale");
                    entry.last_alert = None;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use auto_trade_core::events::LedgerRecord;
    use auto_trade_core::traits::{Notification, NotificationChannel};
    use auto_trade_core::ApiError;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedLedger {
        last: std::sync::Mutex<Option<DateTime<Utc>>>,
    }

    #[async_trait]
    impl LedgerStore for FixedLedger {
        async fn record_cycle(&self, _record: &LedgerRecord) -> Result<()> {
            Ok(())
        }

        async fn read_recent(&self, _asset_id: &str, _limit: u32) -> Result<Vec<LedgerRecord>> {
            Ok(Vec::new())
        }

        async fn last_timestamp(&self, _asset_id: &str) -> Result<Option<DateTime<Utc>>> {
            Ok(*self.last.lock().unwrap())
        }
    }

    struct CountingChannel {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        async fn send(&self, _notification: &Notification) -> Result<(), ApiError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> StalenessConfig {
        StalenessConfig::default()
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, minute, 0).unwrap()
    }

    fn monitor_with(
        last: Option<DateTime<Utc>>,
    ) -> (StalenessMonitor, Arc<CountingChannel>, tokio::task::JoinHandle<()>) {
        let ledger = Arc::new(FixedLedger {
            last: std::sync::Mutex::new(last),
        });
        let channel = Arc::new(CountingChannel {
            sent: AtomicUsize::new(0),
        });
        let channel_dyn: Arc<dyn NotificationChannel> = channel.clone();
        let (notifier, worker) = Notifier::spawn(Some(channel_dyn));

        let monitor = StalenessMonitor::new(ledger, vec!["BTC".to_string()], config(), notifier);
        (monitor, channel, worker.unwrap())
    }

    async fn drain(monitor: StalenessMonitor, worker: tokio::task::JoinHandle<()>) {
        drop(monitor);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn classification_thresholds() {
        let config = config();
        assert_eq!(classify(0.5, &config), Freshness::Fresh);
        assert_eq!(classify(1.99, &config), Freshness::Fresh);
        assert_eq!(classify(2.0, &config), Freshness::Aging);
        assert_eq!(classify(4.99, &config), Freshness::Aging);
        assert_eq!(classify(5.0, &config), Freshness::Stale);
        assert_eq!(classify(48.0, &config), Freshness::Stale);
    }

    #[tokio::test]
    async fn six_hours_old_fires_exactly_one_alert() {
        // Last record six hours ago, threshold five hours.
        let (monitor, channel, worker) = monitor_with(Some(at(4, 0)));

        monitor.check_all(at(10, 0)).await;
        {
            let health = monitor.health.read().await;
            assert_eq!(health["BTC"].freshness, Freshness::Stale);
            assert!(health["BTC"].last_alert.is_some());
        }

        // Ten minutes later, still stale: suppressed.
        monitor.check_all(at(10, 10)).await;

        drain(monitor, worker).await;
        assert_eq!(channel.sent.load(Ordering::SeqCst), 1, "24h suppression");
    }

    #[tokio::test]
    async fn suppression_window_expiry_re_alerts() {
        let (monitor, channel, worker) = monitor_with(Some(at(0, 0)));

        monitor.check_all(at(6, 0)).await;
        // 25 hours after the first alert, still stale.
        let next_day = at(6, 0) + chrono::Duration::hours(25);
        monitor.check_all(next_day).await;

        drain(monitor, worker).await;
        assert_eq!(channel.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn recovery_clears_suppression_for_next_episode() {
        let ledger = Arc::new(FixedLedger {
            last: std::sync::Mutex::new(Some(at(0, 0))),
        });
        let channel = Arc::new(CountingChannel {
            sent: AtomicUsize::new(0),
        });
        let channel_dyn: Arc<dyn NotificationChannel> = channel.clone();
        let (notifier, worker) = Notifier::spawn(Some(channel_dyn));
        let monitor =
            StalenessMonitor::new(ledger.clone(), vec!["BTC".to_string()], config(), notifier);

        // Stale at 06:00 -> alert.
        monitor.check_all(at(6, 0)).await;

        // A new record lands; the next check sees Fresh and clears suppression.
        *ledger.last.lock().unwrap() = Some(at(6, 30));
        monitor.check_all(at(7, 0)).await;
        {
            let health = monitor.health.read().await;
            assert_eq!(health["BTC"].freshness, Freshness::Fresh);
            assert!(health["BTC"].last_alert.is_none());
        }

        // Pipeline stalls again: a fresh episode alerts immediately even
        // though less than 24h passed since the first alert.
        monitor.check_all(at(12, 0)).await;

        drop(monitor);
        worker.unwrap().await.unwrap();
        assert_eq!(channel.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fresh_asset_never_alerts() {
        let (monitor, channel, worker) = monitor_with(Some(at(9, 30)));

        monitor.check_all(at(10, 0)).await;
        {
            let health = monitor.health.read().await;
            assert_eq!(health["BTC"].freshness, Freshness::Fresh);
        }

        drain(monitor, worker).await;
        assert_eq!(channel.sent.load(Ordering::SeqCst), 0);
    }
}
