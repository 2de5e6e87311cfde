use crate::commands::{AssetCommand, AssetStatus};
use crate::handle::AssetHandle;
use crate::notifier::Notifier;
use crate::scheduler::{AssetScheduler, Collaborators};
use anyhow::Result;
use auto_trade_core::config::{AssetConfig, EngineConfig};
use auto_trade_core::validation::partition_assets;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

struct Supervised {
    handle: AssetHandle,
    task: JoinHandle<Result<()>>,
}

/// Supervises one scheduler actor per admitted asset and owns the global
/// start/stop lifecycle.
pub struct Orchestrator {
    assets: Arc<RwLock<HashMap<String, Supervised>>>,
    deps: Collaborators,
    engine: EngineConfig,
    notifier: Notifier,
    news_limit: usize,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        deps: Collaborators,
        engine: EngineConfig,
        notifier: Notifier,
        news_limit: usize,
    ) -> Self {
        Self {
            assets: Arc::new(RwLock::new(HashMap::new())),
            deps,
            engine,
            notifier,
            news_limit,
        }
    }

    /// Validates and admits the configured assets, spawning one scheduler
    /// actor each. Invalid assets are surfaced once, here, and skipped;
    /// they never enter the active set.
    ///
    /// # Errors
    /// Returns an error if spawning an admitted asset fails.
    pub async fn admit(&self, configs: &[AssetConfig]) -> Result<Vec<String>> {
        let (admitted, rejected) = partition_assets(configs);
        for err in &rejected {
            tracing::error!(error = %err, "asset rejected at startup");
        }

        let mut admitted_ids = Vec::new();
        for config in admitted {
            let asset_id = config.asset_id.clone();
            self.spawn_asset(config).await?;
            admitted_ids.push(asset_id);
        }

        Ok(admitted_ids)
    }

    /// Spawns the scheduler actor for one asset.
    ///
    /// # Errors
    /// Returns an error if an actor for the asset already exists.
    pub async fn spawn_asset(&self, config: AssetConfig) -> Result<AssetHandle> {
        let asset_id = config.asset_id.clone();

        let mut assets = self.assets.write().await;
        if assets.contains_key(&asset_id) {
            anyhow::bail!("asset {asset_id} already registered");
        }

        let (tx, rx) = mpsc::channel::<AssetCommand>(32);
        let (status_tx, status_rx) = watch::channel(AssetStatus::stopped(&asset_id));

        let scheduler = AssetScheduler::new(
            config,
            self.engine.clone(),
            self.deps.clone(),
            self.notifier.clone(),
            self.news_limit,
            rx,
            status_tx,
        );

        let task_asset_id = asset_id.clone();
        let task = tokio::spawn(async move {
            let result = scheduler.run().await;
            if let Err(ref e) = result {
                tracing::error!(asset = %task_asset_id, error = %e, "scheduler exited with error");
            }
            result
        });

        let handle = AssetHandle::new(tx, status_rx);
        assets.insert(
            asset_id,
            Supervised {
                handle: handle.clone(),
                task,
            },
        );

        Ok(handle)
    }

    #[must_use]
    pub async fn get(&self, asset_id: &str) -> Option<AssetHandle> {
        self.assets
            .read()
            .await
            .get(asset_id)
            .map(|s| s.handle.clone())
    }

    #[must_use]
    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.assets.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Starts every admitted asset's trading loop.
    ///
    /// # Errors
    /// Returns an error if a start command cannot be delivered.
    pub async fn start_all(&self) -> Result<()> {
        let handles: Vec<_> = self
            .assets
            .read()
            .await
            .values()
            .map(|s| s.handle.clone())
            .collect();
        for handle in handles {
            handle.start().await?;
        }
        Ok(())
    }

    /// Graceful shutdown: each actor finishes its in-flight cycle step,
    /// persists, and exits; the idle ones just halt. Waits for every actor
    /// task to finish.
    ///
    /// # Errors
    /// Returns an error if a shutdown command cannot be delivered.
    pub async fn shutdown_all(&self) -> Result<()> {
        let mut assets = self.assets.write().await;

        for supervised in assets.values() {
            supervised.handle.shutdown().await?;
        }
        for (asset_id, supervised) in assets.drain() {
            match supervised.task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(asset = %asset_id, error = %e, "scheduler ended with error")
                }
                Err(e) => tracing::error!(asset = %asset_id, error = %e, "scheduler task panicked"),
            }
        }

        tracing::info!("all schedulers stopped");
        Ok(())
    }
}
