use crate::commands::{AssetCommand, AssetStatus};
use anyhow::Result;
use tokio::sync::{mpsc, oneshot, watch};

/// Cloneable handle to one asset's scheduler actor.
#[derive(Clone)]
pub struct AssetHandle {
    tx: mpsc::Sender<AssetCommand>,
    status_rx: watch::Receiver<AssetStatus>,
}

impl AssetHandle {
    #[must_use]
    pub const fn new(tx: mpsc::Sender<AssetCommand>, status_rx: watch::Receiver<AssetStatus>) -> Self {
        Self { tx, status_rx }
    }

    /// Starts the asset's trading loop.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the actor.
    pub async fn start(&self) -> Result<()> {
        self.tx.send(AssetCommand::Start).await?;
        Ok(())
    }

    /// Stops the trading loop. An in-flight cycle finishes its current step
    /// and persists before the loop parks.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the actor.
    pub async fn stop(&self) -> Result<()> {
        self.tx.send(AssetCommand::Stop).await?;
        Ok(())
    }

    /// Fetches status via round-trip to the actor.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent or the response
    /// cannot be received.
    pub async fn get_status(&self) -> Result<AssetStatus> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(AssetCommand::GetStatus(tx)).await?;
        let status = rx.await?;
        Ok(status)
    }

    /// Last status broadcast by the actor, without a round-trip.
    #[must_use]
    pub fn latest_status(&self) -> AssetStatus {
        self.status_rx.borrow().clone()
    }

    /// Shuts the actor down permanently.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(AssetCommand::Shutdown).await?;
        Ok(())
    }
}
