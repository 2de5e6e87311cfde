use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum AssetCommand {
    Start,
    Stop,
    GetStatus(oneshot::Sender<AssetStatus>),
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssetState {
    Stopped,
    Running,
}

/// Phase of the per-asset cycle state machine. `Failed` is terminal for one
/// cycle only; the scheduler returns to `Idle` for the next tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Deciding,
    Gating,
    Executing,
    Persisting,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetStatus {
    pub asset_id: String,
    pub state: AssetState,
    pub phase: CyclePhase,
    pub last_heartbeat: DateTime<Utc>,
    /// Timestamp of the last cycle that persisted successfully.
    pub last_cycle: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl AssetStatus {
    #[must_use]
    pub fn stopped(asset_id: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            state: AssetState::Stopped,
            phase: CyclePhase::Idle,
            last_heartbeat: Utc::now(),
            last_cycle: None,
            error: None,
        }
    }
}
