use crate::server::ApiState;
use auto_trade_bot_orchestrator::AssetStatus;
use auto_trade_core::events::{AssetHealth, LedgerRecord};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
pub struct AssetListResponse {
    pub assets: Vec<String>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: u32,
}

const fn default_history_limit() -> u32 {
    20
}

/// Lists all supervised assets.
pub async fn list_assets(State(state): State<Arc<ApiState>>) -> Json<AssetListResponse> {
    let assets = state.orchestrator.list().await;
    Json(AssetListResponse { assets })
}

/// Gets the scheduler status for one asset.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the asset isn't supervised, or
/// `StatusCode::INTERNAL_SERVER_ERROR` if the actor cannot be reached.
pub async fn get_status(
    State(state): State<Arc<ApiState>>,
    Path(asset_id): Path<String>,
) -> Result<Json<AssetStatus>, StatusCode> {
    let handle = state
        .orchestrator
        .get(&asset_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    let status = handle
        .get_status()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(status))
}

/// Reads recent ledger records for one asset, newest first.
///
/// # Errors
/// Returns `StatusCode::INTERNAL_SERVER_ERROR` if the ledger read fails.
pub async fn get_history(
    State(state): State<Arc<ApiState>>,
    Path(asset_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<LedgerRecord>>, StatusCode> {
    let records = state
        .ledger
        .read_recent(&asset_id, query.limit)
        .await
        .map_err(|e| {
            tracing::error!(%asset_id, error = %e, "history read failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(records))
}

/// Reads the staleness monitor's view of one asset.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` until the monitor has checked the asset.
pub async fn get_health(
    State(state): State<Arc<ApiState>>,
    Path(asset_id): Path<String>,
) -> Result<Json<AssetHealth>, StatusCode> {
    let health = state.health.read().await;
    health
        .get(&asset_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Starts an asset's trading loop.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the asset isn't supervised, or
/// `StatusCode::INTERNAL_SERVER_ERROR` if the command cannot be delivered.
pub async fn start_asset(
    State(state): State<Arc<ApiState>>,
    Path(asset_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let handle = state
        .orchestrator
        .get(&asset_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    handle
        .start()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::OK)
}

/// Stops an asset's trading loop; an in-flight cycle finishes its step and
/// persists first.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the asset isn't supervised, or
/// `StatusCode::INTERNAL_SERVER_ERROR` if the command cannot be delivered.
pub async fn stop_asset(
    State(state): State<Arc<ApiState>>,
    Path(asset_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let handle = state
        .orchestrator
        .get(&asset_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    handle
        .stop()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::OK)
}
