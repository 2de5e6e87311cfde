use crate::handlers;
use auto_trade_bot_orchestrator::{HealthMap, Orchestrator};
use auto_trade_core::traits::LedgerStore;
use axum::{
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state behind every handler: the supervisor for control commands,
/// the ledger and health map read-only.
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub ledger: Arc<dyn LedgerStore>,
    pub health: HealthMap,
}

pub struct ApiServer {
    state: Arc<ApiState>,
}

impl ApiServer {
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>, ledger: Arc<dyn LedgerStore>, health: HealthMap) -> Self {
        Self {
            state: Arc::new(ApiState {
                orchestrator,
                ledger,
                health,
            }),
        }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/assets", get(handlers::list_assets))
            .route("/api/assets/:asset_id/status", get(handlers::get_status))
            .route("/api/assets/:asset_id/history", get(handlers::get_history))
            .route("/api/assets/:asset_id/health", get(handlers::get_health))
            .route("/api/assets/:asset_id/start", put(handlers::start_asset))
            .route("/api/assets/:asset_id/stop", put(handlers::stop_asset))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Starts the web server listening on the specified address.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve
    /// requests.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Web API listening on {}", addr);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
