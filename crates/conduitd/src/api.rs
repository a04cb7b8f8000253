//! Status HTTP endpoint on 127.0.0.1.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use conduit_services::{BridgeRouter, RouterStatus};

pub fn routes(router: Arc<BridgeRouter>) -> Router {
    Router::new()
        .route("/api/status", get(handle_status))
        .with_state(router)
}

pub async fn serve(router: Arc<BridgeRouter>, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "status API listening on 127.0.0.1");
    axum::serve(listener, routes(router)).await?;
    Ok(())
}

async fn handle_status(State(router): State<Arc<BridgeRouter>>) -> Json<RouterStatus> {
    Json(router.status())
}
