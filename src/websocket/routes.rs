use axum::routing::get;
use axum::Router;
use std::sync::Arc;

use super::handler::{health_handler, websocket_handler};
use crate::server::GameServer;

/// Routes served by the game core: the WebSocket endpoint and a health
/// probe.
pub fn create_router() -> Router<Arc<GameServer>> {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/healthz", get(health_handler))
}
