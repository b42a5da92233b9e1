use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use std::sync::Arc;

use super::connection::handle_socket;
use crate::protocol::UserId;
use crate::server::GameServer;

/// Connection parameters.
///
/// `user_id` is the already-verified identity handed over by the upstream
/// auth layer (the core does not issue or validate credentials itself).
/// Connections without it are unauthenticated players/spectators.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub user_id: Option<UserId>,
}

/// WebSocket upgrade for the game protocol.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(server): State<Arc<GameServer>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, server, query.user_id))
}

/// Liveness probe.
pub async fn health_handler() -> &'static str {
    "ok"
}
