use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::CoreError;
use crate::protocol::{ClientEvent, ServerEvent, UserId};
use crate::server::GameServer;

/// Per-connection socket loop: a send task draining the outbound queue and
/// a receive task feeding the dispatcher. When either side ends, the whole
/// connection is torn down and the disconnect bookkeeping runs (grace
/// periods start ticking from here).
pub(super) async fn handle_socket(
    socket: WebSocket,
    server: Arc<GameServer>,
    user_id: Option<UserId>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<ServerEvent>>(64);

    let connection_id = Uuid::new_v4();
    server.register_connection(connection_id, user_id, tx).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(event.as_ref()) {
                Ok(text) => {
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(%connection_id, error = %err, "Failed to serialize outbound event");
                }
            }
        }
        let _ = ws_sender.close().await;
    });

    let receive_server = Arc::clone(&server);
    let mut receive_task = tokio::spawn(async move {
        while let Some(message) = ws_receiver.next().await {
            let Ok(message) = message else {
                break;
            };
            match message {
                Message::Text(text) => {
                    match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => {
                            receive_server
                                .handle_client_event(connection_id, event)
                                .await;
                        }
                        Err(err) => {
                            receive_server
                                .send_error(
                                    connection_id,
                                    &CoreError::validation(format!("Malformed event: {err}")),
                                )
                                .await;
                        }
                    }
                }
                Message::Close(_) => break,
                // Pings/pongs are handled by the transport; binary frames
                // are not part of this protocol.
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => receive_task.abort(),
        _ = &mut receive_task => send_task.abort(),
    }

    server.handle_disconnect(connection_id).await;
}
