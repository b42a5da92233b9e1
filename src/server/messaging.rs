use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::protocol::{ConnectionId, ServerEvent};

/// Outbound event delivery, scoped per connection and per room channel.
///
/// The WebSocket layer registers each connection's mpsc sender here; the
/// use-cases only ever talk to this trait, which keeps them testable with
/// an in-process sink and keeps broadcast-after-save ordering in one place.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn register_connection(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::Sender<Arc<ServerEvent>>,
    );

    async fn unregister_connection(&self, connection_id: ConnectionId);

    /// Subscribe a connection to a room's broadcasts.
    async fn join_room_channel(&self, pin: &str, connection_id: ConnectionId);

    async fn leave_room_channel(&self, pin: &str, connection_id: ConnectionId);

    /// Drop the whole channel when a room is deleted.
    async fn remove_room_channel(&self, pin: &str);

    async fn send_to_connection(&self, connection_id: ConnectionId, event: Arc<ServerEvent>);

    async fn broadcast_to_room(&self, pin: &str, event: Arc<ServerEvent>);

    async fn broadcast_to_room_except(
        &self,
        pin: &str,
        except: ConnectionId,
        event: Arc<ServerEvent>,
    );
}

/// In-memory sink used by the WebSocket transport and by tests.
pub struct InMemoryEventSink {
    senders: RwLock<HashMap<ConnectionId, mpsc::Sender<Arc<ServerEvent>>>>,
    rooms: RwLock<HashMap<String, HashSet<ConnectionId>>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    async fn deliver(
        senders: &HashMap<ConnectionId, mpsc::Sender<Arc<ServerEvent>>>,
        connection_id: ConnectionId,
        event: &Arc<ServerEvent>,
    ) {
        if let Some(sender) = senders.get(&connection_id) {
            if sender.try_send(Arc::clone(event)).is_err() {
                tracing::warn!(%connection_id, "Outbound queue full or closed; dropping event");
            }
        }
    }
}

impl Default for InMemoryEventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn register_connection(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::Sender<Arc<ServerEvent>>,
    ) {
        self.senders.write().await.insert(connection_id, sender);
    }

    async fn unregister_connection(&self, connection_id: ConnectionId) {
        self.senders.write().await.remove(&connection_id);
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
    }

    async fn join_room_channel(&self, pin: &str, connection_id: ConnectionId) {
        self.rooms
            .write()
            .await
            .entry(pin.to_string())
            .or_default()
            .insert(connection_id);
    }

    async fn leave_room_channel(&self, pin: &str, connection_id: ConnectionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(pin) {
            members.remove(&connection_id);
            if members.is_empty() {
                rooms.remove(pin);
            }
        }
    }

    async fn remove_room_channel(&self, pin: &str) {
        self.rooms.write().await.remove(pin);
    }

    async fn send_to_connection(&self, connection_id: ConnectionId, event: Arc<ServerEvent>) {
        let senders = self.senders.read().await;
        Self::deliver(&senders, connection_id, &event).await;
    }

    async fn broadcast_to_room(&self, pin: &str, event: Arc<ServerEvent>) {
        let rooms = self.rooms.read().await;
        let senders = self.senders.read().await;
        if let Some(members) = rooms.get(pin) {
            for connection_id in members {
                Self::deliver(&senders, *connection_id, &event).await;
            }
        }
    }

    async fn broadcast_to_room_except(
        &self,
        pin: &str,
        except: ConnectionId,
        event: Arc<ServerEvent>,
    ) {
        let rooms = self.rooms.read().await;
        let senders = self.senders.read().await;
        if let Some(members) = rooms.get(pin) {
            for connection_id in members {
                if *connection_id != except {
                    Self::deliver(&senders, *connection_id, &event).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn broadcast_reaches_room_members_only() {
        let sink = InMemoryEventSink::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        sink.register_connection(a, tx_a).await;
        sink.register_connection(b, tx_b).await;
        sink.join_room_channel("042137", a).await;

        sink.broadcast_to_room("042137", Arc::new(ServerEvent::GamePaused))
            .await;

        assert!(matches!(*rx_a.try_recv().unwrap(), ServerEvent::GamePaused));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_except_skips_originator() {
        let sink = InMemoryEventSink::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        sink.register_connection(a, tx_a).await;
        sink.register_connection(b, tx_b).await;
        sink.join_room_channel("042137", a).await;
        sink.join_room_channel("042137", b).await;

        sink.broadcast_to_room_except("042137", a, Arc::new(ServerEvent::GameResumed))
            .await;

        assert!(rx_a.try_recv().is_err());
        assert!(matches!(*rx_b.try_recv().unwrap(), ServerEvent::GameResumed));
    }

    #[tokio::test]
    async fn unregister_leaves_all_channels() {
        let sink = InMemoryEventSink::new();
        let (tx, mut rx) = mpsc::channel(4);
        let conn = Uuid::new_v4();

        sink.register_connection(conn, tx).await;
        sink.join_room_channel("042137", conn).await;
        sink.unregister_connection(conn).await;

        sink.broadcast_to_room("042137", Arc::new(ServerEvent::GamePaused))
            .await;
        assert!(rx.try_recv().is_err());
    }
}
