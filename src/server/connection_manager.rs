use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::protocol::{ConnectionId, UserId};

/// Per-connection context attached at accept time.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionContext {
    /// Verified identity from the auth collaborator, present for hosts
    pub user_id: Option<UserId>,
    #[allow(dead_code)]
    pub connected_at: DateTime<Utc>,
}

/// Tracks live connections and their authentication context.
pub(crate) struct ConnectionManager {
    contexts: DashMap<ConnectionId, ConnectionContext>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            contexts: DashMap::new(),
        }
    }

    pub fn register(&self, connection_id: ConnectionId, user_id: Option<UserId>) {
        self.contexts.insert(
            connection_id,
            ConnectionContext {
                user_id,
                connected_at: Utc::now(),
            },
        );
    }

    pub fn remove(&self, connection_id: ConnectionId) {
        self.contexts.remove(&connection_id);
    }

    pub fn user_id(&self, connection_id: ConnectionId) -> Option<UserId> {
        self.contexts
            .get(&connection_id)
            .and_then(|context| context.user_id)
    }

    pub fn is_authenticated(&self, connection_id: ConnectionId) -> bool {
        self.user_id(connection_id).is_some()
    }

    #[allow(dead_code)]
    pub fn connection_count(&self) -> usize {
        self.contexts.len()
    }
}
