use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::{Pin, Room};
use crate::error::{CoreError, CoreResult};
use crate::protocol::ConnectionId;

/// In-memory room registry: the single authority for live rooms.
///
/// The primary map is `pin -> Room`; reads hand out owned clones so
/// use-cases follow a load → mutate → save discipline. Secondary indexes
/// give O(1) lookups by reconnect token or connection. Index entries can go
/// stale (token rotation, room deletion); lookups verify against the room
/// and drop entries that no longer agree.
///
/// This is the one component that would be replaced by a shared store for
/// multi-node deployment.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Room>>,
    host_tokens: DashMap<String, String>,
    participant_tokens: DashMap<String, String>,
    connections: DashMap<ConnectionId, String>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            host_tokens: DashMap::new(),
            participant_tokens: DashMap::new(),
            connections: DashMap::new(),
        }
    }

    /// Insert a brand-new room. Fails with `Conflict` if the PIN is already
    /// live, so PIN generation can retry.
    pub async fn insert_new(&self, room: Room) -> CoreResult<()> {
        let pin = room.pin.as_str().to_string();
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&pin) {
            return Err(CoreError::conflict("PIN is already in use"));
        }
        self.index_room(&room);
        rooms.insert(pin, room);
        Ok(())
    }

    /// Persist a mutated room and refresh its index entries.
    pub async fn save(&self, room: Room) {
        let pin = room.pin.as_str().to_string();
        self.index_room(&room);
        self.rooms.write().await.insert(pin, room);
    }

    pub async fn get(&self, pin: &str) -> Option<Room> {
        self.rooms.read().await.get(pin).cloned()
    }

    pub async fn remove(&self, pin: &str) -> Option<Room> {
        let removed = self.rooms.write().await.remove(pin);
        if let Some(room) = &removed {
            self.unindex_room(room);
        }
        removed
    }

    pub async fn pin_exists(&self, pin: &str) -> bool {
        self.rooms.read().await.contains_key(pin)
    }

    pub async fn all_pins(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Generate a PIN not currently in use. Collisions retry up to
    /// `attempts` times before giving up.
    pub async fn generate_pin(&self, attempts: u32) -> CoreResult<Pin> {
        for _ in 0..attempts {
            let pin = Pin::generate();
            if !self.pin_exists(pin.as_str()).await {
                return Ok(pin);
            }
        }
        Err(CoreError::internal(
            "Could not generate a unique PIN; registry saturated",
        ))
    }

    // ------------------------------------------------------------------
    // Indexed lookups (self-healing)
    // ------------------------------------------------------------------

    pub async fn pin_by_connection(&self, connection_id: ConnectionId) -> Option<String> {
        let pin = self.connections.get(&connection_id)?.value().clone();
        let rooms = self.rooms.read().await;
        let agrees = rooms.get(&pin).is_some_and(|room| {
            room.host_connection_id == connection_id
                || room.find_player_by_connection(connection_id).is_some()
                || room.find_spectator_by_connection(connection_id).is_some()
        });
        drop(rooms);
        if agrees {
            Some(pin)
        } else {
            self.connections.remove(&connection_id);
            None
        }
    }

    pub async fn pin_by_host_token(&self, token: &str) -> Option<String> {
        let pin = self.host_tokens.get(token)?.value().clone();
        let rooms = self.rooms.read().await;
        let agrees = rooms.get(&pin).is_some_and(|room| room.host_token == token);
        drop(rooms);
        if agrees {
            Some(pin)
        } else {
            self.host_tokens.remove(token);
            None
        }
    }

    pub async fn pin_by_participant_token(&self, token: &str) -> Option<String> {
        let pin = self.participant_tokens.get(token)?.value().clone();
        let rooms = self.rooms.read().await;
        let agrees = rooms.get(&pin).is_some_and(|room| {
            room.players.iter().any(|player| player.token == token)
                || room
                    .spectators
                    .iter()
                    .any(|spectator| spectator.token == token)
        });
        drop(rooms);
        if agrees {
            Some(pin)
        } else {
            self.participant_tokens.remove(token);
            None
        }
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Drop index entries whose room is gone, whose token was rotated away,
    /// or whose token has outlived the TTL. Returns how many were removed.
    pub async fn sweep_stale_indexes(&self, token_ttl: Duration) -> usize {
        let rooms = self.rooms.read().await;
        let mut removed = 0;

        self.host_tokens.retain(|token, pin| {
            let keep = rooms
                .get(pin)
                .is_some_and(|room| room.host_token == *token);
            if !keep {
                removed += 1;
            }
            keep
        });

        self.participant_tokens.retain(|token, pin| {
            let keep = rooms.get(pin).is_some_and(|room| {
                room.players
                    .iter()
                    .any(|player| player.token == *token && player.token_valid(token_ttl))
                    || room.spectators.iter().any(|spectator| {
                        spectator.token == *token && spectator.token_valid(token_ttl)
                    })
            });
            if !keep {
                removed += 1;
            }
            keep
        });

        self.connections.retain(|connection_id, pin| {
            let keep = rooms.get(pin).is_some_and(|room| {
                room.host_connection_id == *connection_id
                    || room.find_player_by_connection(*connection_id).is_some()
                    || room.find_spectator_by_connection(*connection_id).is_some()
            });
            if !keep {
                removed += 1;
            }
            keep
        });

        removed
    }

    fn index_room(&self, room: &Room) {
        let pin = room.pin.as_str().to_string();
        self.host_tokens.insert(room.host_token.clone(), pin.clone());
        self.connections
            .insert(room.host_connection_id, pin.clone());
        for player in &room.players {
            self.participant_tokens
                .insert(player.token.clone(), pin.clone());
            self.connections.insert(player.connection_id, pin.clone());
        }
        for spectator in &room.spectators {
            self.participant_tokens
                .insert(spectator.token.clone(), pin.clone());
            self.connections
                .insert(spectator.connection_id, pin.clone());
        }
    }

    fn unindex_room(&self, room: &Room) {
        self.host_tokens.remove(&room.host_token);
        self.connections.remove(&room.host_connection_id);
        for player in &room.players {
            self.participant_tokens.remove(&player.token);
            self.connections.remove(&player.connection_id);
        }
        for spectator in &room.spectators {
            self.participant_tokens.remove(&spectator.token);
            self.connections.remove(&spectator.connection_id);
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
