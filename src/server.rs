use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::locks::ExpiringLockMap;
use crate::protocol::{ConnectionId, ServerEvent, UserId};
use crate::rate_limit::EventRateLimiter;
use crate::registry::RoomRegistry;
use crate::repository::{GameSessionRepository, QuizRepository, UserRepository};

mod cleanup;
mod connection_manager;
mod game_service;
mod message_router;
mod messaging;
mod room_service;
mod timer_service;

pub use game_service::Principal;
pub use messaging::{EventSink, InMemoryEventSink};
pub use timer_service::GameTimerService;

use connection_manager::ConnectionManager;

/// The realtime game-session core.
///
/// Owns the room registry, the per-room timers, the rate limiter, and the
/// keyed locks; use-cases live in `impl` blocks across the submodules
/// (room lifecycle in `room_service`, game flow in `game_service`, event
/// dispatch in `message_router`, the periodic sweep in `cleanup`).
pub struct GameServer {
    pub(crate) config: Config,
    pub(crate) registry: RoomRegistry,
    pub(crate) quizzes: Arc<dyn QuizRepository>,
    pub(crate) sessions: Arc<dyn GameSessionRepository>,
    pub(crate) users: Arc<dyn UserRepository>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) timers: Arc<GameTimerService>,
    pub(crate) rate_limiter: Arc<EventRateLimiter>,
    pub(crate) locks: ExpiringLockMap,
    pub(crate) connections: ConnectionManager,
    // Handle to ourselves for spawning timer callbacks and sweeps
    self_ref: Weak<GameServer>,
    cleanup_running: AtomicBool,
    shutting_down: AtomicBool,
}

impl GameServer {
    pub fn new(
        config: Config,
        quizzes: Arc<dyn QuizRepository>,
        sessions: Arc<dyn GameSessionRepository>,
        users: Arc<dyn UserRepository>,
        sink: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        let rate_limiter = Arc::new(EventRateLimiter::new(config.rate_limit.clone()));
        let locks = ExpiringLockMap::new(config.server.lock_timeout());

        Arc::new_cyclic(|self_ref| Self {
            registry: RoomRegistry::new(),
            quizzes,
            sessions,
            users,
            sink,
            timers: Arc::new(GameTimerService::new()),
            rate_limiter,
            locks,
            connections: ConnectionManager::new(),
            self_ref: self_ref.clone(),
            cleanup_running: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            config,
        })
    }

    /// Strong handle to ourselves, for spawned tasks. `None` only once the
    /// last external `Arc` is gone, at which point nothing should spawn.
    pub(crate) fn strong_ref(&self) -> Option<Arc<Self>> {
        self.self_ref.upgrade()
    }

    /// Start the background tasks (cleanup sweep, rate-limit sweep).
    pub fn start_background_tasks(&self) {
        self.spawn_cleanup_task();
        Arc::clone(&self.rate_limiter).start_sweep_task();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Register a freshly accepted connection together with its outbound
    /// queue and (optionally) the verified user identity from the auth
    /// collaborator.
    pub async fn register_connection(
        &self,
        connection_id: ConnectionId,
        user_id: Option<UserId>,
        sender: mpsc::Sender<Arc<ServerEvent>>,
    ) {
        self.connections.register(connection_id, user_id);
        self.sink.register_connection(connection_id, sender).await;
        tracing::info!(%connection_id, authenticated = user_id.is_some(), "Connection established");
    }

    /// Transport-level disconnect: record it on the room (grace periods
    /// apply) and drop per-connection state.
    pub async fn handle_disconnect(&self, connection_id: ConnectionId) {
        self.handle_room_disconnect(connection_id).await;
        self.rate_limiter.forget_connection(connection_id).await;
        self.connections.remove(connection_id);
        self.sink.unregister_connection(connection_id).await;
        tracing::info!(%connection_id, "Connection closed");
    }

    pub(crate) async fn emit(&self, connection_id: ConnectionId, event: ServerEvent) {
        self.sink
            .send_to_connection(connection_id, Arc::new(event))
            .await;
    }

    pub(crate) async fn broadcast(&self, pin: &str, event: ServerEvent) {
        self.sink.broadcast_to_room(pin, Arc::new(event)).await;
    }

    pub(crate) async fn broadcast_except(
        &self,
        pin: &str,
        except: ConnectionId,
        event: ServerEvent,
    ) {
        self.sink
            .broadcast_to_room_except(pin, except, Arc::new(event))
            .await;
    }

    pub(crate) fn claim_cleanup_slot(&self) -> bool {
        self.cleanup_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn release_cleanup_slot(&self) {
        self.cleanup_running.store(false, Ordering::SeqCst);
    }

    /// Graceful shutdown: stop timers, archive every room that has a game
    /// in flight as interrupted, and tear the rooms down. The caller wraps
    /// this in the hard deadline.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.timers.stop_all();

        for pin in self.registry.all_pins().await {
            match self.save_interrupted_game(&pin, "server_shutdown").await {
                Ok(_) => {}
                Err(err) if err.is_benign_race() => {}
                Err(err) => {
                    tracing::error!(%pin, error = %err, "Failed to archive room during shutdown");
                }
            }
            self.sink
                .broadcast_to_room(
                    &pin,
                    Arc::new(ServerEvent::RoomClosed {
                        reason: "server_shutdown".to_string(),
                    }),
                )
                .await;
            self.registry.remove(&pin).await;
            self.sink.remove_room_channel(&pin).await;
        }

        tracing::info!("Shutdown complete");
    }
}
