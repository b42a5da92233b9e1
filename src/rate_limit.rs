use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use crate::config::{RateLimitConfig, RatePolicy};
use crate::error::{CoreError, CoreResult};
use crate::protocol::ConnectionId;

/// Fixed-window counter state for one `(connection, event)` pair.
#[derive(Debug, Clone)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
}

impl WindowEntry {
    fn new() -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
        }
    }

    fn try_consume(&mut self, policy: RatePolicy) -> Result<(), Duration> {
        if self.window_start.elapsed() >= policy.window() {
            self.count = 0;
            self.window_start = Instant::now();
        }
        if self.count < policy.max_requests {
            self.count += 1;
            Ok(())
        } else {
            Err(policy.window().saturating_sub(self.window_start.elapsed()))
        }
    }
}

/// Per-connection, per-event rate limiter.
///
/// Each event kind carries its own `{max_requests, window}` policy;
/// unlisted kinds use the default. Refusals carry a `retry_after` hint and
/// are silent on the server side.
pub struct EventRateLimiter {
    config: RateLimitConfig,
    entries: RwLock<HashMap<(ConnectionId, &'static str), WindowEntry>>,
}

impl EventRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn policy_for(&self, event: &str) -> RatePolicy {
        match event {
            "submit_answer" => self.config.submit_answer,
            "join_room" | "join_as_spectator" => self.config.join_room,
            "create_room" => self.config.create_room,
            "reconnect_host" | "reconnect_player" | "reconnect_spectator" => {
                self.config.reconnect
            }
            "start_game" => self.config.start_game,
            "start_answering" | "end_answering" | "show_leaderboard" | "next_question" => {
                self.config.game_flow
            }
            _ => self.config.default,
        }
    }

    /// Check and consume one slot for this connection/event.
    pub async fn check(
        &self,
        connection_id: ConnectionId,
        event: &'static str,
    ) -> CoreResult<()> {
        let policy = self.policy_for(event);
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry((connection_id, event))
            .or_insert_with(WindowEntry::new);

        entry.try_consume(policy).map_err(|remaining| {
            CoreError::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            }
        })
    }

    /// Drop all state for a closed connection.
    pub async fn forget_connection(&self, connection_id: ConnectionId) {
        self.entries
            .write()
            .await
            .retain(|(conn, _), _| *conn != connection_id);
    }

    /// Purge windows that have long since expired.
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(_, event), entry| {
            let window = self.policy_for(event).window();
            entry.window_start.elapsed() < window * 2
        });
        before - entries.len()
    }

    /// Background sweep purging expired windows.
    pub fn start_sweep_task(self: Arc<Self>) {
        let limiter = Arc::clone(&self);
        let interval = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let removed = limiter.cleanup_expired().await;
                if removed > 0 {
                    tracing::debug!(removed, "Purged expired rate-limit windows");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn tight_config() -> RateLimitConfig {
        RateLimitConfig {
            submit_answer: RatePolicy::new(2, 1),
            join_room: RatePolicy::new(1, 1),
            create_room: RatePolicy::new(1, 1),
            reconnect: RatePolicy::new(1, 1),
            start_game: RatePolicy::new(1, 1),
            game_flow: RatePolicy::new(2, 1),
            default: RatePolicy::new(3, 1),
            sweep_interval_secs: 300,
        }
    }

    #[tokio::test]
    async fn refuses_over_limit_with_retry_after() {
        let limiter = EventRateLimiter::new(tight_config());
        let conn = Uuid::new_v4();

        assert!(limiter.check(conn, "submit_answer").await.is_ok());
        assert!(limiter.check(conn, "submit_answer").await.is_ok());
        let err = limiter.check(conn, "submit_answer").await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::RateLimited { retry_after_secs } if retry_after_secs >= 1
        ));
    }

    #[tokio::test]
    async fn limits_are_per_event_kind() {
        let limiter = EventRateLimiter::new(tight_config());
        let conn = Uuid::new_v4();

        assert!(limiter.check(conn, "join_room").await.is_ok());
        assert!(limiter.check(conn, "join_room").await.is_err());
        // A different event kind still has budget
        assert!(limiter.check(conn, "leave_room").await.is_ok());
    }

    #[tokio::test]
    async fn limits_are_per_connection() {
        let limiter = EventRateLimiter::new(tight_config());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(limiter.check(a, "create_room").await.is_ok());
        assert!(limiter.check(a, "create_room").await.is_err());
        assert!(limiter.check(b, "create_room").await.is_ok());
    }

    #[tokio::test]
    async fn window_resets_after_elapse() {
        let limiter = EventRateLimiter::new(tight_config());
        let conn = Uuid::new_v4();

        assert!(limiter.check(conn, "start_game").await.is_ok());
        assert!(limiter.check(conn, "start_game").await.is_err());
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.check(conn, "start_game").await.is_ok());
    }

    #[tokio::test]
    async fn disconnect_drops_entries() {
        let limiter = EventRateLimiter::new(tight_config());
        let conn = Uuid::new_v4();

        assert!(limiter.check(conn, "join_room").await.is_ok());
        assert!(limiter.check(conn, "join_room").await.is_err());

        limiter.forget_connection(conn).await;
        assert!(limiter.check(conn, "join_room").await.is_ok());
    }

    #[tokio::test]
    async fn cleanup_purges_stale_windows() {
        let limiter = EventRateLimiter::new(tight_config());
        let conn = Uuid::new_v4();
        limiter.check(conn, "join_room").await.unwrap();

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(limiter.cleanup_expired().await, 1);
    }

    #[tokio::test]
    async fn unknown_events_use_default_policy() {
        let limiter = EventRateLimiter::new(tight_config());
        let conn = Uuid::new_v4();
        for _ in 0..3 {
            assert!(limiter.check(conn, "get_players").await.is_ok());
        }
        assert!(limiter.check(conn, "get_players").await.is_err());
    }
}
