//! Server behavior configuration types.

use super::defaults::{
    default_cleanup_interval_ms, default_empty_room_timeout_ms, default_host_grace_ms,
    default_idle_room_timeout_ms, default_lock_timeout_ms, default_max_players,
    default_max_questions, default_max_spectators, default_pin_generation_attempts,
    default_player_grace_ms, default_rate_limit_sweep_interval_secs,
    default_shutdown_deadline_ms, default_token_ttl_ms,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Room lifecycle and concurrency configuration.
///
/// Every field can be overridden from the environment by the loader
/// (`HOST_GRACE_MS`, `PLAYER_GRACE_MS`, and friends).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// How long a disconnected host may return before the room is torn down (ms)
    #[serde(default = "default_host_grace_ms")]
    pub host_grace_ms: u64,
    /// How long a disconnected player may reconnect before removal (ms)
    #[serde(default = "default_player_grace_ms")]
    pub player_grace_ms: u64,
    /// Age at which an empty, non-playing room is deleted (ms)
    #[serde(default = "default_empty_room_timeout_ms")]
    pub empty_room_timeout_ms: u64,
    /// Age at which any room is deleted; doubled for rooms in an active game (ms)
    #[serde(default = "default_idle_room_timeout_ms")]
    pub idle_room_timeout_ms: u64,
    /// Interval between cleanup sweeps (ms)
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
    /// TTL for the pending-answer / pending-archive / join locks (ms)
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Lifetime of reconnect tokens (ms)
    #[serde(default = "default_token_ttl_ms")]
    pub token_ttl_ms: u64,
    /// Maximum players per room
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// Maximum spectators per room
    #[serde(default = "default_max_spectators")]
    pub max_spectators: usize,
    /// Maximum questions per quiz snapshot
    #[serde(default = "default_max_questions")]
    pub max_questions: usize,
    /// Retries when a generated PIN collides with a live room
    #[serde(default = "default_pin_generation_attempts")]
    pub pin_generation_attempts: u32,
    /// Hard deadline for graceful shutdown (ms)
    #[serde(default = "default_shutdown_deadline_ms")]
    pub shutdown_deadline_ms: u64,
}

impl ServerConfig {
    pub fn host_grace(&self) -> Duration {
        Duration::from_millis(self.host_grace_ms)
    }

    pub fn player_grace(&self) -> Duration {
        Duration::from_millis(self.player_grace_ms)
    }

    pub fn empty_room_timeout(&self) -> Duration {
        Duration::from_millis(self.empty_room_timeout_ms)
    }

    pub fn idle_room_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_room_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_millis(self.token_ttl_ms)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_millis(self.shutdown_deadline_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host_grace_ms: default_host_grace_ms(),
            player_grace_ms: default_player_grace_ms(),
            empty_room_timeout_ms: default_empty_room_timeout_ms(),
            idle_room_timeout_ms: default_idle_room_timeout_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            token_ttl_ms: default_token_ttl_ms(),
            max_players: default_max_players(),
            max_spectators: default_max_spectators(),
            max_questions: default_max_questions(),
            pin_generation_attempts: default_pin_generation_attempts(),
            shutdown_deadline_ms: default_shutdown_deadline_ms(),
        }
    }
}

/// One fixed-window rate policy: at most `max_requests` events per `window_secs`.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RatePolicy {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_submit_answer_policy() -> RatePolicy {
    RatePolicy::new(5, 10)
}

fn default_join_room_policy() -> RatePolicy {
    RatePolicy::new(5, 60)
}

fn default_create_room_policy() -> RatePolicy {
    RatePolicy::new(3, 60)
}

fn default_reconnect_policy() -> RatePolicy {
    RatePolicy::new(5, 60)
}

fn default_start_game_policy() -> RatePolicy {
    RatePolicy::new(3, 60)
}

fn default_game_flow_policy() -> RatePolicy {
    RatePolicy::new(10, 60)
}

fn default_default_policy() -> RatePolicy {
    RatePolicy::new(30, 60)
}

/// Per-event rate limiting configuration.
///
/// Unlisted events fall back to `default` (30/60 s).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_submit_answer_policy")]
    pub submit_answer: RatePolicy,
    #[serde(default = "default_join_room_policy")]
    pub join_room: RatePolicy,
    #[serde(default = "default_create_room_policy")]
    pub create_room: RatePolicy,
    #[serde(default = "default_reconnect_policy")]
    pub reconnect: RatePolicy,
    #[serde(default = "default_start_game_policy")]
    pub start_game: RatePolicy,
    /// start_answering / end_answering / show_leaderboard / next_question
    #[serde(default = "default_game_flow_policy")]
    pub game_flow: RatePolicy,
    #[serde(default = "default_default_policy")]
    pub default: RatePolicy,
    /// Interval between sweeps purging expired windows (seconds)
    #[serde(default = "default_rate_limit_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            submit_answer: default_submit_answer_policy(),
            join_room: default_join_room_policy(),
            create_room: default_create_room_policy(),
            reconnect: default_reconnect_policy(),
            start_game: default_start_game_policy(),
            game_flow: default_game_flow_policy(),
            default: default_default_policy(),
            sweep_interval_secs: default_rate_limit_sweep_interval_secs(),
        }
    }
}
