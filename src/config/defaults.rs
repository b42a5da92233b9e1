//! Default value functions for configuration fields.
//!
//! All `#[serde(default = ...)]` attributes in the configuration structs
//! point at functions in this module so defaults live in one place.

use super::logging::LogFormat;

// =============================================================================
// Port & Root Config
// =============================================================================

pub const fn default_port() -> u16 {
    3560
}

// =============================================================================
// Server Defaults
// =============================================================================

pub const fn default_host_grace_ms() -> u64 {
    60_000
}

pub const fn default_player_grace_ms() -> u64 {
    120_000
}

pub const fn default_empty_room_timeout_ms() -> u64 {
    300_000
}

pub const fn default_idle_room_timeout_ms() -> u64 {
    3_600_000
}

pub const fn default_cleanup_interval_ms() -> u64 {
    30_000
}

pub const fn default_lock_timeout_ms() -> u64 {
    10_000
}

pub const fn default_token_ttl_ms() -> u64 {
    86_400_000
}

pub const fn default_max_players() -> usize {
    50
}

pub const fn default_max_spectators() -> usize {
    10
}

pub const fn default_max_questions() -> usize {
    50
}

pub const fn default_pin_generation_attempts() -> u32 {
    50
}

pub const fn default_shutdown_deadline_ms() -> u64 {
    30_000
}

// =============================================================================
// Rate Limit Defaults
// =============================================================================

pub const fn default_rate_limit_sweep_interval_secs() -> u64 {
    300
}

// =============================================================================
// Protocol Defaults
// =============================================================================

pub const fn default_nickname_min_length() -> usize {
    2
}

pub const fn default_nickname_max_length() -> usize {
    15
}

pub const fn default_pin_length() -> usize {
    6
}

// =============================================================================
// Logging Defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "server.log".to_string()
}

pub fn default_log_rotation() -> String {
    "daily".to_string()
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Text
}

pub const fn default_enable_file_logging() -> bool {
    false
}
