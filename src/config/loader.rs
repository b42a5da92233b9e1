//! Configuration loading: `config.json` when present, code defaults
//! otherwise, environment variables last.

use super::types::Config;
use std::path::Path;

const CONFIG_FILE: &str = "config.json";

/// Load configuration. Never fails: malformed files are logged to stderr
/// and replaced with defaults so the server can still boot.
pub fn load() -> Config {
    let mut config = load_file(Path::new(CONFIG_FILE)).unwrap_or_default();
    apply_env_overrides(&mut config);
    config
}

fn load_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(err) => {
                eprintln!("Ignoring malformed {}: {err}", path.display());
                None
            }
        },
        Err(err) => {
            eprintln!("Failed to read {}: {err}", path.display());
            None
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            eprintln!("Ignoring non-numeric {name}={raw}");
            None
        }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env_u64(name).map(|value| value as usize)
}

/// Overlay the documented environment variables onto the loaded config.
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(raw) = std::env::var("PORT") {
        match raw.trim().parse::<u16>() {
            Ok(port) => config.port = port,
            Err(_) => eprintln!("Ignoring non-numeric PORT={raw}"),
        }
    }

    let server = &mut config.server;
    if let Some(value) = env_u64("HOST_GRACE_MS") {
        server.host_grace_ms = value;
    }
    if let Some(value) = env_u64("PLAYER_GRACE_MS") {
        server.player_grace_ms = value;
    }
    if let Some(value) = env_u64("EMPTY_ROOM_TIMEOUT_MS") {
        server.empty_room_timeout_ms = value;
    }
    if let Some(value) = env_u64("IDLE_ROOM_TIMEOUT_MS") {
        server.idle_room_timeout_ms = value;
    }
    if let Some(value) = env_u64("CLEANUP_INTERVAL_MS") {
        server.cleanup_interval_ms = value;
    }
    if let Some(value) = env_u64("LOCK_TIMEOUT_MS") {
        server.lock_timeout_ms = value;
    }
    if let Some(value) = env_u64("TOKEN_TTL_MS") {
        server.token_ttl_ms = value;
    }
    if let Some(value) = env_usize("MAX_PLAYERS") {
        server.max_players = value;
    }
    if let Some(value) = env_usize("MAX_SPECTATORS") {
        server.max_spectators = value;
    }
    if let Some(value) = env_usize("MAX_QUESTIONS") {
        server.max_questions = value;
    }
}
