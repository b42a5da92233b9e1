//! Configuration sanity checks run at startup.

use super::types::Config;

/// Validate the loaded configuration. Errors are collected so the operator
/// sees everything wrong at once instead of fixing one field per restart.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut problems = Vec::new();

    if config.server.player_grace_ms == 0 {
        problems.push("server.player_grace_ms must be greater than zero".to_string());
    }
    if config.server.host_grace_ms == 0 {
        problems.push("server.host_grace_ms must be greater than zero".to_string());
    }
    if config.server.cleanup_interval_ms == 0 {
        problems.push("server.cleanup_interval_ms must be greater than zero".to_string());
    }
    if config.server.lock_timeout_ms == 0 {
        problems.push("server.lock_timeout_ms must be greater than zero".to_string());
    }
    if config.server.max_players == 0 {
        problems.push("server.max_players must be at least 1".to_string());
    }
    if config.server.max_questions == 0 {
        problems.push("server.max_questions must be at least 1".to_string());
    }
    if config.protocol.nickname_min_length < 1
        || config.protocol.nickname_min_length > config.protocol.nickname_max_length
    {
        problems.push(
            "protocol nickname length bounds must satisfy 1 <= min <= max".to_string(),
        );
    }
    if config.protocol.pin_length == 0 || config.protocol.pin_length > 9 {
        problems.push("protocol.pin_length must be between 1 and 9".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("\n"))
    }
}
