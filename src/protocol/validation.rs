//! Input validation at the dispatcher boundary.

use crate::config::ProtocolConfig;

/// Trim and validate a nickname against the configured bounds.
///
/// Returns the sanitised display form; uniqueness and ban checks happen in
/// the room aggregate against the lowercase form.
pub fn sanitize_nickname(raw: &str, config: &ProtocolConfig) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.len() < config.nickname_min_length {
        return Err(format!(
            "Nickname must be at least {} characters",
            config.nickname_min_length
        ));
    }
    if trimmed.len() > config.nickname_max_length {
        return Err(format!(
            "Nickname must be at most {} characters",
            config.nickname_max_length
        ));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err("Nickname may only contain letters, digits, '_' and '-'".to_string());
    }
    Ok(trimmed.to_string())
}

/// Validate the wire format of a PIN: exactly `pin_length` decimal digits.
pub fn validate_pin_format(pin: &str, config: &ProtocolConfig) -> Result<(), String> {
    if pin.len() != config.pin_length {
        return Err(format!(
            "PIN must be exactly {} digits",
            config.pin_length
        ));
    }
    if !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err("PIN must be numeric".to_string());
    }
    Ok(())
}

/// Shape-validate an answer submission before any state is touched.
///
/// `elapsed_ms` is still replaced by the timer service's measurement; the
/// check here only rejects nonsense payloads early.
pub fn validate_answer_shape(answer_index: i64, elapsed_ms: f64) -> Result<usize, String> {
    if answer_index < 0 {
        return Err("answer_index must be a non-negative integer".to_string());
    }
    if !elapsed_ms.is_finite() || elapsed_ms < 0.0 {
        return Err("elapsed_ms must be a finite non-negative number".to_string());
    }
    Ok(answer_index as usize)
}
