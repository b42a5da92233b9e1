use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for structured error handling on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing, expired, or mismatched token
    Unauthorized,
    /// Caller is known but not allowed to perform the operation
    Forbidden,
    /// Unknown pin, quiz, player, or question
    NotFound,
    /// Bad shape, out-of-range input, or illegal state transition
    InvalidInput,
    /// Lock held, duplicate answer, nickname taken, state mismatch
    Conflict,
    /// Rate limiter refused the event
    RateLimitExceeded,
    /// Unexpected server-side failure
    InternalError,
}

impl ErrorCode {
    /// Human-readable description, suitable for client display.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unauthorized => {
                "Authentication credentials are missing, invalid, or expired."
            }
            Self::Forbidden => "You are not allowed to perform this action.",
            Self::NotFound => {
                "The requested room, quiz, or participant could not be found."
            }
            Self::InvalidInput => {
                "The provided input is invalid or the operation is not allowed in the current state."
            }
            Self::Conflict => {
                "The operation conflicts with the current state. It may be safe to retry."
            }
            Self::RateLimitExceeded => {
                "Too many requests in a short time. Please slow down and try again later."
            }
            Self::InternalError => {
                "An unexpected error occurred. Please try again or contact support."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
