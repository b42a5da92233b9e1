use thiserror::Error;

use crate::protocol::ErrorCode;

/// Error taxonomy for the game-session core.
///
/// Every use-case failure maps to exactly one of these kinds. Expected
/// domain failures (validation, conflicts, missing rooms) surface to the
/// originating connection as an `error` event and are not logged as severe;
/// `Internal` is the only variant that reaches the error log with a stack.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Bad shape, out-of-range input, or an illegal state transition.
    #[error("{0}")]
    Validation(String),

    /// Missing, expired, or mismatched token.
    #[error("{0}")]
    Unauthorized(String),

    /// The caller is known but not allowed: non-host invoking a host-only
    /// operation, disconnected player submitting, grace period expired.
    #[error("{0}")]
    Forbidden(String),

    /// Unknown pin, quiz, player, or question index.
    #[error("{0}")]
    NotFound(String),

    /// Lock held, duplicate answer, nickname taken, or state mismatch.
    /// The caller may retry.
    #[error("{0}")]
    Conflict(String),

    /// Rate limiter refused the event.
    #[error("Rate limit exceeded. Try again in {retry_after_secs} seconds.")]
    RateLimited { retry_after_secs: u64 },

    /// Unexpected repository or invariant failure.
    #[error("{0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Wire-level error code for this kind.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::InvalidInput,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Seconds the caller should wait before retrying, if rate limited.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Expected errors produced when a server-driven task (timer expiry,
    /// cleanup archival) races an inbound event. These are swallowed by the
    /// caller rather than logged.
    pub fn is_benign_race(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::NotFound(_))
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
