use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};

/// Number of decimal digits in a room PIN.
pub const PIN_LENGTH: usize = 6;

/// A 6-decimal-digit room identifier, zero-padded on the wire.
///
/// Process-wide uniqueness across live rooms is enforced by the registry,
/// not here; the value object only guarantees shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pin(String);

impl Pin {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        if raw.len() != PIN_LENGTH || !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(CoreError::validation(format!(
                "PIN must be exactly {PIN_LENGTH} decimal digits"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Random PIN; the caller retries on registry collision.
    pub fn generate() -> Self {
        let value = fastrand::u32(0..1_000_000);
        Self(format!("{value:06}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display name of a participant.
///
/// Trimmed, 2-15 chars from `[A-Za-z0-9_-]`. Display casing is preserved;
/// uniqueness and ban checks use the lowercase form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nickname(String);

pub const NICKNAME_MIN_LENGTH: usize = 2;
pub const NICKNAME_MAX_LENGTH: usize = 15;

impl Nickname {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let trimmed = raw.trim();
        if trimmed.len() < NICKNAME_MIN_LENGTH {
            return Err(CoreError::validation(format!(
                "Nickname must be at least {NICKNAME_MIN_LENGTH} characters"
            )));
        }
        if trimmed.len() > NICKNAME_MAX_LENGTH {
            return Err(CoreError::validation(format!(
                "Nickname must be at most {NICKNAME_MAX_LENGTH} characters"
            )));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(CoreError::validation(
                "Nickname may only contain letters, digits, '_' and '-'",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase form used for uniqueness and ban checks.
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }

    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-negative score with clamped arithmetic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Score(u32);

impl Score {
    pub const ZERO: Self = Self(0);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn add(self, points: u32) -> Self {
        Self(self.0.saturating_add(points))
    }

    /// Subtraction clamps at zero rather than underflowing.
    #[must_use]
    pub fn deduct(self, points: u32) -> Self {
        Self(self.0.saturating_sub(points))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
