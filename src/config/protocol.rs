//! Protocol settings shared between validation and the dispatcher.

use super::defaults::{
    default_nickname_max_length, default_nickname_min_length, default_pin_length,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProtocolConfig {
    /// Minimum nickname length after trimming
    #[serde(default = "default_nickname_min_length")]
    pub nickname_min_length: usize,
    /// Maximum nickname length after trimming
    #[serde(default = "default_nickname_max_length")]
    pub nickname_max_length: usize,
    /// Number of decimal digits in a room PIN
    #[serde(default = "default_pin_length")]
    pub pin_length: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            nickname_min_length: default_nickname_min_length(),
            nickname_max_length: default_nickname_max_length(),
            pin_length: default_pin_length(),
        }
    }
}
