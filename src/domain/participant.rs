use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::values::{Nickname, Score};
use crate::protocol::{ConnectionId, PlayerId};

/// Mint a reconnect credential: 32 random bytes, URL-safe base64.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn within(age_since: DateTime<Utc>, window: Duration) -> bool {
    let limit = ChronoDuration::from_std(window).unwrap_or(ChronoDuration::MAX);
    Utc::now().signed_duration_since(age_since) <= limit
}

/// A player's submission for the current question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerAttempt {
    pub answer_index: usize,
    pub elapsed_ms: u64,
    pub submitted_at: DateTime<Utc>,
}

/// A scoring participant. Mutated only through the room aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub connection_id: ConnectionId,
    pub nickname: Nickname,
    pub token: String,
    pub token_created_at: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub score: Score,
    pub streak: u32,
    pub correct_answers: u32,
    pub longest_streak: u32,
    pub answer_attempt: Option<AnswerAttempt>,
}

impl Player {
    pub fn new(connection_id: ConnectionId, nickname: Nickname) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            connection_id,
            nickname,
            token: generate_token(),
            token_created_at: now,
            joined_at: now,
            disconnected_at: None,
            score: Score::ZERO,
            streak: 0,
            correct_answers: 0,
            longest_streak: 0,
            answer_attempt: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.disconnected_at.is_none()
    }

    /// Tokens expire after the configured TTL regardless of grace periods.
    pub fn token_valid(&self, ttl: Duration) -> bool {
        within(self.token_created_at, ttl)
    }

    /// True while the disconnect is still inside the grace window.
    /// A connected player is trivially within grace.
    pub fn within_grace(&self, grace: Duration) -> bool {
        match self.disconnected_at {
            None => true,
            Some(at) => within(at, grace),
        }
    }

    /// Replace the transport handle and credential after a reconnect.
    /// Rotation is mandatory: the old token must never authenticate again.
    pub fn restore_connection(&mut self, connection_id: ConnectionId, new_token: String) {
        self.connection_id = connection_id;
        self.token = new_token;
        self.token_created_at = Utc::now();
        self.disconnected_at = None;
    }
}

/// A non-scoring observer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spectator {
    pub id: PlayerId,
    pub connection_id: ConnectionId,
    pub nickname: Nickname,
    pub token: String,
    pub token_created_at: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
    pub disconnected_at: Option<DateTime<Utc>>,
}

impl Spectator {
    pub fn new(connection_id: ConnectionId, nickname: Nickname) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            connection_id,
            nickname,
            token: generate_token(),
            token_created_at: now,
            joined_at: now,
            disconnected_at: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.disconnected_at.is_none()
    }

    pub fn token_valid(&self, ttl: Duration) -> bool {
        within(self.token_created_at, ttl)
    }

    pub fn within_grace(&self, grace: Duration) -> bool {
        match self.disconnected_at {
            None => true,
            Some(at) => within(at, grace),
        }
    }

    pub fn restore_connection(&mut self, connection_id: ConnectionId, new_token: String) {
        self.connection_id = connection_id;
        self.token = new_token;
        self.token_created_at = Utc::now();
        self.disconnected_at = None;
    }
}
