use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::question::QuestionKind;
use crate::domain::room::RoomState;

/// Ephemeral per-transport handle for a connection
pub type ConnectionId = Uuid;
/// Stable identifier for a player within a room
pub type PlayerId = Uuid;
/// Verified user identity supplied by the auth collaborator
pub type UserId = Uuid;
/// Identifier of a quiz in the quiz store
pub type QuizId = Uuid;

/// A question as shown to clients.
///
/// `correct_answer_index` is present only in the host-facing variant; the
/// broadcast to players omits it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionView {
    pub index: usize,
    pub text: String,
    pub kind: QuestionKind,
    pub options: Vec<String>,
    pub time_limit_secs: u32,
    pub points: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer_index: Option<usize>,
}

/// One row of the leaderboard (also used for the podium).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    /// 1-based
    pub rank: usize,
    pub player_id: PlayerId,
    pub nickname: String,
    pub score: u32,
    pub streak: u32,
}

/// Public view of a player for joins and roster queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerPublicInfo {
    pub id: PlayerId,
    pub nickname: String,
    pub score: u32,
    pub connected: bool,
}

/// Public view of a spectator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpectatorPublicInfo {
    pub id: PlayerId,
    pub nickname: String,
}

/// Snapshot of the server-side countdown, used by late joiners and
/// reconnectors to align their UI with the authoritative timer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimerSyncPayload {
    pub active: bool,
    /// Server wall-clock in epoch milliseconds at the time of the sync
    pub server_time: i64,
    /// Epoch milliseconds when the countdown started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    /// Epoch milliseconds when the countdown ends
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    /// Whole seconds remaining
    pub remaining: u64,
    pub remaining_ms: u64,
    /// Configured total duration in seconds
    pub duration: u64,
}

/// Per-round answer statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerStats {
    /// Count of submissions per option index
    pub distribution: Vec<u32>,
    /// Submissions matching the correct option
    pub correct_count: u32,
    /// Submissions with an out-of-range option index
    pub skipped_count: u32,
}

/// Sync payload handed to a reconnecting participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSync {
    pub pin: String,
    pub state: RoomState,
    pub current_question_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}
