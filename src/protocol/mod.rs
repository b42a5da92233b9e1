//! WebSocket message protocol: event enums, shared payload types, error
//! codes, and boundary validation.

pub mod error_codes;
pub mod messages;
pub mod types;
pub mod validation;

pub use error_codes::ErrorCode;
pub use messages::{ClientEvent, ServerEvent};
pub use types::{
    AnswerStats, ConnectionId, LeaderboardEntry, PlayerId, PlayerPublicInfo, QuestionView,
    QuizId, ReconnectSync, SpectatorPublicInfo, TimerSyncPayload, UserId,
};
