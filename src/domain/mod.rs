//! Domain model for the game-session core.
//!
//! - [`values`]: validated primitive wrappers (PIN, nickname, score)
//! - [`question`]: question/quiz snapshots and the definitive scoring rule
//! - [`participant`]: players, spectators, and reconnect credentials
//! - [`room`]: the room aggregate and its state machine
//! - [`session`]: answer records and the game-session archive shape

pub mod participant;
pub mod question;
pub mod room;
pub mod session;
pub mod values;

pub use participant::{generate_token, AnswerAttempt, Player, Spectator};
pub use question::{Question, QuestionKind, Quiz, QuizSnapshot};
pub use room::{NextQuestion, Room, RoomState};
pub use session::{AnswerRecord, ArchivedAnswer, GameSession, GameStatus, PlayerResult};
pub use values::{Nickname, Pin, Score};
