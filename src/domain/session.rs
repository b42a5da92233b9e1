use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::room::{Room, RoomState};
use crate::protocol::{PlayerId, QuizId, UserId};

/// One submitted answer, appended to the room's history. Immutable once
/// appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRecord {
    pub player_id: PlayerId,
    pub nickname: String,
    pub question_index: usize,
    pub answer_index: usize,
    pub correct: bool,
    /// Time-scaled score, excluding any streak bonus
    pub base_score: u32,
    pub streak_bonus: u32,
    pub response_time_ms: u64,
    pub submitted_at: DateTime<Utc>,
}

/// Terminal status of an archived game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Completed,
    Interrupted,
}

/// Per-player summary row in the archive. `rank` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerResult {
    pub rank: usize,
    pub player_id: PlayerId,
    pub nickname: String,
    pub score: u32,
    pub correct_answers: u32,
    pub wrong_answers: u32,
    pub average_response_time_ms: u64,
    pub longest_streak: u32,
}

/// Answer row in the archive shape. `score` is the base score only; streak
/// bonuses are reflected in `PlayerResult.score`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchivedAnswer {
    pub player_id: PlayerId,
    pub nickname: String,
    pub question_index: usize,
    pub answer_index: usize,
    pub correct: bool,
    pub score: u32,
    pub response_time_ms: u64,
    pub submitted_at: DateTime<Utc>,
}

/// Immutable archive of a finished (or interrupted) game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub id: Uuid,
    pub pin: String,
    pub quiz_id: QuizId,
    pub host_user_id: UserId,
    pub player_count: usize,
    pub player_results: Vec<PlayerResult>,
    pub answers: Vec<ArchivedAnswer>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interruption_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_question_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_state: Option<RoomState>,
}

impl GameSession {
    /// Build the archive record for a room. Completed games carry no
    /// interruption fields; interrupted games record where they stopped.
    pub fn assemble(room: &Room, status: GameStatus, interruption_reason: Option<String>) -> Self {
        let ended_at = Utc::now();
        let started_at = room.game_started_at.unwrap_or(room.created_at);

        let player_results = build_player_results(room);
        let answers = room
            .answer_history
            .iter()
            .map(|record| ArchivedAnswer {
                player_id: record.player_id,
                nickname: record.nickname.clone(),
                question_index: record.question_index,
                answer_index: record.answer_index,
                correct: record.correct,
                score: record.base_score,
                response_time_ms: record.response_time_ms,
                submitted_at: record.submitted_at,
            })
            .collect();

        let (last_question_index, last_state) = match status {
            GameStatus::Completed => (None, None),
            GameStatus::Interrupted => {
                (Some(room.current_question_index), Some(room.state))
            }
        };

        Self {
            id: Uuid::new_v4(),
            pin: room.pin.as_str().to_string(),
            quiz_id: room.quiz_id,
            host_user_id: room.host_user_id,
            player_count: room.players.len(),
            player_results,
            answers,
            started_at,
            ended_at,
            status,
            interruption_reason,
            last_question_index,
            last_state,
        }
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.ended_at - self.started_at).num_seconds()
    }
}

fn build_player_results(room: &Room) -> Vec<PlayerResult> {
    room.leaderboard()
        .into_iter()
        .map(|entry| {
            let records: Vec<_> = room
                .answer_history
                .iter()
                .filter(|record| record.player_id == entry.player_id)
                .collect();
            let submitted = records.len() as u32;
            let correct = records.iter().filter(|record| record.correct).count() as u32;
            let average_response_time_ms = if records.is_empty() {
                0
            } else {
                let total: u64 = records.iter().map(|record| record.response_time_ms).sum();
                total / records.len() as u64
            };
            let longest_streak = room
                .players
                .iter()
                .find(|player| player.id == entry.player_id)
                .map_or(0, |player| player.longest_streak);

            PlayerResult {
                rank: entry.rank,
                player_id: entry.player_id,
                nickname: entry.nickname,
                score: entry.score,
                correct_answers: correct,
                wrong_answers: submitted - correct,
                average_response_time_ms,
                longest_streak,
            }
        })
        .collect()
}
