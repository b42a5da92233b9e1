use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::participant::{AnswerAttempt, Player, Spectator};
use super::question::{base_score, streak_bonus, Question, QuizSnapshot, MAX_STREAK};
use super::session::AnswerRecord;
use super::values::{Nickname, Pin};
use crate::error::{CoreError, CoreResult};
use crate::protocol::{
    AnswerStats, ConnectionId, LeaderboardEntry, PlayerId, QuizId, UserId,
};

// ============================================================================
// ROOM LIFECYCLE
// ============================================================================
//
// ```text
// [*] --> WaitingPlayers: Room Created
//
// WaitingPlayers --> QuestionIntro:  host starts the game
// QuestionIntro  --> AnsweringPhase: host opens answering
// AnsweringPhase --> ShowResults:    timer expiry, all answered, or host
// ShowResults    --> Leaderboard:    host reveals standings
// Leaderboard    --> QuestionIntro:  more questions remain
// Leaderboard    --> AnsweringPhase: host reopens answering directly
// Leaderboard    --> Podium:         last question done (terminal)
// Leaderboard    --> Paused:         host pauses
// Paused         --> Leaderboard:    resume restores the prior state
// ```
//
// Players join only in WaitingPlayers; spectators may attach at any time.
// The quiz snapshot is set exactly once, when the game starts.
// ============================================================================

/// Game-flow state of a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomState {
    WaitingPlayers,
    QuestionIntro,
    AnsweringPhase,
    ShowResults,
    Leaderboard,
    Paused,
    Podium,
}

impl RoomState {
    /// The transition table. Everything not listed is illegal.
    pub fn can_transition_to(self, next: RoomState) -> bool {
        use RoomState::{
            AnsweringPhase, Leaderboard, Paused, Podium, QuestionIntro, ShowResults,
            WaitingPlayers,
        };
        matches!(
            (self, next),
            (WaitingPlayers, QuestionIntro)
                | (QuestionIntro, AnsweringPhase)
                | (AnsweringPhase, ShowResults)
                | (ShowResults, Leaderboard)
                | (Leaderboard, QuestionIntro)
                | (Leaderboard, AnsweringPhase)
                | (Leaderboard, Podium)
                | (Leaderboard, Paused)
                | (Paused, Leaderboard)
        )
    }

    /// States in which a game is in flight (used by the cleanup sweep to
    /// double idle timeouts and to pick interruption reasons).
    pub fn is_active_game(self) -> bool {
        !matches!(self, Self::WaitingPlayers | Self::Podium)
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WaitingPlayers => "WAITING_PLAYERS",
            Self::QuestionIntro => "QUESTION_INTRO",
            Self::AnsweringPhase => "ANSWERING_PHASE",
            Self::ShowResults => "SHOW_RESULTS",
            Self::Leaderboard => "LEADERBOARD",
            Self::Paused => "PAUSED",
            Self::Podium => "PODIUM",
        };
        f.write_str(name)
    }
}

/// Outcome of advancing past the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextQuestion {
    /// Index advanced, room is back in QuestionIntro
    HasMore,
    /// Last question was already shown; room is at the podium
    Finished,
}

/// A live game session identified by a PIN. Aggregate root: all player and
/// spectator mutation goes through this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub pin: Pin,
    pub host_connection_id: ConnectionId,
    pub host_user_id: UserId,
    pub host_token: String,
    pub host_token_created_at: DateTime<Utc>,
    pub quiz_id: QuizId,
    pub quiz_snapshot: Option<QuizSnapshot>,
    pub game_started_at: Option<DateTime<Utc>>,
    pub state: RoomState,
    pub current_question_index: usize,
    pub paused_at: Option<DateTime<Utc>>,
    pub paused_from_state: Option<RoomState>,
    pub players: Vec<Player>,
    pub spectators: Vec<Spectator>,
    pub banned_nicknames: HashSet<String>,
    pub answer_history: Vec<AnswerRecord>,
    pub host_disconnected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    max_players: usize,
    max_spectators: usize,
}

impl Room {
    pub fn new(
        pin: Pin,
        host_connection_id: ConnectionId,
        host_user_id: UserId,
        host_token: String,
        quiz_id: QuizId,
        max_players: usize,
        max_spectators: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            pin,
            host_connection_id,
            host_user_id,
            host_token,
            host_token_created_at: now,
            quiz_id,
            quiz_snapshot: None,
            game_started_at: None,
            state: RoomState::WaitingPlayers,
            current_question_index: 0,
            paused_at: None,
            paused_from_state: None,
            players: Vec::new(),
            spectators: Vec::new(),
            banned_nicknames: HashSet::new(),
            answer_history: Vec::new(),
            host_disconnected_at: None,
            created_at: now,
            max_players,
            max_spectators,
        }
    }

    // ------------------------------------------------------------------
    // Host identity
    // ------------------------------------------------------------------

    pub fn is_host(&self, connection_id: ConnectionId) -> bool {
        self.host_connection_id == connection_id
    }

    fn require_host(&self, requester: ConnectionId) -> CoreResult<()> {
        if self.is_host(requester) {
            Ok(())
        } else {
            Err(CoreError::forbidden("Only the host may perform this action"))
        }
    }

    pub fn set_host_disconnected(&mut self) {
        if self.host_disconnected_at.is_none() {
            self.host_disconnected_at = Some(Utc::now());
        }
    }

    pub fn is_host_disconnected(&self) -> bool {
        self.host_disconnected_at.is_some()
    }

    /// Resume the host session: validate token and grace, then bind the new
    /// connection and rotate the credential.
    pub fn reconnect_host(
        &mut self,
        new_connection_id: ConnectionId,
        token: &str,
        grace: Duration,
        token_ttl: Duration,
        new_token: String,
    ) -> CoreResult<()> {
        if self.host_token != token {
            return Err(CoreError::unauthorized("Unknown host token"));
        }
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(token_ttl).unwrap_or(chrono::Duration::MAX);
        if now.signed_duration_since(self.host_token_created_at) > ttl {
            return Err(CoreError::unauthorized("Host token has expired"));
        }
        if let Some(disconnected_at) = self.host_disconnected_at {
            let grace =
                chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::MAX);
            if now.signed_duration_since(disconnected_at) > grace {
                return Err(CoreError::forbidden(
                    "Host reconnection grace period has expired",
                ));
            }
        }
        self.host_connection_id = new_connection_id;
        self.host_token = new_token;
        self.host_token_created_at = now;
        self.host_disconnected_at = None;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    fn nickname_taken(&self, nickname: &Nickname) -> bool {
        let normalized = nickname.normalized();
        self.players
            .iter()
            .any(|player| player.nickname.normalized() == normalized)
            || self
                .spectators
                .iter()
                .any(|spectator| spectator.nickname.normalized() == normalized)
    }

    pub fn add_player(&mut self, player: Player) -> CoreResult<()> {
        if self.state != RoomState::WaitingPlayers {
            return Err(CoreError::validation(
                "Players can only join before the game starts",
            ));
        }
        if self.players.len() >= self.max_players {
            return Err(CoreError::conflict("Room is full"));
        }
        if self.banned_nicknames.contains(&player.nickname.normalized()) {
            return Err(CoreError::validation("This nickname is banned"));
        }
        if self.nickname_taken(&player.nickname) {
            return Err(CoreError::conflict("Nickname is already taken"));
        }
        self.players.push(player);
        Ok(())
    }

    pub fn add_spectator(&mut self, spectator: Spectator) -> CoreResult<()> {
        if self.spectators.len() >= self.max_spectators {
            return Err(CoreError::conflict("Spectator slots are full"));
        }
        if self
            .banned_nicknames
            .contains(&spectator.nickname.normalized())
        {
            return Err(CoreError::validation("This nickname is banned"));
        }
        if self.nickname_taken(&spectator.nickname) {
            return Err(CoreError::conflict("Nickname is already taken"));
        }
        self.spectators.push(spectator);
        Ok(())
    }

    /// Idempotent: removing an unknown connection is a no-op.
    pub fn remove_player(&mut self, connection_id: ConnectionId) -> Option<Player> {
        let index = self
            .players
            .iter()
            .position(|player| player.connection_id == connection_id)?;
        Some(self.players.remove(index))
    }

    pub fn remove_player_by_id(&mut self, player_id: PlayerId) -> Option<Player> {
        let index = self
            .players
            .iter()
            .position(|player| player.id == player_id)?;
        Some(self.players.remove(index))
    }

    pub fn remove_spectator(&mut self, connection_id: ConnectionId) -> Option<Spectator> {
        let index = self
            .spectators
            .iter()
            .position(|spectator| spectator.connection_id == connection_id)?;
        Some(self.spectators.remove(index))
    }

    pub fn set_player_disconnected(&mut self, connection_id: ConnectionId) -> Option<&Player> {
        let player = self
            .players
            .iter_mut()
            .find(|player| player.connection_id == connection_id)?;
        if player.disconnected_at.is_none() {
            player.disconnected_at = Some(Utc::now());
        }
        Some(player)
    }

    pub fn set_spectator_disconnected(
        &mut self,
        connection_id: ConnectionId,
    ) -> Option<&Spectator> {
        let spectator = self
            .spectators
            .iter_mut()
            .find(|spectator| spectator.connection_id == connection_id)?;
        if spectator.disconnected_at.is_none() {
            spectator.disconnected_at = Some(Utc::now());
        }
        Some(spectator)
    }

    /// Resume a player session by reconnect token. On success the token is
    /// rotated and the old one never authenticates again.
    pub fn reconnect_player(
        &mut self,
        old_token: &str,
        new_connection_id: ConnectionId,
        grace: Duration,
        token_ttl: Duration,
        new_token: String,
    ) -> CoreResult<Player> {
        let player = self
            .players
            .iter_mut()
            .find(|player| player.token == old_token)
            .ok_or_else(|| CoreError::unauthorized("Unknown reconnect token"))?;
        if !player.token_valid(token_ttl) {
            return Err(CoreError::unauthorized("Reconnect token has expired"));
        }
        if !player.within_grace(grace) {
            return Err(CoreError::forbidden(
                "Reconnection grace period has expired",
            ));
        }
        player.restore_connection(new_connection_id, new_token);
        Ok(player.clone())
    }

    pub fn reconnect_spectator(
        &mut self,
        old_token: &str,
        new_connection_id: ConnectionId,
        grace: Duration,
        token_ttl: Duration,
        new_token: String,
    ) -> CoreResult<Spectator> {
        let spectator = self
            .spectators
            .iter_mut()
            .find(|spectator| spectator.token == old_token)
            .ok_or_else(|| CoreError::unauthorized("Unknown reconnect token"))?;
        if !spectator.token_valid(token_ttl) {
            return Err(CoreError::unauthorized("Reconnect token has expired"));
        }
        if !spectator.within_grace(grace) {
            return Err(CoreError::forbidden(
                "Reconnection grace period has expired",
            ));
        }
        spectator.restore_connection(new_connection_id, new_token);
        Ok(spectator.clone())
    }

    pub fn find_player_by_connection(&self, connection_id: ConnectionId) -> Option<&Player> {
        self.players
            .iter()
            .find(|player| player.connection_id == connection_id)
    }

    pub fn find_player_by_id(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|player| player.id == player_id)
    }

    pub fn find_spectator_by_connection(
        &self,
        connection_id: ConnectionId,
    ) -> Option<&Spectator> {
        self.spectators
            .iter()
            .find(|spectator| spectator.connection_id == connection_id)
    }

    pub fn connected_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|player| player.is_connected())
    }

    pub fn connected_player_count(&self) -> usize {
        self.connected_players().count()
    }

    pub fn disconnected_players(&self) -> Vec<&Player> {
        self.players
            .iter()
            .filter(|player| !player.is_connected())
            .collect()
    }

    /// Drop players whose disconnect has outlived the grace window.
    /// Returns the removed players so the caller can notify the room.
    pub fn remove_stale_disconnected_players(&mut self, grace: Duration) -> Vec<Player> {
        let mut removed = Vec::new();
        let mut index = 0;
        while index < self.players.len() {
            let stale = !self.players[index].is_connected()
                && !self.players[index].within_grace(grace);
            if stale {
                removed.push(self.players.remove(index));
            } else {
                index += 1;
            }
        }
        removed
    }

    // ------------------------------------------------------------------
    // Moderation
    // ------------------------------------------------------------------

    pub fn kick_player(
        &mut self,
        player_id: PlayerId,
        requester: ConnectionId,
    ) -> CoreResult<Player> {
        self.require_host(requester)?;
        self.remove_player_by_id(player_id)
            .ok_or_else(|| CoreError::not_found("Player not found in this room"))
    }

    pub fn ban_player(
        &mut self,
        player_id: PlayerId,
        requester: ConnectionId,
    ) -> CoreResult<Player> {
        self.require_host(requester)?;
        let player = self
            .remove_player_by_id(player_id)
            .ok_or_else(|| CoreError::not_found("Player not found in this room"))?;
        self.banned_nicknames.insert(player.nickname.normalized());
        Ok(player)
    }

    pub fn unban_nickname(&mut self, nickname: &str, requester: ConnectionId) -> CoreResult<bool> {
        self.require_host(requester)?;
        Ok(self.banned_nicknames.remove(&nickname.trim().to_lowercase()))
    }

    pub fn banned_nicknames(&self) -> Vec<String> {
        let mut nicknames: Vec<String> = self.banned_nicknames.iter().cloned().collect();
        nicknames.sort();
        nicknames
    }

    // ------------------------------------------------------------------
    // Game flow
    // ------------------------------------------------------------------

    /// Validate that the requester may start the game now. State mutation
    /// happens through `set_quiz_snapshot` + `set_state`.
    pub fn start_game(&self, requester: ConnectionId) -> CoreResult<()> {
        self.require_host(requester)?;
        if self.state != RoomState::WaitingPlayers {
            return Err(CoreError::conflict("Game has already started"));
        }
        if self.players.is_empty() {
            return Err(CoreError::validation(
                "Cannot start a game with no players",
            ));
        }
        Ok(())
    }

    /// Exactly once per room lifetime. Also stamps `game_started_at`.
    pub fn set_quiz_snapshot(&mut self, snapshot: QuizSnapshot) -> CoreResult<()> {
        if self.quiz_snapshot.is_some() {
            return Err(CoreError::conflict("Quiz snapshot is already set"));
        }
        self.quiz_snapshot = Some(snapshot);
        self.game_started_at = Some(Utc::now());
        Ok(())
    }

    pub fn has_quiz_snapshot(&self) -> bool {
        self.quiz_snapshot.is_some()
    }

    pub fn set_state(&mut self, next: RoomState) -> CoreResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::validation(format!(
                "Illegal state transition {} -> {next}",
                self.state
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Advance to the next question, or to the podium after the last one.
    pub fn next_question(
        &mut self,
        requester: ConnectionId,
        total_questions: usize,
    ) -> CoreResult<NextQuestion> {
        self.require_host(requester)?;
        if self.current_question_index + 1 >= total_questions {
            self.set_state(RoomState::Podium)?;
            return Ok(NextQuestion::Finished);
        }
        self.set_state(RoomState::QuestionIntro)?;
        self.current_question_index += 1;
        Ok(NextQuestion::HasMore)
    }

    pub fn pause(&mut self, requester: ConnectionId) -> CoreResult<()> {
        self.require_host(requester)?;
        if self.state != RoomState::Leaderboard {
            return Err(CoreError::validation(
                "Games can only be paused from the leaderboard",
            ));
        }
        let prior = self.state;
        self.set_state(RoomState::Paused)?;
        self.paused_from_state = Some(prior);
        self.paused_at = Some(Utc::now());
        Ok(())
    }

    pub fn resume(&mut self, requester: ConnectionId) -> CoreResult<()> {
        self.require_host(requester)?;
        if self.state != RoomState::Paused {
            return Err(CoreError::validation("Game is not paused"));
        }
        let target = self.paused_from_state.take().unwrap_or(RoomState::Leaderboard);
        self.set_state(target)?;
        self.paused_at = None;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Answers & scoring
    // ------------------------------------------------------------------

    /// Called when entering the answering phase.
    pub fn clear_all_answer_attempts(&mut self) {
        for player in &mut self.players {
            player.answer_attempt = None;
        }
    }

    /// Append to the answer history, rejecting duplicates for the same
    /// player and question.
    pub fn record_answer(&mut self, record: AnswerRecord) -> CoreResult<()> {
        let duplicate = self.answer_history.iter().any(|existing| {
            existing.player_id == record.player_id
                && existing.question_index == record.question_index
        });
        if duplicate {
            return Err(CoreError::conflict("Already answered"));
        }
        self.answer_history.push(record);
        Ok(())
    }

    /// Score a submission and mutate the player through the aggregate.
    ///
    /// The caller has already verified the room state and acquired the
    /// submission lock; this method enforces the per-player rules.
    pub fn apply_answer(
        &mut self,
        connection_id: ConnectionId,
        question: &Question,
        answer_index: usize,
        elapsed_ms: u64,
    ) -> CoreResult<AnswerRecord> {
        let question_index = self.current_question_index;
        let player = self
            .players
            .iter_mut()
            .find(|player| player.connection_id == connection_id)
            .ok_or_else(|| CoreError::not_found("Player not found in this room"))?;
        if !player.is_connected() {
            return Err(CoreError::forbidden(
                "Disconnected players cannot submit answers",
            ));
        }
        if player.answer_attempt.is_some() {
            return Err(CoreError::conflict("Already answered"));
        }
        if answer_index >= question.options.len() {
            return Err(CoreError::validation("Answer index is out of range"));
        }
        let already_recorded = self.answer_history.iter().any(|existing| {
            existing.player_id == player.id && existing.question_index == question_index
        });
        if already_recorded {
            return Err(CoreError::conflict("Already answered"));
        }

        let correct = question.is_correct(answer_index);
        let base = if correct {
            base_score(question.points, elapsed_ms, question.time_limit_ms())
        } else {
            0
        };
        let bonus = if correct {
            streak_bonus(player.streak)
        } else {
            0
        };

        let now = Utc::now();
        player.answer_attempt = Some(AnswerAttempt {
            answer_index,
            elapsed_ms,
            submitted_at: now,
        });
        if correct {
            player.score = player.score.add(base + bonus);
            player.streak = (player.streak + 1).min(MAX_STREAK);
            player.longest_streak = player.longest_streak.max(player.streak);
            player.correct_answers += 1;
        } else {
            player.streak = 0;
        }

        let record = AnswerRecord {
            player_id: player.id,
            nickname: player.nickname.as_str().to_string(),
            question_index,
            answer_index,
            correct,
            base_score: base,
            streak_bonus: bonus,
            response_time_ms: elapsed_ms,
            submitted_at: now,
        };
        self.answer_history.push(record.clone());
        Ok(record)
    }

    /// Distribution of the current round's attempts across options.
    /// Out-of-range indices count as skipped rather than panicking.
    pub fn answer_distribution(
        &self,
        option_count: usize,
        correct_answer_index: usize,
    ) -> AnswerStats {
        let mut distribution = vec![0u32; option_count];
        let mut correct_count = 0;
        let mut skipped_count = 0;
        for player in &self.players {
            let Some(attempt) = &player.answer_attempt else {
                continue;
            };
            if attempt.answer_index < option_count {
                distribution[attempt.answer_index] += 1;
                if attempt.answer_index == correct_answer_index {
                    correct_count += 1;
                }
            } else {
                skipped_count += 1;
            }
        }
        AnswerStats {
            distribution,
            correct_count,
            skipped_count,
        }
    }

    pub fn answered_count(&self) -> usize {
        self.players
            .iter()
            .filter(|player| player.answer_attempt.is_some())
            .count()
    }

    /// True when every *connected* player has submitted. Disconnected
    /// players do not hold up the round.
    pub fn have_all_players_answered(&self) -> bool {
        let mut any = false;
        for player in self.connected_players() {
            any = true;
            if player.answer_attempt.is_none() {
                return false;
            }
        }
        any
    }

    // ------------------------------------------------------------------
    // Standings
    // ------------------------------------------------------------------

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut sorted: Vec<&Player> = self.players.iter().collect();
        sorted.sort_by(|a, b| b.score.cmp(&a.score));
        sorted
            .into_iter()
            .enumerate()
            .map(|(position, player)| LeaderboardEntry {
                rank: position + 1,
                player_id: player.id,
                nickname: player.nickname.as_str().to_string(),
                score: player.score.value(),
                streak: player.streak,
            })
            .collect()
    }

    pub fn podium(&self) -> Vec<LeaderboardEntry> {
        let mut leaderboard = self.leaderboard();
        leaderboard.truncate(3);
        leaderboard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::participant::generate_token;
    use crate::domain::question::QuestionKind;

    const GRACE: Duration = Duration::from_secs(120);
    const TTL: Duration = Duration::from_secs(86_400);

    fn room() -> (Room, ConnectionId) {
        let host_conn = Uuid::new_v4();
        let room = Room::new(
            Pin::parse("042137").unwrap(),
            host_conn,
            Uuid::new_v4(),
            generate_token(),
            Uuid::new_v4(),
            50,
            10,
        );
        (room, host_conn)
    }

    fn player(name: &str) -> Player {
        Player::new(Uuid::new_v4(), Nickname::parse(name).unwrap())
    }

    fn question() -> Question {
        Question::new(
            "2+2?",
            QuestionKind::MultipleChoice,
            vec!["3".into(), "4".into(), "5".into(), "6".into()],
            1,
            30,
            1000,
            None,
        )
        .unwrap()
    }

    fn start(room: &mut Room, host: ConnectionId) {
        let quiz = crate::domain::question::Quiz::new("t", vec![question()]).unwrap();
        room.start_game(host).unwrap();
        room.set_quiz_snapshot(quiz.snapshot()).unwrap();
        room.set_state(RoomState::QuestionIntro).unwrap();
    }

    #[test]
    fn transition_table_is_enforced() {
        let (mut room, _) = room();
        assert!(room.set_state(RoomState::AnsweringPhase).is_err());
        assert!(room.set_state(RoomState::Podium).is_err());
        room.set_state(RoomState::QuestionIntro).unwrap();
        room.set_state(RoomState::AnsweringPhase).unwrap();
        assert!(room.set_state(RoomState::Leaderboard).is_err());
        room.set_state(RoomState::ShowResults).unwrap();
        room.set_state(RoomState::Leaderboard).unwrap();
        room.set_state(RoomState::Podium).unwrap();
        // Podium is terminal
        assert!(room.set_state(RoomState::QuestionIntro).is_err());
    }

    #[test]
    fn leaderboard_may_reopen_answering() {
        let (mut room, _) = room();
        room.set_state(RoomState::QuestionIntro).unwrap();
        room.set_state(RoomState::AnsweringPhase).unwrap();
        room.set_state(RoomState::ShowResults).unwrap();
        room.set_state(RoomState::Leaderboard).unwrap();
        assert!(room.set_state(RoomState::AnsweringPhase).is_ok());
    }

    #[test]
    fn players_join_only_while_waiting() {
        let (mut room, host) = room();
        room.add_player(player("Ada")).unwrap();
        start(&mut room, host);
        let err = room.add_player(player("Late")).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn nicknames_unique_case_insensitive() {
        let (mut room, _) = room();
        room.add_player(player("Ada")).unwrap();
        let err = room.add_player(player("ADA")).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        // Spectators share the namespace
        let spectator = Spectator::new(Uuid::new_v4(), Nickname::parse("aDa").unwrap());
        assert!(room.add_spectator(spectator).is_err());
    }

    #[test]
    fn room_capacity_enforced() {
        let host_conn = Uuid::new_v4();
        let mut room = Room::new(
            Pin::parse("000001").unwrap(),
            host_conn,
            Uuid::new_v4(),
            generate_token(),
            Uuid::new_v4(),
            2,
            1,
        );
        room.add_player(player("P1")).unwrap();
        room.add_player(player("P2")).unwrap();
        assert!(matches!(
            room.add_player(player("P3")).unwrap_err(),
            CoreError::Conflict(_)
        ));

        room.add_spectator(Spectator::new(Uuid::new_v4(), Nickname::parse("S1").unwrap()))
            .unwrap();
        assert!(room
            .add_spectator(Spectator::new(
                Uuid::new_v4(),
                Nickname::parse("S2").unwrap()
            ))
            .is_err());
    }

    #[test]
    fn banned_nickname_cannot_join() {
        let (mut room, host) = room();
        let p = player("Rude");
        let player_id = p.id;
        room.add_player(p).unwrap();
        room.ban_player(player_id, host).unwrap();
        assert!(room.banned_nicknames().contains(&"rude".to_string()));

        let err = room.add_player(player("RUDE")).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        assert!(room.unban_nickname("Rude", host).unwrap());
        room.add_player(player("rude")).unwrap();
    }

    #[test]
    fn kick_and_ban_are_host_only() {
        let (mut room, _) = room();
        let p = player("Ada");
        let player_id = p.id;
        let player_conn = p.connection_id;
        room.add_player(p).unwrap();

        assert!(matches!(
            room.kick_player(player_id, player_conn).unwrap_err(),
            CoreError::Forbidden(_)
        ));
        assert!(matches!(
            room.ban_player(player_id, player_conn).unwrap_err(),
            CoreError::Forbidden(_)
        ));
    }

    #[test]
    fn start_game_requires_host_state_and_players() {
        let (mut room, host) = room();
        assert!(matches!(
            room.start_game(host).unwrap_err(),
            CoreError::Validation(_)
        ));
        room.add_player(player("Ada")).unwrap();
        assert!(matches!(
            room.start_game(Uuid::new_v4()).unwrap_err(),
            CoreError::Forbidden(_)
        ));
        room.start_game(host).unwrap();
    }

    #[test]
    fn snapshot_set_exactly_once() {
        let (mut room, host) = room();
        room.add_player(player("Ada")).unwrap();
        start(&mut room, host);
        let quiz = crate::domain::question::Quiz::new("t", vec![question()]).unwrap();
        assert!(matches!(
            room.set_quiz_snapshot(quiz.snapshot()).unwrap_err(),
            CoreError::Conflict(_)
        ));
        assert!(room.game_started_at.is_some());
    }

    #[test]
    fn scoring_first_question_happy_path() {
        let (mut room, host) = room();
        let p1 = player("P1");
        let p2 = player("P2");
        let c1 = p1.connection_id;
        let c2 = p2.connection_id;
        room.add_player(p1).unwrap();
        room.add_player(p2).unwrap();
        start(&mut room, host);
        room.set_state(RoomState::AnsweringPhase).unwrap();
        room.clear_all_answer_attempts();

        let q = question();
        let r1 = room.apply_answer(c1, &q, 1, 1000).unwrap();
        assert!(r1.correct);
        assert_eq!(r1.base_score, 983);
        assert_eq!(r1.streak_bonus, 0);

        let r2 = room.apply_answer(c2, &q, 0, 2000).unwrap();
        assert!(!r2.correct);
        assert_eq!(r2.base_score, 0);

        let stats = room.answer_distribution(4, 1);
        assert_eq!(stats.distribution, vec![1, 1, 0, 0]);
        assert_eq!(stats.correct_count, 1);
        assert_eq!(stats.skipped_count, 0);

        let board = room.leaderboard();
        assert_eq!(board[0].nickname, "P1");
        assert_eq!(board[0].score, 983);
        assert_eq!(board[1].score, 0);
    }

    #[test]
    fn streak_bonus_applies_on_second_correct() {
        let (mut room, host) = room();
        let p1 = player("P1");
        let c1 = p1.connection_id;
        room.add_player(p1).unwrap();
        start(&mut room, host);
        room.set_state(RoomState::AnsweringPhase).unwrap();

        let q = question();
        room.apply_answer(c1, &q, 1, 1000).unwrap();

        // Next round
        room.set_state(RoomState::ShowResults).unwrap();
        room.set_state(RoomState::Leaderboard).unwrap();
        room.next_question(host, 2).ok();
        room.current_question_index = 1;
        room.state = RoomState::AnsweringPhase;
        room.clear_all_answer_attempts();

        let record = room.apply_answer(c1, &q, 1, 1000).unwrap();
        assert_eq!(record.streak_bonus, 100);
        let p = room.find_player_by_connection(c1).unwrap();
        assert_eq!(p.score.value(), 983 + 983 + 100);
        assert_eq!(p.streak, 2);
        assert_eq!(p.longest_streak, 2);
    }

    #[test]
    fn double_submission_rejected() {
        let (mut room, host) = room();
        let p1 = player("P1");
        let c1 = p1.connection_id;
        room.add_player(p1).unwrap();
        start(&mut room, host);
        room.set_state(RoomState::AnsweringPhase).unwrap();

        let q = question();
        room.apply_answer(c1, &q, 1, 1000).unwrap();
        let err = room.apply_answer(c1, &q, 2, 1500).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(room.answer_history.len(), 1);
    }

    #[test]
    fn disconnected_player_cannot_submit() {
        let (mut room, host) = room();
        let p1 = player("P1");
        let c1 = p1.connection_id;
        room.add_player(p1).unwrap();
        start(&mut room, host);
        room.set_state(RoomState::AnsweringPhase).unwrap();
        room.set_player_disconnected(c1);

        let err = room.apply_answer(c1, &question(), 1, 1000).unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[test]
    fn all_answered_ignores_disconnected() {
        let (mut room, host) = room();
        let p1 = player("P1");
        let p2 = player("P2");
        let c1 = p1.connection_id;
        let c2 = p2.connection_id;
        room.add_player(p1).unwrap();
        room.add_player(p2).unwrap();
        start(&mut room, host);
        room.set_state(RoomState::AnsweringPhase).unwrap();

        room.apply_answer(c1, &question(), 1, 1000).unwrap();
        assert!(!room.have_all_players_answered());

        room.set_player_disconnected(c2);
        assert!(room.have_all_players_answered());
    }

    #[test]
    fn all_answered_is_false_with_no_connected_players() {
        let (mut room, host) = room();
        let p1 = player("P1");
        let c1 = p1.connection_id;
        room.add_player(p1).unwrap();
        start(&mut room, host);
        room.set_state(RoomState::AnsweringPhase).unwrap();
        room.set_player_disconnected(c1);
        assert!(!room.have_all_players_answered());
    }

    #[test]
    fn out_of_range_attempts_count_as_skipped() {
        let (mut room, host) = room();
        let p1 = player("P1");
        let c1 = p1.connection_id;
        room.add_player(p1).unwrap();
        start(&mut room, host);
        room.set_state(RoomState::AnsweringPhase).unwrap();

        // Inject a corrupt attempt directly; the public API rejects these.
        room.players[0].answer_attempt = Some(AnswerAttempt {
            answer_index: 9,
            elapsed_ms: 100,
            submitted_at: Utc::now(),
        });
        let _ = c1;
        let stats = room.answer_distribution(4, 1);
        assert_eq!(stats.distribution, vec![0, 0, 0, 0]);
        assert_eq!(stats.skipped_count, 1);
    }

    #[test]
    fn next_question_advances_then_finishes() {
        let (mut room, host) = room();
        room.add_player(player("P1")).unwrap();
        start(&mut room, host);
        room.set_state(RoomState::AnsweringPhase).unwrap();
        room.set_state(RoomState::ShowResults).unwrap();
        room.set_state(RoomState::Leaderboard).unwrap();

        assert_eq!(room.next_question(host, 2).unwrap(), NextQuestion::HasMore);
        assert_eq!(room.current_question_index, 1);
        assert_eq!(room.state, RoomState::QuestionIntro);

        room.set_state(RoomState::AnsweringPhase).unwrap();
        room.set_state(RoomState::ShowResults).unwrap();
        room.set_state(RoomState::Leaderboard).unwrap();
        assert_eq!(
            room.next_question(host, 2).unwrap(),
            NextQuestion::Finished
        );
        assert_eq!(room.state, RoomState::Podium);
    }

    #[test]
    fn pause_resume_round_trip() {
        let (mut room, host) = room();
        room.add_player(player("P1")).unwrap();
        start(&mut room, host);
        room.set_state(RoomState::AnsweringPhase).unwrap();

        // Pausing mid-answering is not allowed
        assert!(room.pause(host).is_err());

        room.set_state(RoomState::ShowResults).unwrap();
        room.set_state(RoomState::Leaderboard).unwrap();
        room.pause(host).unwrap();
        assert_eq!(room.state, RoomState::Paused);
        assert!(room.paused_at.is_some());

        room.resume(host).unwrap();
        assert_eq!(room.state, RoomState::Leaderboard);
        assert!(room.paused_at.is_none());
        assert!(room.paused_from_state.is_none());
    }

    #[test]
    fn reconnect_rotates_player_token() {
        let (mut room, _) = room();
        let p1 = player("P1");
        let c1 = p1.connection_id;
        let old_token = p1.token.clone();
        room.add_player(p1).unwrap();
        room.set_player_disconnected(c1);

        let new_conn = Uuid::new_v4();
        let reconnected = room
            .reconnect_player(&old_token, new_conn, GRACE, TTL, generate_token())
            .unwrap();
        assert_eq!(reconnected.connection_id, new_conn);
        assert_ne!(reconnected.token, old_token);

        // The prior token no longer authenticates
        let err = room
            .reconnect_player(&old_token, Uuid::new_v4(), GRACE, TTL, generate_token())
            .unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));
    }

    #[test]
    fn reconnect_after_grace_is_forbidden() {
        let (mut room, _) = room();
        let p1 = player("P1");
        let token = p1.token.clone();
        room.add_player(p1).unwrap();
        room.players[0].disconnected_at =
            Some(Utc::now() - chrono::Duration::seconds(130));

        let err = room
            .reconnect_player(&token, Uuid::new_v4(), GRACE, TTL, generate_token())
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[test]
    fn host_reconnect_validates_token_and_grace() {
        let (mut room, _) = room();
        let token = room.host_token.clone();
        room.set_host_disconnected();

        assert!(matches!(
            room.reconnect_host(Uuid::new_v4(), "bogus", GRACE, TTL, generate_token())
                .unwrap_err(),
            CoreError::Unauthorized(_)
        ));

        let new_conn = Uuid::new_v4();
        room.reconnect_host(new_conn, &token, GRACE, TTL, generate_token())
            .unwrap();
        assert_eq!(room.host_connection_id, new_conn);
        assert_ne!(room.host_token, token);
        assert!(!room.is_host_disconnected());
    }

    #[test]
    fn stale_disconnected_players_removed() {
        let (mut room, _) = room();
        room.add_player(player("Fresh")).unwrap();
        room.add_player(player("Stale")).unwrap();
        room.players[1].disconnected_at =
            Some(Utc::now() - chrono::Duration::seconds(300));

        let removed = room.remove_stale_disconnected_players(GRACE);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].nickname.as_str(), "Stale");
        assert_eq!(room.players.len(), 1);
    }

    #[test]
    fn waiting_room_removal_is_idempotent() {
        let (mut room, _) = room();
        let p1 = player("P1");
        let c1 = p1.connection_id;
        room.add_player(p1).unwrap();
        assert!(room.remove_player(c1).is_some());
        assert!(room.remove_player(c1).is_none());
    }
}
