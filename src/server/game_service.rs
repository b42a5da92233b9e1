use std::sync::Arc;

use super::GameServer;
use crate::domain::{GameSession, GameStatus, NextQuestion, Question, RoomState};
use crate::error::{CoreError, CoreResult};
use crate::protocol::validation;
use crate::protocol::{ConnectionId, QuestionView, ServerEvent};

/// Who is asking. Timer expiry and the all-answered auto-advance re-enter
/// the use-case layer as `Server`; everything else carries the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Host(ConnectionId),
    Server,
}

fn question_view(question: &Question, index: usize, include_answer: bool) -> QuestionView {
    QuestionView {
        index,
        text: question.text.clone(),
        kind: question.kind,
        options: question.options.clone(),
        time_limit_secs: question.time_limit_secs,
        points: question.points,
        image_url: question.image_url.clone(),
        correct_answer_index: include_answer.then_some(question.correct_answer_index),
    }
}

impl GameServer {
    fn current_question(room: &crate::domain::Room) -> CoreResult<Question> {
        room.quiz_snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.question(room.current_question_index))
            .cloned()
            .ok_or_else(|| CoreError::not_found("Question not found"))
    }

    /// Host starts the game: freeze the quiz into the room and move to the
    /// first question intro.
    pub async fn start_game(&self, connection_id: ConnectionId) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let mut room = self.load_room(&pin).await?;

        let quiz = self
            .quizzes
            .find_by_id(&room.quiz_id)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::not_found("Quiz not found"))?;
        if quiz.questions.is_empty() {
            return Err(CoreError::validation("Quiz has no questions"));
        }
        if quiz.questions.len() > self.config.server.max_questions {
            return Err(CoreError::validation(format!(
                "Quiz exceeds the {}-question limit",
                self.config.server.max_questions
            )));
        }
        if room.connected_player_count() == 0 {
            return Err(CoreError::validation(
                "Cannot start a game with no connected players",
            ));
        }

        room.start_game(connection_id)?;
        let snapshot = quiz.snapshot();
        let total_questions = snapshot.len();
        room.set_quiz_snapshot(snapshot)?;
        room.set_state(RoomState::QuestionIntro)?;
        let first = Self::current_question(&room)?;
        self.registry.save(room).await;

        // Best-effort; the game proceeds even if the counter write fails.
        if let Err(err) = self.quizzes.increment_play_count(&quiz.id).await {
            tracing::warn!(quiz_id = %quiz.id, error = %err, "Failed to increment play count");
        }

        tracing::info!(%pin, total_questions, "Game started");
        self.emit(
            connection_id,
            ServerEvent::GameStarted {
                total_questions,
                question: question_view(&first, 0, true),
            },
        )
        .await;
        self.broadcast_except(
            &pin,
            connection_id,
            ServerEvent::GameStarted {
                total_questions,
                question: question_view(&first, 0, false),
            },
        )
        .await;
        Ok(())
    }

    /// Host opens the answering window. Clears stale attempts and pending
    /// answer locks, then hands the countdown to the timer service.
    pub async fn start_answering(&self, connection_id: ConnectionId) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let mut room = self.load_room(&pin).await?;
        if !room.is_host(connection_id) {
            return Err(CoreError::forbidden("Only the host may open answering"));
        }
        room.set_state(RoomState::AnsweringPhase)?;
        room.clear_all_answer_attempts();
        let question = Self::current_question(&room)?;
        self.registry.save(room).await;

        self.locks
            .release_prefix(&format!("answer:{pin}:"))
            .await;

        self.broadcast(
            &pin,
            ServerEvent::AnsweringStarted {
                time_limit_secs: question.time_limit_secs,
                option_count: question.options.len(),
            },
        )
        .await;

        let server = self
            .strong_ref()
            .ok_or_else(|| CoreError::internal("Server is shutting down"))?;
        let expired_pin = pin.clone();
        self.timers
            .start_timer(
                &pin,
                u64::from(question.time_limit_secs),
                Arc::clone(&self.sink),
                async move {
                    server.handle_time_expired(expired_pin).await;
                },
            )
            .await;
        Ok(())
    }

    /// Timer callback: end the round as the server principal. Races with
    /// an inbound end or an all-answered advance are expected and benign.
    pub(crate) async fn handle_time_expired(self: Arc<Self>, pin: String) {
        match self.end_answering_internal(&pin, Principal::Server).await {
            Ok(()) => {}
            Err(err) if err.is_benign_race() => {
                tracing::debug!(%pin, error = %err, "Timer expiry raced the round end");
            }
            Err(err) => {
                tracing::error!(%pin, error = %err, "Timer expiry failed to end the round");
            }
        }
    }

    /// Player submits an answer for the current question.
    ///
    /// Four phases: shape validation, lock acquisition, guarded state
    /// checks + scoring, lock release. The client's `elapsed_ms` is
    /// replaced with the timer service's measurement.
    pub async fn submit_answer(
        &self,
        connection_id: ConnectionId,
        answer_index: i64,
        elapsed_ms: f64,
    ) -> CoreResult<()> {
        let answer_index = validation::validate_answer_shape(answer_index, elapsed_ms)
            .map_err(CoreError::Validation)?;
        let pin = self.pin_for_connection(connection_id).await?;

        let lock_key = format!("answer:{pin}:{connection_id}");
        if !self.locks.try_acquire(&lock_key).await {
            return Err(CoreError::conflict("Answer submission in progress"));
        }
        let result = self
            .submit_answer_locked(connection_id, &pin, answer_index)
            .await;
        self.locks.release(&lock_key).await;

        let all_answered = result?;
        if all_answered {
            self.broadcast(&pin, ServerEvent::AllPlayersAnswered).await;
            self.timers.stop_timer(&pin);
            match self.end_answering_internal(&pin, Principal::Server).await {
                Ok(()) => {}
                Err(err) if err.is_benign_race() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn submit_answer_locked(
        &self,
        connection_id: ConnectionId,
        pin: &str,
        answer_index: usize,
    ) -> CoreResult<bool> {
        let mut room = self.load_room(pin).await?;
        if room.state != RoomState::AnsweringPhase {
            return Err(CoreError::conflict("Not in answering phase"));
        }
        let question = Self::current_question(&room)?;

        // Authoritative elapsed time. A submission landing after the
        // deadline but before the expiry callback has torn the round down
        // reads the clamped total and still earns the floor score.
        let elapsed_ms = self
            .timers
            .elapsed_ms(pin)
            .unwrap_or_else(|| question.time_limit_ms());

        let record = room.apply_answer(connection_id, &question, answer_index, elapsed_ms)?;
        let all_answered = room.have_all_players_answered();
        let answered = room.answered_count();
        let total = room.players.len();
        self.registry.save(room).await;

        self.emit(
            connection_id,
            ServerEvent::AnswerReceived {
                answer_index: record.answer_index,
                elapsed_ms: record.response_time_ms,
            },
        )
        .await;
        self.broadcast(pin, ServerEvent::AnswerCountUpdated { answered, total })
            .await;
        Ok(all_answered)
    }

    pub async fn end_answering(&self, connection_id: ConnectionId) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        self.end_answering_internal(&pin, Principal::Host(connection_id))
            .await
    }

    pub(crate) async fn end_answering_internal(
        &self,
        pin: &str,
        principal: Principal,
    ) -> CoreResult<()> {
        let mut room = self.load_room(pin).await?;
        if let Principal::Host(connection_id) = principal {
            if !room.is_host(connection_id) {
                return Err(CoreError::forbidden("Only the host may end the round"));
            }
        }
        if room.state != RoomState::AnsweringPhase {
            return Err(CoreError::conflict("Not in answering phase"));
        }
        let question = Self::current_question(&room)?;
        room.set_state(RoomState::ShowResults)?;
        let stats =
            room.answer_distribution(question.options.len(), question.correct_answer_index);
        let total_players = room.players.len();
        self.registry.save(room).await;
        self.timers.stop_timer(pin);

        self.broadcast(
            pin,
            ServerEvent::ShowResults {
                correct_answer_index: question.correct_answer_index,
                distribution: stats.distribution,
                correct_count: stats.correct_count,
                total_players,
            },
        )
        .await;
        self.broadcast(pin, ServerEvent::RoundEnded).await;
        Ok(())
    }

    pub async fn show_leaderboard(&self, connection_id: ConnectionId) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let mut room = self.load_room(&pin).await?;
        if !room.is_host(connection_id) {
            return Err(CoreError::forbidden(
                "Only the host may reveal the leaderboard",
            ));
        }
        room.set_state(RoomState::Leaderboard)?;
        let entries = room.leaderboard();
        self.registry.save(room).await;
        self.broadcast(&pin, ServerEvent::Leaderboard { entries }).await;
        Ok(())
    }

    /// Advance to the next question, or finish the game at the podium and
    /// archive it.
    pub async fn next_question(&self, connection_id: ConnectionId) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let mut room = self.load_room(&pin).await?;
        let total_questions = room
            .quiz_snapshot
            .as_ref()
            .map(crate::domain::QuizSnapshot::len)
            .ok_or_else(|| CoreError::conflict("Game has not started"))?;

        match room.next_question(connection_id, total_questions)? {
            NextQuestion::HasMore => {
                let index = room.current_question_index;
                let question = Self::current_question(&room)?;
                self.registry.save(room).await;

                self.emit(
                    connection_id,
                    ServerEvent::QuestionIntro {
                        total_questions,
                        question: question_view(&question, index, true),
                    },
                )
                .await;
                self.broadcast_except(
                    &pin,
                    connection_id,
                    ServerEvent::QuestionIntro {
                        total_questions,
                        question: question_view(&question, index, false),
                    },
                )
                .await;
            }
            NextQuestion::Finished => {
                let podium = room.podium();
                self.registry.save(room).await;
                self.timers.stop_timer(&pin);

                self.broadcast(&pin, ServerEvent::GameOver { podium }).await;
                match self.archive_game(&pin).await {
                    Ok(_) => {}
                    Err(err) if err.is_benign_race() => {}
                    Err(err) => {
                        tracing::error!(%pin, error = %err, "Failed to archive completed game");
                    }
                }
                self.broadcast(
                    &pin,
                    ServerEvent::RoomClosed {
                        reason: "game_completed".to_string(),
                    },
                )
                .await;
                self.sink.remove_room_channel(&pin).await;
                tracing::info!(%pin, "Game completed and archived");
            }
        }
        Ok(())
    }

    /// Re-send the current question's results to the requester.
    pub async fn get_results(&self, connection_id: ConnectionId) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let room = self.load_room(&pin).await?;
        let question = Self::current_question(&room)?;
        let stats =
            room.answer_distribution(question.options.len(), question.correct_answer_index);
        self.emit(
            connection_id,
            ServerEvent::Results {
                correct_answer_index: question.correct_answer_index,
                distribution: stats.distribution,
                correct_count: stats.correct_count,
                total_players: room.players.len(),
            },
        )
        .await;
        Ok(())
    }

    pub async fn pause_game(&self, connection_id: ConnectionId) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let mut room = self.load_room(&pin).await?;
        room.pause(connection_id)?;
        self.registry.save(room).await;
        self.broadcast(&pin, ServerEvent::GamePaused).await;
        Ok(())
    }

    pub async fn resume_game(&self, connection_id: ConnectionId) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let mut room = self.load_room(&pin).await?;
        room.resume(connection_id)?;
        self.registry.save(room).await;
        self.broadcast(&pin, ServerEvent::GameResumed).await;
        Ok(())
    }

    /// Archive a finished game and delete the room. A missing room is
    /// normal: a concurrent deleter (cleanup, host close) may have won.
    pub async fn archive_game(&self, pin: &str) -> CoreResult<Option<GameSession>> {
        let lock_key = format!("archive:{pin}");
        if !self.locks.try_acquire(&lock_key).await {
            return Err(CoreError::conflict("Archive already in progress"));
        }
        let result = self
            .archive_game_locked(pin, GameStatus::Completed, None)
            .await;
        self.locks.release(&lock_key).await;
        result
    }

    /// Archive a game cut short (host timeout, orphaned room, shutdown).
    /// Only rooms that actually started a game carry an archive; rooms
    /// without a snapshot return `None` untouched.
    pub async fn save_interrupted_game(
        &self,
        pin: &str,
        reason: &str,
    ) -> CoreResult<Option<GameSession>> {
        let lock_key = format!("archive:{pin}");
        if !self.locks.try_acquire(&lock_key).await {
            return Err(CoreError::conflict("Archive already in progress"));
        }
        let result = self
            .archive_game_locked(pin, GameStatus::Interrupted, Some(reason.to_string()))
            .await;
        self.locks.release(&lock_key).await;
        result
    }

    async fn archive_game_locked(
        &self,
        pin: &str,
        status: GameStatus,
        interruption_reason: Option<String>,
    ) -> CoreResult<Option<GameSession>> {
        let Some(room) = self.registry.get(pin).await else {
            return Ok(None);
        };
        if !room.has_quiz_snapshot() {
            return Ok(None);
        }

        let session = GameSession::assemble(&room, status, interruption_reason);
        let saved = self
            .sessions
            .save(session)
            .await
            .map_err(CoreError::from)?;

        self.locks
            .release_prefix(&format!("answer:{pin}:"))
            .await;
        self.registry.remove(pin).await;

        // Resolve the host for the archive log line; archival itself only
        // needs the id.
        let host = self
            .users
            .find_by_id(&room.host_user_id)
            .await
            .ok()
            .flatten();
        tracing::info!(
            %pin,
            status = ?status,
            host = host.as_ref().map_or("unknown", |user| user.username.as_str()),
            "Game session archived"
        );
        Ok(Some(saved))
    }
}
