use super::GameServer;
use crate::error::CoreError;
use crate::protocol::{ClientEvent, ConnectionId, ServerEvent};

impl GameServer {
    /// Dispatch one inbound event: rate limit first, then the host
    /// authentication gate, then the use-case. Failures are returned to
    /// the originator as an `error` event; only internal failures hit the
    /// error log.
    pub async fn handle_client_event(&self, connection_id: ConnectionId, event: ClientEvent) {
        let event_name = event.name();

        if let Err(err) = self.rate_limiter.check(connection_id, event_name).await {
            // Deliberately not logged server-side.
            self.send_error(connection_id, &err).await;
            return;
        }

        if event.is_host_action() && !self.connections.is_authenticated(connection_id) {
            self.send_error(
                connection_id,
                &CoreError::unauthorized("Authentication required"),
            )
            .await;
            return;
        }

        let result = match event {
            ClientEvent::CreateRoom { quiz_id } => {
                self.create_room(connection_id, quiz_id).await
            }
            ClientEvent::JoinRoom { pin, nickname } => {
                self.join_room(connection_id, pin, nickname).await
            }
            ClientEvent::JoinAsSpectator { pin, nickname } => {
                self.join_as_spectator(connection_id, pin, nickname).await
            }
            ClientEvent::LeaveRoom => self.leave_room(connection_id).await,
            ClientEvent::CloseRoom => self.close_room(connection_id).await,
            ClientEvent::StartGame => self.start_game(connection_id).await,
            ClientEvent::StartAnswering => self.start_answering(connection_id).await,
            ClientEvent::SubmitAnswer {
                answer_index,
                elapsed_ms,
            } => {
                self.submit_answer(connection_id, answer_index, elapsed_ms)
                    .await
            }
            ClientEvent::EndAnswering => self.end_answering(connection_id).await,
            ClientEvent::ShowLeaderboard => self.show_leaderboard(connection_id).await,
            ClientEvent::NextQuestion => self.next_question(connection_id).await,
            ClientEvent::PauseGame => self.pause_game(connection_id).await,
            ClientEvent::ResumeGame => self.resume_game(connection_id).await,
            ClientEvent::KickPlayer { player_id } => {
                self.kick_player(connection_id, player_id).await
            }
            ClientEvent::BanPlayer { player_id } => {
                self.ban_player(connection_id, player_id).await
            }
            ClientEvent::UnbanNickname { nickname } => {
                self.unban_nickname(connection_id, nickname).await
            }
            ClientEvent::GetResults => self.get_results(connection_id).await,
            ClientEvent::GetPlayers => self.get_players(connection_id).await,
            ClientEvent::GetSpectators => self.get_spectators(connection_id).await,
            ClientEvent::GetBannedNicknames => {
                self.get_banned_nicknames(connection_id).await
            }
            ClientEvent::ReconnectHost { token } => {
                self.reconnect_host(connection_id, token).await
            }
            ClientEvent::ReconnectPlayer { token } => {
                self.reconnect_player(connection_id, token).await
            }
            ClientEvent::ReconnectSpectator { token } => {
                self.reconnect_spectator(connection_id, token).await
            }
        };

        if let Err(err) = result {
            match &err {
                CoreError::Internal(message) => {
                    tracing::error!(
                        %connection_id,
                        event = event_name,
                        error = %message,
                        "Unexpected failure handling event"
                    );
                }
                CoreError::RateLimited { .. } => {}
                _ => {
                    tracing::debug!(
                        %connection_id,
                        event = event_name,
                        error = %err,
                        "Event rejected"
                    );
                }
            }
            self.send_error(connection_id, &err).await;
        }
    }

    /// Map an error onto the wire. Internal details never leave the
    /// process; the client sees a generic message.
    pub(crate) async fn send_error(&self, connection_id: ConnectionId, err: &CoreError) {
        let error = if matches!(err, CoreError::Internal(_)) {
            "An unexpected error occurred".to_string()
        } else {
            err.to_string()
        };
        self.emit(
            connection_id,
            ServerEvent::Error {
                error,
                code: err.code(),
                retry_after: err.retry_after_secs(),
            },
        )
        .await;
    }
}
