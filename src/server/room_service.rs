use super::GameServer;
use crate::domain::{generate_token, Nickname, Player, Room, RoomState, Spectator};
use crate::error::{CoreError, CoreResult};
use crate::protocol::validation;
use crate::protocol::{
    ConnectionId, PlayerPublicInfo, QuizId, ReconnectSync, ServerEvent, SpectatorPublicInfo,
};

fn player_public(player: &Player) -> PlayerPublicInfo {
    PlayerPublicInfo {
        id: player.id,
        nickname: player.nickname.as_str().to_string(),
        score: player.score.value(),
        connected: player.is_connected(),
    }
}

fn spectator_public(spectator: &Spectator) -> SpectatorPublicInfo {
    SpectatorPublicInfo {
        id: spectator.id,
        nickname: spectator.nickname.as_str().to_string(),
    }
}

impl GameServer {
    pub(crate) async fn pin_for_connection(
        &self,
        connection_id: ConnectionId,
    ) -> CoreResult<String> {
        self.registry
            .pin_by_connection(connection_id)
            .await
            .ok_or_else(|| CoreError::not_found("You are not in a room"))
    }

    pub(crate) async fn load_room(&self, pin: &str) -> CoreResult<Room> {
        self.registry
            .get(pin)
            .await
            .ok_or_else(|| CoreError::not_found("Room not found"))
    }

    /// Open a room for an authenticated host. Generates a fresh PIN,
    /// retrying on the rare collision with a live room.
    pub async fn create_room(
        &self,
        connection_id: ConnectionId,
        quiz_id: QuizId,
    ) -> CoreResult<()> {
        let user_id = self
            .connections
            .user_id(connection_id)
            .ok_or_else(|| CoreError::unauthorized("Authentication required to host a room"))?;

        self.quizzes
            .find_by_id(&quiz_id)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::not_found("Quiz not found"))?;

        let server_cfg = &self.config.server;
        let mut created: Option<(String, String)> = None;
        for _ in 0..server_cfg.pin_generation_attempts.max(1) {
            let pin = self
                .registry
                .generate_pin(server_cfg.pin_generation_attempts)
                .await?;
            let host_token = generate_token();
            let room = Room::new(
                pin.clone(),
                connection_id,
                user_id,
                host_token.clone(),
                quiz_id,
                server_cfg.max_players,
                server_cfg.max_spectators,
            );
            match self.registry.insert_new(room).await {
                Ok(()) => {
                    created = Some((pin.as_str().to_string(), host_token));
                    break;
                }
                // Another create raced us to the same PIN; roll again.
                Err(CoreError::Conflict(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        let (pin, host_token) = created
            .ok_or_else(|| CoreError::internal("Could not allocate a unique room PIN"))?;

        self.sink.join_room_channel(&pin, connection_id).await;
        tracing::info!(%connection_id, %pin, %quiz_id, "Room created");
        self.emit(
            connection_id,
            ServerEvent::RoomCreated {
                pin,
                quiz_id,
                host_token,
            },
        )
        .await;
        Ok(())
    }

    /// Join a room by PIN and nickname. A transient per-(pin, nickname)
    /// lock prevents two simultaneous identical joins from both passing the
    /// uniqueness check.
    pub async fn join_room(
        &self,
        connection_id: ConnectionId,
        pin: String,
        nickname: String,
    ) -> CoreResult<()> {
        validation::validate_pin_format(&pin, &self.config.protocol)
            .map_err(CoreError::Validation)?;
        let display = validation::sanitize_nickname(&nickname, &self.config.protocol)
            .map_err(CoreError::Validation)?;
        let nickname = Nickname::parse(&display)?;

        let lock_key = format!("join:{pin}:{}", nickname.normalized());
        if !self.locks.try_acquire(&lock_key).await {
            return Err(CoreError::conflict("Join already in progress"));
        }
        let result = self.join_room_locked(connection_id, &pin, nickname).await;
        self.locks.release(&lock_key).await;
        result
    }

    async fn join_room_locked(
        &self,
        connection_id: ConnectionId,
        pin: &str,
        nickname: Nickname,
    ) -> CoreResult<()> {
        let mut room = self.load_room(pin).await?;
        let player = Player::new(connection_id, nickname);
        let token = player.token.clone();
        let joined = player_public(&player);
        room.add_player(player)?;
        let state = room.state;
        let roster: Vec<PlayerPublicInfo> = room.players.iter().map(player_public).collect();
        self.registry.save(room).await;

        self.sink.join_room_channel(pin, connection_id).await;
        tracing::info!(%connection_id, %pin, nickname = %joined.nickname, "Player joined room");
        self.emit(
            connection_id,
            ServerEvent::RoomJoined {
                pin: pin.to_string(),
                player_id: joined.id,
                nickname: joined.nickname.clone(),
                token,
                state,
                players: roster,
            },
        )
        .await;
        self.broadcast_except(
            pin,
            connection_id,
            ServerEvent::PlayerJoined { player: joined },
        )
        .await;
        Ok(())
    }

    /// Join as a read-only observer. Requires no authentication.
    pub async fn join_as_spectator(
        &self,
        connection_id: ConnectionId,
        pin: String,
        nickname: String,
    ) -> CoreResult<()> {
        validation::validate_pin_format(&pin, &self.config.protocol)
            .map_err(CoreError::Validation)?;
        let display = validation::sanitize_nickname(&nickname, &self.config.protocol)
            .map_err(CoreError::Validation)?;
        let nickname = Nickname::parse(&display)?;

        let lock_key = format!("join:{pin}:{}", nickname.normalized());
        if !self.locks.try_acquire(&lock_key).await {
            return Err(CoreError::conflict("Join already in progress"));
        }
        let result = self
            .join_as_spectator_locked(connection_id, &pin, nickname)
            .await;
        self.locks.release(&lock_key).await;
        result
    }

    async fn join_as_spectator_locked(
        &self,
        connection_id: ConnectionId,
        pin: &str,
        nickname: Nickname,
    ) -> CoreResult<()> {
        let mut room = self.load_room(pin).await?;
        let spectator = Spectator::new(connection_id, nickname);
        let token = spectator.token.clone();
        let joined = spectator_public(&spectator);
        room.add_spectator(spectator)?;
        let state = room.state;
        self.registry.save(room).await;

        self.sink.join_room_channel(pin, connection_id).await;
        tracing::info!(%connection_id, %pin, nickname = %joined.nickname, "Spectator joined room");
        self.emit(
            connection_id,
            ServerEvent::RoomJoinedSpectator {
                pin: pin.to_string(),
                spectator_id: joined.id,
                nickname: joined.nickname.clone(),
                token,
                state,
            },
        )
        .await;
        self.broadcast_except(
            pin,
            connection_id,
            ServerEvent::SpectatorJoined { spectator: joined },
        )
        .await;
        Ok(())
    }

    pub async fn leave_room(&self, connection_id: ConnectionId) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let mut room = self.load_room(&pin).await?;
        if room.is_host(connection_id) {
            return Err(CoreError::validation(
                "The host closes the room instead of leaving it",
            ));
        }

        if let Some(player) = room.remove_player(connection_id) {
            self.registry.save(room).await;
            self.sink.leave_room_channel(&pin, connection_id).await;
            self.emit(connection_id, ServerEvent::RoomLeft).await;
            self.broadcast(
                &pin,
                ServerEvent::PlayerLeft {
                    player_id: player.id,
                    nickname: player.nickname.as_str().to_string(),
                },
            )
            .await;
            return Ok(());
        }
        if let Some(spectator) = room.remove_spectator(connection_id) {
            self.registry.save(room).await;
            self.sink.leave_room_channel(&pin, connection_id).await;
            self.emit(connection_id, ServerEvent::RoomLeft).await;
            self.broadcast(
                &pin,
                ServerEvent::SpectatorLeft {
                    spectator_id: spectator.id,
                    nickname: spectator.nickname.as_str().to_string(),
                },
            )
            .await;
            return Ok(());
        }
        Err(CoreError::not_found("You are not in this room"))
    }

    /// Host tears the room down. Mid-game rooms are archived as
    /// interrupted first.
    pub async fn close_room(&self, connection_id: ConnectionId) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let room = self.load_room(&pin).await?;
        if !room.is_host(connection_id) {
            return Err(CoreError::forbidden("Only the host may close the room"));
        }

        self.timers.stop_timer(&pin);
        if room.has_quiz_snapshot() {
            self.save_interrupted_game(&pin, "host_closed").await?;
        } else {
            self.registry.remove(&pin).await;
        }
        self.broadcast(
            &pin,
            ServerEvent::RoomClosed {
                reason: "host_closed".to_string(),
            },
        )
        .await;
        self.sink.remove_room_channel(&pin).await;
        tracing::info!(%pin, "Room closed by host");
        Ok(())
    }

    pub async fn kick_player(
        &self,
        connection_id: ConnectionId,
        player_id: crate::protocol::PlayerId,
    ) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let mut room = self.load_room(&pin).await?;
        let removed = room.kick_player(player_id, connection_id)?;
        self.registry.save(room).await;

        self.emit(
            removed.connection_id,
            ServerEvent::YouWereKicked {
                reason: "kicked".to_string(),
            },
        )
        .await;
        self.sink
            .leave_room_channel(&pin, removed.connection_id)
            .await;
        self.broadcast(
            &pin,
            ServerEvent::PlayerKicked {
                player_id: removed.id,
                nickname: removed.nickname.as_str().to_string(),
            },
        )
        .await;
        Ok(())
    }

    pub async fn ban_player(
        &self,
        connection_id: ConnectionId,
        player_id: crate::protocol::PlayerId,
    ) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let mut room = self.load_room(&pin).await?;
        let removed = room.ban_player(player_id, connection_id)?;
        self.registry.save(room).await;

        self.emit(
            removed.connection_id,
            ServerEvent::YouWereKicked {
                reason: "banned".to_string(),
            },
        )
        .await;
        self.sink
            .leave_room_channel(&pin, removed.connection_id)
            .await;
        self.broadcast(
            &pin,
            ServerEvent::PlayerBanned {
                player_id: removed.id,
                nickname: removed.nickname.as_str().to_string(),
            },
        )
        .await;
        Ok(())
    }

    pub async fn unban_nickname(
        &self,
        connection_id: ConnectionId,
        nickname: String,
    ) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let mut room = self.load_room(&pin).await?;
        room.unban_nickname(&nickname, connection_id)?;
        let nicknames = room.banned_nicknames();
        self.registry.save(room).await;
        self.emit(connection_id, ServerEvent::BannedNicknames { nicknames })
            .await;
        Ok(())
    }

    pub async fn get_banned_nicknames(&self, connection_id: ConnectionId) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let room = self.load_room(&pin).await?;
        if !room.is_host(connection_id) {
            return Err(CoreError::forbidden("Only the host may view the ban list"));
        }
        self.emit(
            connection_id,
            ServerEvent::BannedNicknames {
                nicknames: room.banned_nicknames(),
            },
        )
        .await;
        Ok(())
    }

    pub async fn get_players(&self, connection_id: ConnectionId) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let room = self.load_room(&pin).await?;
        self.emit(
            connection_id,
            ServerEvent::Players {
                players: room.players.iter().map(player_public).collect(),
            },
        )
        .await;
        Ok(())
    }

    pub async fn get_spectators(&self, connection_id: ConnectionId) -> CoreResult<()> {
        let pin = self.pin_for_connection(connection_id).await?;
        let room = self.load_room(&pin).await?;
        self.emit(
            connection_id,
            ServerEvent::Spectators {
                spectators: room.spectators.iter().map(spectator_public).collect(),
            },
        )
        .await;
        Ok(())
    }

    /// Transport-loss bookkeeping. Hosts and mid-game players are marked
    /// disconnected (grace periods apply); lobby players are removed
    /// outright.
    pub(crate) async fn handle_room_disconnect(&self, connection_id: ConnectionId) {
        let Some(pin) = self.registry.pin_by_connection(connection_id).await else {
            return;
        };
        let Some(mut room) = self.registry.get(&pin).await else {
            return;
        };

        if room.is_host(connection_id) {
            room.set_host_disconnected();
            self.registry.save(room).await;
            self.broadcast(&pin, ServerEvent::HostDisconnected).await;
            tracing::info!(%pin, "Host disconnected");
        } else if room.find_player_by_connection(connection_id).is_some() {
            if room.state == RoomState::WaitingPlayers {
                if let Some(player) = room.remove_player(connection_id) {
                    self.registry.save(room).await;
                    self.broadcast(
                        &pin,
                        ServerEvent::PlayerLeft {
                            player_id: player.id,
                            nickname: player.nickname.as_str().to_string(),
                        },
                    )
                    .await;
                }
            } else {
                room.set_player_disconnected(connection_id);
                self.registry.save(room).await;
                tracing::debug!(%pin, %connection_id, "Player disconnected mid-game; grace period running");
            }
        } else if room.find_spectator_by_connection(connection_id).is_some() {
            room.set_spectator_disconnected(connection_id);
            self.registry.save(room).await;
        }
    }

    pub async fn reconnect_host(
        &self,
        connection_id: ConnectionId,
        token: String,
    ) -> CoreResult<()> {
        let pin = self
            .registry
            .pin_by_host_token(&token)
            .await
            .ok_or_else(|| CoreError::unauthorized("Unknown host token"))?;
        let mut room = self.load_room(&pin).await?;

        let new_token = generate_token();
        room.reconnect_host(
            connection_id,
            &token,
            self.config.server.host_grace(),
            self.config.server.token_ttl(),
            new_token.clone(),
        )?;
        let sync = ReconnectSync {
            pin: pin.clone(),
            state: room.state,
            current_question_index: room.current_question_index,
            score: None,
        };
        let in_answering = room.state == RoomState::AnsweringPhase;
        self.registry.save(room).await;

        self.sink.join_room_channel(&pin, connection_id).await;
        self.emit(
            connection_id,
            ServerEvent::HostReconnected {
                token: new_token,
                sync,
            },
        )
        .await;
        self.broadcast_except(&pin, connection_id, ServerEvent::HostReturned)
            .await;
        if in_answering {
            self.emit(
                connection_id,
                ServerEvent::TimerSync(self.timers.timer_sync(&pin)),
            )
            .await;
        }
        tracing::info!(%pin, %connection_id, "Host reconnected");
        Ok(())
    }

    pub async fn reconnect_player(
        &self,
        connection_id: ConnectionId,
        token: String,
    ) -> CoreResult<()> {
        let pin = self
            .registry
            .pin_by_participant_token(&token)
            .await
            .ok_or_else(|| CoreError::unauthorized("Unknown reconnect token"))?;
        let mut room = self.load_room(&pin).await?;

        let new_token = generate_token();
        let player = room.reconnect_player(
            &token,
            connection_id,
            self.config.server.player_grace(),
            self.config.server.token_ttl(),
            new_token.clone(),
        )?;
        let sync = ReconnectSync {
            pin: pin.clone(),
            state: room.state,
            current_question_index: room.current_question_index,
            score: Some(player.score.value()),
        };
        let in_answering = room.state == RoomState::AnsweringPhase;
        self.registry.save(room).await;

        self.sink.join_room_channel(&pin, connection_id).await;
        self.emit(
            connection_id,
            ServerEvent::PlayerReconnected {
                player_id: player.id,
                nickname: player.nickname.as_str().to_string(),
                token: new_token,
                sync,
            },
        )
        .await;
        if in_answering {
            self.emit(
                connection_id,
                ServerEvent::TimerSync(self.timers.timer_sync(&pin)),
            )
            .await;
        }
        tracing::info!(%pin, %connection_id, "Player reconnected");
        Ok(())
    }

    pub async fn reconnect_spectator(
        &self,
        connection_id: ConnectionId,
        token: String,
    ) -> CoreResult<()> {
        let pin = self
            .registry
            .pin_by_participant_token(&token)
            .await
            .ok_or_else(|| CoreError::unauthorized("Unknown reconnect token"))?;
        let mut room = self.load_room(&pin).await?;

        let new_token = generate_token();
        let spectator = room.reconnect_spectator(
            &token,
            connection_id,
            self.config.server.player_grace(),
            self.config.server.token_ttl(),
            new_token.clone(),
        )?;
        let sync = ReconnectSync {
            pin: pin.clone(),
            state: room.state,
            current_question_index: room.current_question_index,
            score: None,
        };
        let in_answering = room.state == RoomState::AnsweringPhase;
        self.registry.save(room).await;

        self.sink.join_room_channel(&pin, connection_id).await;
        self.emit(
            connection_id,
            ServerEvent::SpectatorReconnected {
                spectator_id: spectator.id,
                nickname: spectator.nickname.as_str().to_string(),
                token: new_token,
                sync,
            },
        )
        .await;
        if in_answering {
            self.emit(
                connection_id,
                ServerEvent::TimerSync(self.timers.timer_sync(&pin)),
            )
            .await;
        }
        Ok(())
    }
}
