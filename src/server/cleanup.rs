use chrono::Utc;
use std::time::Duration;

use super::GameServer;
use crate::protocol::ServerEvent;

impl GameServer {
    /// Periodic sweep: stale players, abandoned hosts, orphaned and idle
    /// rooms, expired registry indexes and locks.
    pub fn spawn_cleanup_task(&self) {
        let Some(server) = self.strong_ref() else {
            return;
        };
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(server.config.server.cleanup_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if server.is_shutting_down() {
                    break;
                }
                server.cleanup_pass().await;
            }
        });
    }

    /// One sweep. Non-reentrant: if the previous pass is still running,
    /// this invocation is skipped.
    pub async fn cleanup_pass(&self) {
        if !self.claim_cleanup_slot() {
            tracing::debug!("Cleanup sweep still running; skipping this tick");
            return;
        }
        self.cleanup_pass_inner().await;
        self.release_cleanup_slot();
    }

    async fn cleanup_pass_inner(&self) {
        let cfg = &self.config.server;
        let now = Utc::now();
        let player_grace = cfg.player_grace();
        let host_grace = cfg.host_grace();
        let orphan_grace = host_grace.min(player_grace);

        for pin in self.registry.all_pins().await {
            let Some(mut room) = self.registry.get(&pin).await else {
                continue;
            };

            // 1. Remove players whose disconnect outlived the grace window.
            let removed_players = room.remove_stale_disconnected_players(player_grace);
            if !removed_players.is_empty() {
                self.registry.save(room.clone()).await;
                for player in &removed_players {
                    tracing::info!(%pin, nickname = %player.nickname, "Removed stale disconnected player");
                    self.broadcast(
                        &pin,
                        ServerEvent::PlayerRemoved {
                            player_id: player.id,
                            nickname: player.nickname.as_str().to_string(),
                        },
                    )
                    .await;
                }
            }

            let mut delete_reason: Option<&str> = None;

            // 2. Host abandonment.
            if let Some(disconnected_at) = room.host_disconnected_at {
                let elapsed = now
                    .signed_duration_since(disconnected_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if room.connected_player_count() == 0 && elapsed > orphan_grace {
                    delete_reason = Some("orphan_room");
                } else if elapsed > host_grace {
                    delete_reason = Some("host_timeout");
                } else {
                    let remaining_seconds =
                        host_grace.saturating_sub(elapsed).as_secs();
                    self.broadcast(
                        &pin,
                        ServerEvent::HostDisconnectedWarning { remaining_seconds },
                    )
                    .await;
                }
            }

            let age = now
                .signed_duration_since(room.created_at)
                .to_std()
                .unwrap_or(Duration::ZERO);

            // 3. Empty, never-started rooms.
            if delete_reason.is_none()
                && room.players.is_empty()
                && !room.state.is_active_game()
                && age > cfg.empty_room_timeout()
            {
                delete_reason = Some("empty_room");
            }

            // 4. Idle rooms; active games get double the budget.
            if delete_reason.is_none() {
                let active = room.state.is_active_game();
                let limit = if active {
                    cfg.idle_room_timeout() * 2
                } else {
                    cfg.idle_room_timeout()
                };
                if age > limit {
                    delete_reason = Some(if active { "game_timeout" } else { "idle_timeout" });
                }
            }

            // 5. Archive and delete marked rooms.
            if let Some(reason) = delete_reason {
                self.timers.stop_timer(&pin);
                if room.has_quiz_snapshot() {
                    match self.save_interrupted_game(&pin, reason).await {
                        Ok(_) => {}
                        Err(err) if err.is_benign_race() => {}
                        Err(err) => {
                            tracing::error!(%pin, error = %err, "Failed to archive room during cleanup");
                        }
                    }
                }
                // Tolerate "already deleted": the archive path removes the
                // room itself, and a concurrent closer may also have won.
                self.registry.remove(&pin).await;
                self.broadcast(
                    &pin,
                    ServerEvent::RoomClosed {
                        reason: reason.to_string(),
                    },
                )
                .await;
                self.sink.remove_room_channel(&pin).await;
                tracing::info!(%pin, reason, "Room removed by cleanup");
            }
        }

        // 6. Expired index entries and lock map entries.
        let swept_indexes = self.registry.sweep_stale_indexes(cfg.token_ttl()).await;
        let swept_locks = self.locks.cleanup_expired().await;
        if swept_indexes > 0 || swept_locks > 0 {
            tracing::debug!(swept_indexes, swept_locks, "Cleanup swept expired entries");
        }
    }
}
