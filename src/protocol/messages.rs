use serde::{Deserialize, Serialize};

use super::error_codes::ErrorCode;
use super::types::{
    AnswerStats, LeaderboardEntry, PlayerId, PlayerPublicInfo, QuestionView, QuizId,
    ReconnectSync, SpectatorPublicInfo, TimerSyncPayload,
};
use crate::domain::room::RoomState;

/// Events sent from client to server.
///
/// Wire shape is `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Open a room for a quiz (requires an authenticated host)
    CreateRoom { quiz_id: QuizId },
    /// Join a room by PIN and nickname
    JoinRoom { pin: String, nickname: String },
    /// Join a room as a non-scoring observer (no authentication required)
    JoinAsSpectator { pin: String, nickname: String },
    /// Leave the current room
    LeaveRoom,
    /// Close the room (host only)
    CloseRoom,
    /// Start the game (host only)
    StartGame,
    /// Open the answering phase for the current question (host only)
    StartAnswering,
    /// Submit an answer to the current question.
    ///
    /// `elapsed_ms` is shape-validated but never trusted: the server
    /// substitutes the timer service's measurement.
    SubmitAnswer { answer_index: i64, elapsed_ms: f64 },
    /// End the answering phase early (host only)
    EndAnswering,
    /// Reveal the leaderboard (host only)
    ShowLeaderboard,
    /// Advance to the next question or finish the game (host only)
    NextQuestion,
    /// Pause the game from the leaderboard (host only)
    PauseGame,
    /// Resume a paused game (host only)
    ResumeGame,
    /// Remove a player from the room (host only)
    KickPlayer { player_id: PlayerId },
    /// Remove a player and ban their nickname (host only)
    BanPlayer { player_id: PlayerId },
    /// Lift a nickname ban (host only)
    UnbanNickname { nickname: String },
    /// Re-request the current question's results
    GetResults,
    /// Roster query
    GetPlayers,
    /// Spectator roster query
    GetSpectators,
    /// Ban list query (host only)
    GetBannedNicknames,
    /// Resume a host session after transport loss
    ReconnectHost { token: String },
    /// Resume a player session after transport loss
    ReconnectPlayer { token: String },
    /// Resume a spectator session after transport loss
    ReconnectSpectator { token: String },
}

impl ClientEvent {
    /// Wire name of the event, used as the rate-limiter key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "create_room",
            Self::JoinRoom { .. } => "join_room",
            Self::JoinAsSpectator { .. } => "join_as_spectator",
            Self::LeaveRoom => "leave_room",
            Self::CloseRoom => "close_room",
            Self::StartGame => "start_game",
            Self::StartAnswering => "start_answering",
            Self::SubmitAnswer { .. } => "submit_answer",
            Self::EndAnswering => "end_answering",
            Self::ShowLeaderboard => "show_leaderboard",
            Self::NextQuestion => "next_question",
            Self::PauseGame => "pause_game",
            Self::ResumeGame => "resume_game",
            Self::KickPlayer { .. } => "kick_player",
            Self::BanPlayer { .. } => "ban_player",
            Self::UnbanNickname { .. } => "unban_nickname",
            Self::GetResults => "get_results",
            Self::GetPlayers => "get_players",
            Self::GetSpectators => "get_spectators",
            Self::GetBannedNicknames => "get_banned_nicknames",
            Self::ReconnectHost { .. } => "reconnect_host",
            Self::ReconnectPlayer { .. } => "reconnect_player",
            Self::ReconnectSpectator { .. } => "reconnect_spectator",
        }
    }

    /// True for operations only the room's host may invoke.
    pub fn is_host_action(&self) -> bool {
        matches!(
            self,
            Self::CreateRoom { .. }
                | Self::CloseRoom
                | Self::StartGame
                | Self::StartAnswering
                | Self::EndAnswering
                | Self::ShowLeaderboard
                | Self::NextQuestion
                | Self::PauseGame
                | Self::ResumeGame
                | Self::KickPlayer { .. }
                | Self::BanPlayer { .. }
                | Self::UnbanNickname { .. }
                | Self::GetBannedNicknames
        )
    }
}

/// Events sent from server to client.
///
/// Room-scoped broadcasts unless the variant documentation says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// To the creating host only; carries the host reconnect token
    RoomCreated {
        pin: String,
        quiz_id: QuizId,
        host_token: String,
    },
    /// To the joining player only; carries the player reconnect token
    RoomJoined {
        pin: String,
        player_id: PlayerId,
        nickname: String,
        token: String,
        state: RoomState,
        players: Vec<PlayerPublicInfo>,
    },
    /// To the joining spectator only; carries the spectator reconnect token
    RoomJoinedSpectator {
        pin: String,
        spectator_id: PlayerId,
        nickname: String,
        token: String,
        state: RoomState,
    },
    /// Confirmation to a participant who left the room
    RoomLeft,
    PlayerJoined {
        player: PlayerPublicInfo,
    },
    SpectatorJoined {
        spectator: SpectatorPublicInfo,
    },
    PlayerLeft {
        player_id: PlayerId,
        nickname: String,
    },
    SpectatorLeft {
        spectator_id: PlayerId,
        nickname: String,
    },
    /// A stale disconnected player was removed by the cleanup sweep
    PlayerRemoved {
        player_id: PlayerId,
        nickname: String,
    },
    HostDisconnected,
    HostDisconnectedWarning {
        remaining_seconds: u64,
    },
    HostReturned,
    /// Host receives a host-data question; players receive the public view
    GameStarted {
        total_questions: usize,
        question: QuestionView,
    },
    QuestionIntro {
        total_questions: usize,
        question: QuestionView,
    },
    AnsweringStarted {
        time_limit_secs: u32,
        option_count: usize,
    },
    TimerStarted {
        duration_secs: u64,
    },
    TimerTick {
        remaining: u64,
        remaining_ms: u64,
    },
    TimeExpired,
    /// Private acknowledgement to the submitting player
    AnswerReceived {
        answer_index: usize,
        elapsed_ms: u64,
    },
    AnswerCountUpdated {
        answered: usize,
        total: usize,
    },
    AllPlayersAnswered,
    ShowResults {
        correct_answer_index: usize,
        distribution: Vec<u32>,
        correct_count: u32,
        total_players: usize,
    },
    RoundEnded,
    Leaderboard {
        entries: Vec<LeaderboardEntry>,
    },
    GameOver {
        podium: Vec<LeaderboardEntry>,
    },
    PlayerKicked {
        player_id: PlayerId,
        nickname: String,
    },
    PlayerBanned {
        player_id: PlayerId,
        nickname: String,
    },
    /// Direct to the removed participant
    YouWereKicked {
        reason: String,
    },
    GamePaused,
    GameResumed,
    RoomClosed {
        reason: String,
    },
    TimerSync(TimerSyncPayload),
    /// To the reconnecting player only; carries the rotated token
    PlayerReconnected {
        player_id: PlayerId,
        nickname: String,
        token: String,
        sync: ReconnectSync,
    },
    /// To the reconnecting host only; carries the rotated token
    HostReconnected {
        token: String,
        sync: ReconnectSync,
    },
    /// To the reconnecting spectator only; carries the rotated token
    SpectatorReconnected {
        spectator_id: PlayerId,
        nickname: String,
        token: String,
        sync: ReconnectSync,
    },
    /// Reply to `get_results`
    Results {
        correct_answer_index: usize,
        distribution: Vec<u32>,
        correct_count: u32,
        total_players: usize,
    },
    /// Reply to `get_players`
    Players {
        players: Vec<PlayerPublicInfo>,
    },
    /// Reply to `get_spectators`
    Spectators {
        spectators: Vec<SpectatorPublicInfo>,
    },
    /// Reply to `get_banned_nicknames`
    BannedNicknames {
        nicknames: Vec<String>,
    },
    /// Direct to the originator of a failed event
    Error {
        error: String,
        code: ErrorCode,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after: Option<u64>,
    },
}
