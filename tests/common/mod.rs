//! Shared harness for the integration suites: an in-process server wired
//! to in-memory repositories and a channel-backed event sink.
#![allow(dead_code)]

use quizroom_server::config::Config;
use quizroom_server::domain::{Question, QuestionKind, Quiz};
use quizroom_server::protocol::{ConnectionId, QuizId, ServerEvent, UserId};
use quizroom_server::repository::{
    InMemoryGameSessionRepository, InMemoryQuizRepository, InMemoryUserRepository,
};
use quizroom_server::server::{GameServer, InMemoryEventSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct TestHarness {
    pub server: Arc<GameServer>,
    pub sessions: Arc<InMemoryGameSessionRepository>,
    pub quizzes: Arc<InMemoryQuizRepository>,
    pub quiz_id: QuizId,
    pub host_user: UserId,
}

/// The two-question arithmetic quiz from the happy-path scenario.
pub fn arithmetic_quiz() -> Quiz {
    Quiz::new(
        "arithmetic",
        vec![
            Question::new(
                "2+2?",
                QuestionKind::MultipleChoice,
                vec!["3".into(), "4".into(), "5".into(), "6".into()],
                1,
                30,
                1000,
                None,
            )
            .unwrap(),
            Question::new(
                "3+3?",
                QuestionKind::MultipleChoice,
                vec!["5".into(), "6".into(), "7".into(), "8".into()],
                1,
                30,
                1000,
                None,
            )
            .unwrap(),
        ],
    )
    .unwrap()
}

pub async fn harness_with(config: Config, quiz: Quiz) -> TestHarness {
    let quizzes = Arc::new(InMemoryQuizRepository::new());
    let quiz_id = quiz.id;
    quizzes.insert(quiz).await;

    let sessions = Arc::new(InMemoryGameSessionRepository::new());
    let users = Arc::new(InMemoryUserRepository::new());
    let sink = Arc::new(InMemoryEventSink::new());

    let server = GameServer::new(
        config,
        quizzes.clone(),
        sessions.clone(),
        users,
        sink,
    );

    TestHarness {
        server,
        sessions,
        quizzes,
        quiz_id,
        host_user: Uuid::new_v4(),
    }
}

pub async fn harness() -> TestHarness {
    harness_with(Config::default(), arithmetic_quiz()).await
}

/// Register a connection with a capturing outbound queue.
pub async fn connect(
    server: &Arc<GameServer>,
    user_id: Option<UserId>,
) -> (ConnectionId, mpsc::Receiver<Arc<ServerEvent>>) {
    let (tx, rx) = mpsc::channel(256);
    let connection_id = Uuid::new_v4();
    server.register_connection(connection_id, user_id, tx).await;
    (connection_id, rx)
}

/// Everything queued so far, without waiting.
pub fn drain(rx: &mut mpsc::Receiver<Arc<ServerEvent>>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push((*event).clone());
    }
    events
}

/// Await the next event, bounded so a missing broadcast fails the test
/// instead of hanging it.
pub async fn recv_event(rx: &mut mpsc::Receiver<Arc<ServerEvent>>) -> ServerEvent {
    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed");
    (*event).clone()
}

/// Create a room and return (pin, host token) from the RoomCreated event.
pub async fn create_room(
    harness: &TestHarness,
    host_conn: ConnectionId,
    host_rx: &mut mpsc::Receiver<Arc<ServerEvent>>,
) -> (String, String) {
    harness
        .server
        .create_room(host_conn, harness.quiz_id)
        .await
        .expect("room creation succeeds");
    match recv_event(host_rx).await {
        ServerEvent::RoomCreated {
            pin, host_token, ..
        } => (pin, host_token),
        other => panic!("expected RoomCreated, got {other:?}"),
    }
}

/// Join a room and return the player's reconnect token.
pub async fn join(
    harness: &TestHarness,
    pin: &str,
    nickname: &str,
    conn: ConnectionId,
    rx: &mut mpsc::Receiver<Arc<ServerEvent>>,
) -> String {
    harness
        .server
        .join_room(conn, pin.to_string(), nickname.to_string())
        .await
        .expect("join succeeds");
    match recv_event(rx).await {
        ServerEvent::RoomJoined { token, .. } => token,
        other => panic!("expected RoomJoined, got {other:?}"),
    }
}
