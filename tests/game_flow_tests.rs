//! End-to-end game flow against an in-process server: rooms, rounds,
//! scoring, auto-advance, and archival.

mod common;

use common::{connect, create_room, drain, harness, harness_with, join, recv_event};
use quizroom_server::config::Config;
use quizroom_server::domain::{GameStatus, Question, QuestionKind, Quiz, RoomState};
use quizroom_server::protocol::{ClientEvent, ErrorCode, ServerEvent};
use quizroom_server::repository::GameSessionRepository;
use uuid::Uuid;

#[tokio::test]
async fn two_player_two_question_happy_path() {
    let h = harness().await;
    let (host_conn, mut host_rx) = connect(&h.server, Some(h.host_user)).await;
    let (pin, _host_token) = create_room(&h, host_conn, &mut host_rx).await;

    let (p1, mut p1_rx) = connect(&h.server, None).await;
    let (p2, mut p2_rx) = connect(&h.server, None).await;
    join(&h, &pin, "P1", p1, &mut p1_rx).await;
    join(&h, &pin, "P2", p2, &mut p2_rx).await;

    h.server.start_game(host_conn).await.unwrap();

    // Host sees the correct answer; players do not.
    let host_started = drain(&mut host_rx)
        .into_iter()
        .find_map(|event| match event {
            ServerEvent::GameStarted { question, .. } => Some(question),
            _ => None,
        })
        .expect("host GameStarted");
    assert_eq!(host_started.correct_answer_index, Some(1));

    let p1_started = drain(&mut p1_rx)
        .into_iter()
        .find_map(|event| match event {
            ServerEvent::GameStarted { question, .. } => Some(question),
            _ => None,
        })
        .expect("player GameStarted");
    assert_eq!(p1_started.correct_answer_index, None);

    // Round 1
    h.server.start_answering(host_conn).await.unwrap();
    h.server.submit_answer(p1, 1, 1000.0).await.unwrap();
    h.server.submit_answer(p2, 0, 2000.0).await.unwrap();

    let p1_events = drain(&mut p1_rx);
    assert!(p1_events
        .iter()
        .any(|event| matches!(event, ServerEvent::AnsweringStarted { time_limit_secs: 30, option_count: 4 })));
    assert!(p1_events
        .iter()
        .any(|event| matches!(event, ServerEvent::AnswerReceived { answer_index: 1, .. })));
    assert!(p1_events
        .iter()
        .any(|event| matches!(event, ServerEvent::AllPlayersAnswered)));

    let results = p1_events
        .iter()
        .find_map(|event| match event {
            ServerEvent::ShowResults {
                correct_answer_index,
                distribution,
                correct_count,
                total_players,
            } => Some((
                *correct_answer_index,
                distribution.clone(),
                *correct_count,
                *total_players,
            )),
            _ => None,
        })
        .expect("auto-advance broadcasts show_results");
    assert_eq!(results.0, 1);
    assert_eq!(results.1, vec![1, 1, 0, 0]);
    assert_eq!(results.2, 1);
    assert_eq!(results.3, 2);

    h.server.show_leaderboard(host_conn).await.unwrap();
    let board = drain(&mut p2_rx)
        .into_iter()
        .find_map(|event| match event {
            ServerEvent::Leaderboard { entries } => Some(entries),
            _ => None,
        })
        .expect("leaderboard broadcast");
    assert_eq!(board[0].nickname, "P1");
    assert!(board[0].score >= 983, "instant correct answer scores near full");
    assert_eq!(board[1].nickname, "P2");
    assert_eq!(board[1].score, 0);

    // Round 2: both correct; P1 streak reaches 2 and earns a 100 bonus.
    h.server.next_question(host_conn).await.unwrap();
    h.server.start_answering(host_conn).await.unwrap();
    h.server.submit_answer(p1, 1, 1000.0).await.unwrap();
    h.server.submit_answer(p2, 1, 1000.0).await.unwrap();

    let room = h.server.registry().get(&pin).await.expect("room still live");
    assert_eq!(room.state, RoomState::ShowResults);
    let p1_player = room
        .players
        .iter()
        .find(|player| player.nickname.as_str() == "P1")
        .unwrap();
    assert_eq!(p1_player.streak, 2);
    assert_eq!(p1_player.longest_streak, 2);

    let p1_bases: u32 = room
        .answer_history
        .iter()
        .filter(|record| record.player_id == p1_player.id)
        .map(|record| record.base_score)
        .sum();
    let p1_bonuses: u32 = room
        .answer_history
        .iter()
        .filter(|record| record.player_id == p1_player.id)
        .map(|record| record.streak_bonus)
        .sum();
    assert_eq!(p1_bonuses, 100, "second correct answer carries the bonus");
    assert_eq!(p1_player.score.value(), p1_bases + p1_bonuses);
}

#[tokio::test]
async fn double_submission_is_rejected() {
    let h = harness().await;
    let (host_conn, mut host_rx) = connect(&h.server, Some(h.host_user)).await;
    let (pin, _) = create_room(&h, host_conn, &mut host_rx).await;

    let (p1, mut p1_rx) = connect(&h.server, None).await;
    join(&h, &pin, "P1", p1, &mut p1_rx).await;
    let (p2, mut p2_rx) = connect(&h.server, None).await;
    join(&h, &pin, "P2", p2, &mut p2_rx).await;

    h.server.start_game(host_conn).await.unwrap();
    h.server.start_answering(host_conn).await.unwrap();

    h.server.submit_answer(p1, 1, 500.0).await.unwrap();
    let err = h.server.submit_answer(p1, 2, 900.0).await.unwrap_err();
    let message = err.to_string();
    assert!(
        message.contains("Already answered") || message.contains("Answer submission in progress"),
        "unexpected rejection: {message}"
    );

    // Only one record made it into the history.
    let room = h.server.registry().get(&pin).await.unwrap();
    assert_eq!(room.answer_history.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn timer_expiry_auto_ends_the_round() {
    let quiz = Quiz::new(
        "speedy",
        vec![Question::new(
            "fast one",
            QuestionKind::MultipleChoice,
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            0,
            5,
            1000,
            None,
        )
        .unwrap()],
    )
    .unwrap();
    let h = harness_with(Config::default(), quiz).await;

    let (host_conn, mut host_rx) = connect(&h.server, Some(h.host_user)).await;
    let (pin, _) = create_room(&h, host_conn, &mut host_rx).await;
    let (p1, mut p1_rx) = connect(&h.server, None).await;
    join(&h, &pin, "P1", p1, &mut p1_rx).await;

    h.server.start_game(host_conn).await.unwrap();
    h.server.start_answering(host_conn).await.unwrap();

    // Nobody answers; the 5 s timer runs out under virtual time.
    tokio::time::sleep(std::time::Duration::from_secs(6)).await;

    let events = drain(&mut p1_rx);
    assert!(events
        .iter()
        .any(|event| matches!(event, ServerEvent::TimeExpired)));
    let results = events
        .iter()
        .find_map(|event| match event {
            ServerEvent::ShowResults {
                distribution,
                correct_count,
                ..
            } => Some((distribution.clone(), *correct_count)),
            _ => None,
        })
        .expect("expiry broadcasts show_results");
    assert_eq!(results.0, vec![0, 0, 0, 0]);
    assert_eq!(results.1, 0);

    let room = h.server.registry().get(&pin).await.unwrap();
    assert_eq!(room.state, RoomState::ShowResults);
}

#[tokio::test]
async fn finishing_the_game_archives_it() {
    let h = harness().await;
    let (host_conn, mut host_rx) = connect(&h.server, Some(h.host_user)).await;
    let (pin, _) = create_room(&h, host_conn, &mut host_rx).await;

    let (p1, mut p1_rx) = connect(&h.server, None).await;
    join(&h, &pin, "P1", p1, &mut p1_rx).await;
    let (p2, mut p2_rx) = connect(&h.server, None).await;
    join(&h, &pin, "P2", p2, &mut p2_rx).await;

    h.server.start_game(host_conn).await.unwrap();
    for _ in 0..2 {
        h.server.start_answering(host_conn).await.unwrap();
        h.server.submit_answer(p1, 1, 700.0).await.unwrap();
        h.server.submit_answer(p2, 3, 900.0).await.unwrap();
        h.server.show_leaderboard(host_conn).await.unwrap();
        h.server.next_question(host_conn).await.unwrap();
    }

    // The room is gone; a completed archive exists.
    assert!(h.server.registry().get(&pin).await.is_none());
    let archives = h.sessions.get_recent(10).await.unwrap();
    assert_eq!(archives.len(), 1);
    let archive = &archives[0];
    assert_eq!(archive.status, GameStatus::Completed);
    assert_eq!(archive.pin, pin);
    assert_eq!(archive.player_count, 2);
    assert_eq!(archive.player_results.len(), 2);
    assert_eq!(archive.player_results[0].rank, 1);
    assert_eq!(archive.player_results[1].rank, 2);
    assert!(archive.duration_seconds() >= 0);

    // Archive law: answers carry base scores; player results fold in the
    // streak bonuses on top.
    let answer_total: u32 = archive.answers.iter().map(|answer| answer.score).sum();
    let result_total: u32 = archive
        .player_results
        .iter()
        .map(|result| result.score)
        .sum();
    let bonus_total = result_total - answer_total;
    assert_eq!(bonus_total, 100, "P1's second correct answer earns 100");

    let p1_events = drain(&mut p1_rx);
    assert!(p1_events
        .iter()
        .any(|event| matches!(event, ServerEvent::GameOver { .. })));
    assert!(p1_events.iter().any(|event| matches!(
        event,
        ServerEvent::RoomClosed { reason } if reason == "game_completed"
    )));
}

#[tokio::test]
async fn host_actions_require_authentication() {
    let h = harness().await;
    let (unauth_conn, mut rx) = connect(&h.server, None).await;

    h.server
        .handle_client_event(unauth_conn, ClientEvent::StartGame)
        .await;

    let event = recv_event(&mut rx).await;
    match event {
        ServerEvent::Error { code, .. } => assert_eq!(code, ErrorCode::Unauthorized),
        other => panic!("expected error event, got {other:?}"),
    }
}

#[tokio::test]
async fn over_limit_events_carry_retry_after() {
    let h = harness().await;
    let (conn, mut rx) = connect(&h.server, Some(Uuid::new_v4())).await;

    // create_room allows 3 per window; the 4th is refused.
    for _ in 0..4 {
        h.server
            .handle_client_event(
                conn,
                ClientEvent::CreateRoom {
                    quiz_id: Uuid::new_v4(),
                },
            )
            .await;
    }

    let events = drain(&mut rx);
    let rate_limited = events
        .iter()
        .find_map(|event| match event {
            ServerEvent::Error {
                code: ErrorCode::RateLimitExceeded,
                retry_after,
                ..
            } => Some(*retry_after),
            _ => None,
        })
        .expect("fourth create_room is rate limited");
    assert!(rate_limited.unwrap_or(0) >= 1);
}

#[tokio::test]
async fn pause_and_resume_from_leaderboard() {
    let h = harness().await;
    let (host_conn, mut host_rx) = connect(&h.server, Some(h.host_user)).await;
    let (pin, _) = create_room(&h, host_conn, &mut host_rx).await;
    let (p1, mut p1_rx) = connect(&h.server, None).await;
    join(&h, &pin, "P1", p1, &mut p1_rx).await;

    h.server.start_game(host_conn).await.unwrap();
    h.server.start_answering(host_conn).await.unwrap();
    h.server.submit_answer(p1, 1, 400.0).await.unwrap();
    h.server.show_leaderboard(host_conn).await.unwrap();

    h.server.pause_game(host_conn).await.unwrap();
    let room = h.server.registry().get(&pin).await.unwrap();
    assert_eq!(room.state, RoomState::Paused);

    h.server.resume_game(host_conn).await.unwrap();
    let room = h.server.registry().get(&pin).await.unwrap();
    assert_eq!(room.state, RoomState::Leaderboard);

    let events = drain(&mut p1_rx);
    assert!(events.iter().any(|event| matches!(event, ServerEvent::GamePaused)));
    assert!(events.iter().any(|event| matches!(event, ServerEvent::GameResumed)));
}

#[tokio::test]
async fn kicked_and_banned_players_are_notified() {
    let h = harness().await;
    let (host_conn, mut host_rx) = connect(&h.server, Some(h.host_user)).await;
    let (pin, _) = create_room(&h, host_conn, &mut host_rx).await;

    let (p1, mut p1_rx) = connect(&h.server, None).await;
    join(&h, &pin, "Rowdy", p1, &mut p1_rx).await;

    let room = h.server.registry().get(&pin).await.unwrap();
    let player_id = room.players[0].id;

    h.server.ban_player(host_conn, player_id).await.unwrap();

    let p1_events = drain(&mut p1_rx);
    assert!(p1_events.iter().any(|event| matches!(
        event,
        ServerEvent::YouWereKicked { reason } if reason == "banned"
    )));

    // The banned nickname cannot rejoin.
    let (p2, _p2_rx) = connect(&h.server, None).await;
    let err = h
        .server
        .join_room(p2, pin.clone(), "rowdy".to_string())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("banned"));
}
