#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use quizroom_server::config;
use quizroom_server::domain::{Question, QuestionKind, Quiz};
use quizroom_server::logging;
use quizroom_server::repository::{
    InMemoryGameSessionRepository, InMemoryQuizRepository, InMemoryUserRepository,
};
use quizroom_server::server::{GameServer, InMemoryEventSink};
use quizroom_server::websocket;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Quizroom -- realtime game-session core for a live quiz platform
#[derive(Parser, Debug)]
#[command(name = "quizroom-server")]
#[command(about = "Realtime game-session core for a live multiple-choice quiz platform")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,

    /// Insert a small demo quiz into the in-memory quiz store at startup
    /// and log its id, so a room can be created without an external store.
    #[arg(long)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config(&cfg);
    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Host grace: {} ms", cfg.server.host_grace_ms);
                println!("  Player grace: {} ms", cfg.server.player_grace_ms);
                println!("  Cleanup interval: {} ms", cfg.server.cleanup_interval_ms);
                println!("  Max players per room: {}", cfg.server.max_players);
                println!("  Max spectators per room: {}", cfg.server.max_spectators);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }
    validation_result.map_err(|e| anyhow::anyhow!(e))?;

    logging::init_with_config(&cfg.logging);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!(%addr, "Starting Quizroom server");

    let quizzes = Arc::new(InMemoryQuizRepository::new());
    if cli.seed_demo {
        let quiz = demo_quiz()?;
        let quiz_id = quiz.id;
        quizzes.insert(quiz).await;
        tracing::info!(%quiz_id, "Seeded demo quiz");
    }
    let sessions = Arc::new(InMemoryGameSessionRepository::new());
    let users = Arc::new(InMemoryUserRepository::new());
    let sink = Arc::new(InMemoryEventSink::new());

    let shutdown_deadline = cfg.server.shutdown_deadline();
    let server = GameServer::new(cfg, quizzes, sessions, users, sink);
    server.start_background_tasks();

    let router = websocket::create_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server started - WebSocket: /ws, Health: /healthz");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Transport is closed; archive in-flight games under the hard deadline.
    if tokio::time::timeout(shutdown_deadline, server.shutdown())
        .await
        .is_err()
    {
        tracing::error!("Graceful shutdown exceeded the deadline; exiting anyway");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received; draining");
}

fn demo_quiz() -> anyhow::Result<Quiz> {
    let questions = vec![
        Question::new(
            "2 + 2?",
            QuestionKind::MultipleChoice,
            vec!["3".into(), "4".into(), "5".into(), "6".into()],
            1,
            30,
            1000,
            None,
        )?,
        Question::new(
            "The capital of Australia is Sydney.",
            QuestionKind::TrueFalse,
            vec!["True".into(), "False".into()],
            1,
            15,
            500,
            None,
        )?,
    ];
    Ok(Quiz::new("Demo quiz", questions)?)
}

#[cfg(test)]
mod cli_tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn test_cli_default_no_flags() {
        let cli = Cli::try_parse_from(["quizroom-server"]).unwrap();
        assert!(!cli.validate_config);
        assert!(!cli.print_config);
        assert!(!cli.seed_demo);
    }

    #[test]
    fn test_cli_validate_config_short() {
        let cli = Cli::try_parse_from(["quizroom-server", "-c"]).unwrap();
        assert!(cli.validate_config);
    }

    #[test]
    fn test_cli_validate_and_print_config_conflict() {
        let result =
            Cli::try_parse_from(["quizroom-server", "--validate-config", "--print-config"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_demo_quiz_is_well_formed() {
        let quiz = super::demo_quiz().unwrap();
        assert_eq!(quiz.questions.len(), 2);
    }
}
