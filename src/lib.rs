#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Quizroom Server
//!
//! Realtime game-session core for a live multiple-choice quiz platform.
//!
//! A host opens a room identified by a 6-digit PIN, players join by
//! PIN+nickname, the host drives the group through timed questions, and the
//! server computes authoritative per-question scores and the final ranking.
//! State lives in memory; finished or interrupted games are archived through
//! a repository interface.

/// Server configuration and environment variables
pub mod config;

/// Domain model: rooms, questions, participants, scoring, archives
pub mod domain;

/// Error taxonomy shared across use-cases and the wire
pub mod error;

/// Keyed expiring locks guarding concurrent room operations
pub mod locks;

/// Structured logging configuration
pub mod logging;

/// WebSocket message protocol definitions
pub mod protocol;

/// Rate limiting implementation
pub mod rate_limit;

/// In-memory room registry with token and socket indexes
pub mod registry;

/// Repository interfaces for quizzes, users and game-session archives
pub mod repository;

/// Main server orchestration
pub mod server;

/// WebSocket connection handling
pub mod websocket;
