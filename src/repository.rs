use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::{GameSession, Quiz};
use crate::protocol::{QuizId, UserId};

/// A user as resolved by the auth collaborator. The core only reads it when
/// archiving a game on behalf of a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

/// Read-only access to the quiz store.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    async fn find_by_id(&self, id: &QuizId) -> Result<Option<Quiz>>;

    /// Best-effort play counter; failures are logged, never fatal.
    async fn increment_play_count(&self, id: &QuizId) -> Result<()>;
}

/// Durable store for finished and interrupted game archives.
#[async_trait]
pub trait GameSessionRepository: Send + Sync {
    async fn save(&self, session: GameSession) -> Result<GameSession>;

    /// Page through a host's archives, newest first. `page` is 1-based.
    async fn find_by_host(
        &self,
        host_user_id: &UserId,
        page: usize,
        limit: usize,
    ) -> Result<Vec<GameSession>>;

    async fn find_by_quiz(
        &self,
        quiz_id: &QuizId,
        page: usize,
        limit: usize,
    ) -> Result<Vec<GameSession>>;

    async fn get_recent(&self, limit: usize) -> Result<Vec<GameSession>>;

    /// Returns the number of deleted archives.
    async fn delete_by_quiz(&self, quiz_id: &QuizId) -> Result<usize>;

    async fn delete_by_host(&self, host_user_id: &UserId) -> Result<usize>;
}

/// Resolves host identity for archival.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>>;
}

// ===========================================================================
// In-memory implementations
// ===========================================================================

#[derive(Default)]
pub struct InMemoryQuizRepository {
    quizzes: RwLock<HashMap<QuizId, Quiz>>,
    play_counts: RwLock<HashMap<QuizId, u64>>,
}

impl InMemoryQuizRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, quiz: Quiz) {
        self.quizzes.write().await.insert(quiz.id, quiz);
    }

    pub async fn play_count(&self, id: &QuizId) -> u64 {
        self.play_counts.read().await.get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl QuizRepository for InMemoryQuizRepository {
    async fn find_by_id(&self, id: &QuizId) -> Result<Option<Quiz>> {
        Ok(self.quizzes.read().await.get(id).cloned())
    }

    async fn increment_play_count(&self, id: &QuizId) -> Result<()> {
        *self.play_counts.write().await.entry(*id).or_insert(0) += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryGameSessionRepository {
    sessions: RwLock<Vec<GameSession>>,
}

impl InMemoryGameSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn paginate(mut sessions: Vec<GameSession>, page: usize, limit: usize) -> Vec<GameSession> {
    sessions.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
    let start = page.saturating_sub(1).saturating_mul(limit);
    sessions.into_iter().skip(start).take(limit).collect()
}

#[async_trait]
impl GameSessionRepository for InMemoryGameSessionRepository {
    async fn save(&self, session: GameSession) -> Result<GameSession> {
        self.sessions.write().await.push(session.clone());
        Ok(session)
    }

    async fn find_by_host(
        &self,
        host_user_id: &UserId,
        page: usize,
        limit: usize,
    ) -> Result<Vec<GameSession>> {
        let matching: Vec<GameSession> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|session| session.host_user_id == *host_user_id)
            .cloned()
            .collect();
        Ok(paginate(matching, page, limit))
    }

    async fn find_by_quiz(
        &self,
        quiz_id: &QuizId,
        page: usize,
        limit: usize,
    ) -> Result<Vec<GameSession>> {
        let matching: Vec<GameSession> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|session| session.quiz_id == *quiz_id)
            .cloned()
            .collect();
        Ok(paginate(matching, page, limit))
    }

    async fn get_recent(&self, limit: usize) -> Result<Vec<GameSession>> {
        let all: Vec<GameSession> = self.sessions.read().await.clone();
        Ok(paginate(all, 1, limit))
    }

    async fn delete_by_quiz(&self, quiz_id: &QuizId) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|session| session.quiz_id != *quiz_id);
        Ok(before - sessions.len())
    }

    async fn delete_by_host(&self, host_user_id: &UserId) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|session| session.host_user_id != *host_user_id);
        Ok(before - sessions.len())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GameStatus, Question, QuestionKind, Room};
    use crate::domain::{generate_token, Pin};
    use uuid::Uuid;

    fn quiz() -> Quiz {
        Quiz::new(
            "geography",
            vec![Question::new(
                "Capital of France?",
                QuestionKind::MultipleChoice,
                vec!["Paris".into(), "Lyon".into()],
                0,
                20,
                1000,
                None,
            )
            .unwrap()],
        )
        .unwrap()
    }

    fn session_for(host: UserId, quiz_id: QuizId) -> GameSession {
        let mut room = Room::new(
            Pin::parse("042137").unwrap(),
            Uuid::new_v4(),
            host,
            generate_token(),
            quiz_id,
            50,
            10,
        );
        room.game_started_at = Some(chrono::Utc::now());
        GameSession::assemble(&room, GameStatus::Completed, None)
    }

    #[tokio::test]
    async fn quiz_round_trip_and_play_count() {
        let repo = InMemoryQuizRepository::new();
        let quiz = quiz();
        let id = quiz.id;
        repo.insert(quiz).await;

        assert!(repo.find_by_id(&id).await.unwrap().is_some());
        repo.increment_play_count(&id).await.unwrap();
        repo.increment_play_count(&id).await.unwrap();
        assert_eq!(repo.play_count(&id).await, 2);
    }

    #[tokio::test]
    async fn sessions_filter_by_host_and_quiz() {
        let repo = InMemoryGameSessionRepository::new();
        let host_a = Uuid::new_v4();
        let host_b = Uuid::new_v4();
        let quiz_id = Uuid::new_v4();

        repo.save(session_for(host_a, quiz_id)).await.unwrap();
        repo.save(session_for(host_a, Uuid::new_v4())).await.unwrap();
        repo.save(session_for(host_b, quiz_id)).await.unwrap();

        assert_eq!(repo.find_by_host(&host_a, 1, 10).await.unwrap().len(), 2);
        assert_eq!(repo.find_by_quiz(&quiz_id, 1, 10).await.unwrap().len(), 2);
        assert_eq!(repo.get_recent(2).await.unwrap().len(), 2);

        assert_eq!(repo.delete_by_quiz(&quiz_id).await.unwrap(), 2);
        assert_eq!(repo.delete_by_host(&host_a).await.unwrap(), 1);
        assert_eq!(repo.count().await, 0);
    }

    #[tokio::test]
    async fn pagination_is_one_based() {
        let repo = InMemoryGameSessionRepository::new();
        let host = Uuid::new_v4();
        for _ in 0..5 {
            repo.save(session_for(host, Uuid::new_v4())).await.unwrap();
        }
        assert_eq!(repo.find_by_host(&host, 1, 2).await.unwrap().len(), 2);
        assert_eq!(repo.find_by_host(&host, 3, 2).await.unwrap().len(), 1);
        assert_eq!(repo.find_by_host(&host, 4, 2).await.unwrap().len(), 0);
    }
}
