pub mod choice;
pub mod postgres;
pub mod question;
pub mod session;
pub mod user;
pub mod vote;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use choice::{Choice, ChoiceId};
use question::{Question, QuestionId};
use session::{Session, SessionId};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::fmt;
use user::{User, UserId};
use vote::Vote;

/// Kind of row a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Question,
    Choice,
    User,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Question => "question",
            Entity::Choice => "choice",
            Entity::User => "user",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(Entity),

    #[error("question must close after it is published")]
    InvalidSchedule,

    #[error("text is longer than {0} characters")]
    TextTooLong(usize),

    #[error("username {0} is already taken")]
    DuplicateUsername(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Persistent storage for questions, choices, votes and accounts.
///
/// Implementations own the ownership rules: deleting a question removes its
/// choices and votes, deleting a choice clears it from votes, deleting a user
/// clears them from votes and ends their sessions. Each of these is atomic.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn create_question(
        &self,
        text: &str,
        publish_at: DateTime<Utc>,
        close_at: DateTime<Utc>,
    ) -> Result<Question, StoreError>;

    async fn update_question(&self, question: &Question) -> Result<Question, StoreError>;

    async fn delete_question(&self, id: QuestionId) -> Result<bool, StoreError>;

    async fn question_by_id(&self, id: QuestionId) -> Result<Option<Question>, StoreError>;

    /// Questions with `publish_at <= now`, most recently published first.
    async fn published_questions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Question>, StoreError>;

    async fn add_choice(&self, question_id: QuestionId, text: &str) -> Result<Choice, StoreError>;

    async fn delete_choice(&self, id: ChoiceId) -> Result<bool, StoreError>;

    /// Choices of a question in the order they were added.
    async fn choices_for_question(&self, id: QuestionId) -> Result<Vec<Choice>, StoreError>;

    async fn votes_for_question(&self, id: QuestionId) -> Result<Vec<Vote>, StoreError>;

    /// Points the user's ballot for the question at `choice_id`, creating it
    /// if needed, then recounts every choice of the question from the vote
    /// rows. Both steps happen as one unit per question.
    async fn record_vote(
        &self,
        question_id: QuestionId,
        choice_id: ChoiceId,
        user_id: UserId,
    ) -> Result<Vec<Choice>, StoreError>;

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError>;

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError>;

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn create_session(&self, user_id: UserId) -> Result<Session, StoreError>;

    async fn session_by_id(&self, id: SessionId) -> Result<Option<Session>, StoreError>;

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError>;
}

pub async fn new_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    new_pool_with(database_url.parse()?, max_connections).await
}

pub async fn new_pool_with(
    connect_options: PgConnectOptions,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(connect_options)
        .await
}
