use super::{
    choice::{Choice, ChoiceId},
    new_pool,
    question::{validate_question, validate_text, Question, QuestionId},
    session::{Session, SessionId},
    user::{User, UserId},
    vote::{Vote, VoteId},
    Entity, PollStore, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info, instrument};

const QUESTION_COLUMNS: &str = "id, text, publish_at, close_at";
const CHOICE_COLUMNS: &str = "id, question_id, text, vote_count";

/// Postgres-backed [`PollStore`].
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = new_pool(database_url, max_connections).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }
}

fn map_unique_username(err: sqlx::Error, username: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::DuplicateUsername(username.to_owned())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl PollStore for PgStore {
    #[instrument(skip(self))]
    async fn create_question(
        &self,
        text: &str,
        publish_at: DateTime<Utc>,
        close_at: DateTime<Utc>,
    ) -> Result<Question, StoreError> {
        validate_question(text, publish_at, close_at)?;
        let question = sqlx::query_as::<_, Question>(&format!(
            "INSERT INTO questions (id, text, publish_at, close_at) VALUES ($1, $2, $3, $4) RETURNING {}",
            QUESTION_COLUMNS
        ))
        .bind(QuestionId::new())
        .bind(text)
        .bind(publish_at)
        .bind(close_at)
        .fetch_one(&self.pool)
        .await?;
        debug!(id = %question.id, "Created question");
        Ok(question)
    }

    #[instrument(skip(self), fields(id = %question.id))]
    async fn update_question(&self, question: &Question) -> Result<Question, StoreError> {
        validate_question(&question.text, question.publish_at, question.close_at)?;
        sqlx::query_as::<_, Question>(&format!(
            "UPDATE questions SET text = $2, publish_at = $3, close_at = $4 WHERE id = $1 RETURNING {}",
            QUESTION_COLUMNS
        ))
        .bind(question.id)
        .bind(&question.text)
        .bind(question.publish_at)
        .bind(question.close_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(Entity::Question))
    }

    #[instrument(skip(self))]
    async fn delete_question(&self, id: QuestionId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM votes WHERE question_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM choices WHERE question_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        tx.commit().await?;
        debug!(deleted, "Deleted question");
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn question_by_id(&self, id: QuestionId) -> Result<Option<Question>, StoreError> {
        debug!("Retrieving question by id");
        let question = sqlx::query_as::<_, Question>(&format!(
            "SELECT {} FROM questions WHERE id = $1",
            QUESTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(question)
    }

    #[instrument(skip(self))]
    async fn published_questions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Question>, StoreError> {
        let questions = sqlx::query_as::<_, Question>(&format!(
            "SELECT {} FROM questions WHERE publish_at <= $1 ORDER BY publish_at DESC LIMIT $2",
            QUESTION_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        debug!("Found {} published questions", questions.len());
        Ok(questions)
    }

    #[instrument(skip(self))]
    async fn add_choice(&self, question_id: QuestionId, text: &str) -> Result<Choice, StoreError> {
        validate_text(text)?;
        sqlx::query_as::<_, Choice>(&format!(
            r#"
            INSERT INTO choices (id, question_id, text)
            SELECT $1, q.id, $3 FROM questions q WHERE q.id = $2
            RETURNING {}
            "#,
            CHOICE_COLUMNS
        ))
        .bind(ChoiceId::new())
        .bind(question_id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(Entity::Question))
    }

    #[instrument(skip(self))]
    async fn delete_choice(&self, id: ChoiceId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE votes SET choice_id = NULL WHERE choice_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM choices WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        tx.commit().await?;
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn choices_for_question(&self, id: QuestionId) -> Result<Vec<Choice>, StoreError> {
        let choices = sqlx::query_as::<_, Choice>(&format!(
            "SELECT {} FROM choices WHERE question_id = $1 ORDER BY ordinal",
            CHOICE_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(choices)
    }

    #[instrument(skip(self))]
    async fn votes_for_question(&self, id: QuestionId) -> Result<Vec<Vote>, StoreError> {
        let votes = sqlx::query_as::<_, Vote>(
            "SELECT id, question_id, choice_id, user_id FROM votes WHERE question_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(votes)
    }

    #[instrument(skip(self))]
    async fn record_vote(
        &self,
        question_id: QuestionId,
        choice_id: ChoiceId,
        user_id: UserId,
    ) -> Result<Vec<Choice>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises concurrent ballots on the same question.
        let locked: Option<(QuestionId,)> =
            sqlx::query_as("SELECT id FROM questions WHERE id = $1 FOR UPDATE")
                .bind(question_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound(Entity::Question));
        }

        let owned: Option<(ChoiceId,)> =
            sqlx::query_as("SELECT id FROM choices WHERE id = $1 AND question_id = $2")
                .bind(choice_id)
                .bind(question_id)
                .fetch_optional(&mut *tx)
                .await?;
        if owned.is_none() {
            return Err(StoreError::NotFound(Entity::Choice));
        }

        sqlx::query(
            r#"
            INSERT INTO votes (id, question_id, choice_id, user_id) VALUES ($1, $2, $3, $4)
            ON CONFLICT (question_id, user_id) DO UPDATE SET choice_id = EXCLUDED.choice_id
            "#,
        )
        .bind(VoteId::new())
        .bind(question_id)
        .bind(choice_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE choices AS c SET vote_count = (
                SELECT COUNT(*) FROM votes v WHERE v.question_id = c.question_id AND v.choice_id = c.id
            )
            WHERE c.question_id = $1
            "#,
        )
        .bind(question_id)
        .execute(&mut *tx)
        .await?;

        let choices = sqlx::query_as::<_, Choice>(&format!(
            "SELECT {} FROM choices WHERE question_id = $1 ORDER BY ordinal",
            CHOICE_COLUMNS
        ))
        .bind(question_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(user_id = user_id.as_string().as_str(), "Recorded vote");
        Ok(choices)
    }

    #[instrument(skip(self, password_hash))]
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, password_hash) VALUES ($1, $2, $3)
            RETURNING id, username, password_hash
            "#,
        )
        .bind(UserId::new())
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| map_unique_username(err, username))
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE votes SET user_id = NULL WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        tx.commit().await?;
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn create_session(&self, user_id: UserId) -> Result<Session, StoreError> {
        debug!(
            user_id = user_id.as_string().as_str(),
            "Save new session for user"
        );
        let session = sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, user_id) VALUES ($1, $2) RETURNING id, user_id",
        )
        .bind(SessionId::new())
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn session_by_id(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let session =
            sqlx::query_as::<_, Session>("SELECT id, user_id FROM sessions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
