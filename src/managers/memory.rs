use crate::db::{
    choice::{Choice, ChoiceId},
    question::{validate_question, validate_text, Question, QuestionId},
    session::{Session, SessionId},
    user::{User, UserId},
    vote::{Vote, VoteId},
    Entity, PollStore, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

#[derive(Default)]
struct Tables {
    questions: Vec<Question>,
    choices: Vec<Choice>,
    votes: Vec<Vote>,
    users: HashMap<UserId, User>,
    sessions: HashMap<SessionId, Session>,
}

impl Tables {
    fn recount(&mut self, question_id: QuestionId) {
        let votes = &self.votes;
        for choice in self
            .choices
            .iter_mut()
            .filter(|c| c.question_id == question_id)
        {
            choice.vote_count = votes
                .iter()
                .filter(|v| v.question_id == question_id && v.choice_id == Some(choice.id))
                .count() as i32;
        }
    }

    fn choices_for(&self, question_id: QuestionId) -> Vec<Choice> {
        self.choices
            .iter()
            .filter(|c| c.question_id == question_id)
            .cloned()
            .collect()
    }
}

/// In-process [`PollStore`] with the same ownership and uniqueness rules as
/// the Postgres store. All operations take one lock, so every call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn create_question(
        &self,
        text: &str,
        publish_at: DateTime<Utc>,
        close_at: DateTime<Utc>,
    ) -> Result<Question, StoreError> {
        validate_question(text, publish_at, close_at)?;
        let question = Question {
            id: QuestionId::new(),
            text: text.to_owned(),
            publish_at,
            close_at,
        };
        self.tables.lock().await.questions.push(question.clone());
        Ok(question)
    }

    async fn update_question(&self, question: &Question) -> Result<Question, StoreError> {
        validate_question(&question.text, question.publish_at, question.close_at)?;
        let mut tables = self.tables.lock().await;
        let stored = tables
            .questions
            .iter_mut()
            .find(|q| q.id == question.id)
            .ok_or(StoreError::NotFound(Entity::Question))?;
        *stored = question.clone();
        Ok(question.clone())
    }

    async fn delete_question(&self, id: QuestionId) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.questions.len();
        tables.questions.retain(|q| q.id != id);
        if tables.questions.len() == before {
            return Ok(false);
        }
        tables.choices.retain(|c| c.question_id != id);
        tables.votes.retain(|v| v.question_id != id);
        Ok(true)
    }

    async fn question_by_id(&self, id: QuestionId) -> Result<Option<Question>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.questions.iter().find(|q| q.id == id).cloned())
    }

    async fn published_questions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Question>, StoreError> {
        let tables = self.tables.lock().await;
        let mut questions: Vec<Question> = tables
            .questions
            .iter()
            .filter(|q| q.is_published_at(now))
            .cloned()
            .collect();
        questions.sort_by(|a, b| b.publish_at.cmp(&a.publish_at));
        questions.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(questions)
    }

    async fn add_choice(&self, question_id: QuestionId, text: &str) -> Result<Choice, StoreError> {
        validate_text(text)?;
        let mut tables = self.tables.lock().await;
        if !tables.questions.iter().any(|q| q.id == question_id) {
            return Err(StoreError::NotFound(Entity::Question));
        }
        let choice = Choice {
            id: ChoiceId::new(),
            question_id,
            text: text.to_owned(),
            vote_count: 0,
        };
        tables.choices.push(choice.clone());
        Ok(choice)
    }

    async fn delete_choice(&self, id: ChoiceId) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.choices.len();
        tables.choices.retain(|c| c.id != id);
        if tables.choices.len() == before {
            return Ok(false);
        }
        for vote in tables.votes.iter_mut().filter(|v| v.choice_id == Some(id)) {
            vote.choice_id = None;
        }
        Ok(true)
    }

    async fn choices_for_question(&self, id: QuestionId) -> Result<Vec<Choice>, StoreError> {
        Ok(self.tables.lock().await.choices_for(id))
    }

    async fn votes_for_question(&self, id: QuestionId) -> Result<Vec<Vote>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .votes
            .iter()
            .filter(|v| v.question_id == id)
            .cloned()
            .collect())
    }

    #[instrument(skip(self))]
    async fn record_vote(
        &self,
        question_id: QuestionId,
        choice_id: ChoiceId,
        user_id: UserId,
    ) -> Result<Vec<Choice>, StoreError> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        if !tables.questions.iter().any(|q| q.id == question_id) {
            return Err(StoreError::NotFound(Entity::Question));
        }
        if !tables
            .choices
            .iter()
            .any(|c| c.id == choice_id && c.question_id == question_id)
        {
            return Err(StoreError::NotFound(Entity::Choice));
        }

        match tables
            .votes
            .iter_mut()
            .find(|v| v.question_id == question_id && v.user_id == Some(user_id))
        {
            Some(vote) => {
                debug!("Replacing existing vote");
                vote.choice_id = Some(choice_id);
            }
            None => tables.votes.push(Vote {
                id: VoteId::new(),
                question_id,
                choice_id: Some(choice_id),
                user_id: Some(user_id),
            }),
        }

        tables.recount(question_id);
        Ok(tables.choices_for(question_id))
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.username == username) {
            return Err(StoreError::DuplicateUsername(username.to_owned()));
        }
        let user = User {
            id: UserId::new(),
            username: username.to_owned(),
            password_hash: password_hash.to_owned(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }
        for vote in tables.votes.iter_mut().filter(|v| v.user_id == Some(id)) {
            vote.user_id = None;
        }
        tables.sessions.retain(|_, s| s.user_id != id);
        Ok(true)
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_session(&self, user_id: UserId) -> Result<Session, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound(Entity::User));
        }
        let session = Session {
            id: SessionId::new(),
            user_id,
        };
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn session_by_id(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.tables.lock().await.sessions.get(&id).cloned())
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.sessions.remove(&id).is_some())
    }
}
