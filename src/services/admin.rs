use crate::db::{
    choice::{Choice, ChoiceId},
    question::{validate_question, validate_text, Question, QuestionId},
    Entity, PollStore, StoreError,
};
use crate::error::PollError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, instrument};

/// Fields to change on an existing question. `None` keeps the stored value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuestionEdit {
    pub text: Option<String>,
    pub publish_at: Option<DateTime<Utc>>,
    pub close_at: Option<DateTime<Utc>>,
}

/// Operator-side management of questions and choices. There is no web
/// surface for these; the `polls_admin` binary drives them.
pub struct AdminService {
    store: Arc<dyn PollStore>,
}

impl AdminService {
    pub fn new(store: Arc<dyn PollStore>) -> Self {
        Self { store }
    }

    /// Creates a question together with its choices. Every text and the
    /// schedule are checked before anything is written.
    #[instrument(skip(self, choices), fields(choices = choices.len()))]
    pub async fn create_poll(
        &self,
        text: &str,
        publish_at: DateTime<Utc>,
        close_at: DateTime<Utc>,
        choices: &[String],
    ) -> Result<(Question, Vec<Choice>), PollError> {
        validate_question(text, publish_at, close_at)?;
        for choice in choices {
            validate_text(choice)?;
        }

        let question = self.store.create_question(text, publish_at, close_at).await?;
        let mut created = Vec::with_capacity(choices.len());
        for choice in choices {
            created.push(self.store.add_choice(question.id, choice).await?);
        }
        info!(id = %question.id, "Created poll");
        Ok((question, created))
    }

    #[instrument(skip(self))]
    pub async fn edit_question(
        &self,
        id: QuestionId,
        edit: QuestionEdit,
    ) -> Result<Question, PollError> {
        let mut question = self
            .store
            .question_by_id(id)
            .await?
            .ok_or(StoreError::NotFound(Entity::Question))?;
        if let Some(text) = edit.text {
            question.text = text;
        }
        if let Some(publish_at) = edit.publish_at {
            question.publish_at = publish_at;
        }
        if let Some(close_at) = edit.close_at {
            question.close_at = close_at;
        }
        Ok(self.store.update_question(&question).await?)
    }

    pub async fn add_choice(
        &self,
        question_id: QuestionId,
        text: &str,
    ) -> Result<Choice, PollError> {
        Ok(self.store.add_choice(question_id, text).await?)
    }

    pub async fn delete_question(&self, id: QuestionId) -> Result<bool, PollError> {
        Ok(self.store.delete_question(id).await?)
    }

    pub async fn delete_choice(&self, id: ChoiceId) -> Result<bool, PollError> {
        Ok(self.store.delete_choice(id).await?)
    }

    /// Fills an empty store with one open poll so a server without a
    /// database has something to show.
    pub async fn seed_demo(&self, now: DateTime<Utc>) -> Result<Option<Question>, PollError> {
        if !self.store.published_questions(now, 1).await?.is_empty() {
            return Ok(None);
        }
        let choices = ["Not much".to_owned(), "The sky".to_owned()];
        let (question, _) = self
            .create_poll(
                "What's up?",
                now - Duration::minutes(1),
                now + Duration::days(30),
                &choices,
            )
            .await?;
        Ok(Some(question))
    }
}
