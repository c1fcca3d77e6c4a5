use crate::db::{
    choice::{Choice, ChoiceId},
    question::{Question, QuestionId},
    user::User,
    Entity, PollStore, StoreError,
};
use crate::error::PollError;
use crate::notice::Notice;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Most questions the listing ever shows.
pub const LISTING_LIMIT: i64 = 1000;

/// A published question with its choices and any notices for the viewer.
#[derive(Clone, Debug, PartialEq)]
pub struct QuestionDetail {
    pub question: Question,
    pub choices: Vec<Choice>,
    pub notices: Vec<Notice>,
}

/// Outcome of a successful ballot.
#[derive(Clone, Debug, PartialEq)]
pub struct VoteReceipt {
    pub question: Question,
    pub choices: Vec<Choice>,
    pub notice: Notice,
}

pub struct PollService {
    store: Arc<dyn PollStore>,
    enforce_voting_window: bool,
}

impl PollService {
    pub fn new(store: Arc<dyn PollStore>, enforce_voting_window: bool) -> Self {
        Self {
            store,
            enforce_voting_window,
        }
    }

    /// Published questions, newest first, capped at [`LISTING_LIMIT`].
    pub async fn visible_questions(&self, now: DateTime<Utc>) -> Result<Vec<Question>, PollError> {
        Ok(self.store.published_questions(now, LISTING_LIMIT).await?)
    }

    /// Unpublished questions are indistinguishable from missing ones.
    pub async fn published_question(
        &self,
        id: QuestionId,
        now: DateTime<Utc>,
    ) -> Result<Question, PollError> {
        match self.store.question_by_id(id).await? {
            Some(question) if question.is_published_at(now) => Ok(question),
            _ => Err(PollError::NotFound),
        }
    }

    /// Voting page. Requires a user; a closed question is still shown, with a
    /// warning.
    #[instrument(skip(self, user))]
    pub async fn detail(
        &self,
        id: QuestionId,
        user: Option<&User>,
        now: DateTime<Utc>,
    ) -> Result<QuestionDetail, PollError> {
        if user.is_none() {
            return Err(PollError::Unauthenticated);
        }
        let question = self.published_question(id, now).await?;
        let choices = self.store.choices_for_question(id).await?;
        let mut notices = vec![];
        if !question.can_vote_at(now) {
            debug!("Voting is closed");
            notices.push(Notice::VotingClosed);
        }
        Ok(QuestionDetail {
            question,
            choices,
            notices,
        })
    }

    pub async fn results(
        &self,
        id: QuestionId,
        now: DateTime<Utc>,
    ) -> Result<QuestionDetail, PollError> {
        let question = self.published_question(id, now).await?;
        let choices = self.store.choices_for_question(id).await?;
        Ok(QuestionDetail {
            question,
            choices,
            notices: vec![],
        })
    }

    /// Records `user`'s ballot for the question and returns the recounted
    /// choices.
    #[instrument(skip(self, user), fields(user = ?user.map(|u| &u.username)))]
    pub async fn cast_vote(
        &self,
        id: QuestionId,
        choice: Option<ChoiceId>,
        user: Option<&User>,
        now: DateTime<Utc>,
    ) -> Result<VoteReceipt, PollError> {
        let user = user.ok_or(PollError::Unauthenticated)?;
        let question = self.published_question(id, now).await?;
        if self.enforce_voting_window && !question.can_vote_at(now) {
            return Err(PollError::VotingClosed);
        }
        let choice = choice.ok_or(PollError::InvalidChoice)?;

        let choices = match self.store.record_vote(id, choice, user.id).await {
            Ok(choices) => choices,
            Err(StoreError::NotFound(Entity::Choice)) => return Err(PollError::InvalidChoice),
            Err(StoreError::NotFound(_)) => return Err(PollError::NotFound),
            Err(err) => return Err(err.into()),
        };
        info!("Vote recorded");
        Ok(VoteReceipt {
            question,
            choices,
            notice: Notice::VoteRecorded,
        })
    }
}
