use super::question::QuestionId;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use std::fmt;

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct ChoiceId(pub Uuid);

impl ChoiceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChoiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// One selectable option of a question.
///
/// `vote_count` is a cache. It is only ever written by a full recount of the
/// question's votes, never incremented in place.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct Choice {
    pub id: ChoiceId,
    pub question_id: QuestionId,
    pub text: String,
    pub vote_count: i32,
}
