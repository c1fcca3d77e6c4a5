use super::{choice::ChoiceId, question::QuestionId, user::UserId};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct VoteId(pub Uuid);

impl VoteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VoteId {
    fn default() -> Self {
        Self::new()
    }
}

/// A user's current ballot for one question.
///
/// `choice_id` clears when the choice is deleted and `user_id` clears when the
/// account is deleted; the row itself only goes away with its question.
#[derive(Clone, PartialEq, Eq, Debug, sqlx::FromRow)]
pub struct Vote {
    pub id: VoteId,
    pub question_id: QuestionId,
    pub choice_id: Option<ChoiceId>,
    pub user_id: Option<UserId>,
}
