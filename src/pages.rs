//! JSON documents returned by the page routes.

use crate::db::{
    choice::{Choice, ChoiceId},
    question::{Question, QuestionId},
};
use crate::notice::Notice;
use crate::services::polls::QuestionDetail;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize)]
pub struct QuestionSummary {
    pub id: QuestionId,
    pub text: String,
    pub publish_at: DateTime<Utc>,
    pub close_at: DateTime<Utc>,
    pub recently_published: bool,
    pub can_vote: bool,
}

impl QuestionSummary {
    pub fn new(question: &Question, now: DateTime<Utc>) -> Self {
        Self {
            id: question.id,
            text: question.text.clone(),
            publish_at: question.publish_at,
            close_at: question.close_at,
            recently_published: question.was_published_recently_at(now),
            can_vote: question.can_vote_at(now),
        }
    }
}

#[derive(Serialize)]
pub struct ChoiceOption {
    pub id: ChoiceId,
    pub text: String,
}

#[derive(Serialize)]
pub struct ChoiceTally {
    pub id: ChoiceId,
    pub text: String,
    pub votes: i32,
}

impl From<&Choice> for ChoiceOption {
    fn from(choice: &Choice) -> Self {
        Self {
            id: choice.id,
            text: choice.text.clone(),
        }
    }
}

impl From<&Choice> for ChoiceTally {
    fn from(choice: &Choice) -> Self {
        Self {
            id: choice.id,
            text: choice.text.clone(),
            votes: choice.vote_count,
        }
    }
}

#[derive(Serialize)]
pub struct IndexPage {
    pub questions: Vec<QuestionSummary>,
    pub notices: Vec<Notice>,
}

#[derive(Serialize)]
pub struct DetailPage {
    pub question: QuestionSummary,
    pub choices: Vec<ChoiceOption>,
    pub notices: Vec<Notice>,
}

impl DetailPage {
    pub fn new(detail: &QuestionDetail, notices: Vec<Notice>, now: DateTime<Utc>) -> Self {
        Self {
            question: QuestionSummary::new(&detail.question, now),
            choices: detail.choices.iter().map(ChoiceOption::from).collect(),
            notices,
        }
    }
}

#[derive(Serialize)]
pub struct ResultsPage {
    pub question: QuestionSummary,
    pub choices: Vec<ChoiceTally>,
    pub notices: Vec<Notice>,
}

impl ResultsPage {
    pub fn new(detail: &QuestionDetail, notices: Vec<Notice>, now: DateTime<Utc>) -> Self {
        Self {
            question: QuestionSummary::new(&detail.question, now),
            choices: detail.choices.iter().map(ChoiceTally::from).collect(),
            notices,
        }
    }
}

#[derive(Serialize)]
pub struct LoginPage {
    pub notices: Vec<Notice>,
}
