use crate::db::StoreError;
use crate::notice::Notice;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("question not found")]
    NotFound,

    #[error("no valid choice was selected")]
    InvalidChoice,

    #[error("voting is closed for this question")]
    VotingClosed,

    #[error("login required")]
    Unauthenticated,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PollError {
    /// Notice shown to the user when the error is recovered locally.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            PollError::InvalidChoice => Some(Notice::NoChoice),
            PollError::VotingClosed => Some(Notice::VotingClosed),
            PollError::Unauthenticated => Some(Notice::LoginRequired),
            PollError::InvalidCredentials => Some(Notice::LoginFailed),
            _ => None,
        }
    }
}

impl ResponseError for PollError {
    fn status_code(&self) -> StatusCode {
        match self {
            PollError::NotFound | PollError::Store(StoreError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            PollError::InvalidChoice | PollError::VotingClosed => StatusCode::BAD_REQUEST,
            PollError::Unauthenticated | PollError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            PollError::PasswordHash(_) | PollError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
            return HttpResponse::build(status).json(json!({ "error": "internal server error" }));
        }
        HttpResponse::build(status).json(json!({ "error": self.to_string() }))
    }
}
