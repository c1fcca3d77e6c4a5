//! User-facing notices, shown on the next rendered page.
//!
//! A notice raised before a redirect travels in the `polls_notice` cookie as
//! its key and is consumed by whichever page renders next.

use actix_web::{cookie::Cookie, HttpRequest};
use serde::{ser::SerializeStruct, Serialize, Serializer};

pub const NOTICE_COOKIE: &str = "polls_notice";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Success,
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    LoginRequired,
    VotingClosed,
    NoChoice,
    VoteRecorded,
    LoginFailed,
    LoggedOut,
}

impl Notice {
    const ALL: [Notice; 6] = [
        Notice::LoginRequired,
        Notice::VotingClosed,
        Notice::NoChoice,
        Notice::VoteRecorded,
        Notice::LoginFailed,
        Notice::LoggedOut,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Notice::LoginRequired => "login_required",
            Notice::VotingClosed => "voting_closed",
            Notice::NoChoice => "no_choice",
            Notice::VoteRecorded => "vote_recorded",
            Notice::LoginFailed => "login_failed",
            Notice::LoggedOut => "logged_out",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|n| n.key() == key)
    }

    pub fn level(self) -> Level {
        match self {
            Notice::VoteRecorded | Notice::LoggedOut => Level::Success,
            Notice::VotingClosed => Level::Warning,
            Notice::LoginRequired | Notice::NoChoice | Notice::LoginFailed => Level::Error,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Notice::LoginRequired => "You must login before you can vote",
            Notice::VotingClosed => "Can not vote current question",
            Notice::NoChoice => "You didn't make a choice",
            Notice::VoteRecorded => "Your choice successfully recorded. Thank you.",
            Notice::LoginFailed => "Please enter a correct username and password",
            Notice::LoggedOut => "You have been logged out",
        }
    }
}

impl Serialize for Notice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut notice = serializer.serialize_struct("Notice", 2)?;
        notice.serialize_field("level", &self.level())?;
        notice.serialize_field("message", self.message())?;
        notice.end()
    }
}

pub fn flash_cookie(notice: Notice) -> Cookie<'static> {
    Cookie::build(NOTICE_COOKIE, notice.key())
        .path("/")
        .http_only(true)
        .finish()
}

pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(NOTICE_COOKIE, "").path("/").finish();
    cookie.make_removal();
    cookie
}

/// Notice carried over from the previous response, if any.
pub fn take_flash(req: &HttpRequest) -> Option<Notice> {
    req.cookie(NOTICE_COOKIE)
        .and_then(|cookie| Notice::from_key(cookie.value()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn keys_round_trip() {
        for notice in Notice::ALL.iter().copied() {
            assert_eq!(Notice::from_key(notice.key()), Some(notice));
        }
        assert_eq!(Notice::from_key("bogus"), None);
    }

    #[test]
    fn serializes_level_and_message() {
        let json = serde_json::to_value(Notice::NoChoice).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "level": "error", "message": "You didn't make a choice" })
        );
    }

    #[test]
    fn flash_is_read_from_cookie() {
        let req = TestRequest::default()
            .cookie(flash_cookie(Notice::VoteRecorded))
            .to_http_request();
        assert_eq!(take_flash(&req), Some(Notice::VoteRecorded));
        assert_eq!(take_flash(&TestRequest::default().to_http_request()), None);
    }
}
