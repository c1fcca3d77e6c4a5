use super::StoreError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use std::fmt;

/// Longest prompt or choice label the schema accepts.
pub const TEXT_MAX_LEN: usize = 200;

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct QuestionId(pub Uuid);

impl QuestionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QuestionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A timed poll. Visible and votable from `publish_at`, closed from `close_at`.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub publish_at: DateTime<Utc>,
    pub close_at: DateTime<Utc>,
}

impl Question {
    /// Published within the last day, and not in the future.
    pub fn was_published_recently_at(&self, now: DateTime<Utc>) -> bool {
        now - Duration::days(1) <= self.publish_at && self.publish_at <= now
    }

    pub fn was_published_recently(&self) -> bool {
        self.was_published_recently_at(Utc::now())
    }

    pub fn is_published_at(&self, now: DateTime<Utc>) -> bool {
        self.publish_at <= now
    }

    pub fn is_published(&self) -> bool {
        self.is_published_at(Utc::now())
    }

    /// Voting is open on the half-open interval `[publish_at, close_at)`.
    pub fn can_vote_at(&self, now: DateTime<Utc>) -> bool {
        self.publish_at <= now && now < self.close_at
    }

    pub fn can_vote(&self) -> bool {
        self.can_vote_at(Utc::now())
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub(crate) fn validate_question(
    text: &str,
    publish_at: DateTime<Utc>,
    close_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    validate_text(text)?;
    if publish_at >= close_at {
        return Err(StoreError::InvalidSchedule);
    }
    Ok(())
}

pub(crate) fn validate_text(text: &str) -> Result<(), StoreError> {
    if text.chars().count() > TEXT_MAX_LEN {
        return Err(StoreError::TextTooLong(TEXT_MAX_LEN));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(now: DateTime<Utc>, publish: Duration, close: Duration) -> Question {
        Question {
            id: QuestionId::new(),
            text: "What's up?".to_owned(),
            publish_at: now + publish,
            close_at: now + close,
        }
    }

    #[test]
    fn future_question_was_not_published_recently() {
        let now = Utc::now();
        let q = question(now, Duration::days(30), Duration::days(60));
        assert!(!q.was_published_recently_at(now));
    }

    #[test]
    fn old_question_was_not_published_recently() {
        let now = Utc::now();
        let q = question(
            now,
            -(Duration::days(1) + Duration::seconds(1)),
            Duration::days(30),
        );
        assert!(!q.was_published_recently_at(now));
    }

    #[test]
    fn recent_question_was_published_recently() {
        let now = Utc::now();
        let almost_a_day = Duration::hours(23) + Duration::minutes(59) + Duration::seconds(59);
        let q = question(now, -almost_a_day, Duration::days(30));
        assert!(q.was_published_recently_at(now));
    }

    #[test]
    fn recently_published_bounds_are_inclusive() {
        let now = Utc::now();
        assert!(question(now, -Duration::days(1), Duration::days(1)).was_published_recently_at(now));
        assert!(question(now, Duration::zero(), Duration::days(1)).was_published_recently_at(now));
    }

    #[test]
    fn is_published() {
        let now = Utc::now();
        assert!(question(now, Duration::zero(), Duration::days(30)).is_published_at(now));
        assert!(question(now, -Duration::days(1), Duration::days(30)).is_published_at(now));
        assert!(!question(now, Duration::days(1), Duration::days(30)).is_published_at(now));
    }

    #[test]
    fn cannot_vote_before_publication() {
        let now = Utc::now();
        let q = question(now, Duration::days(1), Duration::days(30));
        assert!(!q.can_vote_at(now));
    }

    #[test]
    fn cannot_vote_after_close() {
        let now = Utc::now();
        let q = question(now, -Duration::days(8), -Duration::days(1));
        assert!(!q.can_vote_at(now));
    }

    #[test]
    fn can_vote_while_open() {
        let now = Utc::now();
        let q = question(now, -Duration::days(1), Duration::days(30));
        assert!(q.can_vote_at(now));
        assert!(q.can_vote());
    }

    #[test]
    fn voting_window_is_half_open() {
        let now = Utc::now();
        let q = question(now, Duration::zero(), Duration::days(1));
        assert!(q.can_vote_at(q.publish_at));
        assert!(!q.can_vote_at(q.close_at));
        assert!(q.can_vote_at(q.close_at - Duration::nanoseconds(1)));
        assert!(!q.can_vote_at(q.publish_at - Duration::nanoseconds(1)));
    }

    #[test]
    fn schedule_must_close_after_publication() {
        let now = Utc::now();
        assert!(validate_question("q", now, now + Duration::days(1)).is_ok());
        assert!(matches!(
            validate_question("q", now, now),
            Err(StoreError::InvalidSchedule)
        ));
        assert!(matches!(
            validate_question(&"x".repeat(TEXT_MAX_LEN + 1), now, now + Duration::days(1)),
            Err(StoreError::TextTooLong(_))
        ));
    }
}
