use super::audit::{AuditEvent, AuditKind, AuditSink};
use crate::db::{
    session::{Session, SessionId},
    user::User,
    PollStore,
};
use crate::error::PollError;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Hash a password using argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, PollError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PollError::PasswordHash(e.to_string()))
}

/// Verify a password against a stored argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PollError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PollError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub struct AuthService {
    store: Arc<dyn PollStore>,
    audit: Arc<dyn AuditSink>,
}

impl AuthService {
    pub fn new(store: Arc<dyn PollStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, username: &str, password: &str) -> Result<User, PollError> {
        let hash = hash_password(password)?;
        let user = self.store.create_user(username, &hash).await?;
        debug!(user_id = user.id.as_string().as_str(), "Registered user");
        Ok(user)
    }

    /// Checks credentials and opens a session. Success and failure are both
    /// audited.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        client_ip: Option<String>,
    ) -> Result<(Session, User), PollError> {
        let user = match self.store.user_by_username(username).await? {
            Some(user) if self.password_matches(&user, password) => user,
            _ => {
                self.audit.record(&AuditEvent::new(
                    AuditKind::LoginFailed,
                    Some(username.to_owned()),
                    client_ip,
                ));
                return Err(PollError::InvalidCredentials);
            }
        };
        let session = self.store.create_session(user.id).await?;
        self.audit.record(&AuditEvent::new(
            AuditKind::Login,
            Some(user.username.clone()),
            client_ip,
        ));
        Ok((session, user))
    }

    #[instrument(skip(self))]
    pub async fn logout(
        &self,
        session_id: Option<SessionId>,
        client_ip: Option<String>,
    ) -> Result<(), PollError> {
        let mut username = None;
        if let Some(session_id) = session_id {
            if let Some(user) = self.current_user(session_id).await? {
                username = Some(user.username);
            }
            self.store.delete_session(session_id).await?;
        }
        self.audit
            .record(&AuditEvent::new(AuditKind::Logout, username, client_ip));
        Ok(())
    }

    /// An unreadable stored hash counts as a mismatch so the attempt is
    /// still audited as a failed login.
    fn password_matches(&self, user: &User, password: &str) -> bool {
        verify_password(password, &user.password_hash).unwrap_or_else(|err| {
            warn!(
                user_id = user.id.as_string().as_str(),
                error = %err,
                "Stored password hash is unreadable"
            );
            false
        })
    }

    pub async fn current_user(&self, session_id: SessionId) -> Result<Option<User>, PollError> {
        let session = match self.store.session_by_id(session_id).await? {
            Some(session) => session,
            None => return Ok(None),
        };
        Ok(self.store.user_by_id(session.user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::memory::MemoryStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<AuditEvent>>);

    impl AuditSink for RecordingSink {
        fn record(&self, event: &AuditEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn service() -> (AuthService, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let service = AuthService::new(Arc::new(MemoryStore::new()), sink.clone());
        (service, sink)
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("mysecret").unwrap();
        assert!(verify_password("mysecret", &hash).unwrap());
        assert!(!verify_password("wrongpassword", &hash).unwrap());
    }

    #[actix_rt::test]
    async fn login_opens_session_and_audits() {
        let (auth, sink) = service();
        auth.register("alice", "secret").await.unwrap();

        let (session, user) = auth
            .login("alice", "secret", Some("203.0.113.7".to_owned()))
            .await
            .unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(auth.current_user(session.id).await.unwrap(), Some(user));

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AuditKind::Login);
        assert_eq!(events[0].username.as_deref(), Some("alice"));
        assert_eq!(events[0].client_ip.as_deref(), Some("203.0.113.7"));
    }

    #[actix_rt::test]
    async fn wrong_password_is_rejected_and_audited() {
        let (auth, sink) = service();
        auth.register("alice", "secret").await.unwrap();

        let result = auth.login("alice", "nope", None).await;
        assert!(matches!(result, Err(PollError::InvalidCredentials)));
        let result = auth.login("mallory", "secret", None).await;
        assert!(matches!(result, Err(PollError::InvalidCredentials)));

        let events = sink.0.lock().unwrap();
        assert!(events.iter().all(|e| e.kind == AuditKind::LoginFailed));
        assert_eq!(events[1].username.as_deref(), Some("mallory"));
    }

    #[actix_rt::test]
    async fn unreadable_hash_is_a_failed_login() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let auth = AuthService::new(store.clone(), sink.clone());
        store.create_user("legacy", "md5:5f4dcc3b").await.unwrap();

        let result = auth.login("legacy", "password", Some("198.51.100.2".to_owned())).await;
        assert!(matches!(result, Err(PollError::InvalidCredentials)));

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AuditKind::LoginFailed);
        assert_eq!(events[0].username.as_deref(), Some("legacy"));
    }

    #[actix_rt::test]
    async fn logout_ends_session() {
        let (auth, sink) = service();
        auth.register("alice", "secret").await.unwrap();
        let (session, _) = auth.login("alice", "secret", None).await.unwrap();

        auth.logout(Some(session.id), None).await.unwrap();
        assert_eq!(auth.current_user(session.id).await.unwrap(), None);

        let events = sink.0.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.kind, AuditKind::Logout);
        assert_eq!(last.username.as_deref(), Some("alice"));
    }
}
