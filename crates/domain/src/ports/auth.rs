//! Auth provider port: email/password principals and bearer sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::CHANGE_CHANNEL_CAPACITY;
use crate::clock::Clock;
use shared::credentials::{
    generate_session_token, hash_password, hash_session_token, verify_password,
};

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 30;

/// Authenticated identity. `uid` maps 1:1 to `UserAccount.uid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub uid: Uuid,
    pub email: String,
}

/// An issued bearer session. The token is only ever returned here.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub principal: Principal,
    pub expires_at: DateTime<Utc>,
}

/// Emitted on the session-change subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Principal),
    SignedOut { uid: Uuid },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already in use")]
    EmailInUse,

    #[error("auth provider unavailable: {0}")]
    Unavailable(String),

    #[error("auth provider error: {0}")]
    Backend(String),
}

#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Registers a new email/password principal.
    async fn create_principal(&self, email: &str, password: &str) -> Result<Principal, AuthError>;

    /// Verifies credentials and opens a session.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// Looks up the principal behind a live session token.
    async fn resolve(&self, token: &str) -> Result<Option<Principal>, AuthError>;

    /// Ends a session. Unknown tokens are ignored.
    async fn revoke(&self, token: &str) -> Result<(), AuthError>;

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

struct CredentialRecord {
    principal: Principal,
    password_hash: String,
}

struct SessionRecord {
    principal: Principal,
    expires_at: DateTime<Utc>,
}

/// In-memory auth provider. Stores only password and token hashes.
pub struct InMemoryAuthProvider {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    credentials: Mutex<HashMap<String, CredentialRecord>>,
    sessions: Mutex<HashMap<String, SessionRecord>>,
    events: broadcast::Sender<SessionEvent>,
}

impl InMemoryAuthProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, Duration::hours(DEFAULT_SESSION_TTL_HOURS))
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            clock,
            ttl,
            credentials: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn credentials(&self) -> std::sync::MutexGuard<'_, HashMap<String, CredentialRecord>> {
        self.credentials.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait::async_trait]
impl AuthProvider for InMemoryAuthProvider {
    async fn create_principal(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let key = email_key(email);
        if self.credentials().contains_key(&key) {
            return Err(AuthError::EmailInUse);
        }

        let password_hash =
            hash_password(password).map_err(|e| AuthError::Backend(e.to_string()))?;
        let principal = Principal {
            uid: Uuid::new_v4(),
            email: key.clone(),
        };

        let mut credentials = self.credentials();
        if credentials.contains_key(&key) {
            return Err(AuthError::EmailInUse);
        }
        credentials.insert(
            key,
            CredentialRecord {
                principal: principal.clone(),
                password_hash,
            },
        );
        Ok(principal)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let (principal, password_hash) = {
            let credentials = self.credentials();
            let record = credentials
                .get(&email_key(email))
                .ok_or(AuthError::InvalidCredentials)?;
            (record.principal.clone(), record.password_hash.clone())
        };

        let valid = verify_password(password, &password_hash)
            .map_err(|e| AuthError::Backend(e.to_string()))?;
        if !valid {
            return Err(AuthError::InvalidCredentials);
        }

        let token = generate_session_token();
        let expires_at = self.clock.now() + self.ttl;
        self.sessions().insert(
            hash_session_token(&token),
            SessionRecord {
                principal: principal.clone(),
                expires_at,
            },
        );

        let _ = self.events.send(SessionEvent::SignedIn(principal.clone()));
        Ok(Session {
            token,
            principal,
            expires_at,
        })
    }

    async fn resolve(&self, token: &str) -> Result<Option<Principal>, AuthError> {
        let now = self.clock.now();
        let sessions = self.sessions();
        Ok(sessions
            .get(&hash_session_token(token))
            .filter(|s| s.expires_at > now)
            .map(|s| s.principal.clone()))
    }

    async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let removed = self.sessions().remove(&hash_session_token(token));
        if let Some(session) = removed {
            let _ = self.events.send(SessionEvent::SignedOut {
                uid: session.principal.uid,
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn provider() -> (Arc<ManualClock>, InMemoryAuthProvider) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let provider = InMemoryAuthProvider::with_ttl(clock.clone(), Duration::hours(1));
        (clock, provider)
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let (_, auth) = provider();
        let principal = auth
            .create_principal("Ana@Example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(principal.email, "ana@example.com");

        let session = auth.authenticate("ana@example.com", "secret1").await.unwrap();
        assert_eq!(session.principal.uid, principal.uid);
        assert_eq!(
            auth.resolve(&session.token).await.unwrap(),
            Some(principal)
        );
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let (_, auth) = provider();
        auth.create_principal("a@b.co", "secret1").await.unwrap();
        assert_eq!(
            auth.create_principal("A@B.CO", "secret2").await,
            Err(AuthError::EmailInUse)
        );
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let (_, auth) = provider();
        auth.create_principal("a@b.co", "secret1").await.unwrap();
        assert!(matches!(
            auth.authenticate("a@b.co", "nope123").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate("x@b.co", "secret1").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_session_expiry_and_revoke() {
        let (clock, auth) = provider();
        auth.create_principal("a@b.co", "secret1").await.unwrap();
        let mut events = auth.subscribe();

        let first = auth.authenticate("a@b.co", "secret1").await.unwrap();
        clock.advance(Duration::hours(2));
        assert_eq!(auth.resolve(&first.token).await.unwrap(), None);

        let second = auth.authenticate("a@b.co", "secret1").await.unwrap();
        auth.revoke(&second.token).await.unwrap();
        assert_eq!(auth.resolve(&second.token).await.unwrap(), None);

        assert!(matches!(events.recv().await.unwrap(), SessionEvent::SignedIn(_)));
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::SignedIn(_)));
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::SignedOut { .. }
        ));
    }
}
