//! Auth provider backed by the principals and sessions tables.

use chrono::{Duration, Utc};
use domain::ports::{AuthError, AuthProvider, Principal, Session, SessionEvent, CHANGE_CHANNEL_CAPACITY};
use shared::credentials::{
    generate_session_token, hash_password, hash_session_token, verify_password,
};
use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::entities::{PrincipalEntity, SessionEntity};
use crate::error::map_auth_error;
use crate::metrics::QueryTimer;

#[derive(Clone)]
pub struct PgAuthProvider {
    pool: PgPool,
    session_ttl: Duration,
    events: broadcast::Sender<SessionEvent>,
}

impl PgAuthProvider {
    pub fn new(pool: PgPool, session_ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            pool,
            session_ttl,
            events,
        }
    }

    /// Removes sessions past their expiry. Returns the number removed.
    pub async fn delete_expired_sessions(&self) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_expired_sessions");
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await;
        timer.record();
        Ok(result?.rows_affected())
    }

    async fn find_principal(&self, email: &str) -> Result<Option<PrincipalEntity>, AuthError> {
        let timer = QueryTimer::new("find_principal_by_email");
        let result = sqlx::query_as::<_, PrincipalEntity>(
            r#"
            SELECT uid, email, password_hash, created_at
            FROM principals
            WHERE email = $1
            "#,
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result.map_err(map_auth_error)
    }
}

#[async_trait::async_trait]
impl AuthProvider for PgAuthProvider {
    async fn create_principal(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let password_hash =
            hash_password(password).map_err(|e| AuthError::Backend(e.to_string()))?;

        let timer = QueryTimer::new("create_principal");
        let result = sqlx::query_as::<_, PrincipalEntity>(
            r#"
            INSERT INTO principals (uid, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING uid, email, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email.trim().to_lowercase())
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        let entity = result.map_err(map_auth_error)?;
        Ok(Principal::from(&entity))
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let entity = self
            .find_principal(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let valid = verify_password(password, &entity.password_hash)
            .map_err(|e| AuthError::Backend(e.to_string()))?;
        if !valid {
            return Err(AuthError::InvalidCredentials);
        }

        let token = generate_session_token();
        let expires_at = Utc::now() + self.session_ttl;

        let timer = QueryTimer::new("create_session");
        let result = sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, uid, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(hash_session_token(&token))
        .bind(entity.uid)
        .bind(expires_at)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map_err(map_auth_error)?;

        let principal = Principal::from(&entity);
        let _ = self.events.send(SessionEvent::SignedIn(principal.clone()));
        debug!(uid = %principal.uid, "Session opened");

        Ok(Session {
            token,
            principal,
            expires_at,
        })
    }

    async fn resolve(&self, token: &str) -> Result<Option<Principal>, AuthError> {
        let timer = QueryTimer::new("resolve_session");
        let result = sqlx::query_as::<_, SessionEntity>(
            r#"
            SELECT s.token_hash, s.uid, p.email, s.expires_at
            FROM sessions s
            JOIN principals p ON p.uid = s.uid
            WHERE s.token_hash = $1 AND s.expires_at > NOW()
            "#,
        )
        .bind(hash_session_token(token))
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(map_auth_error)?.map(Principal::from))
    }

    async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let timer = QueryTimer::new("revoke_session");
        let result: Result<Option<Uuid>, sqlx::Error> =
            sqlx::query_scalar("DELETE FROM sessions WHERE token_hash = $1 RETURNING uid")
                .bind(hash_session_token(token))
                .fetch_optional(&self.pool)
                .await;
        timer.record();

        if let Some(uid) = result.map_err(map_auth_error)? {
            let _ = self.events.send(SessionEvent::SignedOut { uid });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
