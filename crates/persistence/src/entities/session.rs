//! Principal and session entities (database row mappings).

use chrono::{DateTime, Utc};
use domain::ports::Principal;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the principals table.
#[derive(Debug, Clone, FromRow)]
pub struct PrincipalEntity {
    pub uid: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A session row joined with its principal.
#[derive(Debug, Clone, FromRow)]
pub struct SessionEntity {
    pub token_hash: String,
    pub uid: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&PrincipalEntity> for Principal {
    fn from(entity: &PrincipalEntity) -> Self {
        Self {
            uid: entity.uid,
            email: entity.email.clone(),
        }
    }
}

impl From<SessionEntity> for Principal {
    fn from(entity: SessionEntity) -> Self {
        Self {
            uid: entity.uid,
            email: entity.email,
        }
    }
}
