//! Mapping from sqlx errors onto the store port error type.

use domain::ports::{AuthError, StoreError};

/// Postgres SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
        sqlx::Error::Database(ref db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict(db.message().to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

pub fn map_auth_error(err: sqlx::Error) -> AuthError {
    match map_sqlx_error(err) {
        StoreError::Unavailable(msg) => AuthError::Unavailable(msg),
        StoreError::Conflict(_) => AuthError::EmailInUse,
        other => AuthError::Backend(other.to_string()),
    }
}
