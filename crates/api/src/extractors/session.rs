//! Session extractor for handlers behind the auth middleware.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use domain::models::UserAccount;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

/// The signed-in account.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserAccount);

impl CurrentUser {
    pub fn uid(&self) -> Uuid {
        self.0.uid
    }

    /// Owners may act on their own records; admins on anyone's.
    pub fn ensure_self_or_admin(&self, uid: Uuid) -> Result<(), ApiError> {
        if self.0.uid == uid || self.0.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "You can only access your own records".to_string(),
            ))
        }
    }
}

/// Token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the bearer token to its directory account.
pub async fn resolve_session(state: &AppState, headers: &HeaderMap) -> Result<UserAccount, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing or invalid Authorization header".to_string()))?;

    state
        .services
        .auth
        .current_user(token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Already resolved by the middleware
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        resolve_session(state, &parts.headers).await.map(CurrentUser)
    }
}
