//! Authentication routes: registration, login, logout and the current account.

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use domain::models::{Role, SignUpRequest, UserAccount};
use domain::services::SignedIn;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::session::bearer_token;
use crate::extractors::CurrentUser;

/// Request body for self-registration. Self-registered accounts are employees.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

impl From<RegisterRequest> for SignUpRequest {
    fn from(request: RegisterRequest) -> Self {
        SignUpRequest {
            email: request.email,
            password: request.password,
            display_name: request.display_name,
            role: Role::Employee,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user: UserAccount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token_type: &'static str,
    #[serde(flatten)]
    pub session: SignedIn,
    /// Foreground sampling period for device agents.
    pub keep_alive_secs: u64,
}

/// Register a new employee account.
///
/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let user = state.services.auth.sign_up(&request.into()).await?;
    info!(uid = %user.uid, "Account registered");
    Ok((StatusCode::CREATED, Json(RegisterResponse { user })))
}

/// Exchange credentials for a session token.
///
/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let session = state
        .services
        .auth
        .sign_in(&request.email, &request.password)
        .await?;
    Ok(Json(LoginResponse {
        token_type: "Bearer",
        session,
        keep_alive_secs: state.config.tracking.keep_alive_secs,
    }))
}

/// Revoke the presented session token.
///
/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        state.services.auth.sign_out(token).await?;
        info!(uid = %user.uid(), "Signed out");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/auth/me
pub async fn me(user: CurrentUser) -> Json<UserAccount> {
    Json(user.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_is_always_employee() {
        let request: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@b.co","password":"secret1","displayName":"Ann","role":"admin"}"#,
        )
        .unwrap();
        let sign_up: SignUpRequest = request.into();
        assert_eq!(sign_up.role, Role::Employee);
        assert_eq!(sign_up.display_name, "Ann");
    }

    #[test]
    fn test_login_request_deserialization() {
        let request: LoginRequest =
            serde_json::from_str(r#"{"email":"a@b.co","password":"secret1"}"#).unwrap();
        assert_eq!(request.email, "a@b.co");
    }
}
