//! User directory routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::{ProfileUpdate, SignUpRequest, UserAccount};
use domain::services::DeletionReport;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersResponse {
    pub users: Vec<UserAccount>,
    pub total: usize,
}

/// GET /api/v1/users (admin)
pub async fn list_users(State(state): State<AppState>) -> Result<Json<ListUsersResponse>, ApiError> {
    let users = state.services.directory.list().await?;
    Ok(Json(ListUsersResponse {
        total: users.len(),
        users,
    }))
}

/// Creates an account on behalf of an administrator. The admin's own
/// session is untouched.
///
/// POST /api/v1/users (admin)
pub async fn provision_user(
    State(state): State<AppState>,
    admin: CurrentUser,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<UserAccount>), ApiError> {
    let user = state.services.auth.sign_up(&request).await?;
    info!(uid = %user.uid, role = %user.role, admin = %admin.uid(), "User provisioned");
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/v1/users/:uid (self or admin)
pub async fn get_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(uid): Path<Uuid>,
) -> Result<Json<UserAccount>, ApiError> {
    user.ensure_self_or_admin(uid)?;
    Ok(Json(state.services.directory.get(uid).await?))
}

/// PATCH /api/v1/users/:uid (self or admin)
pub async fn update_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(uid): Path<Uuid>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserAccount>, ApiError> {
    user.ensure_self_or_admin(uid)?;
    let updated = state.services.directory.update_profile(uid, &update).await?;
    Ok(Json(updated))
}

/// Deletes the account, then its samples best-effort.
///
/// DELETE /api/v1/users/:uid (admin)
pub async fn delete_user(
    State(state): State<AppState>,
    admin: CurrentUser,
    Path(uid): Path<Uuid>,
) -> Result<Json<DeletionReport>, ApiError> {
    if !admin.0.is_admin() {
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }
    let report = state
        .services
        .directory
        .delete_user(admin.uid(), uid)
        .await?;
    Ok(Json(report))
}
