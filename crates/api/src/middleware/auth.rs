//! Session authentication middleware.
//!
//! Resolves the `Authorization: Bearer <token>` header to a directory
//! account and stores it in request extensions as [`CurrentUser`].

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::session::{resolve_session, CurrentUser};

/// Middleware that requires a valid session token.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match resolve_session(&state, req.headers()).await {
        Ok(user) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

/// Middleware for admin-only routes.
///
/// Requires a valid session AND the account must have the admin role.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match resolve_session(&state, req.headers()).await {
        Ok(user) => {
            if !user.is_admin() {
                return ApiError::Forbidden("Admin access required".to_string()).into_response();
            }
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}
