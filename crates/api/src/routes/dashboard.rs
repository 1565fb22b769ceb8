//! Admin dashboard counters.

use axum::{extract::State, Json};
use domain::models::DashboardStats;

use crate::app::AppState;
use crate::error::ApiError;

/// GET /api/v1/dashboard/stats (admin)
///
/// `totalUsers` counts every account; `activeUsers` and `inactiveUsers`
/// split the employees by current presence.
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.services.aggregator.dashboard_stats().await?))
}
