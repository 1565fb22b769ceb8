//! Employee status routes for the admin dashboard.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use domain::models::{format_last_active, EmployeeStatus};
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;

/// One employee row with a display label for the last write.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeStatusView {
    #[serde(flatten)]
    pub status: EmployeeStatus,
    pub last_active_label: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeStatusResponse {
    pub employees: Vec<EmployeeStatusView>,
    pub online: usize,
    /// When the statuses were evaluated. Absent before the first live refresh.
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl EmployeeStatusResponse {
    fn build(statuses: Vec<EmployeeStatus>, evaluated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let online = statuses.iter().filter(|s| s.is_online).count();
        let employees = statuses
            .into_iter()
            .map(|status| EmployeeStatusView {
                last_active_label: format_last_active(status.last_active, now),
                status,
            })
            .collect();
        Self {
            employees,
            online,
            evaluated_at,
        }
    }
}

/// Fresh fan-out over every employee.
///
/// GET /api/v1/employees/status (admin)
pub async fn list_statuses(
    State(state): State<AppState>,
) -> Result<Json<EmployeeStatusResponse>, ApiError> {
    let statuses = state.services.aggregator.list_employee_statuses().await?;
    let now = state.capabilities.clock.now();
    Ok(Json(EmployeeStatusResponse::build(statuses, Some(now), now)))
}

/// Latest snapshot held by the status monitor.
///
/// GET /api/v1/employees/status/live (admin)
pub async fn live_statuses(State(state): State<AppState>) -> Json<EmployeeStatusResponse> {
    let snapshot = state.services.monitor.snapshot();
    let now = state.capabilities.clock.now();
    Json(EmployeeStatusResponse::build(
        snapshot.statuses,
        snapshot.refreshed_at,
        now,
    ))
}
