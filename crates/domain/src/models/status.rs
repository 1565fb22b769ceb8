//! Derived (non-persisted) status records consumed by dashboards.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::location::Coordinates;

/// Presence record for one employee. Recomputed on every aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeStatus {
    pub user_id: Uuid,
    pub display_name: String,
    pub is_online: bool,
    /// Write time of the latest sample; absent means "Never".
    pub last_active: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_location: Option<Coordinates>,
}

impl EmployeeStatus {
    /// Status for a user whose samples could not be read or who has none.
    pub fn offline(user_id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            is_online: false,
            last_active: None,
            current_location: None,
        }
    }
}

/// Headline counters for the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: usize,
    pub active_users: usize,
    pub inactive_users: usize,
}

/// Per-employee activity summary over a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStats {
    pub hours_worked: f64,
    /// Metres travelled between consecutive samples.
    pub distance_covered: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<i32>,
    pub sample_count: usize,
}

/// Human-readable "last active" label.
///
/// ```
/// use chrono::{Duration, Utc};
/// use domain::models::format_last_active;
///
/// let now = Utc::now();
/// assert_eq!(format_last_active(None, now), "Never");
/// assert_eq!(format_last_active(Some(now - Duration::minutes(5)), now), "5m ago");
/// ```
pub fn format_last_active(last_active: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = last_active else {
        return "Never".to_string();
    };

    let minutes = (now - at).num_minutes();
    if minutes < 1 {
        return "Just now".to_string();
    }
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h ago", hours);
    }
    format!("{}d ago", hours / 24)
}
