//! Location ingest and per-user location, presence and stats handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, TimeZone, Utc};
use domain::models::{format_last_active, LocationSample, NewLocationSample, TrackingStats};
use domain::ports::StoreError;
use domain::services::Presence;
use domain::DomainError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;
use crate::middleware::metrics::record_location_ingest;
use crate::middleware::RequestId;

/// A sample posted by a device agent. The user comes from the session and
/// the timestamp from the store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestLocationRequest {
    pub lat: f64,
    pub lng: f64,
    pub battery_level: i32,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestLocationResponse {
    pub id: i64,
    pub user_id: Uuid,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestLocationResponse {
    pub location: Option<LocationSample>,
    pub last_active: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsQuery {
    /// Start of the period; defaults to midnight UTC today.
    pub since: Option<DateTime<Utc>>,
}

/// POST /api/v1/locations
pub async fn ingest_location(
    State(state): State<AppState>,
    user: CurrentUser,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<IngestLocationRequest>,
) -> Result<(StatusCode, Json<IngestLocationResponse>), ApiError> {
    let sample = NewLocationSample {
        user_id: user.uid(),
        lat: request.lat,
        lng: request.lng,
        battery_level: request.battery_level,
        speed: request.speed,
        heading: request.heading,
    };
    if let Err(e) = sample.validate() {
        record_location_ingest("rejected");
        return Err(e.into());
    }

    let stored = state.services.samples.insert(sample).await.map_err(|e| {
        record_location_ingest("failed");
        warn!(user_id = %user.uid(), request_id = %request_id.0, error = %e, "Location write failed");
        match e {
            StoreError::Unavailable(msg) => DomainError::BackendUnavailable(msg),
            other => DomainError::SampleWriteFailed(other.to_string()),
        }
    })?;

    record_location_ingest("stored");
    debug!(user_id = %user.uid(), sample_id = stored.id, request_id = %request_id.0, "Location stored");

    Ok((
        StatusCode::CREATED,
        Json(IngestLocationResponse {
            id: stored.id,
            user_id: stored.user_id,
            timestamp: stored.timestamp.normalize(),
        }),
    ))
}

/// GET /api/v1/users/:uid/locations/latest
pub async fn latest_location(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(uid): Path<Uuid>,
) -> Result<Json<LatestLocationResponse>, ApiError> {
    user.ensure_self_or_admin(uid)?;
    let location = state.services.presence.latest_location(uid).await?;
    let now = state.capabilities.clock.now();
    Ok(Json(LatestLocationResponse {
        last_active: format_last_active(location.as_ref().map(|l| l.timestamp), now),
        location,
    }))
}

/// GET /api/v1/users/:uid/presence
pub async fn presence(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(uid): Path<Uuid>,
) -> Result<Json<Presence>, ApiError> {
    user.ensure_self_or_admin(uid)?;
    Ok(Json(state.services.presence.evaluate(uid).await?))
}

/// GET /api/v1/users/:uid/stats
pub async fn tracking_stats(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(uid): Path<Uuid>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<TrackingStats>, ApiError> {
    user.ensure_self_or_admin(uid)?;
    let since = query
        .since
        .unwrap_or_else(|| start_of_day(state.capabilities.clock.now()));
    Ok(Json(state.services.stats.stats_for(uid, since).await?))
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_of_day() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 14, 30, 5).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_ingest_request_deserialization() {
        let request: IngestLocationRequest =
            serde_json::from_str(r#"{"lat":40.7,"lng":-74.0,"batteryLevel":85}"#).unwrap();
        assert_eq!(request.battery_level, 85);
        assert!(request.speed.is_none());
    }
}
