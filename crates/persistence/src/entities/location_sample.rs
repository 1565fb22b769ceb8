//! Location sample entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{SampleTimestamp, StoredSample};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the location_samples table.
#[derive(Debug, Clone, FromRow)]
pub struct LocationSampleEntity {
    pub id: i64,
    pub user_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
    pub battery_level: i32,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

impl From<LocationSampleEntity> for StoredSample {
    fn from(entity: LocationSampleEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            lat: entity.lat,
            lng: entity.lng,
            timestamp: SampleTimestamp::Instant(entity.timestamp),
            battery_level: entity.battery_level,
            speed: entity.speed,
            heading: entity.heading,
        }
    }
}
