//! Location sample domain model.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Identifier assigned by the sample store.
pub type SampleId = i64;

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Timestamp of a stored sample, in whichever shape the backend returned it.
///
/// Backends differ: some hand back a native instant, some a
/// `{ seconds, nanoseconds }` object, some epoch milliseconds.
/// [`SampleTimestamp::normalize`] maps every shape onto `DateTime<Utc>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleTimestamp {
    Instant(DateTime<Utc>),
    Seconds {
        seconds: i64,
        #[serde(default)]
        nanoseconds: u32,
    },
    Millis(i64),
    Text(String),
}

impl SampleTimestamp {
    /// Converts to a single in-memory instant. `None` if the value cannot be
    /// interpreted as a point in time.
    pub fn normalize(&self) -> Option<DateTime<Utc>> {
        match self {
            SampleTimestamp::Instant(at) => Some(*at),
            SampleTimestamp::Seconds {
                seconds,
                nanoseconds,
            } => Utc.timestamp_opt(*seconds, *nanoseconds).single(),
            SampleTimestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            SampleTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .or_else(|_| DateTime::parse_from_rfc2822(text))
                .ok()
                .map(|at| at.with_timezone(&Utc)),
        }
    }
}

impl From<DateTime<Utc>> for SampleTimestamp {
    fn from(at: DateTime<Utc>) -> Self {
        SampleTimestamp::Instant(at)
    }
}

/// A sample as returned by the sample store, before timestamp normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSample {
    pub id: SampleId,
    pub user_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: SampleTimestamp,
    pub battery_level: i32,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

impl StoredSample {
    /// Normalizes the timestamp. Samples whose timestamp cannot be read are dropped.
    pub fn normalize(&self) -> Option<LocationSample> {
        let timestamp = self.timestamp.normalize()?;
        Some(LocationSample {
            id: self.id,
            user_id: self.user_id,
            lat: self.lat,
            lng: self.lng,
            timestamp,
            battery_level: self.battery_level,
            speed: self.speed,
            heading: self.heading,
        })
    }
}

/// A persisted, immutable location sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub id: SampleId,
    pub user_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    /// Server-assigned write time.
    pub timestamp: DateTime<Utc>,
    /// Battery percentage (0-100) at capture time.
    pub battery_level: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

impl LocationSample {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lng: self.lng,
        }
    }

    /// Age of the sample at `now`, never negative.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).max(Duration::zero())
    }
}

/// A sample about to be written. The store assigns `id` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewLocationSample {
    pub user_id: Uuid,

    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub lat: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub lng: f64,

    #[validate(custom(function = "shared::validation::validate_battery_level"))]
    pub battery_level: i32,

    #[validate(custom(function = "shared::validation::validate_speed"))]
    pub speed: Option<f64>,

    #[validate(custom(function = "shared::validation::validate_heading"))]
    pub heading: Option<f64>,
}

impl NewLocationSample {
    /// Builds a sample from a device fix and a battery fraction (0.0-1.0).
    ///
    /// Platforms report "unknown" speed/heading as negative values; those
    /// are stored as absent. A missing speed is recorded as 0.
    pub fn from_fix(user_id: Uuid, fix: &PositionFix, battery_fraction: f64) -> Self {
        Self {
            user_id,
            lat: fix.lat,
            lng: fix.lng,
            battery_level: shared::validation::battery_fraction_to_percent(battery_fraction),
            speed: Some(fix.speed.filter(|s| *s >= 0.0).unwrap_or(0.0)),
            heading: fix.heading.filter(|h| (0.0..=360.0).contains(h)),
        }
    }
}

/// A position fix reported by the device location API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionFix {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    /// Device-side acquisition time. Informational only; never persisted.
    pub captured_at: DateTime<Utc>,
}

impl PositionFix {
    pub fn at(lat: f64, lng: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            lat,
            lng,
            accuracy: None,
            speed: None,
            heading: None,
            captured_at,
        }
    }
}
