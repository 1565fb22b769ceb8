//! Per-employee activity summary: hours worked, distance, battery.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use geo::{HaversineDistance, Point};
use tracing::debug;
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::{LocationSample, StoredSample, TrackingStats};
use crate::ports::{SampleStore, StoreError};

/// Gaps longer than this between consecutive samples are not counted as work.
pub const DEFAULT_ACTIVITY_GAP_MINUTES: i64 = 5;

pub struct TrackingStatsService {
    samples: Arc<dyn SampleStore>,
    activity_gap: Duration,
}

impl TrackingStatsService {
    pub fn new(samples: Arc<dyn SampleStore>) -> Self {
        Self {
            samples,
            activity_gap: Duration::minutes(DEFAULT_ACTIVITY_GAP_MINUTES),
        }
    }

    pub fn with_activity_gap(mut self, gap: Duration) -> Self {
        self.activity_gap = gap;
        self
    }

    /// Summary of the samples written since `since`.
    pub async fn stats_for(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<TrackingStats, DomainError> {
        let stored = match self.samples.recent_for_user(user_id, since).await {
            Ok(recent) => recent,
            Err(StoreError::Unavailable(msg)) => return Err(DomainError::BackendUnavailable(msg)),
            Err(e) => {
                debug!(user_id = %user_id, error = %e, "Indexed range query failed, scanning");
                self.samples.all_for_user(user_id).await?
            }
        };

        let mut samples: Vec<LocationSample> = stored
            .iter()
            .filter_map(StoredSample::normalize)
            .filter(|s| s.timestamp >= since)
            .collect();
        samples.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

        Ok(summarize(&samples, self.activity_gap))
    }
}

/// Summarizes samples sorted oldest first.
pub fn summarize(samples: &[LocationSample], activity_gap: Duration) -> TrackingStats {
    let mut worked = Duration::zero();
    let mut distance = 0.0;

    for pair in samples.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        let gap = to.timestamp - from.timestamp;
        if gap <= activity_gap {
            worked += gap;
        }
        distance += Point::new(from.lng, from.lat).haversine_distance(&Point::new(to.lng, to.lat));
    }

    TrackingStats {
        hours_worked: worked.num_seconds() as f64 / 3600.0,
        distance_covered: distance,
        battery_level: samples.last().map(|s| s.battery_level),
        sample_count: samples.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ports::InMemorySampleStore;
    use chrono::TimeZone;

    fn sample(id: i64, lat: f64, lng: f64, at: DateTime<Utc>) -> LocationSample {
        LocationSample {
            id,
            user_id: Uuid::nil(),
            lat,
            lng,
            timestamp: at,
            battery_level: 50 + id as i32,
            speed: Some(0.0),
            heading: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_empty() {
        let stats = summarize(&[], Duration::minutes(5));
        assert_eq!(stats.hours_worked, 0.0);
        assert_eq!(stats.distance_covered, 0.0);
        assert_eq!(stats.battery_level, None);
        assert_eq!(stats.sample_count, 0);
    }

    #[test]
    fn test_long_gaps_are_not_worked_time() {
        let samples = vec![
            sample(1, 0.0, 0.0, t0()),
            sample(2, 0.0, 0.0, t0() + Duration::minutes(3)),
            sample(3, 0.0, 0.0, t0() + Duration::minutes(6)),
            // Two-hour break.
            sample(4, 0.0, 0.0, t0() + Duration::minutes(126)),
            sample(5, 0.0, 0.0, t0() + Duration::minutes(129)),
        ];
        let stats = summarize(&samples, Duration::minutes(5));
        assert!((stats.hours_worked - 0.15).abs() < 1e-9);
        assert_eq!(stats.battery_level, Some(55));
    }

    #[test]
    fn test_distance_is_haversine_metres() {
        // One degree of longitude on the equator is about 111.2 km.
        let samples = vec![
            sample(1, 0.0, 0.0, t0()),
            sample(2, 0.0, 1.0, t0() + Duration::minutes(1)),
        ];
        let stats = summarize(&samples, Duration::minutes(5));
        assert!((stats.distance_covered - 111_195.0).abs() < 100.0);
    }

    #[tokio::test]
    async fn test_stats_for_filters_by_since() {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(InMemorySampleStore::without_index(clock));
        let user = Uuid::new_v4();
        store.seed(user, 0.0, 0.0, t0() - Duration::hours(30));
        store.seed(user, 0.0, 0.0, t0() + Duration::minutes(1));
        store.seed(user, 0.0, 0.0, t0() + Duration::minutes(2));

        let service = TrackingStatsService::new(store);
        let stats = service.stats_for(user, t0()).await.unwrap();
        assert_eq!(stats.sample_count, 2);
        assert!((stats.hours_worked - 1.0 / 60.0).abs() < 1e-9);
    }
}
