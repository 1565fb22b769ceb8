//! Presence inference over a user's recent location samples.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::DomainError;
use crate::models::{Coordinates, LocationSample, StoredSample};
use crate::ports::{SampleStore, StoreError};

/// Recency-plus-frequency online heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresencePolicy {
    /// A latest sample at most this old marks the user online.
    pub very_recent: Duration,
    /// Trailing window for the frequency signal.
    pub activity_window: Duration,
    /// Samples needed inside `activity_window` to mark the user online.
    pub min_window_samples: usize,
}

impl Default for PresencePolicy {
    fn default() -> Self {
        Self {
            very_recent: Duration::minutes(2),
            activity_window: Duration::minutes(3),
            min_window_samples: 2,
        }
    }
}

impl PresencePolicy {
    /// `latest_age` is `None` when the user has no samples at all.
    pub fn is_online(&self, latest_age: Option<Duration>, window_count: usize) -> bool {
        match latest_age {
            None => false,
            Some(age) => age <= self.very_recent || window_count >= self.min_window_samples,
        }
    }
}

/// Presence of one user at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: Uuid,
    pub is_online: bool,
    pub last_active: Option<DateTime<Utc>>,
    pub current_location: Option<Coordinates>,
    pub recent_count: usize,
    pub evaluated_at: DateTime<Utc>,
}

pub struct PresenceService {
    samples: Arc<dyn SampleStore>,
    clock: Arc<dyn Clock>,
    policy: PresencePolicy,
}

impl PresenceService {
    pub fn new(samples: Arc<dyn SampleStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(samples, clock, PresencePolicy::default())
    }

    pub fn with_policy(
        samples: Arc<dyn SampleStore>,
        clock: Arc<dyn Clock>,
        policy: PresencePolicy,
    ) -> Self {
        Self {
            samples,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> PresencePolicy {
        self.policy
    }

    /// Most recent readable sample, or `None` if the user has none.
    ///
    /// Tries the indexed query first and falls back to a full per-user scan
    /// when it fails.
    pub async fn latest_location(&self, user_id: Uuid) -> Result<Option<LocationSample>, DomainError> {
        match self.samples.latest_for_user(user_id).await {
            Ok(Some(stored)) => {
                if let Some(sample) = stored.normalize() {
                    return Ok(Some(sample));
                }
                debug!(user_id = %user_id, sample_id = stored.id, "Latest sample has unreadable timestamp, scanning");
            }
            Ok(None) => return Ok(None),
            Err(StoreError::Unavailable(msg)) => return Err(DomainError::BackendUnavailable(msg)),
            Err(e) => {
                debug!(user_id = %user_id, error = %e, "Indexed latest query failed, scanning");
            }
        }

        let all = self.samples.all_for_user(user_id).await?;
        Ok(latest_of(&all))
    }

    /// Samples written within the trailing `window`.
    pub async fn recent_locations_count(
        &self,
        user_id: Uuid,
        window: Duration,
    ) -> Result<usize, DomainError> {
        self.count_since(user_id, self.clock.now() - window).await
    }

    async fn count_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<usize, DomainError> {
        let candidates = match self.samples.recent_for_user(user_id, since).await {
            Ok(recent) => recent,
            Err(StoreError::Unavailable(msg)) => return Err(DomainError::BackendUnavailable(msg)),
            Err(e) => {
                debug!(user_id = %user_id, error = %e, "Indexed range query failed, scanning");
                self.samples.all_for_user(user_id).await?
            }
        };

        Ok(count_since(&candidates, since))
    }

    pub async fn is_online(&self, user_id: Uuid) -> Result<bool, DomainError> {
        Ok(self.evaluate(user_id).await?.is_online)
    }

    /// Evaluates presence. Read failures degrade to "no data"; only a missing
    /// backend is reported as an error.
    ///
    /// The window cutoff and the latest sample's age use the same instant.
    pub async fn evaluate(&self, user_id: Uuid) -> Result<Presence, DomainError> {
        let now = self.clock.now();
        let (latest, count) = tokio::join!(
            self.latest_location(user_id),
            self.count_since(user_id, now - self.policy.activity_window)
        );

        let latest = match latest {
            Ok(latest) => latest,
            Err(e @ DomainError::BackendUnavailable(_)) => return Err(e),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Latest location read failed, treating as offline");
                None
            }
        };
        let count = match count {
            Ok(count) => count,
            Err(e @ DomainError::BackendUnavailable(_)) => return Err(e),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Recent count read failed, treating as zero");
                0
            }
        };

        let is_online = self
            .policy
            .is_online(latest.as_ref().map(|s| s.age_at(now)), count);

        Ok(Presence {
            user_id,
            is_online,
            last_active: latest.as_ref().map(|s| s.timestamp),
            current_location: latest.as_ref().map(LocationSample::coordinates),
            recent_count: count,
            evaluated_at: now,
        })
    }
}

/// Latest sample by normalized timestamp; ties go to the higher id.
fn latest_of(samples: &[StoredSample]) -> Option<LocationSample> {
    samples
        .iter()
        .filter_map(StoredSample::normalize)
        .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)))
}

fn count_since(samples: &[StoredSample], since: DateTime<Utc>) -> usize {
    samples
        .iter()
        .filter_map(|s| s.timestamp.normalize())
        .filter(|at| *at >= since)
        .count()
}
