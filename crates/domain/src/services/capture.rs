//! Location capture: permission negotiation, sampling and persistence.
//!
//! Foreground callers drive [`LocationCaptureService`]. The OS drives
//! [`BackgroundSampler`], which is registered by `start_tracking` and learns
//! which user it samples for from the durable `tracking_userId` entry.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{DomainError, PermissionScope};
use crate::models::{NewLocationSample, PositionFix, StoredSample};
use crate::ports::{
    Accuracy, BatteryMonitor, KeyValueStore, LocationProvider, LocationUpdate,
    LocationUpdateHandler, SampleStore, StoreError, UpdateOptions,
};

/// Name under which the background sampling task is registered.
pub const LOCATION_TASK_NAME: &str = "background-location-task";

/// Key of the durable entry naming the tracked user.
pub const TRACKING_USER_KEY: &str = "tracking_userId";

/// Builds a sample from `fix` and appends it to the store.
async fn persist_fix(
    samples: &dyn SampleStore,
    battery: &dyn BatteryMonitor,
    user_id: Uuid,
    fix: &PositionFix,
) -> Result<StoredSample, DomainError> {
    let fraction = battery.battery_level().await?;
    let sample = NewLocationSample::from_fix(user_id, fix, fraction);
    sample.validate()?;

    samples.insert(sample).await.map_err(|e| match e {
        StoreError::Unavailable(msg) => DomainError::BackendUnavailable(msg),
        other => DomainError::SampleWriteFailed(other.to_string()),
    })
}

pub struct LocationCaptureService {
    location: Arc<dyn LocationProvider>,
    storage: Arc<dyn KeyValueStore>,
    battery: Arc<dyn BatteryMonitor>,
    samples: Arc<dyn SampleStore>,
    options: UpdateOptions,
}

impl LocationCaptureService {
    pub fn new(
        location: Arc<dyn LocationProvider>,
        storage: Arc<dyn KeyValueStore>,
        battery: Arc<dyn BatteryMonitor>,
        samples: Arc<dyn SampleStore>,
    ) -> Self {
        Self {
            location,
            storage,
            battery,
            samples,
            options: UpdateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    /// Asks for foreground, then background permission. The background prompt
    /// is never shown when the foreground grant is refused.
    pub async fn request_permissions(&self) -> Result<bool, DomainError> {
        Ok(self.refused_scope().await?.is_none())
    }

    async fn refused_scope(&self) -> Result<Option<PermissionScope>, DomainError> {
        let foreground = self.location.request_foreground_permission().await?;
        if !foreground.is_granted() {
            warn!(status = ?foreground, "Foreground location permission not granted");
            return Ok(Some(PermissionScope::Foreground));
        }

        let background = self.location.request_background_permission().await?;
        if !background.is_granted() {
            warn!(status = ?background, "Background location permission not granted");
            return Ok(Some(PermissionScope::Background));
        }

        Ok(None)
    }

    /// Starts background tracking for `user_id`.
    ///
    /// Records the user before registering the task so the first callback can
    /// already attribute its sample. Calling this again replaces the task
    /// handler rather than adding a second one.
    pub async fn start_tracking(&self, user_id: Uuid) -> Result<(), DomainError> {
        if let Some(scope) = self.refused_scope().await? {
            return Err(DomainError::PermissionDenied(scope));
        }

        if let Err(e) = self.save_current_location(user_id).await {
            warn!(user_id = %user_id, error = %e, "Initial location sample failed");
        }

        self.storage
            .set(TRACKING_USER_KEY, &user_id.to_string())
            .await?;

        let sampler = BackgroundSampler::new(
            self.storage.clone(),
            self.battery.clone(),
            self.samples.clone(),
        );
        self.location.define_task(LOCATION_TASK_NAME, Arc::new(sampler));

        self.location
            .start_updates(LOCATION_TASK_NAME, &self.options)
            .await?;

        info!(
            user_id = %user_id,
            interval_secs = self.options.time_interval.as_secs(),
            distance_m = self.options.distance_interval_m,
            "Location tracking started"
        );
        Ok(())
    }

    /// Stops background updates. A no-op when tracking is not active.
    pub async fn stop_tracking(&self) -> Result<(), DomainError> {
        if self.location.has_started_updates(LOCATION_TASK_NAME).await? {
            self.location.stop_updates(LOCATION_TASK_NAME).await?;
            info!("Location tracking stopped");
        } else {
            debug!("Stop requested while not tracking");
        }
        Ok(())
    }

    /// Queries the OS on every call; the answer is never cached.
    pub async fn is_tracking(&self) -> bool {
        match self.location.has_started_updates(LOCATION_TASK_NAME).await {
            Ok(started) => started,
            Err(e) => {
                warn!(error = %e, "Could not query tracking state");
                false
            }
        }
    }

    /// One-shot foreground sample. Errors go back to the caller.
    pub async fn save_current_location(&self, user_id: Uuid) -> Result<StoredSample, DomainError> {
        let fix = self.location.current_position(Accuracy::High).await?;
        let stored =
            persist_fix(self.samples.as_ref(), self.battery.as_ref(), user_id, &fix).await?;
        debug!(user_id = %user_id, sample_id = stored.id, "Saved current location");
        Ok(stored)
    }
}

/// Handler invoked by the OS on each qualifying location change.
pub struct BackgroundSampler {
    storage: Arc<dyn KeyValueStore>,
    battery: Arc<dyn BatteryMonitor>,
    samples: Arc<dyn SampleStore>,
}

impl BackgroundSampler {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        battery: Arc<dyn BatteryMonitor>,
        samples: Arc<dyn SampleStore>,
    ) -> Self {
        Self {
            storage,
            battery,
            samples,
        }
    }

    async fn tracked_user(&self) -> Result<Uuid, DomainError> {
        let stored = self.storage.get(TRACKING_USER_KEY).await?;
        stored
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or(DomainError::OrphanSample)
    }

    /// Attributes and persists one fix.
    pub async fn record(&self, fix: &PositionFix) -> Result<StoredSample, DomainError> {
        let user_id = self.tracked_user().await?;
        persist_fix(self.samples.as_ref(), self.battery.as_ref(), user_id, fix).await
    }
}

#[async_trait::async_trait]
impl LocationUpdateHandler for BackgroundSampler {
    async fn handle(&self, update: LocationUpdate) {
        let fix = match update {
            LocationUpdate::Error(message) => {
                error!(error = %message, "Background location task error");
                return;
            }
            LocationUpdate::Fixes(fixes) => match fixes.into_iter().next() {
                Some(fix) => fix,
                None => return,
            },
        };

        match self.record(&fix).await {
            Ok(stored) => {
                debug!(user_id = %stored.user_id, sample_id = stored.id, "Background sample saved");
            }
            Err(DomainError::OrphanSample) => {
                warn!("Background sample dropped: no tracked user recorded");
            }
            Err(e) => {
                error!(error = %e, "Background sample not saved");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::ports::{
        FixedBattery, InMemoryKeyValueStore, InMemorySampleStore, PermissionStatus,
        SimulatedLocationProvider,
    };
    use chrono::{Duration, TimeZone, Utc};

    struct Harness {
        clock: Arc<ManualClock>,
        location: Arc<SimulatedLocationProvider>,
        storage: Arc<InMemoryKeyValueStore>,
        battery: Arc<FixedBattery>,
        samples: Arc<InMemorySampleStore>,
        service: LocationCaptureService,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ));
        let location = Arc::new(SimulatedLocationProvider::new(clock.clone()));
        let storage = Arc::new(InMemoryKeyValueStore::new());
        let battery = Arc::new(FixedBattery::new(0.42));
        let samples = Arc::new(InMemorySampleStore::new(clock.clone()));
        let service = LocationCaptureService::new(
            location.clone(),
            storage.clone(),
            battery.clone(),
            samples.clone(),
        );
        Harness {
            clock,
            location,
            storage,
            battery,
            samples,
            service,
        }
    }

    #[tokio::test]
    async fn test_foreground_denied_skips_background_prompt() {
        let h = harness();
        h.location.set_foreground_permission(PermissionStatus::Denied);

        assert!(!h.service.request_permissions().await.unwrap());
        assert_eq!(
            h.location.requested_permissions(),
            vec![PermissionScope::Foreground]
        );
    }

    #[tokio::test]
    async fn test_background_denied() {
        let h = harness();
        h.location.set_background_permission(PermissionStatus::Denied);

        assert!(!h.service.request_permissions().await.unwrap());
        assert_eq!(
            h.location.requested_permissions(),
            vec![PermissionScope::Foreground, PermissionScope::Background]
        );
    }

    #[tokio::test]
    async fn test_start_tracking_denied() {
        let h = harness();
        h.location.set_foreground_permission(PermissionStatus::Denied);

        let result = h.service.start_tracking(Uuid::new_v4()).await;
        assert!(matches!(
            result,
            Err(DomainError::PermissionDenied(PermissionScope::Foreground))
        ));
        assert!(h.samples.is_empty());
        assert!(!h.service.is_tracking().await);
    }

    #[tokio::test]
    async fn test_start_tracking_happy_path() {
        let h = harness();
        let user = Uuid::new_v4();

        h.service.start_tracking(user).await.unwrap();

        assert!(h.service.is_tracking().await);
        assert_eq!(h.samples.samples_for(user).len(), 1);
        assert_eq!(
            h.storage.get(TRACKING_USER_KEY).await.unwrap(),
            Some(user.to_string())
        );
        let options = h.location.started_options(LOCATION_TASK_NAME).unwrap();
        assert_eq!(options, UpdateOptions::default());
    }

    #[tokio::test]
    async fn test_sample_fields() {
        let h = harness();
        let user = Uuid::new_v4();
        h.location.set_position(40.7128, -74.0060);

        let stored = h.service.save_current_location(user).await.unwrap();
        assert_eq!(stored.battery_level, 42);
        assert_eq!(stored.speed, Some(0.0));
        assert_eq!(stored.heading, None);
        assert_eq!(stored.timestamp.normalize(), Some(h.clock.now()));
    }

    #[tokio::test]
    async fn test_initial_sample_failure_does_not_block_start() {
        let h = harness();
        h.location.clear_position();

        h.service.start_tracking(Uuid::new_v4()).await.unwrap();
        assert!(h.service.is_tracking().await);
        assert!(h.samples.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let h = harness();
        h.storage.set_failing(true);

        let result = h.service.start_tracking(Uuid::new_v4()).await;
        assert!(matches!(result, Err(DomainError::DeviceStorage(_))));
        assert!(!h.service.is_tracking().await);
    }

    #[tokio::test]
    async fn test_restart_replaces_handler() {
        let h = harness();
        let user = Uuid::new_v4();

        h.service.start_tracking(user).await.unwrap();
        h.service.start_tracking(user).await.unwrap();
        assert_eq!(h.location.task_definitions(), 2);
        let before = h.samples.insert_count();

        h.clock.advance(Duration::seconds(35));
        assert!(h.location.emit_position(LOCATION_TASK_NAME, 1.0, 2.0).await);
        assert_eq!(h.samples.insert_count(), before + 1);
    }

    #[tokio::test]
    async fn test_stop_when_not_tracking() {
        let h = harness();
        assert!(h.service.stop_tracking().await.is_ok());
        assert!(h.service.stop_tracking().await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_cancels_future_callbacks() {
        let h = harness();
        let user = Uuid::new_v4();
        h.service.start_tracking(user).await.unwrap();
        h.service.stop_tracking().await.unwrap();

        assert!(!h.service.is_tracking().await);
        assert!(!h.location.emit_position(LOCATION_TASK_NAME, 1.0, 2.0).await);
        assert_eq!(h.samples.samples_for(user).len(), 1);
    }

    #[tokio::test]
    async fn test_background_sampler_orphan() {
        let h = harness();
        let sampler =
            BackgroundSampler::new(h.storage.clone(), h.battery.clone(), h.samples.clone());
        let fix = PositionFix::at(1.0, 2.0, h.clock.now());

        assert!(matches!(
            sampler.record(&fix).await,
            Err(DomainError::OrphanSample)
        ));
        sampler.handle(LocationUpdate::Fixes(vec![fix])).await;
        assert!(h.samples.is_empty());
    }

    #[tokio::test]
    async fn test_background_write_failure_keeps_cadence() {
        let h = harness();
        let user = Uuid::new_v4();
        h.service.start_tracking(user).await.unwrap();

        h.samples.set_fail_writes(true);
        assert!(h.location.emit_position(LOCATION_TASK_NAME, 1.0, 2.0).await);
        assert_eq!(h.samples.samples_for(user).len(), 1);

        h.samples.set_fail_writes(false);
        assert!(h.location.emit_position(LOCATION_TASK_NAME, 1.5, 2.5).await);
        assert_eq!(h.samples.samples_for(user).len(), 2);
        assert!(h.service.is_tracking().await);
    }

    #[tokio::test]
    async fn test_background_error_update_is_ignored() {
        let h = harness();
        h.service.start_tracking(Uuid::new_v4()).await.unwrap();
        let before = h.samples.len();

        h.location
            .emit(LOCATION_TASK_NAME, LocationUpdate::Error("gps lost".into()))
            .await;
        h.location
            .emit(LOCATION_TASK_NAME, LocationUpdate::Fixes(vec![]))
            .await;
        assert_eq!(h.samples.len(), before);
    }

    #[tokio::test]
    async fn test_save_current_location_reports_write_failure() {
        let h = harness();
        h.samples.set_fail_writes(true);
        assert!(matches!(
            h.service.save_current_location(Uuid::new_v4()).await,
            Err(DomainError::SampleWriteFailed(_))
        ));

        h.samples.set_fail_writes(false);
        h.samples.set_available(false);
        assert!(matches!(
            h.service.save_current_location(Uuid::new_v4()).await,
            Err(DomainError::BackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_tracking_session_drives_presence() {
        use crate::services::presence::PresenceService;

        let h = harness();
        let presence = PresenceService::new(h.samples.clone(), h.clock.clone());
        let user = Uuid::new_v4();
        let t0 = h.clock.now();

        h.service.start_tracking(user).await.unwrap();
        h.clock.set(t0 + Duration::seconds(35));
        h.location.emit_position(LOCATION_TASK_NAME, 1.0, 2.0).await;
        h.clock.set(t0 + Duration::seconds(70));
        h.location.emit_position(LOCATION_TASK_NAME, 1.0, 2.1).await;

        h.clock.set(t0 + Duration::seconds(90));
        let now = presence.evaluate(user).await.unwrap();
        assert!(now.is_online);
        assert_eq!(now.last_active, Some(t0 + Duration::seconds(70)));

        h.clock.set(t0 + Duration::seconds(260));
        assert!(!presence.is_online(user).await.unwrap());
    }
}
