//! Foreground keep-alive: periodic one-shot samples while the app is open.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use super::capture::LocationCaptureService;

pub const DEFAULT_KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(30);

/// Runs `save_current_location` every `period` until stopped or dropped.
///
/// Stopping aborts the loop; a write already in flight may or may not land.
pub struct KeepAlive {
    user_id: Uuid,
    task: JoinHandle<()>,
}

impl KeepAlive {
    pub fn spawn(service: Arc<LocationCaptureService>, user_id: Uuid, period: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match service.save_current_location(user_id).await {
                    Ok(stored) => debug!(user_id = %user_id, sample_id = stored.id, "Keep-alive sample saved"),
                    Err(e) => warn!(user_id = %user_id, error = %e, "Keep-alive sample failed"),
                }
            }
        });

        Self { user_id, task }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ports::{
        FixedBattery, InMemoryKeyValueStore, InMemorySampleStore, SimulatedLocationProvider,
    };
    use chrono::Utc;

    fn setup() -> (
        Arc<SimulatedLocationProvider>,
        Arc<InMemorySampleStore>,
        Arc<LocationCaptureService>,
    ) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let location = Arc::new(SimulatedLocationProvider::new(clock.clone()));
        let samples = Arc::new(InMemorySampleStore::new(clock));
        let service = Arc::new(LocationCaptureService::new(
            location.clone(),
            Arc::new(InMemoryKeyValueStore::new()),
            Arc::new(FixedBattery::new(0.9)),
            samples.clone(),
        ));
        (location, samples, service)
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_on_interval_until_stopped() {
        let (_, samples, service) = setup();
        let user = Uuid::new_v4();

        let keep_alive = KeepAlive::spawn(service, user, DEFAULT_KEEP_ALIVE_PERIOD);
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(samples.samples_for(user).len(), 3);

        keep_alive.stop();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(samples.samples_for(user).len(), 3);
        assert!(!keep_alive.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let (location, samples, service) = setup();
        let user = Uuid::new_v4();
        location.clear_position();

        let _keep_alive = KeepAlive::spawn(service, user, DEFAULT_KEEP_ALIVE_PERIOD);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(samples.is_empty());

        location.set_position(10.0, 20.0);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(samples.samples_for(user).len(), 1);
    }
}
