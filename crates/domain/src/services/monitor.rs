//! Live employee status: re-evaluates presence on store changes and on demand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::status::StatusAggregator;
use crate::clock::Clock;
use crate::error::DomainError;
use crate::models::EmployeeStatus;
use crate::ports::{DirectoryStore, SampleStore, StoreChange};

/// Latest aggregation result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub statuses: Vec<EmployeeStatus>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// A change of a user's online state between two refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub user_id: Uuid,
    pub online: bool,
}

impl Transition {
    pub fn label(&self) -> &'static str {
        if self.online {
            "Offline -> Online"
        } else {
            "Online -> Offline"
        }
    }
}

pub struct StatusMonitor {
    aggregator: Arc<StatusAggregator>,
    clock: Arc<dyn Clock>,
    sender: watch::Sender<StatusSnapshot>,
    /// Held from aggregation through publish so snapshots land in call order.
    refresh_lock: Mutex<()>,
    refreshes: AtomicU64,
}

impl StatusMonitor {
    pub fn new(aggregator: Arc<StatusAggregator>, clock: Arc<dyn Clock>) -> Self {
        let (sender, _) = watch::channel(StatusSnapshot::default());
        Self {
            aggregator,
            clock,
            sender,
            refresh_lock: Mutex::new(()),
            refreshes: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.sender.borrow().clone()
    }

    /// Completed refreshes since the monitor was created.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Re-aggregates, publishes the new snapshot and returns the transitions.
    /// On failure the previous snapshot stays in place.
    ///
    /// Concurrent callers are serialized, so a slow aggregation never
    /// replaces a snapshot published after it started.
    pub async fn refresh(&self) -> Result<Vec<Transition>, DomainError> {
        let _guard = self.refresh_lock.lock().await;
        let statuses = self.aggregator.list_employee_statuses().await?;

        let previous: HashMap<Uuid, bool> = self
            .sender
            .borrow()
            .statuses
            .iter()
            .map(|s| (s.user_id, s.is_online))
            .collect();

        let transitions: Vec<Transition> = statuses
            .iter()
            .filter(|s| previous.get(&s.user_id).copied().unwrap_or(false) != s.is_online)
            .map(|s| Transition {
                user_id: s.user_id,
                online: s.is_online,
            })
            .collect();

        for t in &transitions {
            info!(user_id = %t.user_id, transition = t.label(), "Presence changed");
        }

        self.sender.send_replace(StatusSnapshot {
            statuses,
            refreshed_at: Some(self.clock.now()),
        });
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(transitions)
    }

    /// Refreshes whenever the directory or the sample store reports a change,
    /// until `shutdown` flips to true. Events already queued when a refresh
    /// starts are folded into it.
    pub fn spawn(
        self: Arc<Self>,
        directory: Arc<dyn DirectoryStore>,
        samples: Arc<dyn SampleStore>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let mut directory_rx = Some(directory.subscribe());
        let mut samples_rx = Some(samples.subscribe());

        tokio::spawn(async move {
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Initial status refresh failed");
            }

            loop {
                let changed = tokio::select! {
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() {
                            break;
                        }
                        false
                    }
                    changed = next_change(&mut directory_rx) => changed,
                    changed = next_change(&mut samples_rx) => changed,
                };

                if changed {
                    let folded = drain_pending(&mut directory_rx) + drain_pending(&mut samples_rx);
                    if folded > 0 {
                        debug!(folded, "Coalesced queued store changes");
                    }
                    if let Err(e) = self.refresh().await {
                        warn!(error = %e, "Status refresh failed");
                    }
                }
            }
            debug!("Status monitor stopped");
        })
    }
}

/// Waits for the next change. A closed feed goes quiet instead of spinning.
async fn next_change(rx: &mut Option<broadcast::Receiver<StoreChange>>) -> bool {
    let Some(receiver) = rx.as_mut() else {
        return std::future::pending().await;
    };

    match receiver.recv().await {
        Ok(_) | Err(RecvError::Lagged(_)) => true,
        Err(RecvError::Closed) => {
            *rx = None;
            false
        }
    }
}

/// Discards changes that are already queued and returns how many there were.
fn drain_pending(rx: &mut Option<broadcast::Receiver<StoreChange>>) -> usize {
    let Some(receiver) = rx.as_mut() else {
        return 0;
    };

    let mut drained = 0;
    loop {
        match receiver.try_recv() {
            Ok(_) => drained += 1,
            Err(TryRecvError::Lagged(skipped)) => drained += skipped as usize,
            Err(TryRecvError::Empty) => return drained,
            Err(TryRecvError::Closed) => {
                *rx = None;
                return drained;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{NewLocationSample, NewUserAccount, Role};
    use crate::ports::{InMemoryDirectory, InMemorySampleStore};
    use crate::models::{SampleId, StoredSample};
    use crate::ports::StoreError;
    use crate::services::presence::PresenceService;
    use chrono::Duration;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration as StdDuration;
    use tokio::sync::Notify;

    struct Setup {
        clock: Arc<ManualClock>,
        directory: Arc<InMemoryDirectory>,
        samples: Arc<InMemorySampleStore>,
        monitor: Arc<StatusMonitor>,
    }

    fn setup() -> Setup {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let directory = Arc::new(InMemoryDirectory::new(clock.clone()));
        let samples = Arc::new(InMemorySampleStore::new(clock.clone()));
        let presence = Arc::new(PresenceService::new(samples.clone(), clock.clone()));
        let aggregator = Arc::new(StatusAggregator::new(directory.clone(), presence));
        let monitor = Arc::new(StatusMonitor::new(aggregator, clock.clone()));
        Setup {
            clock,
            directory,
            samples,
            monitor,
        }
    }

    async fn employee(directory: &InMemoryDirectory) -> Uuid {
        directory
            .create(NewUserAccount {
                uid: Uuid::new_v4(),
                email: format!("{}@example.com", Uuid::new_v4()),
                display_name: "Field Worker".into(),
                role: Role::Employee,
                phone_number: None,
                photo_url: None,
            })
            .await
            .unwrap()
            .uid
    }

    fn sample(user_id: Uuid) -> NewLocationSample {
        NewLocationSample {
            user_id,
            lat: 1.0,
            lng: 2.0,
            battery_level: 80,
            speed: Some(0.0),
            heading: None,
        }
    }

    #[tokio::test]
    async fn test_refresh_reports_transitions() {
        let s = setup();
        let user = employee(&s.directory).await;

        assert!(s.monitor.refresh().await.unwrap().is_empty());

        s.samples.insert(sample(user)).await.unwrap();
        let transitions = s.monitor.refresh().await.unwrap();
        assert_eq!(
            transitions,
            vec![Transition {
                user_id: user,
                online: true
            }]
        );
        assert_eq!(transitions[0].label(), "Offline -> Online");

        // Time alone takes the user offline again.
        s.clock.advance(Duration::minutes(4));
        let transitions = s.monitor.refresh().await.unwrap();
        assert_eq!(transitions.len(), 1);
        assert!(!transitions[0].online);
        assert!(!s.monitor.snapshot().statuses[0].is_online);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_snapshot() {
        let s = setup();
        employee(&s.directory).await;
        s.monitor.refresh().await.unwrap();
        let before = s.monitor.snapshot();

        s.directory.set_available(false);
        assert!(s.monitor.refresh().await.is_err());
        assert_eq!(s.monitor.snapshot(), before);
    }

    #[tokio::test]
    async fn test_spawned_monitor_follows_sample_writes() {
        let s = setup();
        let user = employee(&s.directory).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut updates = s.monitor.subscribe();

        let handle = s
            .monitor
            .clone()
            .spawn(s.directory.clone(), s.samples.clone(), shutdown_rx);

        updates.changed().await.unwrap();
        assert!(!updates.borrow_and_update().statuses[0].is_online);

        s.samples.insert(sample(user)).await.unwrap();
        updates.changed().await.unwrap();
        assert!(updates.borrow_and_update().statuses[0].is_online);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    /// Sample store whose next `latest_for_user` stalls after reading until
    /// released.
    struct GatedSamples {
        inner: Arc<InMemorySampleStore>,
        armed: AtomicBool,
        reached: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl SampleStore for GatedSamples {
        async fn insert(&self, sample: NewLocationSample) -> Result<StoredSample, StoreError> {
            self.inner.insert(sample).await
        }

        async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<StoredSample>, StoreError> {
            let latest = self.inner.latest_for_user(user_id).await;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            latest
        }

        async fn recent_for_user(
            &self,
            user_id: Uuid,
            since: DateTime<Utc>,
        ) -> Result<Vec<StoredSample>, StoreError> {
            self.inner.recent_for_user(user_id, since).await
        }

        async fn all_for_user(&self, user_id: Uuid) -> Result<Vec<StoredSample>, StoreError> {
            self.inner.all_for_user(user_id).await
        }

        async fn delete_sample(&self, id: SampleId) -> Result<(), StoreError> {
            self.inner.delete_sample(id).await
        }

        fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
            self.inner.subscribe()
        }
    }

    #[tokio::test]
    async fn test_slow_refresh_does_not_overwrite_newer_snapshot() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let directory = Arc::new(InMemoryDirectory::new(clock.clone()));
        let samples = Arc::new(GatedSamples {
            inner: Arc::new(InMemorySampleStore::new(clock.clone())),
            armed: AtomicBool::new(true),
            reached: Notify::new(),
            release: Notify::new(),
        });
        let presence = Arc::new(PresenceService::new(samples.clone(), clock.clone()));
        let aggregator = Arc::new(StatusAggregator::new(directory.clone(), presence));
        let monitor = Arc::new(StatusMonitor::new(aggregator, clock.clone()));
        let user = employee(&directory).await;

        // First refresh reads "no samples", then stalls.
        let first = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.refresh().await }
        });
        samples.reached.notified().await;

        samples.inner.insert(sample(user)).await.unwrap();
        let mut second = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.refresh().await }
        });

        // The second refresh must queue behind the stalled one.
        assert!(
            tokio::time::timeout(StdDuration::from_millis(100), &mut second)
                .await
                .is_err()
        );

        samples.release.notify_one();
        assert!(first.await.unwrap().unwrap().is_empty());
        let transitions = second.await.unwrap().unwrap();

        assert_eq!(
            transitions,
            vec![Transition {
                user_id: user,
                online: true
            }]
        );
        assert!(monitor.snapshot().statuses[0].is_online);
        assert_eq!(monitor.refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_queued_changes_fold_into_one_refresh() {
        let s = setup();
        let user = employee(&s.directory).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = s
            .monitor
            .clone()
            .spawn(s.directory.clone(), s.samples.clone(), shutdown_rx);

        // Queued before the monitor task first runs.
        for _ in 0..5 {
            s.samples.insert(sample(user)).await.unwrap();
        }

        tokio::time::timeout(StdDuration::from_secs(5), async {
            while s.monitor.refresh_count() < 2 {
                tokio::time::sleep(StdDuration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        // Initial refresh plus one for the five queued inserts.
        assert_eq!(s.monitor.refresh_count(), 2);
        assert!(s.monitor.snapshot().statuses[0].is_online);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
