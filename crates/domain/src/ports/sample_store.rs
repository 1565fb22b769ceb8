//! Sample store port: the append-only collection of location samples.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{StoreChange, StoreError, CHANGE_CHANNEL_CAPACITY};
use crate::clock::Clock;
use crate::models::{NewLocationSample, SampleId, SampleTimestamp, StoredSample};

/// Append-only store of location samples.
///
/// `latest_for_user` and `recent_for_user` are the indexed query paths and may
/// fail with [`StoreError::QueryCapabilityMissing`]; callers fall back to
/// `all_for_user` and filter client-side.
#[async_trait::async_trait]
pub trait SampleStore: Send + Sync {
    /// Appends a sample. The store assigns the id and the timestamp.
    async fn insert(&self, sample: NewLocationSample) -> Result<StoredSample, StoreError>;

    /// Most recent sample for a user (ordered by timestamp desc, limit 1).
    async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<StoredSample>, StoreError>;

    /// Samples for a user with `timestamp >= since`, newest first.
    async fn recent_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredSample>, StoreError>;

    /// Every sample for a user, unordered (equality query only).
    async fn all_for_user(&self, user_id: Uuid) -> Result<Vec<StoredSample>, StoreError>;

    async fn delete_sample(&self, id: SampleId) -> Result<(), StoreError>;

    /// Live subscription to changes in the collection.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// In-memory sample store with switchable failure modes.
pub struct InMemorySampleStore {
    clock: Arc<dyn Clock>,
    samples: RwLock<Vec<StoredSample>>,
    next_id: AtomicI64,
    indexed: AtomicBool,
    available: AtomicBool,
    fail_writes: AtomicBool,
    failing_deletes: Mutex<HashSet<SampleId>>,
    inserts: AtomicUsize,
    changes: broadcast::Sender<StoreChange>,
}

impl InMemorySampleStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            clock,
            samples: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            indexed: AtomicBool::new(true),
            available: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            failing_deletes: Mutex::new(HashSet::new()),
            inserts: AtomicUsize::new(0),
            changes,
        }
    }

    /// Store without the composite index: indexed queries fail.
    pub fn without_index(clock: Arc<dyn Clock>) -> Self {
        let store = Self::new(clock);
        store.set_indexed(false);
        store
    }

    pub fn set_indexed(&self, indexed: bool) {
        self.indexed.store(indexed, Ordering::SeqCst);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `delete_sample(id)` fail.
    pub fn fail_delete_of(&self, id: SampleId) {
        self.lock_failing().insert(id);
    }

    /// Inserts a raw document, bypassing server timestamp assignment.
    /// Lets tests seed samples with arbitrary timestamp shapes.
    pub fn seed(
        &self,
        user_id: Uuid,
        lat: f64,
        lng: f64,
        timestamp: impl Into<SampleTimestamp>,
    ) -> SampleId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.write_samples().push(StoredSample {
            id,
            user_id,
            lat,
            lng,
            timestamp: timestamp.into(),
            battery_level: 100,
            speed: Some(0.0),
            heading: None,
        });
        id
    }

    /// Successful inserts since creation.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.read_samples().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn samples_for(&self, user_id: Uuid) -> Vec<StoredSample> {
        self.read_samples()
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("sample store offline".into()))
        }
    }

    fn check_indexed(&self) -> Result<(), StoreError> {
        if self.indexed.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::QueryCapabilityMissing(
                "composite index on (userId, timestamp) is missing".into(),
            ))
        }
    }

    fn read_samples(&self) -> std::sync::RwLockReadGuard<'_, Vec<StoredSample>> {
        self.samples.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_samples(&self) -> std::sync::RwLockWriteGuard<'_, Vec<StoredSample>> {
        self.samples.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_failing(&self) -> std::sync::MutexGuard<'_, HashSet<SampleId>> {
        self.failing_deletes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Samples of a user whose timestamps can be read, newest first.
    fn ordered_for(&self, user_id: Uuid) -> Vec<(DateTime<Utc>, StoredSample)> {
        let mut ordered: Vec<_> = self
            .read_samples()
            .iter()
            .filter(|s| s.user_id == user_id)
            .filter_map(|s| s.timestamp.normalize().map(|at| (at, s.clone())))
            .collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.id.cmp(&a.1.id)));
        ordered
    }
}

#[async_trait::async_trait]
impl SampleStore for InMemorySampleStore {
    async fn insert(&self, sample: NewLocationSample) -> Result<StoredSample, StoreError> {
        self.check_available()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated write failure".into()));
        }

        let stored = StoredSample {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            user_id: sample.user_id,
            lat: sample.lat,
            lng: sample.lng,
            timestamp: SampleTimestamp::Instant(self.clock.now()),
            battery_level: sample.battery_level,
            speed: sample.speed,
            heading: sample.heading,
        };
        self.write_samples().push(stored.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);

        let _ = self.changes.send(StoreChange::SampleInserted {
            user_id: stored.user_id,
            id: stored.id,
        });
        Ok(stored)
    }

    async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<StoredSample>, StoreError> {
        self.check_available()?;
        self.check_indexed()?;
        Ok(self.ordered_for(user_id).into_iter().next().map(|(_, s)| s))
    }

    async fn recent_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredSample>, StoreError> {
        self.check_available()?;
        self.check_indexed()?;
        Ok(self
            .ordered_for(user_id)
            .into_iter()
            .take_while(|(at, _)| *at >= since)
            .map(|(_, s)| s)
            .collect())
    }

    async fn all_for_user(&self, user_id: Uuid) -> Result<Vec<StoredSample>, StoreError> {
        self.check_available()?;
        Ok(self.samples_for(user_id))
    }

    async fn delete_sample(&self, id: SampleId) -> Result<(), StoreError> {
        self.check_available()?;
        if self.lock_failing().contains(&id) {
            return Err(StoreError::Backend(format!("simulated delete failure for {}", id)));
        }

        let mut samples = self.write_samples();
        let before = samples.len();
        samples.retain(|s| s.id != id);
        let removed = samples.len() < before;
        drop(samples);

        if removed {
            let _ = self.changes.send(StoreChange::SampleDeleted { id });
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("sample {}", id)))
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone};

    fn setup() -> (Arc<ManualClock>, InMemorySampleStore) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        ));
        let store = InMemorySampleStore::new(clock.clone());
        (clock, store)
    }

    fn new_sample(user_id: Uuid) -> NewLocationSample {
        NewLocationSample {
            user_id,
            lat: 40.0,
            lng: -73.0,
            battery_level: 90,
            speed: Some(0.0),
            heading: None,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_server_timestamp() {
        let (clock, store) = setup();
        let user = Uuid::new_v4();
        let stored = store.insert(new_sample(user)).await.unwrap();
        assert_eq!(stored.timestamp.normalize(), Some(clock.now()));
        assert_eq!(store.insert_count(), 1);
    }

    #[tokio::test]
    async fn test_latest_and_recent() {
        let (clock, store) = setup();
        let user = Uuid::new_v4();
        store.insert(new_sample(user)).await.unwrap();
        clock.advance(Duration::seconds(30));
        let second = store.insert(new_sample(user)).await.unwrap();
        store.insert(new_sample(Uuid::new_v4())).await.unwrap();

        let latest = store.latest_for_user(user).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);

        let recent = store
            .recent_for_user(user, clock.now() - Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn test_without_index_rejects_indexed_queries() {
        let (clock, _) = setup();
        let store = InMemorySampleStore::without_index(clock);
        let user = Uuid::new_v4();
        store.insert(new_sample(user)).await.unwrap();
        assert!(matches!(
            store.latest_for_user(user).await,
            Err(StoreError::QueryCapabilityMissing(_))
        ));
        assert_eq!(store.all_for_user(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_receives_inserts() {
        let (_, store) = setup();
        let mut rx = store.subscribe();
        let user = Uuid::new_v4();
        let stored = store.insert(new_sample(user)).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            StoreChange::SampleInserted {
                user_id: user,
                id: stored.id
            }
        );
    }

    #[tokio::test]
    async fn test_delete_failure_modes() {
        let (_, store) = setup();
        let user = Uuid::new_v4();
        let a = store.insert(new_sample(user)).await.unwrap();
        let b = store.insert(new_sample(user)).await.unwrap();
        store.fail_delete_of(b.id);

        assert!(store.delete_sample(a.id).await.is_ok());
        assert!(store.delete_sample(b.id).await.is_err());
        assert!(matches!(
            store.delete_sample(a.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let (_, store) = setup();
        store.set_available(false);
        assert!(matches!(
            store.insert(new_sample(Uuid::new_v4())).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
