//! Ports: the collaborators the core consumes, expressed as traits.
//!
//! Each port module also ships an in-memory implementation used by tests
//! and local development.

pub mod auth;
pub mod device;
pub mod directory;
pub mod sample_store;

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::DomainError;
use crate::models::SampleId;

pub use auth::{AuthError, AuthProvider, InMemoryAuthProvider, Principal, Session, SessionEvent};
pub use device::{
    Accuracy, BatteryMonitor, DeviceError, FixedBattery, ForegroundNotification,
    InMemoryKeyValueStore, KeyValueStore, LocationProvider, LocationUpdate, LocationUpdateHandler,
    PermissionStatus, SimulatedLocationProvider, UpdateOptions,
};
pub use directory::{DirectoryStore, InMemoryDirectory};
pub use sample_store::{InMemorySampleStore, SampleStore};

/// Capacity of the change broadcast channels.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Errors reported by store ports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Store not configured or not reachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The requested query needs an index or feature the store does not have.
    #[error("query capability missing: {0}")]
    QueryCapabilityMissing(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Change notification emitted by a store's live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    SampleInserted { user_id: Uuid, id: SampleId },
    SampleDeleted { id: SampleId },
    UserCreated(Uuid),
    UserUpdated(Uuid),
    UserDeleted(Uuid),
}

/// Backend capability bundle injected into every service.
#[derive(Clone)]
pub struct Capabilities {
    pub auth: Arc<dyn AuthProvider>,
    pub directory: Arc<dyn DirectoryStore>,
    pub samples: Arc<dyn SampleStore>,
    pub clock: Arc<dyn Clock>,
}

impl Capabilities {
    pub fn builder() -> CapabilitiesBuilder {
        CapabilitiesBuilder::default()
    }

    /// Fully in-memory backend sharing one clock.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            auth: Arc::new(InMemoryAuthProvider::new(clock.clone())),
            directory: Arc::new(InMemoryDirectory::new(clock.clone())),
            samples: Arc::new(InMemorySampleStore::new(clock.clone())),
            clock,
        }
    }
}

/// Builder that refuses to produce a bundle with a missing backend.
#[derive(Default)]
pub struct CapabilitiesBuilder {
    auth: Option<Arc<dyn AuthProvider>>,
    directory: Option<Arc<dyn DirectoryStore>>,
    samples: Option<Arc<dyn SampleStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CapabilitiesBuilder {
    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn DirectoryStore>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn samples(mut self, samples: Arc<dyn SampleStore>) -> Self {
        self.samples = Some(samples);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fails with `BackendUnavailable` naming the first missing backend.
    pub fn build(self) -> Result<Capabilities, DomainError> {
        let missing = |name: &str| DomainError::BackendUnavailable(format!("{} not configured", name));
        Ok(Capabilities {
            auth: self.auth.ok_or_else(|| missing("auth provider"))?,
            directory: self.directory.ok_or_else(|| missing("directory store"))?,
            samples: self.samples.ok_or_else(|| missing("sample store"))?,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}
