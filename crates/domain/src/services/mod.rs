//! Domain services for the workforce tracker.
//!
//! Services hold the capture, presence and directory logic and talk to the
//! outside world only through the ports in [`crate::ports`].

pub mod auth;
pub mod capture;
pub mod directory;
pub mod keep_alive;
pub mod monitor;
pub mod presence;
pub mod stats;
pub mod status;

pub use auth::{AuthService, SignedIn, USER_DATA_NOT_FOUND};
pub use capture::{BackgroundSampler, LocationCaptureService, LOCATION_TASK_NAME, TRACKING_USER_KEY};
pub use directory::{DeletionReport, UserDirectoryService};
pub use keep_alive::{KeepAlive, DEFAULT_KEEP_ALIVE_PERIOD};
pub use monitor::{StatusMonitor, StatusSnapshot, Transition};
pub use presence::{Presence, PresencePolicy, PresenceService};
pub use stats::{TrackingStatsService, DEFAULT_ACTIVITY_GAP_MINUTES};
pub use status::StatusAggregator;
