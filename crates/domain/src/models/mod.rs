//! Domain models for the workforce tracker.

pub mod location;
pub mod status;
pub mod user;

pub use location::{
    Coordinates, LocationSample, NewLocationSample, PositionFix, SampleId, SampleTimestamp,
    StoredSample,
};
pub use status::{format_last_active, DashboardStats, EmployeeStatus, TrackingStats};
pub use user::{NewUserAccount, ProfileUpdate, Role, SignUpRequest, UserAccount};
