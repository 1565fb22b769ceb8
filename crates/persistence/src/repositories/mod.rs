//! Repository implementations of the domain store ports.

pub mod auth;
pub mod location_sample;
pub mod user_account;

pub use auth::PgAuthProvider;
pub use location_sample::PgSampleStore;
pub use user_account::PgDirectory;
