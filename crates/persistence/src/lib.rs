//! Persistence layer for the workforce tracker.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - PostgreSQL implementations of the directory, sample store and auth ports
//! - The LISTEN/NOTIFY change feed behind the store subscriptions

pub mod change_feed;
pub mod db;
pub mod entities;
pub mod error;
pub mod metrics;
pub mod repositories;

pub use change_feed::ChangeFeed;
pub use repositories::{PgAuthProvider, PgDirectory, PgSampleStore};
