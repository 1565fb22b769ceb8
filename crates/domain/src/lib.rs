//! Domain layer for the workforce tracker.
//!
//! This crate contains:
//! - Domain models (LocationSample, UserAccount, EmployeeStatus)
//! - Ports: traits for the backend stores, auth provider and device APIs,
//!   each with an in-memory implementation
//! - Services: location capture, presence inference, status aggregation
//! - Domain error types

pub mod clock;
pub mod error;
pub mod models;
pub mod ports;
pub mod services;

pub use error::DomainError;
