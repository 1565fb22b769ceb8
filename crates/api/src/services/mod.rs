//! Startup services that sit outside the request path.

pub mod admin_bootstrap;

pub use admin_bootstrap::bootstrap_admin;
