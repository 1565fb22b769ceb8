//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

use crate::ports::{AuthError, DeviceError, StoreError};

/// Which location permission grant was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope {
    Foreground,
    Background,
}

impl std::fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionScope::Foreground => write!(f, "foreground"),
            PermissionScope::Background => write!(f, "background"),
        }
    }
}

/// Errors raised by the capture, presence and directory services.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Location permission refused; terminal until the user re-grants it.
    #[error("Location permission not granted ({0})")]
    PermissionDenied(PermissionScope),

    /// Auth or store not configured/reachable.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Indexed query path missing. Normally handled internally by the fallback scan.
    #[error("Query capability missing: {0}")]
    QueryCapabilityMissing(String),

    /// A single sample could not be persisted.
    #[error("Failed to write location sample: {0}")]
    SampleWriteFailed(String),

    /// Background sample with no tracked user recorded.
    #[error("No tracked user recorded; sample dropped")]
    OrphanSample,

    /// The device could not produce a position fix.
    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Device storage error: {0}")]
    DeviceStorage(String),

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => DomainError::BackendUnavailable(msg),
            StoreError::QueryCapabilityMissing(msg) => DomainError::QueryCapabilityMissing(msg),
            StoreError::Conflict(msg) => DomainError::Conflict(msg),
            StoreError::NotFound(msg) => DomainError::Store(format!("not found: {}", msg)),
            StoreError::Backend(msg) => DomainError::Store(msg),
        }
    }
}

impl From<AuthError> for DomainError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => DomainError::Unauthorized(err.to_string()),
            AuthError::EmailInUse => DomainError::Conflict(err.to_string()),
            AuthError::Unavailable(msg) => DomainError::BackendUnavailable(msg),
            AuthError::Backend(msg) => DomainError::Store(msg),
        }
    }
}

impl From<DeviceError> for DomainError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::PermissionDenied(scope) => DomainError::PermissionDenied(scope),
            DeviceError::Storage(msg) => DomainError::DeviceStorage(msg),
            other => DomainError::LocationUnavailable(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string())
            })
            .collect();
        messages.sort();
        DomainError::Validation(messages.join("; "))
    }
}

impl DomainError {
    /// True for failures the UI has to surface as-is (permission or configuration).
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            DomainError::PermissionDenied(_) | DomainError::BackendUnavailable(_)
        )
    }
}
