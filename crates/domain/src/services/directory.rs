//! User directory management.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::DomainError;
use crate::models::{ProfileUpdate, UserAccount};
use crate::ports::{DirectoryStore, SampleStore};

/// Outcome of deleting an account and its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub uid: Uuid,
    pub samples_deleted: usize,
    pub samples_failed: usize,
}

pub struct UserDirectoryService {
    directory: Arc<dyn DirectoryStore>,
    samples: Arc<dyn SampleStore>,
}

impl UserDirectoryService {
    pub fn new(directory: Arc<dyn DirectoryStore>, samples: Arc<dyn SampleStore>) -> Self {
        Self { directory, samples }
    }

    pub async fn list(&self) -> Result<Vec<UserAccount>, DomainError> {
        Ok(self.directory.list().await?)
    }

    pub async fn get(&self, uid: Uuid) -> Result<UserAccount, DomainError> {
        self.directory
            .get(uid)
            .await?
            .ok_or(DomainError::UserNotFound(uid))
    }

    /// Applies editable profile fields. Role cannot be changed here.
    pub async fn update_profile(
        &self,
        uid: Uuid,
        update: &ProfileUpdate,
    ) -> Result<UserAccount, DomainError> {
        update.validate()?;
        let mut account = self.get(uid).await?;
        if update.is_empty() {
            return Ok(account);
        }

        account.apply(update);
        self.directory.update(&account).await?;
        info!(uid = %uid, "Profile updated");
        Ok(account)
    }

    /// Deletes `uid` on behalf of `actor`, then best-effort deletes its samples.
    ///
    /// Sample deletion failures are counted and logged; they never fail the call.
    pub async fn delete_user(&self, actor: Uuid, uid: Uuid) -> Result<DeletionReport, DomainError> {
        if actor == uid {
            return Err(DomainError::Forbidden(
                "You cannot delete your own account".into(),
            ));
        }

        if !self.directory.delete(uid).await? {
            return Err(DomainError::UserNotFound(uid));
        }
        info!(uid = %uid, actor = %actor, "User deleted");

        let mut report = DeletionReport {
            uid,
            samples_deleted: 0,
            samples_failed: 0,
        };

        let samples = match self.samples.all_for_user(uid).await {
            Ok(samples) => samples,
            Err(e) => {
                warn!(uid = %uid, error = %e, "Could not list samples of deleted user");
                return Ok(report);
            }
        };

        for sample in samples {
            match self.samples.delete_sample(sample.id).await {
                Ok(()) => report.samples_deleted += 1,
                Err(e) => {
                    report.samples_failed += 1;
                    warn!(uid = %uid, sample_id = sample.id, error = %e, "Sample delete failed");
                }
            }
        }

        Ok(report)
    }
}
