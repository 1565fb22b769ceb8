//! Removes expired session tokens.

use persistence::PgAuthProvider;
use tracing::info;

use super::scheduler::{Job, JobFrequency};

pub struct SessionCleanupJob {
    auth: PgAuthProvider,
    interval_minutes: u64,
}

impl SessionCleanupJob {
    pub fn new(auth: PgAuthProvider, interval_minutes: u64) -> Self {
        Self {
            auth,
            interval_minutes,
        }
    }
}

#[async_trait::async_trait]
impl Job for SessionCleanupJob {
    fn name(&self) -> &'static str {
        "session_cleanup"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    async fn execute(&self) -> Result<(), String> {
        let removed = self
            .auth
            .delete_expired_sessions()
            .await
            .map_err(|e| format!("Failed to delete expired sessions: {}", e))?;
        if removed > 0 {
            info!(removed, "Expired sessions removed");
        }
        Ok(())
    }
}
