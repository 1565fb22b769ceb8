//! Periodic re-evaluation of employee presence.
//!
//! Change events only fire on writes; a user drifting from online to
//! offline produces none, so the monitor is also refreshed on a timer.

use std::sync::Arc;

use domain::services::StatusMonitor;
use tracing::info;

use super::scheduler::{Job, JobFrequency};

pub struct PresenceRefreshJob {
    monitor: Arc<StatusMonitor>,
    interval_secs: u64,
}

impl PresenceRefreshJob {
    pub fn new(monitor: Arc<StatusMonitor>, interval_secs: u64) -> Self {
        Self {
            monitor,
            interval_secs,
        }
    }
}

#[async_trait::async_trait]
impl Job for PresenceRefreshJob {
    fn name(&self) -> &'static str {
        "presence_refresh"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        let transitions = self.monitor.refresh().await.map_err(|e| e.to_string())?;
        if !transitions.is_empty() {
            info!(count = transitions.len(), "Presence changed on scheduled refresh");
        }
        Ok(())
    }
}
