//! Directory/status aggregation: joins the employee directory with presence.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, instrument};

use super::presence::PresenceService;
use crate::error::DomainError;
use crate::models::{DashboardStats, EmployeeStatus, Role, UserAccount};
use crate::ports::DirectoryStore;

pub struct StatusAggregator {
    directory: Arc<dyn DirectoryStore>,
    presence: Arc<PresenceService>,
}

impl StatusAggregator {
    pub fn new(directory: Arc<dyn DirectoryStore>, presence: Arc<PresenceService>) -> Self {
        Self {
            directory,
            presence,
        }
    }

    pub fn presence(&self) -> &Arc<PresenceService> {
        &self.presence
    }

    /// Status of every employee, in directory order.
    ///
    /// Per-user lookups run concurrently with no cap; the call returns once
    /// all of them have finished.
    #[instrument(skip(self))]
    pub async fn list_employee_statuses(&self) -> Result<Vec<EmployeeStatus>, DomainError> {
        let employees = self.directory.list_by_role(Role::Employee).await?;
        self.statuses_for(employees).await
    }

    /// Total accounts, plus employees split by online state.
    pub async fn dashboard_stats(&self) -> Result<DashboardStats, DomainError> {
        let accounts = self.directory.list().await?;
        let total_users = accounts.len();
        let employees: Vec<UserAccount> = accounts
            .into_iter()
            .filter(|a| a.role == Role::Employee)
            .collect();

        let statuses = self.statuses_for(employees).await?;
        let active_users = statuses.iter().filter(|s| s.is_online).count();

        Ok(DashboardStats {
            total_users,
            active_users,
            inactive_users: statuses.len() - active_users,
        })
    }

    async fn statuses_for(
        &self,
        accounts: Vec<UserAccount>,
    ) -> Result<Vec<EmployeeStatus>, DomainError> {
        let mut tasks = JoinSet::new();
        for (index, account) in accounts.iter().enumerate() {
            let presence = self.presence.clone();
            let uid = account.uid;
            tasks.spawn(async move { (index, presence.evaluate(uid).await) });
        }

        let mut statuses: Vec<EmployeeStatus> = accounts
            .iter()
            .map(|a| EmployeeStatus::offline(a.uid, a.display_name.clone()))
            .collect();

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "Presence lookup task failed");
                    continue;
                }
            };

            let presence = match result {
                Ok(presence) => presence,
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            };

            let status = &mut statuses[index];
            status.is_online = presence.is_online;
            status.last_active = presence.last_active;
            status.current_location = presence.current_location;
        }

        Ok(statuses)
    }
}
