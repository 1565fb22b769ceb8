//! Background job scheduler and job implementations.

mod pool_metrics;
mod presence_refresh;
mod scheduler;
mod session_cleanup;

pub use pool_metrics::PoolMetricsJob;
pub use presence_refresh::PresenceRefreshJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
pub use session_cleanup::SessionCleanupJob;
