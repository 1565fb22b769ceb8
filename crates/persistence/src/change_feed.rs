//! LISTEN/NOTIFY change feed.
//!
//! Database triggers publish every write to `location_samples` and
//! `user_accounts` on the `wt_changes` channel. [`ChangeFeed::spawn`] forwards
//! those notifications to the store subscriptions.

use domain::ports::{StoreChange, CHANGE_CHANNEL_CAPACITY};
use serde::Deserialize;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const CHANGE_CHANNEL: &str = "wt_changes";

#[derive(Debug, Deserialize)]
struct Notification {
    table: String,
    op: String,
    #[serde(default)]
    id: Option<i64>,
    uid: Uuid,
}

/// Which subscription a parsed notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feed {
    Samples,
    Directory,
}

fn parse(payload: &str) -> Option<(Feed, StoreChange)> {
    let n: Notification = serde_json::from_str(payload).ok()?;
    match (n.table.as_str(), n.op.as_str()) {
        ("location_samples", "INSERT") => Some((
            Feed::Samples,
            StoreChange::SampleInserted {
                user_id: n.uid,
                id: n.id?,
            },
        )),
        ("location_samples", "DELETE") => {
            Some((Feed::Samples, StoreChange::SampleDeleted { id: n.id? }))
        }
        ("user_accounts", "INSERT") => Some((Feed::Directory, StoreChange::UserCreated(n.uid))),
        ("user_accounts", "UPDATE") => Some((Feed::Directory, StoreChange::UserUpdated(n.uid))),
        ("user_accounts", "DELETE") => Some((Feed::Directory, StoreChange::UserDeleted(n.uid))),
        _ => None,
    }
}

/// Fan-out point for store change notifications.
#[derive(Clone)]
pub struct ChangeFeed {
    samples: broadcast::Sender<StoreChange>,
    directory: broadcast::Sender<StoreChange>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (samples, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (directory, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { samples, directory }
    }

    pub fn subscribe_samples(&self) -> broadcast::Receiver<StoreChange> {
        self.samples.subscribe()
    }

    pub fn subscribe_directory(&self) -> broadcast::Receiver<StoreChange> {
        self.directory.subscribe()
    }

    fn publish(&self, payload: &str) {
        match parse(payload) {
            Some((Feed::Samples, change)) => {
                let _ = self.samples.send(change);
            }
            Some((Feed::Directory, change)) => {
                let _ = self.directory.send(change);
            }
            None => warn!(payload = %payload, "Unrecognized change notification"),
        }
    }

    /// Listens on [`CHANGE_CHANNEL`] until `shutdown` flips to true.
    pub async fn spawn(
        &self,
        pool: &PgPool,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        info!(channel = CHANGE_CHANNEL, "Listening for store changes");

        let feed = self.clone();
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    notification = listener.recv() => match notification {
                        Ok(n) => feed.publish(n.payload()),
                        Err(e) => {
                            error!(error = %e, "Change listener failed");
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        }
                    },
                }
            }
            debug!("Change feed stopped");
        }))
    }
}
