//! Directory store port: user account documents keyed by uid.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use uuid::Uuid;

use super::{StoreChange, StoreError, CHANGE_CHANNEL_CAPACITY};
use crate::clock::Clock;
use crate::models::{NewUserAccount, Role, UserAccount};

/// User directory collection.
#[async_trait::async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Creates the account document. `createdAt` is assigned by the store.
    async fn create(&self, account: NewUserAccount) -> Result<UserAccount, StoreError>;

    async fn get(&self, uid: Uuid) -> Result<Option<UserAccount>, StoreError>;

    async fn list(&self) -> Result<Vec<UserAccount>, StoreError>;

    /// Equality query on `role`.
    async fn list_by_role(&self, role: Role) -> Result<Vec<UserAccount>, StoreError>;

    /// Replaces the stored document with `account`.
    async fn update(&self, account: &UserAccount) -> Result<(), StoreError>;

    /// Removes the document. Returns false if it did not exist.
    async fn delete(&self, uid: Uuid) -> Result<bool, StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// In-memory directory, ordered by creation.
pub struct InMemoryDirectory {
    clock: Arc<dyn Clock>,
    accounts: RwLock<Vec<UserAccount>>,
    available: AtomicBool,
    changes: broadcast::Sender<StoreChange>,
}

impl InMemoryDirectory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            clock,
            accounts: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            changes,
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("directory offline".into()))
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<UserAccount>> {
        self.accounts.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<UserAccount>> {
        self.accounts.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl DirectoryStore for InMemoryDirectory {
    async fn create(&self, account: NewUserAccount) -> Result<UserAccount, StoreError> {
        self.check_available()?;
        let mut accounts = self.write();
        if accounts.iter().any(|a| a.uid == account.uid) {
            return Err(StoreError::Conflict(format!("user {} already exists", account.uid)));
        }
        if accounts
            .iter()
            .any(|a| a.email.eq_ignore_ascii_case(&account.email))
        {
            return Err(StoreError::Conflict("email already in use".into()));
        }

        let created = UserAccount {
            uid: account.uid,
            email: account.email,
            display_name: account.display_name,
            role: account.role,
            created_at: self.clock.now(),
            phone_number: account.phone_number,
            photo_url: account.photo_url,
        };
        accounts.push(created.clone());
        drop(accounts);

        let _ = self.changes.send(StoreChange::UserCreated(created.uid));
        Ok(created)
    }

    async fn get(&self, uid: Uuid) -> Result<Option<UserAccount>, StoreError> {
        self.check_available()?;
        Ok(self.read().iter().find(|a| a.uid == uid).cloned())
    }

    async fn list(&self) -> Result<Vec<UserAccount>, StoreError> {
        self.check_available()?;
        Ok(self.read().clone())
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<UserAccount>, StoreError> {
        self.check_available()?;
        Ok(self.read().iter().filter(|a| a.role == role).cloned().collect())
    }

    async fn update(&self, account: &UserAccount) -> Result<(), StoreError> {
        self.check_available()?;
        let mut accounts = self.write();
        let slot = accounts
            .iter_mut()
            .find(|a| a.uid == account.uid)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", account.uid)))?;
        *slot = account.clone();
        drop(accounts);

        let _ = self.changes.send(StoreChange::UserUpdated(account.uid));
        Ok(())
    }

    async fn delete(&self, uid: Uuid) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut accounts = self.write();
        let before = accounts.len();
        accounts.retain(|a| a.uid != uid);
        let removed = accounts.len() < before;
        drop(accounts);

        if removed {
            let _ = self.changes.send(StoreChange::UserDeleted(uid));
        }
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
