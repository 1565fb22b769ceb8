//! Directory repository backed by the user_accounts table.

use domain::models::{NewUserAccount, Role, UserAccount};
use domain::ports::{DirectoryStore, StoreChange, StoreError};
use sqlx::PgPool;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::change_feed::ChangeFeed;
use crate::entities::UserAccountEntity;
use crate::error::map_sqlx_error;
use crate::metrics::QueryTimer;

const ACCOUNT_COLUMNS: &str =
    "uid, email, display_name, role, phone_number, photo_url, created_at";

#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
    feed: ChangeFeed,
}

impl PgDirectory {
    pub fn new(pool: PgPool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }
}

#[async_trait::async_trait]
impl DirectoryStore for PgDirectory {
    async fn create(&self, account: NewUserAccount) -> Result<UserAccount, StoreError> {
        let timer = QueryTimer::new("create_user_account");
        let result = sqlx::query_as::<_, UserAccountEntity>(&format!(
            r#"
            INSERT INTO user_accounts (uid, email, display_name, role, phone_number, photo_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.uid)
        .bind(&account.email)
        .bind(&account.display_name)
        .bind(account.role.as_str())
        .bind(&account.phone_number)
        .bind(&account.photo_url)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(map_sqlx_error)?.into())
    }

    async fn get(&self, uid: Uuid) -> Result<Option<UserAccount>, StoreError> {
        let timer = QueryTimer::new("find_user_account");
        let result = sqlx::query_as::<_, UserAccountEntity>(&format!(
            "SELECT {} FROM user_accounts WHERE uid = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(uid)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(map_sqlx_error)?.map(Into::into))
    }

    async fn list(&self) -> Result<Vec<UserAccount>, StoreError> {
        let timer = QueryTimer::new("list_user_accounts");
        let result = sqlx::query_as::<_, UserAccountEntity>(&format!(
            "SELECT {} FROM user_accounts ORDER BY created_at, uid",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await;
        timer.record();

        Ok(result
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<UserAccount>, StoreError> {
        let timer = QueryTimer::new("list_user_accounts_by_role");
        let result = sqlx::query_as::<_, UserAccountEntity>(&format!(
            "SELECT {} FROM user_accounts WHERE role = $1 ORDER BY created_at, uid",
            ACCOUNT_COLUMNS
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await;
        timer.record();

        Ok(result
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn update(&self, account: &UserAccount) -> Result<(), StoreError> {
        let timer = QueryTimer::new("update_user_account");
        let result = sqlx::query(
            r#"
            UPDATE user_accounts
            SET display_name = $2, phone_number = $3, photo_url = $4
            WHERE uid = $1
            "#,
        )
        .bind(account.uid)
        .bind(&account.display_name)
        .bind(&account.phone_number)
        .bind(&account.photo_url)
        .execute(&self.pool)
        .await;
        timer.record();

        if result.map_err(map_sqlx_error)?.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {}", account.uid)));
        }
        Ok(())
    }

    async fn delete(&self, uid: Uuid) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("delete_user_account");
        let result = sqlx::query("DELETE FROM user_accounts WHERE uid = $1")
            .bind(uid)
            .execute(&self.pool)
            .await;
        timer.record();

        Ok(result.map_err(map_sqlx_error)?.rows_affected() > 0)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.feed.subscribe_directory()
    }
}
