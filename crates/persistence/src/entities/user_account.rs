//! User account entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Role, UserAccount};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the user_accounts table.
#[derive(Debug, Clone, FromRow)]
pub struct UserAccountEntity {
    pub uid: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UserAccountEntity> for UserAccount {
    fn from(entity: UserAccountEntity) -> Self {
        Self {
            uid: entity.uid,
            email: entity.email,
            display_name: entity.display_name,
            // The column is CHECK-constrained to the known roles.
            role: entity.role.parse().unwrap_or(Role::Employee),
            created_at: entity.created_at,
            phone_number: entity.phone_number,
            photo_url: entity.photo_url,
        }
    }
}
