//! Account sign-up, sign-in and session lookup.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use validator::Validate;

use crate::error::DomainError;
use crate::models::{NewUserAccount, SignUpRequest, UserAccount};
use crate::ports::{AuthProvider, DirectoryStore};

/// Message returned when a principal has no directory document.
pub const USER_DATA_NOT_FOUND: &str = "User data not found";

/// A successful sign-in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedIn {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserAccount,
}

pub struct AuthService {
    auth: Arc<dyn AuthProvider>,
    directory: Arc<dyn DirectoryStore>,
}

impl AuthService {
    pub fn new(auth: Arc<dyn AuthProvider>, directory: Arc<dyn DirectoryStore>) -> Self {
        Self { auth, directory }
    }

    /// Creates the principal and then its directory document.
    ///
    /// Used both for self-registration and for administrator provisioning;
    /// no session is opened for the new user.
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<UserAccount, DomainError> {
        request.validate()?;

        let principal = self
            .auth
            .create_principal(request.email.trim(), &request.password)
            .await?;

        let account = self
            .directory
            .create(NewUserAccount {
                uid: principal.uid,
                email: principal.email.clone(),
                display_name: request.display_name.trim().to_string(),
                role: request.role,
                phone_number: None,
                photo_url: None,
            })
            .await
            .map_err(|e| {
                error!(uid = %principal.uid, error = %e, "Principal created but directory write failed");
                DomainError::from(e)
            })?;

        info!(uid = %account.uid, role = %account.role, "Account created");
        Ok(account)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, DomainError> {
        let session = self.auth.authenticate(email, password).await?;

        let account = match self.directory.get(session.principal.uid).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!(uid = %session.principal.uid, "Sign-in for principal without account document");
                self.auth.revoke(&session.token).await?;
                return Err(DomainError::Unauthorized(USER_DATA_NOT_FOUND.into()));
            }
            Err(e) => {
                self.auth.revoke(&session.token).await?;
                return Err(e.into());
            }
        };

        info!(uid = %account.uid, "Signed in");
        Ok(SignedIn {
            token: session.token,
            expires_at: session.expires_at,
            user: account,
        })
    }

    /// Account behind a live session, if any.
    pub async fn current_user(&self, token: &str) -> Result<Option<UserAccount>, DomainError> {
        match self.auth.resolve(token).await? {
            Some(principal) => Ok(self.directory.get(principal.uid).await?),
            None => Ok(None),
        }
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), DomainError> {
        self.auth.revoke(token).await?;
        Ok(())
    }
}
