//! Creates the first administrator on startup.
//!
//! Runs only when `admin.bootstrap_email` is configured and the directory has
//! no administrator yet, so repeated boots are no-ops.

use domain::models::{Role, SignUpRequest, UserAccount};
use domain::ports::Capabilities;
use domain::services::AuthService;
use domain::DomainError;
use tracing::{info, warn};

use crate::config::AdminBootstrapConfig;

/// Returns the created account, or `None` when bootstrap was skipped.
pub async fn bootstrap_admin(
    capabilities: &Capabilities,
    config: &AdminBootstrapConfig,
) -> Result<Option<UserAccount>, DomainError> {
    if config.bootstrap_email.is_empty() {
        return Ok(None);
    }

    if config.bootstrap_password.is_empty() {
        warn!(
            "WT__ADMIN__BOOTSTRAP_EMAIL is set but WT__ADMIN__BOOTSTRAP_PASSWORD is empty - skipping bootstrap"
        );
        return Ok(None);
    }

    let admins = capabilities.directory.list_by_role(Role::Admin).await?;
    if !admins.is_empty() {
        info!(admins = admins.len(), "Administrator already exists - skipping bootstrap");
        return Ok(None);
    }

    let auth = AuthService::new(capabilities.auth.clone(), capabilities.directory.clone());
    let account = auth
        .sign_up(&SignUpRequest {
            email: config.bootstrap_email.clone(),
            password: config.bootstrap_password.clone(),
            display_name: config.bootstrap_display_name.clone(),
            role: Role::Admin,
        })
        .await?;

    info!(uid = %account.uid, email = %account.email, "Bootstrap administrator created");
    warn!(
        "SECURITY: Remove WT__ADMIN__BOOTSTRAP_EMAIL and WT__ADMIN__BOOTSTRAP_PASSWORD \
         from configuration after initial setup"
    );

    Ok(Some(account))
}
