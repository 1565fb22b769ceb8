//! User account domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Account role. Set at creation; not editable through profile updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "employee" => Ok(Role::Employee),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user directory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub uid: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl UserAccount {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Applies a profile update. Role and email are left untouched.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(name) = &update.display_name {
            self.display_name = name.trim().to_string();
        }
        if let Some(phone) = &update.phone_number {
            self.phone_number = non_empty(phone);
        }
        if let Some(photo) = &update.photo_url {
            self.photo_url = non_empty(photo);
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Directory document to create, keyed by the auth principal id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUserAccount {
    pub uid: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
}

/// Sign-up / provisioning form.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    #[validate(custom(function = "shared::validation::validate_email_shape"))]
    pub email: String,

    #[validate(custom(function = "shared::validation::validate_password_length"))]
    pub password: String,

    #[validate(custom(function = "shared::validation::validate_display_name"))]
    pub display_name: String,

    #[serde(default)]
    pub role: Role,
}

/// Editable profile fields. An empty string clears an optional field.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileUpdate {
    #[validate(custom(function = "shared::validation::validate_display_name"))]
    pub display_name: Option<String>,

    #[validate(length(max = 32, message = "Phone number must be at most 32 characters"))]
    pub phone_number: Option<String>,

    #[serde(rename = "photoURL")]
    #[validate(length(max = 2048, message = "Photo URL must be at most 2048 characters"))]
    pub photo_url: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.phone_number.is_none() && self.photo_url.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(role: Role) -> UserAccount {
        UserAccount {
            uid: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            display_name: "Ana".to_string(),
            role,
            created_at: Utc::now(),
            phone_number: None,
            photo_url: None,
        }
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Admin);
        assert_eq!(Role::from_str("employee").unwrap(), Role::Employee);
        assert!(Role::from_str("manager").is_err());
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::default(), Role::Employee);
    }

    #[test]
    fn test_user_account_serialization() {
        let mut user = account(Role::Employee);
        user.photo_url = Some("https://cdn.example.com/a.png".into());
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["role"], "employee");
        assert_eq!(json["displayName"], "Ana");
        assert!(json.get("photoURL").is_some());
        assert!(json.get("phoneNumber").is_none());
    }

    #[test]
    fn test_apply_profile_update() {
        let mut user = account(Role::Employee);
        user.phone_number = Some("+1 555 0100".into());
        let update = ProfileUpdate {
            display_name: Some("  Ana Field ".into()),
            phone_number: Some("".into()),
            photo_url: None,
        };
        user.apply(&update);
        assert_eq!(user.display_name, "Ana Field");
        assert_eq!(user.phone_number, None);
        assert_eq!(user.role, Role::Employee);
    }

    #[test]
    fn test_profile_update_rejects_role() {
        let result: Result<ProfileUpdate, _> =
            serde_json::from_str(r#"{"displayName":"X","role":"admin"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_sign_up_request_validation() {
        let request = SignUpRequest {
            email: "not-an-email".into(),
            password: "123".into(),
            display_name: "Ana".into(),
            role: Role::Employee,
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
        assert!(errors.field_errors().contains_key("password"));
    }

    #[test]
    fn test_sign_up_request_defaults_to_employee() {
        let request: SignUpRequest = serde_json::from_str(
            r#"{"email":"a@b.co","password":"secret1","displayName":"A"}"#,
        )
        .unwrap();
        assert_eq!(request.role, Role::Employee);
        assert!(request.validate().is_ok());
    }
}
