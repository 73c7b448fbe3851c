use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::core::time::format_primitive;
use crate::db::types::UserRole;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct UserCreate {
    #[validate(custom(function = "validate_username"))]
    pub(crate) username: String,
    #[serde(alias = "fullName")]
    #[validate(length(min = 1, max = 255, message = "full_name must be 1..255 characters"))]
    pub(crate) full_name: String,
    #[validate(length(min = 8, max = 128, message = "password must be 8..128 characters"))]
    pub(crate) password: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserLogin {
    pub(crate) username: String,
    pub(crate) password: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: String,
}

impl UserResponse {
    pub(crate) fn from_db(user: crate::db::models::User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            full_name: user.full_name,
            role: user.role,
            is_active: user.is_active,
            created_at: format_primitive(user.created_at),
        }
    }
}

/// 3..64 characters of `[A-Za-z0-9._-]`.
pub(crate) fn is_valid_username(username: &str) -> bool {
    (3..=64).contains(&username.len())
        && username.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if is_valid_username(username) {
        Ok(())
    } else {
        let mut error = ValidationError::new("username");
        error.message = Some("username must be 3..64 characters of letters, digits, '.', '_' or '-'".into());
        Err(error)
    }
}
