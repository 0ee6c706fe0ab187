//! Account data models and API request/response types.
//!
//! This module defines:
//! - `Account`: Database entity representing a registered user
//! - Request bodies for registration, login, profile updates and password reset
//! - `AccountResponse`: Response body returned to clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Represents an account record from the database.
///
/// # Database Table
///
/// Maps to the `accounts` table. Each account owns exactly one wallet,
/// created in the same database transaction as the account itself.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    /// Unique identifier for this account
    pub id: Uuid,

    /// Login email, always stored lowercase
    pub email: String,

    /// Public handle used as a transfer destination
    pub username: String,

    pub full_name: String,

    /// PBKDF2 hash in `pbkdf2_sha256$<iterations>$<salt>$<hash>` form.
    ///
    /// `Account` is not `Serialize`; responses go through `AccountResponse`.
    pub password_hash: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Request body for `POST /api/auth/register`.
///
/// ```json
/// {
///   "email": "alice@example.com",
///   "password": "Secr3t!pass",
///   "username": "alice",
///   "full_name": "Alice Liddell"
/// }
/// ```
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,

    #[validate(custom(function = "validate_password"))]
    pub password: String,

    #[validate(custom(function = "validate_username"))]
    pub username: String,

    #[validate(length(min = 2, max = 50, message = "Full name must be between 2 and 50 characters"))]
    pub full_name: String,
}

/// Request body for `POST /api/auth/login`.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Request body for `PUT /api/users/profile`. Absent fields are left unchanged.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: Option<String>,

    #[validate(length(min = 2, max = 50, message = "Full name must be between 2 and 50 characters"))]
    pub full_name: Option<String>,
}

/// Request body for `POST /api/auth/forgot-password`.
#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
}

/// Request body for `POST /api/auth/reset-password`.
#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(custom(function = "validate_password"))]
    pub password: String,
}

/// Public view of an account.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Drops the password hash.
impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            username: account.username,
            full_name: account.full_name,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// Returned by register and login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: AccountResponse,
}

const PASSWORD_SPECIALS: &str = "!@#$%^&*";

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// At least 8 characters with an uppercase letter, a lowercase letter, a digit
/// and one of `!@#$%^&*`.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < 8 {
        return Err(invalid(
            "password_length",
            "Password must be at least 8 characters long",
        ));
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| PASSWORD_SPECIALS.contains(c));

    if !(has_upper && has_lower && has_digit && has_special) {
        return Err(invalid(
            "password_strength",
            "Password must contain at least one uppercase letter, one lowercase letter, one number, and one special character",
        ));
    }

    Ok(())
}

/// 3 to 20 characters from `[A-Za-z0-9_]`.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(3..=20).contains(&len) {
        return Err(invalid(
            "username_length",
            "Username must be between 3 and 20 characters",
        ));
    }

    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid(
            "username_charset",
            "Username can only contain letters, numbers, and underscores",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(email: &str, password: &str, username: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            username: username.to_string(),
            full_name: "Alice Liddell".to_string(),
        }
    }

    #[test]
    fn accepts_well_formed_registration() {
        assert!(register("alice@example.com", "Secr3t!pass", "alice_01").validate().is_ok());
    }

    #[test]
    fn rejects_weak_passwords() {
        assert!(validate_password("Sh0rt!").is_err());
        assert!(validate_password("alllowercase1!").is_err());
        assert!(validate_password("NoDigitsHere!").is_err());
        assert!(validate_password("NoSpecial123").is_err());
        assert!(validate_password("G00d!enough").is_ok());
    }

    #[test]
    fn rejects_bad_usernames() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username("this_username_is_way_too_long").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("dash-name").is_err());
        assert!(validate_username("bob_99").is_ok());
    }

    #[test]
    fn rejects_bad_email() {
        let err = register("not-an-email", "Secr3t!pass", "alice").validate().unwrap_err();
        assert!(err.field_errors().contains_key("email"));
    }

    #[test]
    fn profile_update_skips_absent_fields() {
        let request = UpdateProfileRequest {
            username: None,
            full_name: Some("Bob".to_string()),
        };
        assert!(request.validate().is_ok());

        let request = UpdateProfileRequest {
            username: Some("x".to_string()),
            full_name: None,
        };
        assert!(request.validate().is_err());
    }
}
