//! Password reset token model.
//!
//! Tokens are handed to the user once (inside the reset link) and stored only
//! as a SHA-256 hash, the same way bearer secrets are never kept in plaintext.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents a password reset token record from the database.
///
/// # Database Table
///
/// Maps to the `password_reset_tokens` table. A token is usable while
/// `used_at` is NULL and `expires_at` is in the future; consuming it sets
/// `used_at` in the same statement that checks those two conditions.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PasswordResetToken {
    pub id: Uuid,

    pub account_id: Uuid,

    /// SHA-256 hex digest of the token sent by email
    pub token_hash: String,

    pub expires_at: DateTime<Utc>,

    pub used_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}
