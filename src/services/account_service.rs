//! Account service - registration, login, profile and password reset.
//!
//! Password hashing is CPU heavy and runs on the blocking thread pool.
//! Reset tokens are random 32-byte values sent once by email; only their
//! SHA-256 digest is stored.

use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        account::{Account, AccountResponse, AuthResponse},
        password_reset::PasswordResetToken,
    },
    services::{
        notification_service::{NotificationDispatcher, templates},
        wallet_service::WalletService,
    },
    utils::{
        jwt::TokenIssuer,
        password::{hash_password, verify_password},
    },
};

/// Settings the account flows need from configuration.
#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub default_currency: String,
    pub reset_token_ttl_minutes: i64,
    pub frontend_url: String,
}

#[derive(Clone)]
pub struct AccountService {
    pool: DbPool,
    wallets: WalletService,
    tokens: TokenIssuer,
    notifications: NotificationDispatcher,
    settings: AccountSettings,
}

impl AccountService {
    pub fn new(
        pool: DbPool,
        wallets: WalletService,
        tokens: TokenIssuer,
        notifications: NotificationDispatcher,
        settings: AccountSettings,
    ) -> Self {
        Self {
            pool,
            wallets,
            tokens,
            notifications,
            settings,
        }
    }

    /// Create an account and its wallet in one transaction.
    ///
    /// Input is expected to be validated already (see `RegisterRequest`).
    ///
    /// # Errors
    ///
    /// - `Conflict`: email or username already taken
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        username: &str,
        full_name: &str,
    ) -> Result<AuthResponse, AppError> {
        let email = email.trim().to_lowercase();
        let password_hash = hash_blocking(password.to_string()).await?;

        let mut tx = self.pool.begin().await?;

        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (email, username, full_name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&email)
        .bind(username)
        .bind(full_name)
        .bind(&password_hash)
        .fetch_one(&mut *tx)
        .await?;

        self.wallets
            .create_wallet(&mut tx, account.id, &self.settings.default_currency)
            .await?;

        tx.commit().await?;

        tracing::info!(account_id = %account.id, username = %account.username, "account registered");

        let token = self.tokens.issue(account.id, &account.email)?;

        self.notifications
            .dispatch(templates::welcome(&account.email, &account.full_name));

        Ok(AuthResponse {
            token,
            user: AccountResponse::from(account),
        })
    }

    /// Exchange credentials for a bearer token.
    ///
    /// Unknown email and wrong password both yield `Unauthorized`.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AppError> {
        let email = email.trim().to_lowercase();

        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !verify_blocking(password.to_string(), account.password_hash.clone()).await? {
            tracing::info!(account_id = %account.id, "login rejected");
            return Err(AppError::Unauthorized);
        }

        let token = self.tokens.issue(account.id, &account.email)?;

        tracing::info!(account_id = %account.id, "login succeeded");
        Ok(AuthResponse {
            token,
            user: AccountResponse::from(account),
        })
    }

    pub async fn profile(&self, account_id: Uuid) -> Result<Account, AppError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("User"))
    }

    /// Change username and/or full name. `None` leaves a field unchanged.
    pub async fn update_profile(
        &self,
        account_id: Uuid,
        username: Option<&str>,
        full_name: Option<&str>,
    ) -> Result<Account, AppError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET username = COALESCE($1, username),
                full_name = COALESCE($2, full_name),
                updated_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(full_name)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("User"))?;

        tracing::info!(%account_id, "profile updated");
        Ok(account)
    }

    /// Issue a reset token and email the link.
    ///
    /// Succeeds whether or not the email belongs to an account.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AppError> {
        let email = email.trim().to_lowercase();

        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;

        let Some(account) = account else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_reset_token();
        let expires_at = Utc::now() + Duration::minutes(self.settings.reset_token_ttl_minutes);

        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (account_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(account.id)
        .bind(hash_reset_token(&token))
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(account_id = %account.id, %expires_at, "password reset token issued");

        let reset_url = format!(
            "{}/reset-password?token={token}",
            self.settings.frontend_url.trim_end_matches('/')
        );
        self.notifications
            .dispatch(templates::password_reset(&account.email, &reset_url));

        Ok(())
    }

    /// Consume a reset token and set a new password, atomically.
    ///
    /// # Errors
    ///
    /// - `Validation`: unknown, used or expired token
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        let password_hash = hash_blocking(new_password.to_string()).await?;

        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            UPDATE password_reset_tokens
            SET used_at = NOW()
            WHERE token_hash = $1
              AND used_at IS NULL
              AND expires_at > NOW()
            RETURNING *
            "#,
        )
        .bind(hash_reset_token(token))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Validation("Invalid or expired reset token".to_string()))?;

        sqlx::query(
            r#"
            UPDATE accounts
            SET password_hash = $1,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(&password_hash)
        .bind(consumed.account_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(account_id = %consumed.account_id, "password reset");
        Ok(())
    }
}

async fn hash_blocking(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {e}")))
}

async fn verify_blocking(password: String, stored_hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {e}")))?
}

/// 32 random bytes, hex encoded.
fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
