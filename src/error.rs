//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::db;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error code.
///
/// # Error Categories
///
/// - **Request Errors**: malformed input, missing identity
/// - **Resource Errors**: unknown or foreign entities, duplicates
/// - **Ledger Errors**: insufficient funds, lifecycle violations
/// - **Infrastructure Errors**: database failures, unreachable processor
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// Unique violations are turned into [`AppError::Conflict`] by the
    /// `From<sqlx::Error>` impl below and never end up here.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 422 Unprocessable Entity with the message verbatim.
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid bearer token, or bad credentials.
    #[error("Not authorized")]
    Unauthorized,

    /// Referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Entity exists but belongs to someone else.
    #[error("{0}")]
    Forbidden(String),

    /// Duplicate unique key (email, username, wallet).
    #[error("{0}")]
    Conflict(String),

    /// Debit exceeds the wallet balance; nothing was applied.
    #[error("Insufficient balance")]
    InsufficientFunds,

    /// Operation not valid for the entity's current lifecycle state.
    #[error("{0}")]
    InvalidState(String),

    /// Lifecycle deadline passed. The expired state has been persisted.
    #[error("{0}")]
    Expired(String),

    /// The external payment processor could not be reached in time.
    #[error("Payment processor unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Broken internal invariant. Details are logged, never returned.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match db::unique_violation(&err) {
            Some(constraint) => AppError::Conflict(conflict_message(&constraint)),
            None => AppError::Database(err),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("Validation failed: {errors}"))
    }
}

fn conflict_message(constraint: &str) -> String {
    match constraint {
        "accounts_email_key" => "Email already in use".to_string(),
        "accounts_username_key" => "Username already taken".to_string(),
        "wallets_account_id_key" => "Wallet already exists for this account".to_string(),
        "transactions_reference_id_key" => "Transaction reference already recorded".to_string(),
        _ => "Resource already exists".to_string(),
    }
}

impl AppError {
    /// HTTP status and stable machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::InsufficientFunds => {
                (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_funds")
            }
            AppError::InvalidState(_) => (StatusCode::CONFLICT, "invalid_state"),
            AppError::Expired(_) => (StatusCode::GONE, "expired"),
            AppError::UpstreamUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable")
            }
            AppError::Database(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "success": false,
///   "error": {
///     "code": "insufficient_funds",
///     "message": "Insufficient balance"
///   }
/// }
/// ```
///
/// Database and internal errors are logged and replaced by a generic message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                "An internal error occurred".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
