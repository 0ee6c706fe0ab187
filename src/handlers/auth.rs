//! Public authentication endpoints.
//!
//! - POST /api/auth/register - Create account and wallet, return token
//! - POST /api/auth/login - Exchange credentials for a token
//! - POST /api/auth/forgot-password - Email a reset link
//! - POST /api/auth/reset-password - Set a new password with a reset token

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use validator::Validate;

use crate::{
    error::AppError,
    models::account::{ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest},
    state::AppState,
};

/// Register a new user.
///
/// # Request Body
///
/// ```json
/// {
///   "email": "alice@example.com",
///   "password": "Secr3t!pass",
///   "username": "alice",
///   "full_name": "Alice Liddell"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "success": true,
///   "token": "eyJ...",
///   "user": { "id": "...", "email": "alice@example.com", "username": "alice", ... }
/// }
/// ```
///
/// - **Error (409)**: email or username taken
/// - **Error (422)**: validation failed
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    request.validate()?;

    let auth = state
        .accounts
        .register(
            &request.email,
            &request.password,
            &request.username,
            &request.full_name,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "token": auth.token,
            "user": auth.user,
        })),
    ))
}

/// Log in with email and password.
///
/// - **Error (401)**: unknown email or wrong password
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    request.validate()?;

    let auth = state.accounts.login(&request.email, &request.password).await?;

    Ok(Json(json!({
        "success": true,
        "token": auth.token,
        "user": auth.user,
    })))
}

/// Request a password reset link.
///
/// Always answers with the same message so the endpoint does not reveal
/// which emails are registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    request.validate()?;

    state.accounts.request_password_reset(&request.email).await?;

    Ok(Json(json!({
        "success": true,
        "message": "If your email is registered, you will receive a password reset link",
    })))
}

/// Reset the password with a token from the reset email.
///
/// - **Error (422)**: invalid, used or expired token, or weak password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    request.validate()?;

    state
        .accounts
        .reset_password(&request.token, &request.password)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Password has been reset successfully",
    })))
}
