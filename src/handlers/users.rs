//! Profile endpoints.
//!
//! - GET /api/users/profile
//! - PUT /api/users/profile

use axum::{Extension, Json, extract::State};
use serde_json::{Value, json};
use validator::Validate;

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::account::{AccountResponse, UpdateProfileRequest},
    state::AppState,
};

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let account = state.accounts.profile(auth.account_id).await?;

    Ok(Json(json!({
        "success": true,
        "user": AccountResponse::from(account),
    })))
}

/// Update username and/or full name.
///
/// ```json
/// { "username": "alice_w", "full_name": "Alice W." }
/// ```
///
/// - **Error (409)**: username taken
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, AppError> {
    request.validate()?;

    let account = state
        .accounts
        .update_profile(
            auth.account_id,
            request.username.as_deref(),
            request.full_name.as_deref(),
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "user": AccountResponse::from(account),
    })))
}
