//! Bonus HTTP handlers.
//!
//! - GET /api/bonus/eligibility - Can the caller spin the wheel
//! - GET /api/bonus - The caller's grants
//! - POST /api/bonus/wheel-of-fortune/spin - Spin and receive a pending grant
//! - POST /api/bonus/claim/{id} - Credit a pending grant to the wallet

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    error::AppError, middleware::auth::AuthContext, models::bonus::BonusType, state::AppState,
};

pub async fn check_eligibility(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let eligible = state
        .bonuses
        .check_eligibility(auth.account_id, BonusType::WheelOfFortune)
        .await?;

    Ok(Json(json!({
        "success": true,
        "eligible": eligible,
        "bonus_type": BonusType::WheelOfFortune,
        "withdrawal_threshold_cents": state.bonuses.rules().withdrawal_threshold_cents,
    })))
}

pub async fn list_bonuses(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let bonuses = state.bonuses.list_for_account(auth.account_id).await?;

    Ok(Json(json!({
        "success": true,
        "bonuses": bonuses,
    })))
}

/// # Response (200)
///
/// ```json
/// {
///   "success": true,
///   "bonus": { "id": "...", "type": "wheel_of_fortune", "amount_cents": 20000, "status": "pending", ... },
///   "message": "Congratulations! You've won 200.00"
/// }
/// ```
///
/// - **Error (403)**: not eligible
/// - **Error (409)**: an unclaimed wheel grant already exists
pub async fn spin_wheel(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let bonus = state
        .bonuses
        .spin_wheel(auth.account_id, &auth.email)
        .await?;

    let message = format!(
        "Congratulations! You've won {}.{:02}",
        bonus.amount_cents / 100,
        bonus.amount_cents % 100
    );

    Ok(Json(json!({
        "success": true,
        "bonus": bonus,
        "message": message,
    })))
}

/// - **Error (403)**: bonus belongs to someone else
/// - **Error (404)**: unknown bonus
/// - **Error (409)**: bonus already claimed or expired
/// - **Error (410)**: bonus expired just now
pub async fn claim_bonus(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let bonus = state
        .bonuses
        .claim(id, auth.account_id, &auth.email)
        .await?;

    Ok(Json(json!({
        "success": true,
        "bonus": bonus,
        "message": "Bonus claimed successfully",
    })))
}
