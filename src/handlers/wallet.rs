//! Wallet HTTP handlers.
//!
//! This module implements the wallet API endpoints:
//! - GET /api/wallet - Current balance
//! - GET /api/wallet/transactions - Ledger entries touching the wallet
//! - POST /api/wallet/transfer - Send money to another user

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde_json::{Value, json};
use validator::Validate;

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::transaction::{HistoryQuery, TransferRequest},
    state::AppState,
};

/// # Response (200)
///
/// ```json
/// {
///   "success": true,
///   "wallet": {
///     "id": "...",
///     "account_id": "...",
///     "balance_cents": 100000,
///     "currency": "USD",
///     "created_at": "...",
///     "updated_at": "..."
///   }
/// }
/// ```
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let wallet = state.wallets.get_for_account(auth.account_id).await?;

    Ok(Json(json!({
        "success": true,
        "wallet": wallet,
    })))
}

/// `GET /api/wallet/transactions?limit=50&offset=0`
pub async fn get_wallet_transactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, AppError> {
    let wallet = state.wallets.get_for_account(auth.account_id).await?;
    let (limit, offset) = query.page();

    let transactions = state
        .transactions
        .find_by_wallet(wallet.id, limit, offset)
        .await?;

    Ok(Json(json!({
        "success": true,
        "transactions": transactions,
    })))
}

/// Transfer money to another user by username.
///
/// # Request Body
///
/// ```json
/// {
///   "recipient_username": "bob",
///   "amount_cents": 25000,
///   "description": "Dinner"
/// }
/// ```
///
/// - **Error (404)**: recipient not found
/// - **Error (422)**: invalid input, self transfer, insufficient funds
pub async fn transfer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<Value>, AppError> {
    request.validate()?;

    let transaction = state
        .transactions
        .transfer(
            auth.account_id,
            &request.recipient_username,
            request.amount_cents,
            request.description,
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "transaction": transaction,
        "message": "Transfer completed successfully",
    })))
}
