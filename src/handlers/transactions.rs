//! Transaction HTTP handlers.
//!
//! This module implements transaction-related API endpoints:
//! - GET /api/transactions - Filtered, paginated history for the caller
//! - GET /api/transactions/{id} - One entry the caller is party to
//! - POST /api/transactions/sync - Pull events from the payment processor

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    error::AppError, middleware::auth::AuthContext, models::transaction::HistoryQuery,
    state::AppState,
};

/// `GET /api/transactions?limit=20&offset=0&type=deposit&status=completed`
///
/// # Response (200)
///
/// ```json
/// {
///   "success": true,
///   "transactions": [ ... ],
///   "total": 42,
///   "limit": 20,
///   "offset": 0
/// }
/// ```
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, AppError> {
    let (limit, offset) = query.page();
    let filter = query.filter();

    let transactions = state
        .transactions
        .find_by_account(auth.account_id, limit, offset, filter)
        .await?;
    let total = state
        .transactions
        .count_by_account(auth.account_id, filter)
        .await?;

    Ok(Json(json!({
        "success": true,
        "transactions": transactions,
        "total": total,
        "limit": limit,
        "offset": offset,
    })))
}

/// - **Error (403)**: neither side of the entry is the caller's wallet
/// - **Error (404)**: unknown id
pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let transaction = state
        .transactions
        .get_for_account(id, auth.account_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "transaction": transaction,
    })))
}

/// Ingest new processor events. Safe to call repeatedly.
///
/// - **Error (503)**: processor unreachable or timed out
pub async fn sync_transactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let created = state
        .transactions
        .sync_external(auth.account_id, &auth.email)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("{} new transactions synchronized", created.len()),
        "transactions": created,
    })))
}
