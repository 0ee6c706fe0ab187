//! Wallet data model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents a wallet record from the database.
///
/// # Database Table
///
/// Maps to the `wallets` table, one row per account.
///
/// # Balance Storage
///
/// Balances are stored as `i64` cents to avoid floating-point precision issues
/// and must never drop below zero (enforced by a CHECK constraint as well as
/// by the transfer protocol). The balance is a cached projection of the
/// completed ledger entries that touch this wallet.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Wallet {
    pub id: Uuid,

    /// Owning account (unique)
    pub account_id: Uuid,

    /// Current balance in cents (not dollars)
    pub balance_cents: i64,

    /// Currency code (ISO 4217, 3 letters), fixed at creation
    pub currency: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}
