//! Transaction (ledger entry) data models and API request/response types.
//!
//! This module defines:
//! - `Transaction`: Database entity representing an immutable ledger entry
//! - `TransactionKind` / `TransactionStatus`: Postgres enum mirrors
//! - `NewTransaction`: insert payload used by the services
//! - Request types for transfers and history queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::account::validate_username;

/// What a ledger entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
    Bonus,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Bonus => "bonus",
        }
    }

    /// Whether a completed entry of this kind changes a wallet balance.
    pub fn moves_balance(self) -> bool {
        !matches!(self, TransactionKind::Withdrawal)
    }
}

/// Lifecycle state of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// Every status except `Pending` is final.
    pub fn is_final(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Whether a row in `self` may be moved to `next`.
    ///
    /// Only pending entries change state, and never back to pending.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        self == TransactionStatus::Pending && next != TransactionStatus::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

/// Represents a transaction record from the database.
///
/// # Database Table
///
/// Maps to the `transactions` table. Each transaction:
/// - Has a unique ID and optional external reference (unique when present)
/// - References one wallet, or two for transfers (one row visible to both sides)
/// - Stores a positive amount in cents; direction comes from `kind` and side
/// - Only ever changes `status` after creation
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Transaction {
    pub id: Uuid,

    /// Origin wallet (the sender for transfers)
    pub wallet_id: Uuid,

    /// Counterpart wallet, present only for transfers
    pub recipient_wallet_id: Option<Uuid>,

    pub kind: TransactionKind,

    pub status: TransactionStatus,

    /// Amount in cents, always positive
    pub amount_cents: i64,

    pub currency: String,

    /// External processor reference used for sync deduplication
    pub reference_id: Option<String>,

    pub description: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// True if `wallet_id` is either side of this entry.
    pub fn involves(&self, wallet_id: Uuid) -> bool {
        self.wallet_id == wallet_id || self.recipient_wallet_id == Some(wallet_id)
    }

    /// Signed balance effect of this entry on `wallet_id`.
    ///
    /// Returns `None` when the entry does not touch the wallet or has no
    /// balance effect for it (e.g. a withdrawal reported by the processor).
    pub fn effect_on(&self, wallet_id: Uuid) -> Option<i64> {
        match self.kind {
            TransactionKind::Transfer if self.wallet_id == wallet_id => Some(-self.amount_cents),
            TransactionKind::Transfer if self.recipient_wallet_id == Some(wallet_id) => {
                Some(self.amount_cents)
            }
            TransactionKind::Deposit | TransactionKind::Bonus if self.wallet_id == wallet_id => {
                Some(self.amount_cents)
            }
            _ => None,
        }
    }
}

/// Insert payload for a new ledger entry.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub wallet_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub recipient_wallet_id: Option<Uuid>,
    pub reference_id: Option<String>,
    pub description: Option<String>,
}

/// Request to transfer money to another user.
///
/// # JSON Example
///
/// ```json
/// {
///   "recipient_username": "bob",
///   "amount_cents": 25000,
///   "description": "Dinner"
/// }
/// ```
///
/// # Atomicity Guarantee
///
/// Both wallets are updated in the same database transaction as the ledger
/// insert. Either everything applies or nothing does.
#[derive(Debug, Deserialize, Validate)]
pub struct TransferRequest {
    #[validate(custom(function = "validate_username"))]
    pub recipient_username: String,

    #[validate(range(min = 1, message = "Amount must be greater than 0"))]
    pub amount_cents: i64,

    #[validate(length(max = 200, message = "Description cannot exceed 200 characters"))]
    pub description: Option<String>,
}

/// Optional filters for account history.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Query string for history endpoints: `?limit=20&offset=40&type=bonus&status=completed`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
}

impl HistoryQuery {
    /// Clamp to `1..=MAX_PAGE_SIZE` and a non-negative offset.
    pub fn page(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }

    pub fn filter(&self) -> TransactionFilter {
        TransactionFilter {
            kind: self.kind,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: TransactionKind, wallet: Uuid, recipient: Option<Uuid>) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            wallet_id: wallet,
            recipient_wallet_id: recipient,
            kind,
            status: TransactionStatus::Completed,
            amount_cents: 10_000,
            currency: "USD".to_string(),
            reference_id: None,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn transfer_effect_depends_on_side() {
        let (sender, recipient, other) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let tx = entry(TransactionKind::Transfer, sender, Some(recipient));

        assert_eq!(tx.effect_on(sender), Some(-10_000));
        assert_eq!(tx.effect_on(recipient), Some(10_000));
        assert_eq!(tx.effect_on(other), None);
        assert!(tx.involves(recipient));
        assert!(!tx.involves(other));
    }

    #[test]
    fn withdrawal_has_no_ledger_effect() {
        let wallet = Uuid::new_v4();
        assert_eq!(entry(TransactionKind::Withdrawal, wallet, None).effect_on(wallet), None);
        assert_eq!(
            entry(TransactionKind::Bonus, wallet, None).effect_on(wallet),
            Some(10_000)
        );
    }

    #[test]
    fn only_withdrawals_leave_balances_alone() {
        assert!(TransactionKind::Deposit.moves_balance());
        assert!(TransactionKind::Transfer.moves_balance());
        assert!(TransactionKind::Bonus.moves_balance());
        assert!(!TransactionKind::Withdrawal.moves_balance());
    }

    #[test]
    fn only_pending_transitions() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Pending.is_final());
        assert!(Cancelled.is_final());
    }

    #[test]
    fn page_is_clamped() {
        let query = HistoryQuery {
            limit: Some(1000),
            offset: Some(-5),
            ..Default::default()
        };
        assert_eq!(query.page(), (MAX_PAGE_SIZE, 0));
        assert_eq!(HistoryQuery::default().page(), (DEFAULT_PAGE_SIZE, 0));
    }

    #[test]
    fn history_query_parses_type_alias() {
        let query: HistoryQuery =
            serde_json::from_str(r#"{"type":"withdrawal","status":"completed"}"#).unwrap();
        assert_eq!(query.kind, Some(TransactionKind::Withdrawal));
        assert_eq!(query.status, Some(TransactionStatus::Completed));
    }

    #[test]
    fn transfer_request_rejects_non_positive_amount() {
        let request = TransferRequest {
            recipient_username: "bob".to_string(),
            amount_cents: 0,
            description: None,
        };
        assert!(request.validate().is_err());
    }
}
