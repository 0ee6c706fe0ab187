//! Events reported by the external payment processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::transaction::{TransactionKind, TransactionStatus};

/// Direction of an external event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalKind {
    Deposit,
    Withdrawal,
}

impl From<ExternalKind> for TransactionKind {
    fn from(kind: ExternalKind) -> Self {
        match kind {
            ExternalKind::Deposit => TransactionKind::Deposit,
            ExternalKind::Withdrawal => TransactionKind::Withdrawal,
        }
    }
}

/// A deposit or withdrawal as seen by the processor, normalised to cents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalEvent {
    /// Processor-side identifier, stored as the ledger `reference_id`
    pub external_id: String,
    pub kind: ExternalKind,
    pub amount_cents: i64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
}

impl ExternalEvent {
    /// Credits the wallet when ingested.
    pub fn credits_wallet(&self) -> bool {
        self.kind == ExternalKind::Deposit && self.status == TransactionStatus::Completed
    }
}

/// Wire shape of one entry in the processor's `GET /transactions` response.
///
/// ```json
/// {
///   "id": "oxp-1734000000-1",
///   "type": "deposit",
///   "amount": 1000.0,
///   "currency": "USD",
///   "timestamp": "2025-01-15T10:30:00Z",
///   "status": "completed"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct ProcessorTransaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ExternalKind,
    /// Major currency units
    pub amount: f64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
}

/// Envelope of the processor's `GET /transactions` response.
///
/// Entries stay untyped until [`into_events`](Self::into_events) so one
/// malformed entry cannot discard the rest of the batch.
#[derive(Debug, Deserialize)]
pub struct ProcessorTransactions {
    pub transactions: Vec<serde_json::Value>,
}

impl ProcessorTransactions {
    /// Decode each entry on its own; entries that fail are logged and dropped.
    pub fn into_events(self) -> Vec<ExternalEvent> {
        self.transactions
            .into_iter()
            .filter_map(|item| {
                let id = item
                    .get("id")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("<missing>")
                    .to_string();
                match serde_json::from_value::<ProcessorTransaction>(item) {
                    Ok(tx) => Some(ExternalEvent::from(tx)),
                    Err(e) => {
                        tracing::warn!(external_id = %id, error = %e, "dropping malformed processor entry");
                        None
                    }
                }
            })
            .collect()
    }
}

impl From<ProcessorTransaction> for ExternalEvent {
    fn from(tx: ProcessorTransaction) -> Self {
        Self {
            external_id: tx.id,
            kind: tx.kind,
            amount_cents: (tx.amount * 100.0).round() as i64,
            currency: tx.currency.to_uppercase(),
            timestamp: tx.timestamp,
            status: tx.status,
        }
    }
}
