//! Transaction service - Core business logic for the ledger.
//!
//! This service handles:
//! - Recording immutable ledger entries
//! - History queries (per wallet and per account)
//! - Status transitions of pending entries
//! - User-to-user transfers
//! - Idempotent ingestion of external processor events
//!
//! # Atomicity Guarantees
//!
//! Every balance change happens in the same PostgreSQL transaction as the
//! ledger entry that justifies it. The database ensures all-or-nothing
//! execution.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::{DbPool, DbTx},
    error::AppError,
    models::{
        external::ExternalEvent,
        transaction::{
            NewTransaction, Transaction, TransactionFilter, TransactionKind, TransactionStatus,
        },
    },
    services::{
        notification_service::{NotificationDispatcher, templates},
        processor::PaymentProcessor,
        wallet_service::WalletService,
    },
};

/// Longest description accepted on a transfer.
pub const MAX_DESCRIPTION_LEN: usize = 200;

/// One side of a transfer: the account and its wallet.
#[derive(Debug, sqlx::FromRow)]
struct Party {
    account_id: Uuid,
    email: String,
    username: String,
    wallet_id: Uuid,
    balance_cents: i64,
}

const PARTY_SELECT: &str = r#"
    SELECT a.id AS account_id, a.email, a.username, w.id AS wallet_id, w.balance_cents
    FROM accounts a
    JOIN wallets w ON w.account_id = a.id
"#;

/// What [`insert_entry`] does when the reference id already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnConflict {
    Fail,
    SkipDuplicateReference,
}

#[derive(Clone)]
pub struct TransactionService {
    pool: DbPool,
    wallets: WalletService,
    processor: Arc<dyn PaymentProcessor>,
    processor_timeout: Duration,
    notifications: NotificationDispatcher,
}

impl TransactionService {
    pub fn new(
        pool: DbPool,
        wallets: WalletService,
        processor: Arc<dyn PaymentProcessor>,
        processor_timeout: Duration,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            pool,
            wallets,
            processor,
            processor_timeout,
            notifications,
        }
    }

    /// Insert a ledger entry inside an open transaction.
    ///
    /// `amount_cents` is a positive magnitude; direction comes from the kind
    /// and the wallet's side of the entry.
    pub async fn record(
        &self,
        tx: &mut DbTx<'_>,
        new: NewTransaction,
    ) -> Result<Transaction, AppError> {
        if new.amount_cents <= 0 {
            return Err(AppError::Validation(
                "Amount must be greater than 0".to_string(),
            ));
        }

        insert_entry(tx, &new, None, OnConflict::Fail)
            .await?
            .ok_or_else(|| AppError::Internal("Ledger insert returned no row".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(transaction)
    }

    /// Entries where the wallet is either side, newest first.
    pub async fn find_by_wallet(
        &self,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, AppError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE wallet_id = $1 OR recipient_wallet_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(wallet_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    /// Entries touching the account's wallet, filtered and newest first.
    pub async fn find_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
        filter: TransactionFilter,
    ) -> Result<Vec<Transaction>, AppError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT t.* FROM transactions t
            JOIN wallets w ON w.id = t.wallet_id OR w.id = t.recipient_wallet_id
            WHERE w.account_id = $1
              AND ($2::transaction_kind IS NULL OR t.kind = $2)
              AND ($3::transaction_status IS NULL OR t.status = $3)
            ORDER BY t.created_at DESC, t.id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(account_id)
        .bind(filter.kind)
        .bind(filter.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    /// Total for [`find_by_account`](Self::find_by_account) with the same filter.
    pub async fn count_by_account(
        &self,
        account_id: Uuid,
        filter: TransactionFilter,
    ) -> Result<i64, AppError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM transactions t
            JOIN wallets w ON w.id = t.wallet_id OR w.id = t.recipient_wallet_id
            WHERE w.account_id = $1
              AND ($2::transaction_kind IS NULL OR t.kind = $2)
              AND ($3::transaction_status IS NULL OR t.status = $3)
            "#,
        )
        .bind(account_id)
        .bind(filter.kind)
        .bind(filter.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// A single entry, visible only if one side is the account's wallet.
    pub async fn get_for_account(
        &self,
        id: Uuid,
        account_id: Uuid,
    ) -> Result<Transaction, AppError> {
        let transaction = self
            .find_by_id(id)
            .await?
            .ok_or(AppError::NotFound("Transaction"))?;

        let owns = match self.wallets.find_by_account(account_id).await? {
            Some(wallet) => transaction.involves(wallet.id),
            None => false,
        };
        if !owns {
            return Err(AppError::Forbidden("Access denied".to_string()));
        }

        Ok(transaction)
    }

    /// Move a pending entry to another status. Balances are not touched, so
    /// pending entries whose kind moves money may fail or be cancelled but
    /// never complete here.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<Transaction, AppError> {
        let mut tx = self.pool.begin().await?;

        let current =
            sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(AppError::NotFound("Transaction"))?;

        if !current.status.can_transition_to(status) {
            tx.rollback().await?;
            return Err(AppError::InvalidState(format!(
                "Transaction already {}",
                current.status.as_str()
            )));
        }

        if status == TransactionStatus::Completed && current.kind.moves_balance() {
            tx.rollback().await?;
            return Err(AppError::InvalidState(format!(
                "Pending {} cannot be completed without its balance change",
                current.kind.as_str()
            )));
        }

        let updated = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = $1,
                updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            transaction_id = %id,
            from = current.status.as_str(),
            to = status.as_str(),
            "transaction status updated"
        );
        Ok(updated)
    }

    /// Execute a transfer (move money between two users' wallets).
    ///
    /// # Process
    ///
    /// 1. Validate amount and description
    /// 2. Resolve the sender and reject an amount above its balance
    /// 3. Resolve the recipient and reject self transfers
    /// 4. Start a database transaction, lock both wallets (id order) and
    ///    re-check the sender balance
    /// 5. Record one transfer entry and apply both deltas
    /// 6. Commit (or rollback on error)
    /// 7. Notify both parties
    ///
    /// # Errors
    ///
    /// - `Validation`: bad amount/description, self transfer, currency mismatch
    /// - `NotFound`: unknown recipient
    /// - `InsufficientFunds`: sender balance below the amount
    /// - `Database`: Database error occurred
    pub async fn transfer(
        &self,
        sender_account_id: Uuid,
        recipient_username: &str,
        amount_cents: i64,
        description: Option<String>,
    ) -> Result<Transaction, AppError> {
        validate_transfer(amount_cents, description.as_deref())?;

        let sender = self
            .party_by_account(sender_account_id)
            .await?
            .ok_or(AppError::NotFound("Wallet"))?;
        if sender.balance_cents < amount_cents {
            return Err(AppError::InsufficientFunds);
        }

        let recipient = self
            .party_by_username(recipient_username)
            .await?
            .ok_or(AppError::NotFound("Recipient"))?;

        if sender.account_id == recipient.account_id {
            return Err(AppError::Validation(
                "Cannot transfer to yourself".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let (sender_wallet, recipient_wallet) = self
            .wallets
            .lock_pair(&mut tx, sender.wallet_id, recipient.wallet_id)
            .await?;

        if sender_wallet.balance_cents < amount_cents {
            tx.rollback().await?;
            return Err(AppError::InsufficientFunds);
        }

        if sender_wallet.currency != recipient_wallet.currency {
            tx.rollback().await?;
            return Err(AppError::Validation(format!(
                "Currency mismatch: {} to {}",
                sender_wallet.currency, recipient_wallet.currency
            )));
        }

        let entry = self
            .record(
                &mut tx,
                NewTransaction {
                    kind: TransactionKind::Transfer,
                    wallet_id: sender_wallet.id,
                    amount_cents,
                    currency: sender_wallet.currency.clone(),
                    status: TransactionStatus::Completed,
                    recipient_wallet_id: Some(recipient_wallet.id),
                    reference_id: None,
                    description,
                },
            )
            .await?;

        self.wallets
            .apply_delta(&mut tx, sender_wallet.id, -amount_cents, &entry)
            .await?;
        self.wallets
            .apply_delta(&mut tx, recipient_wallet.id, amount_cents, &entry)
            .await?;

        tx.commit().await?;

        tracing::info!(
            transaction_id = %entry.id,
            sender = %sender.account_id,
            recipient = %recipient.account_id,
            amount_cents,
            "transfer completed"
        );

        self.notifications.dispatch(templates::transfer_sent(
            &sender.email,
            amount_cents,
            &entry.currency,
            &recipient.username,
        ));
        self.notifications.dispatch(templates::transfer_received(
            &recipient.email,
            amount_cents,
            &entry.currency,
            &sender.username,
        ));

        Ok(entry)
    }

    /// Pull the account's events from the payment processor and record the
    /// ones not seen before.
    ///
    /// Each event is ingested in its own transaction, keyed on the unique
    /// `reference_id`, so repeated or concurrent syncs credit a deposit once.
    /// Returns only the entries created by this call.
    ///
    /// # Errors
    ///
    /// - `NotFound`: the account has no wallet
    /// - `UpstreamUnavailable`: the processor failed or timed out
    pub async fn sync_external(
        &self,
        account_id: Uuid,
        email: &str,
    ) -> Result<Vec<Transaction>, AppError> {
        let wallet = self.wallets.get_for_account(account_id).await?;

        let events = tokio::time::timeout(
            self.processor_timeout,
            self.processor.fetch_events(account_id),
        )
        .await
        .map_err(|_| {
            AppError::UpstreamUnavailable(format!(
                "no response within {}s",
                self.processor_timeout.as_secs()
            ))
        })?
        .map_err(|e| {
            tracing::warn!(%account_id, error = %e, "payment processor fetch failed");
            AppError::UpstreamUnavailable(e.to_string())
        })?;

        let mut created = Vec::new();

        for event in &events {
            if let Some(reason) = skip_reason(event, &wallet.currency) {
                tracing::info!(
                    %account_id,
                    external_id = %event.external_id,
                    reason,
                    "skipping external event"
                );
                continue;
            }

            match self.ingest(wallet.id, event).await {
                Ok(Some(entry)) => {
                    if event.credits_wallet() {
                        self.notifications.dispatch(templates::deposit_received(
                            email,
                            entry.amount_cents,
                            &entry.currency,
                        ));
                    }
                    created.push(entry);
                }
                Ok(None) => {
                    tracing::debug!(external_id = %event.external_id, "external event already recorded");
                }
                Err(e) => {
                    tracing::warn!(
                        %account_id,
                        external_id = %event.external_id,
                        error = %e,
                        "failed to ingest external event"
                    );
                }
            }
        }

        tracing::info!(
            %account_id,
            fetched = events.len(),
            created = created.len(),
            "external sync finished"
        );
        Ok(created)
    }

    /// Insert-or-skip one event and credit completed deposits.
    ///
    /// `Ok(None)` means the reference was already recorded.
    async fn ingest(
        &self,
        wallet_id: Uuid,
        event: &ExternalEvent,
    ) -> Result<Option<Transaction>, AppError> {
        let mut tx = self.pool.begin().await?;

        let kind = TransactionKind::from(event.kind);
        let new = NewTransaction {
            kind,
            wallet_id,
            amount_cents: event.amount_cents,
            currency: event.currency.clone(),
            status: event.status,
            recipient_wallet_id: None,
            reference_id: Some(event.external_id.clone()),
            description: Some(format!("External {}", kind.as_str())),
        };
        let inserted = insert_entry(
            &mut tx,
            &new,
            Some(event.timestamp),
            OnConflict::SkipDuplicateReference,
        )
        .await?;

        let Some(entry) = inserted else {
            tx.rollback().await?;
            return Ok(None);
        };

        if event.credits_wallet() {
            self.wallets
                .apply_delta(&mut tx, wallet_id, entry.amount_cents, &entry)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(
            transaction_id = %entry.id,
            external_id = %event.external_id,
            kind = entry.kind.as_str(),
            amount_cents = entry.amount_cents,
            "external event recorded"
        );
        Ok(Some(entry))
    }

    async fn party_by_account(&self, account_id: Uuid) -> Result<Option<Party>, AppError> {
        let party = sqlx::query_as::<_, Party>(&format!("{PARTY_SELECT} WHERE a.id = $1"))
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(party)
    }

    async fn party_by_username(&self, username: &str) -> Result<Option<Party>, AppError> {
        let party = sqlx::query_as::<_, Party>(&format!("{PARTY_SELECT} WHERE a.username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(party)
    }
}

/// Shared ledger INSERT. `created_at` defaults to now; with
/// `SkipDuplicateReference` an existing `reference_id` yields `Ok(None)`.
async fn insert_entry(
    tx: &mut DbTx<'_>,
    new: &NewTransaction,
    created_at: Option<DateTime<Utc>>,
    on_conflict: OnConflict,
) -> Result<Option<Transaction>, AppError> {
    let conflict = match on_conflict {
        OnConflict::Fail => "",
        OnConflict::SkipDuplicateReference => "ON CONFLICT (reference_id) DO NOTHING",
    };

    let sql = format!(
        r#"
        INSERT INTO transactions (
            wallet_id,
            recipient_wallet_id,
            kind,
            status,
            amount_cents,
            currency,
            reference_id,
            description,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, NOW()))
        {conflict}
        RETURNING *
        "#
    );

    let inserted = sqlx::query_as::<_, Transaction>(&sql)
        .bind(new.wallet_id)
        .bind(new.recipient_wallet_id)
        .bind(new.kind)
        .bind(new.status)
        .bind(new.amount_cents)
        .bind(&new.currency)
        .bind(&new.reference_id)
        .bind(&new.description)
        .bind(created_at)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(inserted)
}

fn validate_transfer(amount_cents: i64, description: Option<&str>) -> Result<(), AppError> {
    if amount_cents <= 0 {
        return Err(AppError::Validation(
            "Amount must be greater than 0".to_string(),
        ));
    }
    if description.is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN) {
        return Err(AppError::Validation(
            "Description cannot exceed 200 characters".to_string(),
        ));
    }
    Ok(())
}

/// Why an external event is not ingested, if it is not.
fn skip_reason(event: &ExternalEvent, wallet_currency: &str) -> Option<&'static str> {
    if !event.status.is_final() {
        Some("status not final")
    } else if event.amount_cents <= 0 {
        Some("non-positive amount")
    } else if event.currency != wallet_currency {
        Some("currency mismatch")
    } else {
        None
    }
}
