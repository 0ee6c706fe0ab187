//! Wallet service - balances and the only sanctioned balance mutation.
//!
//! # Balance Mutation Rules
//!
//! - Balances change only through [`WalletService::apply_delta`]
//! - `apply_delta` needs an open [`DbTx`] and the ledger entry that justifies it
//! - Callers check "balance >= debit" against a row they locked in the same
//!   transaction; the `balance_cents >= 0` CHECK constraint backs this up

use uuid::Uuid;

use crate::{
    db::{DbPool, DbTx},
    error::AppError,
    models::{transaction::Transaction, wallet::Wallet},
};

#[derive(Clone)]
pub struct WalletService {
    pool: DbPool,
}

impl WalletService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the zero-balance wallet for a freshly inserted account.
    ///
    /// Runs inside the registration transaction. A second wallet for the same
    /// account violates `wallets_account_id_key` and surfaces as `Conflict`.
    pub async fn create_wallet(
        &self,
        tx: &mut DbTx<'_>,
        account_id: Uuid,
        currency: &str,
    ) -> Result<Wallet, AppError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (account_id, balance_cents, currency)
            VALUES ($1, 0, $2)
            RETURNING *
            "#,
        )
        .bind(account_id)
        .bind(currency)
        .fetch_one(&mut **tx)
        .await?;

        tracing::info!(%account_id, wallet_id = %wallet.id, "wallet created");
        Ok(wallet)
    }

    pub async fn find_by_account(&self, account_id: Uuid) -> Result<Option<Wallet>, AppError> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(wallet)
    }

    /// The account's wallet, or `NotFound`.
    pub async fn get_for_account(&self, account_id: Uuid) -> Result<Wallet, AppError> {
        self.find_by_account(account_id)
            .await?
            .ok_or(AppError::NotFound("Wallet"))
    }

    /// Current balance in cents; 0 when the account has no wallet.
    pub async fn get_balance(&self, account_id: Uuid) -> Result<i64, AppError> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance_cents FROM wallets WHERE account_id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(balance.unwrap_or(0))
    }

    /// Lock an account's wallet row for the rest of `tx`.
    pub async fn lock_by_account(
        &self,
        tx: &mut DbTx<'_>,
        account_id: Uuid,
    ) -> Result<Wallet, AppError> {
        sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE account_id = $1 FOR UPDATE")
            .bind(account_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(AppError::NotFound("Wallet"))
    }

    /// Lock two wallets by id, always in ascending id order so that two
    /// opposite transfers cannot deadlock. Returns them in argument order.
    pub async fn lock_pair(
        &self,
        tx: &mut DbTx<'_>,
        a: Uuid,
        b: Uuid,
    ) -> Result<(Wallet, Wallet), AppError> {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };

        let lock = |id: Uuid| {
            sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1 FOR UPDATE").bind(id)
        };

        let first_wallet = lock(first)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(AppError::NotFound("Wallet"))?;
        let second_wallet = lock(second)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(AppError::NotFound("Wallet"))?;

        if first == a {
            Ok((first_wallet, second_wallet))
        } else {
            Ok((second_wallet, first_wallet))
        }
    }

    /// Add `delta` cents to a wallet and return the updated row.
    ///
    /// `entry` must be the ledger entry recorded in the same transaction and
    /// its effect on `wallet_id` must equal `delta`; anything else is an
    /// internal error and nothing is written.
    pub async fn apply_delta(
        &self,
        tx: &mut DbTx<'_>,
        wallet_id: Uuid,
        delta: i64,
        entry: &Transaction,
    ) -> Result<Wallet, AppError> {
        check_justified(wallet_id, delta, entry)?;

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET balance_cents = balance_cents + $1,
                updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(delta)
        .bind(wallet_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AppError::NotFound("Wallet"))?;

        tracing::debug!(
            %wallet_id,
            delta,
            transaction_id = %entry.id,
            balance_cents = wallet.balance_cents,
            "wallet balance updated"
        );
        Ok(wallet)
    }
}

fn check_justified(wallet_id: Uuid, delta: i64, entry: &Transaction) -> Result<(), AppError> {
    if !entry.involves(wallet_id) {
        return Err(AppError::Internal(format!(
            "transaction {} does not reference wallet {wallet_id}",
            entry.id
        )));
    }
    if entry.effect_on(wallet_id) != Some(delta) {
        return Err(AppError::Internal(format!(
            "transaction {} does not justify delta {delta} on wallet {wallet_id}",
            entry.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transaction::{TransactionKind, TransactionStatus};
    use chrono::Utc;

    fn transfer(from: Uuid, to: Uuid, amount_cents: i64) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            wallet_id: from,
            recipient_wallet_id: Some(to),
            kind: TransactionKind::Transfer,
            status: TransactionStatus::Completed,
            amount_cents,
            currency: "USD".to_string(),
            reference_id: None,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn delta_must_match_entry_side_and_amount() {
        let (s, r) = (Uuid::new_v4(), Uuid::new_v4());
        let entry = transfer(s, r, 25_000);

        assert!(check_justified(s, -25_000, &entry).is_ok());
        assert!(check_justified(r, 25_000, &entry).is_ok());

        // Wrong sign or magnitude
        assert!(matches!(
            check_justified(s, 25_000, &entry),
            Err(AppError::Internal(_))
        ));
        assert!(matches!(
            check_justified(r, 24_999, &entry),
            Err(AppError::Internal(_))
        ));
    }

    #[test]
    fn foreign_wallet_is_rejected() {
        let entry = transfer(Uuid::new_v4(), Uuid::new_v4(), 100);
        assert!(matches!(
            check_justified(Uuid::new_v4(), 100, &entry),
            Err(AppError::Internal(_))
        ));
    }
}
