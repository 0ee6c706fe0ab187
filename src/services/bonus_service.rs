//! Bonus service - eligibility, grants, the wheel of fortune and claims.
//!
//! # Lock Order
//!
//! - Spin: wallet row, then insert the grant
//! - Claim: bonus row, then wallet row
//!
//! Neither path takes a bonus lock while holding a wallet lock, so the two
//! cannot deadlock against each other.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        bonus::{Bonus, BonusStatus, BonusType, ClaimCheck},
        transaction::{NewTransaction, TransactionKind, TransactionStatus},
    },
    services::{
        notification_service::{NotificationDispatcher, templates},
        prize_table::PrizeTable,
        transaction_service::TransactionService,
        wallet_service::WalletService,
    },
};

/// Bonus rules that come from configuration.
#[derive(Debug, Clone)]
pub struct BonusRules {
    /// Smallest completed withdrawal that unlocks the wheel.
    pub withdrawal_threshold_cents: i64,
    pub expiry_days: i64,
    pub prizes: PrizeTable,
}

/// What the store knows about an account's wheel history.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
struct WheelFacts {
    has_qualifying_withdrawal: bool,
    already_claimed: bool,
}

impl WheelFacts {
    fn eligible(self) -> bool {
        self.has_qualifying_withdrawal && !self.already_claimed
    }
}

#[derive(Clone)]
pub struct BonusService {
    pool: DbPool,
    wallets: WalletService,
    transactions: TransactionService,
    notifications: NotificationDispatcher,
    rules: BonusRules,
}

impl BonusService {
    pub fn new(
        pool: DbPool,
        wallets: WalletService,
        transactions: TransactionService,
        notifications: NotificationDispatcher,
        rules: BonusRules,
    ) -> Self {
        Self {
            pool,
            wallets,
            transactions,
            notifications,
            rules,
        }
    }

    pub fn rules(&self) -> &BonusRules {
        &self.rules
    }

    /// Whether the account may receive a bonus of `bonus_type` now.
    ///
    /// Wheel of fortune: at least one completed withdrawal of at least the
    /// threshold, and no wheel grant ever claimed. Other types are not
    /// self-service and always return `false`.
    pub async fn check_eligibility(
        &self,
        account_id: Uuid,
        bonus_type: BonusType,
    ) -> Result<bool, AppError> {
        if bonus_type != BonusType::WheelOfFortune {
            return Ok(false);
        }

        let facts = wheel_facts(&self.pool, account_id, self.rules.withdrawal_threshold_cents).await?;
        Ok(facts.eligible())
    }

    /// Create a pending grant that expires after the configured number of days.
    pub async fn grant(
        &self,
        account_id: Uuid,
        bonus_type: BonusType,
        amount_cents: i64,
    ) -> Result<Bonus, AppError> {
        let bonus = insert_grant(
            &self.pool,
            account_id,
            bonus_type,
            amount_cents,
            self.rules.expiry_days,
        )
        .await?;

        tracing::info!(bonus_id = %bonus.id, %account_id, amount_cents, "bonus granted");
        Ok(bonus)
    }

    /// Spin the wheel: re-check eligibility under the wallet lock, draw a
    /// prize and grant it.
    ///
    /// # Errors
    ///
    /// - `NotFound`: the account has no wallet
    /// - `Forbidden`: not eligible
    /// - `InvalidState`: an unexpired wheel grant is still waiting to be claimed
    pub async fn spin_wheel(&self, account_id: Uuid, email: &str) -> Result<Bonus, AppError> {
        let mut tx = self.pool.begin().await?;

        let wallet = self.wallets.lock_by_account(&mut tx, account_id).await?;

        let facts = wheel_facts(&mut *tx, account_id, self.rules.withdrawal_threshold_cents).await?;
        if !facts.eligible() {
            tx.rollback().await?;
            return Err(AppError::Forbidden(
                "You are not eligible for this bonus".to_string(),
            ));
        }

        let pending: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM bonuses
                WHERE account_id = $1
                  AND bonus_type = $2
                  AND status = 'pending'
                  AND expires_at > NOW()
            )
            "#,
        )
        .bind(account_id)
        .bind(BonusType::WheelOfFortune)
        .fetch_one(&mut *tx)
        .await?;

        if pending {
            tx.rollback().await?;
            return Err(AppError::InvalidState(
                "A wheel of fortune bonus is already waiting to be claimed".to_string(),
            ));
        }

        let amount_cents = self.rules.prizes.draw(&mut rand::rng());

        let bonus = insert_grant(
            &mut *tx,
            account_id,
            BonusType::WheelOfFortune,
            amount_cents,
            self.rules.expiry_days,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(bonus_id = %bonus.id, %account_id, amount_cents, "wheel of fortune spun");

        self.notifications
            .dispatch(templates::bonus_won(email, amount_cents, &wallet.currency));

        Ok(bonus)
    }

    /// Claim a grant and credit its amount to the beneficiary's wallet.
    ///
    /// # Process
    ///
    /// 1. Lock the bonus row
    /// 2. Check ownership, status and expiry
    /// 3. Expired: persist `expired`, commit, fail with `Expired`
    /// 4. Lock the wallet, record a bonus entry, credit, mark `claimed`
    /// 5. Commit, then notify
    ///
    /// # Errors
    ///
    /// - `NotFound`: unknown bonus or missing wallet
    /// - `Forbidden`: bonus belongs to another account
    /// - `InvalidState`: already claimed/expired, or a once-per-account type
    ///   was already claimed through another grant
    /// - `Expired`: deadline passed (the grant is now `expired`)
    pub async fn claim(
        &self,
        bonus_id: Uuid,
        account_id: Uuid,
        email: &str,
    ) -> Result<Bonus, AppError> {
        let mut tx = self.pool.begin().await?;

        let bonus = sqlx::query_as::<_, Bonus>("SELECT * FROM bonuses WHERE id = $1 FOR UPDATE")
            .bind(bonus_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("Bonus"))?;

        if bonus.check_claim(account_id, Utc::now())? == ClaimCheck::Expired {
            set_status(&mut *tx, bonus_id, BonusStatus::Expired).await?;
            tx.commit().await?;

            tracing::info!(%bonus_id, %account_id, "bonus expired on claim");
            return Err(AppError::Expired("Bonus has expired".to_string()));
        }

        let wallet = self
            .wallets
            .lock_by_account(&mut tx, bonus.account_id)
            .await?;

        if bonus.bonus_type.is_once_per_account() {
            let claimed: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM bonuses
                    WHERE account_id = $1 AND bonus_type = $2 AND status = 'claimed'
                )
                "#,
            )
            .bind(bonus.account_id)
            .bind(bonus.bonus_type)
            .fetch_one(&mut *tx)
            .await?;

            if claimed {
                tx.rollback().await?;
                return Err(AppError::InvalidState(format!(
                    "A {} bonus was already claimed",
                    bonus.bonus_type.as_str()
                )));
            }
        }

        let entry = self
            .transactions
            .record(
                &mut tx,
                NewTransaction {
                    kind: TransactionKind::Bonus,
                    wallet_id: wallet.id,
                    amount_cents: bonus.amount_cents,
                    currency: wallet.currency.clone(),
                    status: TransactionStatus::Completed,
                    recipient_wallet_id: None,
                    reference_id: None,
                    description: Some(format!("Claimed {} bonus", bonus.bonus_type.as_str())),
                },
            )
            .await?;

        self.wallets
            .apply_delta(&mut tx, wallet.id, bonus.amount_cents, &entry)
            .await?;

        let claimed = set_status(&mut *tx, bonus_id, BonusStatus::Claimed).await?;

        tx.commit().await?;

        tracing::info!(
            %bonus_id,
            %account_id,
            transaction_id = %entry.id,
            amount_cents = claimed.amount_cents,
            "bonus claimed"
        );

        self.notifications.dispatch(templates::bonus_claimed(
            email,
            claimed.amount_cents,
            &wallet.currency,
        ));

        Ok(claimed)
    }

    /// Every grant for the account, newest first.
    pub async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<Bonus>, AppError> {
        let bonuses = sqlx::query_as::<_, Bonus>(
            "SELECT * FROM bonuses WHERE account_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bonuses)
    }
}

async fn wheel_facts<'e, E>(
    executor: E,
    account_id: Uuid,
    threshold_cents: i64,
) -> Result<WheelFacts, AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    let facts = sqlx::query_as::<_, WheelFacts>(
        r#"
        SELECT
            EXISTS (
                SELECT 1 FROM transactions t
                JOIN wallets w ON w.id = t.wallet_id
                WHERE w.account_id = $1
                  AND t.kind = 'withdrawal'
                  AND t.status = 'completed'
                  AND t.amount_cents >= $2
            ) AS has_qualifying_withdrawal,
            EXISTS (
                SELECT 1 FROM bonuses
                WHERE account_id = $1 AND bonus_type = $3 AND status = 'claimed'
            ) AS already_claimed
        "#,
    )
    .bind(account_id)
    .bind(threshold_cents)
    .bind(BonusType::WheelOfFortune)
    .fetch_one(executor)
    .await?;

    Ok(facts)
}

async fn insert_grant<'e, E>(
    executor: E,
    account_id: Uuid,
    bonus_type: BonusType,
    amount_cents: i64,
    expiry_days: i64,
) -> Result<Bonus, AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    if amount_cents <= 0 {
        return Err(AppError::Validation(
            "Bonus amount must be greater than 0".to_string(),
        ));
    }

    let bonus = sqlx::query_as::<_, Bonus>(
        r#"
        INSERT INTO bonuses (account_id, bonus_type, amount_cents, status, expires_at)
        VALUES ($1, $2, $3, 'pending', $4)
        RETURNING *
        "#,
    )
    .bind(account_id)
    .bind(bonus_type)
    .bind(amount_cents)
    .bind(Utc::now() + Duration::days(expiry_days))
    .fetch_one(executor)
    .await?;

    Ok(bonus)
}

async fn set_status<'e, E>(executor: E, bonus_id: Uuid, status: BonusStatus) -> Result<Bonus, AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    let bonus = sqlx::query_as::<_, Bonus>(
        r#"
        UPDATE bonuses
        SET status = $1,
            updated_at = NOW()
        WHERE id = $2
        RETURNING *
        "#,
    )
    .bind(status)
    .bind(bonus_id)
    .fetch_one(executor)
    .await?;

    Ok(bonus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheel_needs_withdrawal_and_no_prior_claim() {
        let facts = |has_qualifying_withdrawal, already_claimed| WheelFacts {
            has_qualifying_withdrawal,
            already_claimed,
        };

        assert!(facts(true, false).eligible());
        assert!(!facts(false, false).eligible());
        assert!(!facts(true, true).eligible());
        assert!(!facts(false, true).eligible());
    }
}
