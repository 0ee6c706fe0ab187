//! Store-backed ledger scenarios.
//!
//! These run against the PostgreSQL database in `DATABASE_URL` and return
//! early when it is not set. Every test registers its own accounts, so they
//! can share one database and run in parallel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use wallet_web_server::{
    config::Config,
    db,
    error::AppError,
    models::{
        bonus::{BonusStatus, BonusType},
        external::{ExternalEvent, ExternalKind},
        transaction::{NewTransaction, TransactionFilter, TransactionKind, TransactionStatus},
    },
    services::{
        notification_service::{Email, Notifier, NotifyError},
        processor::{PaymentProcessor, ProcessorError},
    },
    state::AppState,
};

const PASSWORD: &str = "Secr3t!pass";

/// Processor that reports whatever events the test queued.
#[derive(Default)]
struct ScriptedProcessor {
    events: Mutex<Vec<ExternalEvent>>,
}

impl ScriptedProcessor {
    fn push(&self, event: ExternalEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl PaymentProcessor for ScriptedProcessor {
    async fn fetch_events(&self, _account_id: Uuid) -> Result<Vec<ExternalEvent>, ProcessorError> {
        Ok(self.events.lock().unwrap().clone())
    }
}

/// Processor that never answers in time.
struct StalledProcessor;

#[async_trait]
impl PaymentProcessor for StalledProcessor {
    async fn fetch_events(&self, _account_id: Uuid) -> Result<Vec<ExternalEvent>, ProcessorError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

/// Notifier that keeps every email in memory.
#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<Email>>,
}

#[async_trait]
impl Notifier for Outbox {
    async fn notify(&self, email: Email) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

impl Outbox {
    /// Wait for a background dispatch matching `subject` to `to`.
    async fn wait_for(&self, to: &str, subject: &str) -> Email {
        for _ in 0..100 {
            let found = self
                .sent
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.to == to && e.subject == subject)
                .cloned();
            if let Some(email) = found {
                return email;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no '{subject}' email sent to {to}");
    }
}

struct Harness {
    database_url: String,
    state: AppState,
    processor: Arc<ScriptedProcessor>,
    outbox: Arc<Outbox>,
}

struct User {
    id: Uuid,
    email: String,
    username: String,
}

async fn harness() -> Option<Harness> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };

    let pool = db::create_pool(&database_url, 5).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let config = test_config(&database_url, &[]);
    let processor = Arc::new(ScriptedProcessor::default());
    let outbox = Arc::new(Outbox::default());
    let state = AppState::with_adapters(config, pool, processor.clone(), outbox.clone()).unwrap();

    Some(Harness {
        database_url,
        state,
        processor,
        outbox,
    })
}

fn test_config(database_url: &str, extra: &[(&str, &str)]) -> Config {
    let mut vars = vec![
        ("DATABASE_URL".to_string(), database_url.to_string()),
        ("JWT_SECRET".to_string(), "ledger-test-secret".to_string()),
    ];
    vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    Config::from_pairs(vars).unwrap()
}

impl Harness {
    async fn user(&self) -> User {
        let tag = &Uuid::new_v4().simple().to_string()[..12];
        let username = format!("u_{tag}");
        let email = format!("{username}@example.com");

        let auth = self
            .state
            .accounts
            .register(&email, PASSWORD, &username, "Test User")
            .await
            .unwrap();

        User {
            id: auth.user.id,
            email,
            username,
        }
    }

    fn queue(&self, kind: ExternalKind, amount_cents: i64, status: TransactionStatus) -> String {
        let external_id = format!("ext-{}", Uuid::new_v4());
        self.processor.push(ExternalEvent {
            external_id: external_id.clone(),
            kind,
            amount_cents,
            currency: "USD".to_string(),
            timestamp: Utc::now(),
            status,
        });
        external_id
    }

    /// Deposit through the sync path, the only way money enters a wallet.
    async fn fund(&self, user: &User, amount_cents: i64) {
        self.queue(ExternalKind::Deposit, amount_cents, TransactionStatus::Completed);
        self.state
            .transactions
            .sync_external(user.id, &user.email)
            .await
            .unwrap();
        self.processor.events.lock().unwrap().clear();
    }

    async fn balance(&self, user: &User) -> i64 {
        self.state.wallets.get_balance(user.id).await.unwrap()
    }
}

#[tokio::test]
async fn transfer_of_full_balance_moves_everything() {
    let Some(h) = harness().await else { return };
    let (alice, bob) = (h.user().await, h.user().await);
    h.fund(&alice, 100_000).await;

    let entry = h
        .state
        .transactions
        .transfer(alice.id, &bob.username, 100_000, Some("rent".to_string()))
        .await
        .unwrap();

    assert_eq!(h.balance(&alice).await, 0);
    assert_eq!(h.balance(&bob).await, 100_000);
    assert_eq!(entry.kind, TransactionKind::Transfer);
    assert_eq!(entry.status, TransactionStatus::Completed);

    // One row, visible from both sides
    let bob_wallet = h.state.wallets.get_for_account(bob.id).await.unwrap();
    let seen_by_bob = h
        .state
        .transactions
        .find_by_wallet(bob_wallet.id, 50, 0)
        .await
        .unwrap();
    assert_eq!(seen_by_bob.len(), 1);
    assert_eq!(seen_by_bob[0].id, entry.id);

    h.outbox.wait_for(&bob.email, "Transfer Received").await;
}

#[tokio::test]
async fn transfer_beyond_balance_changes_nothing() {
    let Some(h) = harness().await else { return };
    let (alice, bob) = (h.user().await, h.user().await);
    h.fund(&alice, 10_000).await;

    let result = h
        .state
        .transactions
        .transfer(alice.id, &bob.username, 15_000, None)
        .await;

    assert!(matches!(result, Err(AppError::InsufficientFunds)));
    assert_eq!(h.balance(&alice).await, 10_000);
    assert_eq!(h.balance(&bob).await, 0);

    let transfers = h
        .state
        .transactions
        .count_by_account(
            alice.id,
            TransactionFilter {
                kind: Some(TransactionKind::Transfer),
                status: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(transfers, 0);
}

#[tokio::test]
async fn transfer_rejects_self_and_unknown_recipient() {
    let Some(h) = harness().await else { return };
    let alice = h.user().await;
    h.fund(&alice, 10_000).await;

    let to_self = h
        .state
        .transactions
        .transfer(alice.id, &alice.username, 1_000, None)
        .await;
    assert!(matches!(to_self, Err(AppError::Validation(_))));

    let to_nobody = h
        .state
        .transactions
        .transfer(alice.id, "nobody_here_x", 1_000, None)
        .await;
    assert!(matches!(to_nobody, Err(AppError::NotFound("Recipient"))));

    // Funds are checked before the recipient is resolved
    let underfunded = h
        .state
        .transactions
        .transfer(alice.id, "nobody_here_x", 20_000, None)
        .await;
    assert!(matches!(underfunded, Err(AppError::InsufficientFunds)));

    assert_eq!(h.balance(&alice).await, 10_000);
}

#[tokio::test]
async fn concurrent_opposite_transfers_conserve_money() {
    let Some(h) = harness().await else { return };
    let (alice, bob) = (h.user().await, h.user().await);
    h.fund(&alice, 50_000).await;
    h.fund(&bob, 50_000).await;

    let (a, b) = tokio::join!(
        h.state
            .transactions
            .transfer(alice.id, &bob.username, 30_000, None),
        h.state
            .transactions
            .transfer(bob.id, &alice.username, 20_000, None),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(h.balance(&alice).await, 40_000);
    assert_eq!(h.balance(&bob).await, 60_000);
}

#[tokio::test]
async fn concurrent_overdraw_lets_exactly_one_transfer_through() {
    let Some(h) = harness().await else { return };
    let (alice, bob, carol) = (h.user().await, h.user().await, h.user().await);
    h.fund(&alice, 100_000).await;

    let (a, b) = tokio::join!(
        h.state
            .transactions
            .transfer(alice.id, &bob.username, 60_000, None),
        h.state
            .transactions
            .transfer(alice.id, &carol.username, 60_000, None),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(AppError::InsufficientFunds)))
    );

    assert_eq!(h.balance(&alice).await, 40_000);
    assert_eq!(h.balance(&bob).await + h.balance(&carol).await, 60_000);
}

#[tokio::test]
async fn stalled_processor_times_out_without_side_effects() {
    let Some(h) = harness().await else { return };
    let alice = h.user().await;
    h.fund(&alice, 10_000).await;

    let stalled = AppState::with_adapters(
        test_config(&h.database_url, &[("PROCESSOR_TIMEOUT_SECS", "1")]),
        h.state.pool.clone(),
        Arc::new(StalledProcessor),
        h.outbox.clone(),
    )
    .unwrap();

    let started = std::time::Instant::now();
    let result = stalled
        .transactions
        .sync_external(alice.id, &alice.email)
        .await;

    assert!(matches!(result, Err(AppError::UpstreamUnavailable(_))));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(h.balance(&alice).await, 10_000);
}

#[tokio::test]
async fn repeated_sync_credits_a_deposit_once() {
    let Some(h) = harness().await else { return };
    let alice = h.user().await;
    let external_id = h.queue(ExternalKind::Deposit, 50_000, TransactionStatus::Completed);

    let first = h
        .state
        .transactions
        .sync_external(alice.id, &alice.email)
        .await
        .unwrap();
    let second = h
        .state
        .transactions
        .sync_external(alice.id, &alice.email)
        .await
        .unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(first[0].reference_id.as_deref(), Some(external_id.as_str()));
    assert!(second.is_empty());
    assert_eq!(h.balance(&alice).await, 50_000);

    h.outbox.wait_for(&alice.email, "Deposit Received").await;
}

#[tokio::test]
async fn sync_records_withdrawals_without_debiting_and_skips_pending() {
    let Some(h) = harness().await else { return };
    let alice = h.user().await;
    h.queue(ExternalKind::Withdrawal, 150_000, TransactionStatus::Completed);
    h.queue(ExternalKind::Deposit, 70_000, TransactionStatus::Pending);

    let created = h
        .state
        .transactions
        .sync_external(alice.id, &alice.email)
        .await
        .unwrap();

    assert_eq!(created.len(), 1);
    assert_eq!(created[0].kind, TransactionKind::Withdrawal);
    assert_eq!(h.balance(&alice).await, 0);
}

#[tokio::test]
async fn expired_grant_cannot_be_claimed() {
    let Some(h) = harness().await else { return };
    let alice = h.user().await;

    let bonus = h
        .state
        .bonuses
        .grant(alice.id, BonusType::WheelOfFortune, 20_000)
        .await
        .unwrap();
    sqlx::query("UPDATE bonuses SET expires_at = NOW() - INTERVAL '1 minute' WHERE id = $1")
        .bind(bonus.id)
        .execute(&h.state.pool)
        .await
        .unwrap();

    let result = h.state.bonuses.claim(bonus.id, alice.id, &alice.email).await;
    assert!(matches!(result, Err(AppError::Expired(_))));

    let bonuses = h.state.bonuses.list_for_account(alice.id).await.unwrap();
    assert_eq!(bonuses[0].status, BonusStatus::Expired);
    assert_eq!(h.balance(&alice).await, 0);

    // Second attempt sees the persisted state
    let again = h.state.bonuses.claim(bonus.id, alice.id, &alice.email).await;
    assert!(matches!(again, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn concurrent_claims_credit_once() {
    let Some(h) = harness().await else { return };
    let alice = h.user().await;
    let bonus = h
        .state
        .bonuses
        .grant(alice.id, BonusType::Referral, 20_000)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        h.state.bonuses.claim(bonus.id, alice.id, &alice.email),
        h.state.bonuses.claim(bonus.id, alice.id, &alice.email),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(h.balance(&alice).await, 20_000);
}

#[tokio::test]
async fn stranger_cannot_claim_or_view() {
    let Some(h) = harness().await else { return };
    let (alice, mallory) = (h.user().await, h.user().await);
    h.fund(&alice, 10_000).await;

    let bonus = h
        .state
        .bonuses
        .grant(alice.id, BonusType::Referral, 5_000)
        .await
        .unwrap();
    let result = h.state.bonuses.claim(bonus.id, mallory.id, &mallory.email).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let deposit = h
        .state
        .transactions
        .find_by_account(alice.id, 1, 0, TransactionFilter::default())
        .await
        .unwrap()
        .remove(0);
    let view = h.state.transactions.get_for_account(deposit.id, mallory.id).await;
    assert!(matches!(view, Err(AppError::Forbidden(_))));
    assert!(h.state.transactions.get_for_account(deposit.id, alice.id).await.is_ok());
}

#[tokio::test]
async fn wheel_eligibility_lifecycle() {
    let Some(h) = harness().await else { return };
    let alice = h.user().await;
    let bonuses = &h.state.bonuses;

    assert!(!bonuses.check_eligibility(alice.id, BonusType::WheelOfFortune).await.unwrap());
    assert!(matches!(
        bonuses.spin_wheel(alice.id, &alice.email).await,
        Err(AppError::Forbidden(_))
    ));

    // A withdrawal just under the threshold does not count
    h.queue(ExternalKind::Withdrawal, 149_999, TransactionStatus::Completed);
    h.state.transactions.sync_external(alice.id, &alice.email).await.unwrap();
    assert!(!bonuses.check_eligibility(alice.id, BonusType::WheelOfFortune).await.unwrap());

    h.queue(ExternalKind::Withdrawal, 150_000, TransactionStatus::Completed);
    h.state.transactions.sync_external(alice.id, &alice.email).await.unwrap();
    assert!(bonuses.check_eligibility(alice.id, BonusType::WheelOfFortune).await.unwrap());
    assert!(!bonuses.check_eligibility(alice.id, BonusType::Referral).await.unwrap());

    let won = bonuses.spin_wheel(alice.id, &alice.email).await.unwrap();
    assert_eq!(won.status, BonusStatus::Pending);
    assert!(bonuses.rules().prizes.prizes().iter().any(|p| p.value_cents == won.amount_cents));

    assert!(matches!(
        bonuses.spin_wheel(alice.id, &alice.email).await,
        Err(AppError::InvalidState(_))
    ));

    let claimed = bonuses.claim(won.id, alice.id, &alice.email).await.unwrap();
    assert_eq!(claimed.status, BonusStatus::Claimed);
    assert_eq!(h.balance(&alice).await, won.amount_cents);

    // Once claimed, never eligible again
    assert!(!bonuses.check_eligibility(alice.id, BonusType::WheelOfFortune).await.unwrap());
    assert!(matches!(
        bonuses.spin_wheel(alice.id, &alice.email).await,
        Err(AppError::Forbidden(_))
    ));
}

#[tokio::test]
async fn only_pending_entries_change_status() {
    let Some(h) = harness().await else { return };
    let alice = h.user().await;
    let wallet = h.state.wallets.get_for_account(alice.id).await.unwrap();

    let mut tx = h.state.pool.begin().await.unwrap();
    let pending = h
        .state
        .transactions
        .record(
            &mut tx,
            NewTransaction {
                kind: TransactionKind::Withdrawal,
                wallet_id: wallet.id,
                amount_cents: 5_000,
                currency: "USD".to_string(),
                status: TransactionStatus::Pending,
                recipient_wallet_id: None,
                reference_id: None,
                description: None,
            },
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let done = h
        .state
        .transactions
        .update_status(pending.id, TransactionStatus::Completed)
        .await
        .unwrap();
    assert_eq!(done.status, TransactionStatus::Completed);

    let again = h
        .state
        .transactions
        .update_status(pending.id, TransactionStatus::Cancelled)
        .await;
    assert!(matches!(again, Err(AppError::InvalidState(_))));
    assert_eq!(h.balance(&alice).await, 0);
}

#[tokio::test]
async fn pending_deposit_cannot_complete_without_credit() {
    let Some(h) = harness().await else { return };
    let alice = h.user().await;
    let wallet = h.state.wallets.get_for_account(alice.id).await.unwrap();

    let mut tx = h.state.pool.begin().await.unwrap();
    let pending = h
        .state
        .transactions
        .record(
            &mut tx,
            NewTransaction {
                kind: TransactionKind::Deposit,
                wallet_id: wallet.id,
                amount_cents: 5_000,
                currency: "USD".to_string(),
                status: TransactionStatus::Pending,
                recipient_wallet_id: None,
                reference_id: None,
                description: None,
            },
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let completed = h
        .state
        .transactions
        .update_status(pending.id, TransactionStatus::Completed)
        .await;
    assert!(matches!(completed, Err(AppError::InvalidState(_))));
    assert_eq!(h.balance(&alice).await, 0);

    let failed = h
        .state
        .transactions
        .update_status(pending.id, TransactionStatus::Failed)
        .await
        .unwrap();
    assert_eq!(failed.status, TransactionStatus::Failed);
    assert_eq!(h.balance(&alice).await, 0);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let Some(h) = harness().await else { return };
    let alice = h.user().await;

    let dup = h
        .state
        .accounts
        .register(&alice.email.to_uppercase(), PASSWORD, "someone_else", "Other")
        .await;
    assert!(matches!(dup, Err(AppError::Conflict(_))));

    let dup = h
        .state
        .accounts
        .register("fresh@example.org", PASSWORD, &alice.username, "Other")
        .await;
    assert!(matches!(dup, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn password_reset_token_is_single_use() {
    let Some(h) = harness().await else { return };
    let alice = h.user().await;

    h.state
        .accounts
        .request_password_reset(&alice.email)
        .await
        .unwrap();
    let email = h.outbox.wait_for(&alice.email, "Password Reset Request").await;
    let token = email
        .text
        .split("token=")
        .nth(1)
        .expect("reset link in email")
        .trim()
        .to_string();

    h.state
        .accounts
        .reset_password(&token, "N3w!password")
        .await
        .unwrap();

    assert!(matches!(
        h.state.accounts.login(&alice.email, PASSWORD).await,
        Err(AppError::Unauthorized)
    ));
    assert!(h.state.accounts.login(&alice.email, "N3w!password").await.is_ok());

    let reused = h.state.accounts.reset_password(&token, "An0ther!pass").await;
    assert!(matches!(reused, Err(AppError::Validation(_))));
}
