//! Shared application state handed to every handler.
//!
//! Built once at startup from [`Config`]. Everything inside is cheap to
//! clone (pool handles, `Arc`s), so axum can clone the state per request.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Config,
    db::DbPool,
    services::{
        account_service::{AccountService, AccountSettings},
        bonus_service::{BonusRules, BonusService},
        notification_service::{
            HttpMailNotifier, LogNotifier, NotificationDispatcher, Notifier, NotifyError,
        },
        prize_table::{PrizeTable, PrizeTableError},
        processor::{HttpProcessor, MockProcessor, PaymentProcessor, ProcessorError},
        transaction_service::TransactionService,
        wallet_service::WalletService,
    },
    utils::jwt::TokenIssuer,
};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Notifier(#[from] NotifyError),

    #[error("invalid prize table: {0}")]
    Prizes(#[from] PrizeTableError),

    #[error("{0} is set but {1} is missing")]
    Incomplete(&'static str, &'static str),
}

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub tokens: TokenIssuer,
    pub accounts: AccountService,
    pub wallets: WalletService,
    pub transactions: TransactionService,
    pub bonuses: BonusService,
}

impl AppState {
    /// Wire services from configuration.
    ///
    /// The payment processor and mail relay fall back to [`MockProcessor`]
    /// and [`LogNotifier`] when their URLs are not configured.
    pub fn new(config: Config, pool: DbPool) -> Result<Self, StateError> {
        let processor = build_processor(&config)?;
        let notifier = build_notifier(&config)?;
        Self::with_adapters(config, pool, processor, notifier)
    }

    /// Wire services around explicit adapters.
    pub fn with_adapters(
        config: Config,
        pool: DbPool,
        processor: Arc<dyn PaymentProcessor>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, StateError> {
        let notifications = NotificationDispatcher::new(notifier);
        let tokens = TokenIssuer::new(&config.jwt_secret, config.jwt_ttl_hours);

        let wallets = WalletService::new(pool.clone());
        let transactions = TransactionService::new(
            pool.clone(),
            wallets.clone(),
            processor,
            Duration::from_secs(config.processor_timeout_secs),
            notifications.clone(),
        );
        let bonuses = BonusService::new(
            pool.clone(),
            wallets.clone(),
            transactions.clone(),
            notifications.clone(),
            BonusRules {
                withdrawal_threshold_cents: config.bonus_withdrawal_threshold_cents,
                expiry_days: config.bonus_expiry_days,
                prizes: PrizeTable::for_policy(config.wheel_policy)?,
            },
        );
        let accounts = AccountService::new(
            pool.clone(),
            wallets.clone(),
            tokens.clone(),
            notifications,
            AccountSettings {
                default_currency: config.default_currency.clone(),
                reset_token_ttl_minutes: config.reset_token_ttl_minutes,
                frontend_url: config.frontend_url.clone(),
            },
        );

        Ok(Self {
            pool,
            config: Arc::new(config),
            tokens,
            accounts,
            wallets,
            transactions,
            bonuses,
        })
    }
}

fn build_processor(config: &Config) -> Result<Arc<dyn PaymentProcessor>, StateError> {
    match (&config.processor_api_url, &config.processor_api_key) {
        (Some(url), Some(key)) => {
            tracing::info!(url = %url, "using HTTP payment processor");
            Ok(Arc::new(HttpProcessor::new(
                url.clone(),
                key.clone(),
                Duration::from_secs(config.processor_timeout_secs),
            )?))
        }
        (Some(_), None) => Err(StateError::Incomplete("PROCESSOR_API_URL", "PROCESSOR_API_KEY")),
        (None, _) => {
            tracing::info!("no payment processor configured, using mock events");
            Ok(Arc::new(MockProcessor))
        }
    }
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>, StateError> {
    match (&config.mail_relay_url, &config.mail_relay_secret) {
        (Some(url), Some(secret)) => {
            tracing::info!(url = %url, "using HTTP mail relay");
            Ok(Arc::new(HttpMailNotifier::new(
                url.clone(),
                secret.clone(),
                config.mail_from.clone(),
            )?))
        }
        (Some(_), None) => Err(StateError::Incomplete("MAIL_RELAY_URL", "MAIL_RELAY_SECRET")),
        (None, _) => {
            tracing::info!("no mail relay configured, notifications are logged only");
            Ok(Arc::new(LogNotifier))
        }
    }
}
