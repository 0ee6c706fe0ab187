//! External payment processor adapter.
//!
//! The sync flow only needs one capability from the processor: list the
//! deposit/withdrawal events it knows about for an account. Calls are bounded
//! by a timeout so a slow processor surfaces as an error instead of a hung
//! request.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::external::{ExternalEvent, ExternalKind, ProcessorTransactions};
use crate::models::transaction::TransactionStatus;

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("processor returned status {0}")]
    Status(u16),

    #[error("invalid processor configuration: {0}")]
    Config(String),
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Events the processor reports for `account_id`, newest first.
    async fn fetch_events(&self, account_id: Uuid) -> Result<Vec<ExternalEvent>, ProcessorError>;
}

/// Talks to the processor's REST API.
///
/// `GET <api_url>/transactions?user_id=<account>&limit=50` with a bearer API key.
pub struct HttpProcessor {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpProcessor {
    pub fn new(api_url: String, api_key: String, timeout: Duration) -> Result<Self, ProcessorError> {
        crate::services::validate_outbound_url(&api_url).map_err(ProcessorError::Config)?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }
}

#[async_trait]
impl PaymentProcessor for HttpProcessor {
    async fn fetch_events(&self, account_id: Uuid) -> Result<Vec<ExternalEvent>, ProcessorError> {
        let request = self
            .client
            .get(format!("{}/transactions", self.api_url))
            .bearer_auth(&self.api_key)
            .query(&[("user_id", account_id.to_string()), ("limit", "50".to_string())])
            .send();

        // reqwest already enforces the timeout; the outer bound also covers body decoding.
        let fetch = async {
            let response = request.await?;
            if !response.status().is_success() {
                return Err(ProcessorError::Status(response.status().as_u16()));
            }
            let body: ProcessorTransactions = response.json().await?;
            Ok(body.into_events())
        };

        tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| ProcessorError::Timeout(self.timeout))?
    }
}

/// Development stand-in for the processor.
///
/// Reports the same three completed events for an account on every call:
/// deposits of 1000.00 and 500.00 and a withdrawal of 1500.00. Reference ids
/// are derived from the account id, so repeated syncs are no-ops after the
/// first one.
#[derive(Debug, Default)]
pub struct MockProcessor;

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn fetch_events(&self, account_id: Uuid) -> Result<Vec<ExternalEvent>, ProcessorError> {
        let now = Utc::now();
        let short = account_id.simple().to_string();

        let event = |n: u32, kind, amount_cents, days_ago| ExternalEvent {
            external_id: format!("oxp-{short}-{n}"),
            kind,
            amount_cents,
            currency: "USD".to_string(),
            timestamp: now - chrono::Duration::days(days_ago),
            status: TransactionStatus::Completed,
        };

        Ok(vec![
            event(1, ExternalKind::Deposit, 100_000, 0),
            event(2, ExternalKind::Deposit, 50_000, 1),
            event(3, ExternalKind::Withdrawal, 150_000, 2),
        ])
    }
}
