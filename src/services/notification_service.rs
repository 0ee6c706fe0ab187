//! Best-effort email notifications.
//!
//! Notifications are fired after a database transaction commits. Delivery
//! failures are logged and never reach the caller of the triggering operation.
//!
//! Two senders exist:
//! - [`LogNotifier`] writes the message to the log (used when no relay is configured)
//! - [`HttpMailNotifier`] posts the message to a mail relay with an HMAC signature

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// One outgoing email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail relay rejected message with status {0}")]
    Rejected(u16),

    #[error("invalid mail relay configuration: {0}")]
    Config(String),
}

/// Something that can deliver an [`Email`].
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, email: Email) -> Result<(), NotifyError>;
}

/// Cloneable handle that dispatches emails in the background.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Fire-and-forget: spawn delivery and log the outcome.
    pub fn dispatch(&self, email: Email) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let subject = email.subject.clone();
            if let Err(e) = notifier.notify(email).await {
                tracing::warn!(error = %e, subject = %subject, "failed to send notification");
            }
        });
    }
}

/// Logs emails instead of sending them.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, email: Email) -> Result<(), NotifyError> {
        tracing::info!(to = %email.to, subject = %email.subject, "notification (log only)");
        Ok(())
    }
}

/// Posts emails as JSON to a relay endpoint.
///
/// # Headers Sent
///
/// - `Content-Type: application/json`
/// - `X-Signature: sha256=<hex>` (HMAC-SHA256 of the body with the relay secret)
/// - `X-Message-Id: <uuid>`
///
/// # Timeout
///
/// 5 seconds per message.
pub struct HttpMailNotifier {
    client: reqwest::Client,
    url: String,
    secret: String,
    from: String,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    #[serde(flatten)]
    email: &'a Email,
}

impl HttpMailNotifier {
    pub fn new(url: String, secret: String, from: String) -> Result<Self, NotifyError> {
        crate::services::validate_outbound_url(&url).map_err(NotifyError::Config)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            url,
            secret,
            from,
        })
    }
}

#[async_trait]
impl Notifier for HttpMailNotifier {
    async fn notify(&self, email: Email) -> Result<(), NotifyError> {
        let body = serde_json::to_string(&RelayMessage {
            from: &self.from,
            email: &email,
        })
        .map_err(|e| NotifyError::Config(format!("Failed to serialize message: {e}")))?;

        let signature = generate_signature(&self.secret, &body);

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Signature", signature)
            .header("X-Message-Id", Uuid::new_v4().to_string())
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }

        tracing::debug!(to = %email.to, subject = %email.subject, "notification delivered");
        Ok(())
    }
}

/// Generate HMAC-SHA256 signature for a relay payload.
///
/// # Format
///
/// `sha256=<hex_encoded_hmac>`
pub fn generate_signature(secret: &str, payload: &str) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Message templates for each notification the services send.
pub mod templates {
    use super::Email;

    fn units(cents: i64) -> String {
        format!("{}.{:02}", cents / 100, (cents % 100).abs())
    }

    pub fn welcome(to: &str, full_name: &str) -> Email {
        Email {
            to: to.to_string(),
            subject: "Welcome to Crypto Wallet Platform".to_string(),
            text: format!(
                "Hello {full_name}, thank you for joining our platform. Your account has been created successfully."
            ),
            html: format!(
                "<h1>Welcome to Crypto Wallet Platform</h1><p>Hello {full_name},</p><p>Thank you for joining our platform. Your account has been created successfully.</p>"
            ),
        }
    }

    pub fn transfer_sent(to: &str, amount_cents: i64, currency: &str, recipient: &str) -> Email {
        let amount = units(amount_cents);
        Email {
            to: to.to_string(),
            subject: "Transfer Successful".to_string(),
            text: format!("You have successfully transferred {amount} {currency} to {recipient}."),
            html: format!(
                "<h1>Transfer Successful</h1><p>You have successfully transferred {amount} {currency} to {recipient}.</p>"
            ),
        }
    }

    pub fn transfer_received(to: &str, amount_cents: i64, currency: &str, sender: &str) -> Email {
        let amount = units(amount_cents);
        Email {
            to: to.to_string(),
            subject: "Transfer Received".to_string(),
            text: format!("You have received {amount} {currency} from {sender}."),
            html: format!("<h1>Transfer Received</h1><p>You have received {amount} {currency}.</p>"),
        }
    }

    pub fn deposit_received(to: &str, amount_cents: i64, currency: &str) -> Email {
        let amount = units(amount_cents);
        Email {
            to: to.to_string(),
            subject: "Deposit Received".to_string(),
            text: format!("You have received a deposit of {amount} {currency} in your wallet."),
            html: format!(
                "<h1>Deposit Received</h1><p>You have received a deposit of {amount} {currency} in your wallet.</p>"
            ),
        }
    }

    pub fn bonus_won(to: &str, amount_cents: i64, currency: &str) -> Email {
        let amount = units(amount_cents);
        Email {
            to: to.to_string(),
            subject: "You Won a Bonus!".to_string(),
            text: format!(
                "Congratulations! You've won a {amount} {currency} bonus. Claim it now in your dashboard."
            ),
            html: format!(
                "<h1>Congratulations!</h1><p>You've won a <strong>{amount} {currency}</strong> bonus from the Wheel of Fortune.</p><p>Claim it now in your dashboard before it expires.</p>"
            ),
        }
    }

    pub fn bonus_claimed(to: &str, amount_cents: i64, currency: &str) -> Email {
        let amount = units(amount_cents);
        Email {
            to: to.to_string(),
            subject: "Bonus Claimed Successfully".to_string(),
            text: format!(
                "You have successfully claimed your {amount} {currency} bonus. It has been added to your wallet."
            ),
            html: format!(
                "<h1>Bonus Claimed Successfully</h1><p>You have successfully claimed your <strong>{amount} {currency}</strong> bonus.</p><p>It has been added to your wallet.</p>"
            ),
        }
    }

    pub fn password_reset(to: &str, reset_url: &str) -> Email {
        Email {
            to: to.to_string(),
            subject: "Password Reset Request".to_string(),
            text: format!(
                "You requested a password reset. Please use this link to reset your password: {reset_url}"
            ),
            html: format!(
                "<h1>Password Reset</h1><p>You requested a password reset.</p><p>Please click the link below to reset your password:</p><a href=\"{reset_url}\">Reset Password</a>"
            ),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn amounts_render_in_major_units() {
            assert_eq!(units(100_000), "1000.00");
            assert_eq!(units(50_025), "500.25");
            assert_eq!(units(5), "0.05");
        }

        #[test]
        fn transfer_email_names_counterparty() {
            let email = transfer_sent("a@example.com", 25_000, "USD", "bob");
            assert_eq!(email.to, "a@example.com");
            assert!(email.text.contains("250.00 USD to bob"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct ChannelNotifier(mpsc::UnboundedSender<Email>);

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn notify(&self, email: Email) -> Result<(), NotifyError> {
            self.0.send(email).ok();
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _email: Email) -> Result<(), NotifyError> {
            Err(NotifyError::Rejected(502))
        }
    }

    #[test]
    fn signature_is_stable_hex_hmac() {
        let sig = generate_signature("secret", "{\"a\":1}");
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);
        assert_eq!(sig, generate_signature("secret", "{\"a\":1}"));
        assert_ne!(sig, generate_signature("other", "{\"a\":1}"));
    }

    #[tokio::test]
    async fn dispatch_delivers_in_background() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = NotificationDispatcher::new(Arc::new(ChannelNotifier(tx)));

        dispatcher.dispatch(templates::welcome("a@example.com", "Alice"));

        let email = rx.recv().await.unwrap();
        assert_eq!(email.subject, "Welcome to Crypto Wallet Platform");
    }

    #[tokio::test]
    async fn dispatch_swallows_failures() {
        let dispatcher = NotificationDispatcher::new(Arc::new(FailingNotifier));
        dispatcher.dispatch(templates::welcome("a@example.com", "Alice"));
        tokio::task::yield_now().await;
    }

    #[test]
    fn relay_rejects_plain_http_to_remote_host() {
        let result = HttpMailNotifier::new(
            "http://mail.example.com/send".to_string(),
            "secret".to_string(),
            "noreply@example.com".to_string(),
        );
        assert!(matches!(result, Err(NotifyError::Config(_))));
    }
}
