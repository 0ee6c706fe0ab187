//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle database transactions, validation, and complex operations.
//! Each service holds the handles it needs (pool, collaborators, settings),
//! injected once at startup.

pub mod account_service;
pub mod bonus_service;
pub mod notification_service;
pub mod prize_table;
pub mod processor;
pub mod transaction_service;
pub mod wallet_service;

/// Validate an outbound service URL (mail relay, payment processor).
///
/// # Rules
///
/// - Must be valid URL
/// - Must be HTTPS (HTTP localhost allowed for development)
/// - Maximum 2048 characters
pub fn validate_outbound_url(url: &str) -> Result<(), String> {
    if url.len() > 2048 {
        return Err("URL exceeds 2048 characters".to_string());
    }

    let parsed = url::Url::parse(url).map_err(|_| "Invalid URL format".to_string())?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" => {
            // Allow HTTP for localhost/127.0.0.1 (testing)
            if matches!(
                parsed.host_str(),
                Some("localhost") | Some("127.0.0.1") | Some("0.0.0.0")
            ) {
                Ok(())
            } else {
                Err("HTTP is only allowed for localhost. Use HTTPS for production.".to_string())
            }
        }
        _ => Err("URL must use HTTP or HTTPS".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::validate_outbound_url;

    #[test]
    fn outbound_url_rules() {
        assert!(validate_outbound_url("https://relay.example.com/send").is_ok());
        assert!(validate_outbound_url("http://localhost:8025/send").is_ok());
        assert!(validate_outbound_url("http://relay.example.com").is_err());
        assert!(validate_outbound_url("ftp://relay.example.com").is_err());
        assert!(validate_outbound_url("not a url").is_err());
        assert!(validate_outbound_url(&format!("https://x.com/{}", "a".repeat(2048))).is_err());
    }
}
