//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// How the wheel of fortune picks a prize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WheelPolicy {
    /// Every segment is equally likely.
    #[default]
    Uniform,
    /// Small prizes are more likely than large ones.
    Weighted,
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `JWT_SECRET` (required): HMAC key for bearer tokens
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `PROCESSOR_API_URL` / `PROCESSOR_API_KEY` (optional): external payment
///   processor; the built-in mock source is used when unset
/// - `MAIL_RELAY_URL` / `MAIL_RELAY_SECRET` (optional): outbound mail relay;
///   notifications are only logged when unset
///
/// The remaining fields tune bonus rules and token lifetimes and all have defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    pub jwt_secret: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_jwt_ttl_hours")]
    pub jwt_ttl_hours: i64,

    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Minimum completed withdrawal that unlocks the wheel of fortune.
    #[serde(default = "default_bonus_threshold")]
    pub bonus_withdrawal_threshold_cents: i64,

    #[serde(default = "default_bonus_expiry_days")]
    pub bonus_expiry_days: i64,

    #[serde(default)]
    pub wheel_policy: WheelPolicy,

    #[serde(default = "default_reset_ttl_minutes")]
    pub reset_token_ttl_minutes: i64,

    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    pub processor_api_url: Option<String>,

    pub processor_api_key: Option<String>,

    #[serde(default = "default_processor_timeout")]
    pub processor_timeout_secs: u64,

    pub mail_relay_url: Option<String>,

    pub mail_relay_secret: Option<String>,

    #[serde(default = "default_mail_from")]
    pub mail_from: String,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_jwt_ttl_hours() -> i64 {
    24
}

fn default_currency() -> String {
    "USD".to_string()
}

/// 1500.00 in minor units.
fn default_bonus_threshold() -> i64 {
    150_000
}

fn default_bonus_expiry_days() -> i64 {
    7
}

fn default_reset_ttl_minutes() -> i64 {
    60
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_processor_timeout() -> u64 {
    10
}

fn default_mail_from() -> String {
    "noreply@cryptowallet.com".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Parse configuration from an explicit list of `(KEY, value)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(pairs)
    }
}
