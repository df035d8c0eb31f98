//! Broadcast Controller configuration.
//!
//! Configuration is loaded from environment variables. Provider secrets are
//! held in `SecretString` and the database URL is redacted in Debug output.

use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default minimum booking lead time in hours.
pub const DEFAULT_BOOKING_LEAD_TIME_HOURS: i64 = 48;

/// Maximum accepted booking lead time in hours (30 days).
pub const MAX_BOOKING_LEAD_TIME_HOURS: i64 = 720;

/// Default grace period after a slot's end time during which the broadcast
/// token remains usable, in hours.
pub const DEFAULT_TOKEN_GRACE_HOURS: i64 = 1;

/// Broadcast Controller configuration.
///
/// Loaded from environment variables with sensible defaults. Hard secrets
/// (provider API keys, webhook signing secret) have no defaults and must
/// be present.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Deployment region identifier (e.g., "us-east-1").
    pub region: String,

    /// Base URL of the streaming/recording provider API.
    pub streaming_api_url: String,

    /// API key for the streaming/recording provider.
    pub streaming_api_key: SecretString,

    /// Shared secret for the inbound recording webhook HMAC signature.
    pub webhook_signing_secret: SecretString,

    /// Base URL of the payment processor API.
    pub payments_api_url: String,

    /// API key for the payment processor.
    pub payments_api_key: SecretString,

    /// Base URL of the transactional mail provider API.
    pub mail_api_url: String,

    /// API key for the transactional mail provider.
    pub mail_api_key: SecretString,

    /// Minimum lead time before a booking may start, in hours.
    pub booking_lead_time_hours: i64,

    /// Grace period after `end_time` during which the broadcast token stays
    /// valid, in hours. Applied at booking time.
    pub token_grace_hours: i64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("region", &self.region)
            .field("streaming_api_url", &self.streaming_api_url)
            .field("streaming_api_key", &"[REDACTED]")
            .field("webhook_signing_secret", &"[REDACTED]")
            .field("payments_api_url", &self.payments_api_url)
            .field("payments_api_key", &"[REDACTED]")
            .field("mail_api_url", &self.mail_api_url)
            .field("mail_api_key", &"[REDACTED]")
            .field("booking_lead_time_hours", &self.booking_lead_time_hours)
            .field("token_grace_hours", &self.token_grace_hours)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid booking lead time configuration: {0}")]
    InvalidLeadTime(String),

    #[error("Invalid token grace configuration: {0}")]
    InvalidTokenGrace(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = require(vars, "DATABASE_URL")?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let region = vars
            .get("BC_REGION")
            .cloned()
            .unwrap_or_else(|| "us-east-1".to_string());

        let streaming_api_url = vars
            .get("STREAMING_API_URL")
            .cloned()
            .unwrap_or_else(|| "http://localhost:7880".to_string());

        let streaming_api_key = SecretString::from(require(vars, "STREAMING_API_KEY")?);

        let webhook_signing_secret = SecretString::from(require(vars, "WEBHOOK_SIGNING_SECRET")?);

        let payments_api_url = vars
            .get("PAYMENTS_API_URL")
            .cloned()
            .unwrap_or_else(|| "http://localhost:8090".to_string());

        let payments_api_key = SecretString::from(require(vars, "PAYMENTS_API_KEY")?);

        let mail_api_url = vars
            .get("MAIL_API_URL")
            .cloned()
            .unwrap_or_else(|| "http://localhost:8025".to_string());

        let mail_api_key = SecretString::from(require(vars, "MAIL_API_KEY")?);

        // Parse booking lead time with validation
        let booking_lead_time_hours =
            if let Some(value_str) = vars.get("BOOKING_LEAD_TIME_HOURS") {
                let value: i64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidLeadTime(format!(
                        "BOOKING_LEAD_TIME_HOURS must be a valid integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value < 0 {
                    return Err(ConfigError::InvalidLeadTime(format!(
                        "BOOKING_LEAD_TIME_HOURS must not be negative, got {}",
                        value
                    )));
                }

                if value > MAX_BOOKING_LEAD_TIME_HOURS {
                    return Err(ConfigError::InvalidLeadTime(format!(
                        "BOOKING_LEAD_TIME_HOURS must not exceed {}, got {}",
                        MAX_BOOKING_LEAD_TIME_HOURS, value
                    )));
                }

                value
            } else {
                DEFAULT_BOOKING_LEAD_TIME_HOURS
            };

        // Parse token grace with validation
        let token_grace_hours = if let Some(value_str) = vars.get("TOKEN_GRACE_HOURS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidTokenGrace(format!(
                    "TOKEN_GRACE_HOURS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value < 0 {
                return Err(ConfigError::InvalidTokenGrace(format!(
                    "TOKEN_GRACE_HOURS must not be negative, got {}",
                    value
                )));
            }

            value
        } else {
            DEFAULT_TOKEN_GRACE_HOURS
        };

        Ok(Config {
            database_url,
            bind_address,
            region,
            streaming_api_url,
            streaming_api_key,
            webhook_signing_secret,
            payments_api_url,
            payments_api_key,
            mail_api_url,
            mail_api_key,
            booking_lead_time_hours,
            token_grace_hours,
        })
    }
}

fn require(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}
