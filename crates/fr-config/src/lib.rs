//! FormRelay Configuration System
//!
//! This crate provides TOML-based configuration with environment variable override support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub smtp: SmtpConfig,
    pub composer: ComposerConfig,
    pub rate_limit: RateLimitConfig,
    pub limits: LimitsConfig,
    pub delivery: DeliveryConfig,
    pub store: StoreConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            smtp: SmtpConfig::default(),
            composer: ComposerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            limits: LimitsConfig::default(),
            delivery: DeliveryConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.max_requests must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.window_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.window_seconds must be at least 1".to_string(),
            ));
        }
        if self.delivery.base_backoff_seconds <= 0.0 {
            return Err(ConfigError::ValidationError(
                "delivery.base_backoff_seconds must be positive".to_string(),
            ));
        }
        if self.smtp.host.is_some() && self.smtp.mail_from.is_none() {
            return Err(ConfigError::ValidationError(
                "smtp.mail_from is required when smtp.host is set".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Trust the first X-Forwarded-For entry as the client identity.
    /// Only enable behind a proxy that strips client-supplied values.
    pub trust_forwarded_for: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            trust_forwarded_for: false,
        }
    }
}

/// SMTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// SMTP endpoint. When absent, email dispatch degrades to a visible
    /// console emission (development fallback).
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    /// Fixed sender address. Required for real SMTP delivery.
    pub mail_from: Option<String>,
    /// Permit a job's from_override to replace mail_from as display sender.
    pub allow_from_override: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: None,
            password: None,
            use_tls: true,
            mail_from: None,
            allow_from_override: false,
        }
    }
}

/// Generative composer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Chat-completions endpoint. When absent, compose always uses the
    /// deterministic fallback.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 5,
        }
    }
}

/// Sliding-window rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_seconds: 60,
        }
    }
}

/// Request payload ceilings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_body_bytes: usize,
    pub max_name_len: usize,
    pub max_email_len: usize,
    pub max_message_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 64 * 1024,
            max_name_len: 200,
            max_email_len: 320,
            max_message_len: 4000,
        }
    }
}

/// Delivery queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub max_retries: u32,
    pub base_backoff_seconds: f64,
    /// Notification targets for each submission: email addresses and/or
    /// webhook URLs.
    pub notify_recipients: Vec<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_backoff_seconds: 1.0,
            notify_recipients: Vec::new(),
        }
    }
}

/// SQLite storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "contacts.db".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.window_seconds, 60);
        assert_eq!(config.delivery.max_retries, 5);
        assert_eq!(config.limits.max_body_bytes, 64 * 1024);
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            [http]
            port = 8080

            [delivery]
            max_retries = 3
            notify_recipients = ["ops@example.com", "https://hooks.example.com/contact"]
            "#,
        )
        .unwrap();

        assert_eq!(config.http.port, 8080);
        assert_eq!(config.delivery.max_retries, 3);
        assert_eq!(config.delivery.notify_recipients.len(), 2);
        // Untouched sections keep defaults
        assert_eq!(config.smtp.port, 587);
    }

    #[test]
    fn test_smtp_host_requires_mail_from() {
        let result = AppConfig::from_toml(
            r#"
            [smtp]
            host = "smtp.example.com"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let result = AppConfig::from_toml(
            r#"
            [rate_limit]
            max_requests = 0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
