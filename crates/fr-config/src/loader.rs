//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "formrelay.toml",
    "./config/config.toml",
    "/etc/formrelay/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        // Start with defaults
        let mut config = AppConfig::default();

        // Try to load from file
        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        // Apply environment variable overrides
        self.apply_env_overrides(&mut config);

        config.validate()?;
        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        // Check explicit path first
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        // Check FORMRELAY_CONFIG env var
        if let Ok(path) = env::var("FORMRELAY_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // Search standard paths
        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut AppConfig) {
        // HTTP
        if let Ok(val) = env::var("FORMRELAY_HTTP_HOST") {
            config.http.host = val;
        }
        if let Ok(val) = env::var("FORMRELAY_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                config.http.port = port;
            }
        }
        if let Ok(val) = env::var("FORMRELAY_TRUST_FORWARDED_FOR") {
            config.http.trust_forwarded_for = val.parse().unwrap_or(false);
        }

        // SMTP
        if let Ok(val) = env::var("FORMRELAY_SMTP_HOST") {
            config.smtp.host = Some(val);
        }
        if let Ok(val) = env::var("FORMRELAY_SMTP_PORT") {
            if let Ok(port) = val.parse() {
                config.smtp.port = port;
            }
        }
        if let Ok(val) = env::var("FORMRELAY_SMTP_USER") {
            config.smtp.username = Some(val);
        }
        if let Ok(val) = env::var("FORMRELAY_SMTP_PASS") {
            config.smtp.password = Some(val);
        }
        if let Ok(val) = env::var("FORMRELAY_SMTP_USE_TLS") {
            config.smtp.use_tls = val.parse().unwrap_or(true);
        }
        if let Ok(val) = env::var("FORMRELAY_MAIL_FROM") {
            config.smtp.mail_from = Some(val);
        }
        if let Ok(val) = env::var("FORMRELAY_ALLOW_FROM_OVERRIDE") {
            config.smtp.allow_from_override = val.parse().unwrap_or(false);
        }

        // Composer
        if let Ok(val) = env::var("FORMRELAY_COMPOSER_ENDPOINT") {
            config.composer.endpoint = Some(val);
        }
        if let Ok(val) = env::var("FORMRELAY_COMPOSER_API_KEY") {
            config.composer.api_key = Some(val);
        }
        if let Ok(val) = env::var("FORMRELAY_COMPOSER_MODEL") {
            config.composer.model = val;
        }
        if let Ok(val) = env::var("FORMRELAY_COMPOSER_TIMEOUT_SECONDS") {
            if let Ok(timeout) = val.parse() {
                config.composer.timeout_seconds = timeout;
            }
        }

        // Rate limiting
        if let Ok(val) = env::var("FORMRELAY_RATE_LIMIT_MAX_REQUESTS") {
            if let Ok(max) = val.parse() {
                config.rate_limit.max_requests = max;
            }
        }
        if let Ok(val) = env::var("FORMRELAY_RATE_LIMIT_WINDOW_SECONDS") {
            if let Ok(window) = val.parse() {
                config.rate_limit.window_seconds = window;
            }
        }

        // Limits
        if let Ok(val) = env::var("FORMRELAY_MAX_BODY_BYTES") {
            if let Ok(bytes) = val.parse() {
                config.limits.max_body_bytes = bytes;
            }
        }

        // Delivery
        if let Ok(val) = env::var("FORMRELAY_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                config.delivery.max_retries = retries;
            }
        }
        if let Ok(val) = env::var("FORMRELAY_BASE_BACKOFF_SECONDS") {
            if let Ok(backoff) = val.parse() {
                config.delivery.base_backoff_seconds = backoff;
            }
        }
        if let Ok(val) = env::var("FORMRELAY_NOTIFY_RECIPIENTS") {
            config.delivery.notify_recipients = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Store
        if let Ok(val) = env::var("FORMRELAY_DB_PATH") {
            config.store.database_path = val;
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
