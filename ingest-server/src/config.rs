//! Configuration module for environment variable parsing.
//!
//! The configuration is read once at startup and shared immutably
//! (behind an `Arc`) by every component that needs it.

use std::env;
use tracing::warn;

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Service name reported by the root endpoint
    pub app_name: String,

    /// Deployment environment name (dev, staging, prod, ...)
    pub env: String,

    /// SQLite connection URL for the message store
    pub database_url: String,

    /// Shared secret for HMAC-SHA256 webhook signatures
    pub webhook_secret: String,

    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,

    /// Port for the web server to listen on
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            app_name: env::var("APP_NAME").unwrap_or_else(|_| "ingest-server".to_string()),

            env: env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string()),

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://app.db".to_string()),

            webhook_secret: env::var("WEBHOOK_SECRET").unwrap_or_default(),

            log_level: parse_log_level("LOG_LEVEL", "info"),

            port: parse_port("PORT", 8000),
        }
    }

    /// Whether a webhook secret is configured. Any non-empty value counts,
    /// matching what signature verification accepts.
    pub fn has_webhook_secret(&self) -> bool {
        !self.webhook_secret.is_empty()
    }
}

// The secret must never end up in logs, so Debug is written by hand.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("app_name", &self.app_name)
            .field("env", &self.env)
            .field("database_url", &self.database_url)
            .field("webhook_secret", &"<redacted>")
            .field("log_level", &self.log_level)
            .field("port", &self.port)
            .finish()
    }
}

/// Parse a log level, accepting the usual names in any case.
fn parse_log_level(name: &str, default: &str) -> String {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default.to_string(),
    };

    let level = raw.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => level,
        // Python-style names
        "warning" => "warn".to_string(),
        "critical" => "error".to_string(),
        _ => {
            warn!(env_var = name, value = %raw, "Invalid log level, using default");
            default.to_string()
        }
    }
}

/// Parse a TCP port, falling back to the default on bad input.
fn parse_port(name: &str, default: u16) -> u16 {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(env_var = name, value = %raw, "Invalid port, using default");
            default
        }),
        Err(_) => default,
    }
}
