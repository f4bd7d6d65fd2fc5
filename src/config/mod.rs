//! Configuration management for the progression server
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::magic_link::MAX_TTL_HOURS;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }
}

impl Environment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Magic link issuance defaults
#[derive(Debug, Clone)]
pub struct MagicLinkConfig {
    /// Base URL of the client portal, used to build `/suivi?t=...` links
    pub public_base_url: String,

    /// Link lifetime in hours (default: 48)
    pub ttl_hours: i64,

    /// Maximum number of successful validations per link (default: 20)
    pub max_uses: i32,

    /// Random bytes per token before encoding (default: 32)
    pub token_bytes: usize,

    /// How long revoked links are kept before the cleanup job removes them
    pub revoked_retention_days: i64,
}

impl Default for MagicLinkConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:3001".to_string(),
            ttl_hours: 48,
            max_uses: 20,
            token_bytes: 32,
            revoked_retention_days: 7,
        }
    }
}

/// Twilio credentials for SMS delivery
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; the in-memory store is used when absent outside production
    pub database_url: Option<String>,

    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Status endpoint limit: requests per window per IP
    pub status_rate_limit_max: u32,

    /// Status endpoint window length in seconds
    pub status_rate_limit_window_seconds: u64,

    /// Operator API key expected in `x-api-key`
    pub admin_api_key: Option<String>,

    /// Bearer secret expected by the cleanup endpoint
    pub cron_secret: Option<String>,

    /// Cron expression for the in-process cleanup job
    pub cleanup_cron: Option<String>,

    /// Shared secret for payment webhook signatures
    pub vopay_shared_secret: Option<String>,

    /// SMS provider credentials
    pub twilio: Option<TwilioConfig>,

    /// Magic link defaults
    pub magic_link: MagicLinkConfig,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,
}

impl Default for Config {
    /// Development defaults: in-memory store, no credentials, no SMS provider
    fn default() -> Self {
        Self {
            database_url: None,
            environment: Environment::Development,
            port: 3001,
            db_max_connections: 5,
            status_rate_limit_max: 20,
            status_rate_limit_window_seconds: 60,
            admin_api_key: None,
            cron_secret: None,
            cleanup_cron: None,
            vopay_shared_secret: None,
            twilio: None,
            magic_link: MagicLinkConfig::default(),
            cors_allowed_origins: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .map(|s| s.parse::<Environment>())
            .unwrap_or(Ok(Environment::Development))?;

        let database_url = non_empty_var("DATABASE_URL");
        if database_url.is_none() && environment.is_production() {
            return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
        }

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", 5u32);
        let status_rate_limit_max = parse_or("STATUS_RATE_LIMIT_MAX", 20u32);
        let status_rate_limit_window_seconds = parse_or("STATUS_RATE_LIMIT_WINDOW_SECONDS", 60u64);

        let twilio = match (
            non_empty_var("TWILIO_ACCOUNT_SID"),
            non_empty_var("TWILIO_AUTH_TOKEN"),
            non_empty_var("TWILIO_FROM_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number,
            }),
            _ => None,
        };

        let defaults = MagicLinkConfig::default();
        let magic_link = MagicLinkConfig {
            public_base_url: non_empty_var("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            ttl_hours: parse_or("MAGIC_LINK_TTL_HOURS", defaults.ttl_hours),
            max_uses: parse_or("MAGIC_LINK_MAX_USES", defaults.max_uses),
            token_bytes: parse_or("MAGIC_LINK_TOKEN_BYTES", defaults.token_bytes),
            revoked_retention_days: parse_or(
                "REVOKED_RETENTION_DAYS",
                defaults.revoked_retention_days,
            ),
        };

        let config = Config {
            database_url,
            environment,
            port,
            db_max_connections,
            status_rate_limit_max,
            status_rate_limit_window_seconds,
            admin_api_key: non_empty_var("ADMIN_API_KEY"),
            cron_secret: non_empty_var("CRON_SECRET"),
            cleanup_cron: non_empty_var("CLEANUP_CRON"),
            vopay_shared_secret: non_empty_var("VOPAY_SHARED_SECRET"),
            twilio,
            magic_link,
            cors_allowed_origins: non_empty_var("CORS_ALLOWED_ORIGINS"),
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would disable a limit or overflow date arithmetic
    pub fn validate(&self) -> Result<(), ConfigError> {
        let magic_link = &self.magic_link;
        if !(1..=MAX_TTL_HOURS).contains(&magic_link.ttl_hours) {
            return Err(ConfigError::InvalidValue(format!(
                "MAGIC_LINK_TTL_HOURS must be between 1 and {}",
                MAX_TTL_HOURS
            )));
        }
        if magic_link.max_uses < 1 || magic_link.token_bytes < 16 {
            return Err(ConfigError::InvalidValue(
                "MAGIC_LINK_MAX_USES must be >= 1, MAGIC_LINK_TOKEN_BYTES >= 16".to_string(),
            ));
        }
        if self.status_rate_limit_max < 1 {
            return Err(ConfigError::InvalidValue(
                "STATUS_RATE_LIMIT_MAX must be >= 1".to_string(),
            ));
        }
        if self.status_rate_limit_window_seconds < 1 {
            return Err(ConfigError::InvalidValue(
                "STATUS_RATE_LIMIT_WINDOW_SECONDS must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get database URL with the password masked, for logging
    pub fn database_url_masked(&self) -> Option<String> {
        self.database_url.as_deref().map(mask_database_url)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

fn mask_database_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // "postgresql://" has a colon too; only mask when it belongs to user:password
            if !url[colon_pos..].starts_with("://") {
                let prefix = &url[..colon_pos + 1];
                let suffix = &url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
    }
    url.to_string()
}
