//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `IDENTITY_SERVICE_URL` - Base URL of the identity service
//!
//! ## Optional
//! - `STOREFRONT_REDIS_URL` - Redis connection string (default: `redis://127.0.0.1:6379`)
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_REQUEST_TIMEOUT_SECS` - Per-request deadline (default: 10)
//! - `STOREFRONT_BACKUP_WORKERS` - Cart backup workers (default: 4)
//! - `STOREFRONT_BACKUP_QUEUE_CAPACITY` - Pending backups per worker (default: 1024)
//! - `STOREFRONT_BACKUP_DRAIN_SECS` - Shutdown grace period for backups (default: 10)
//! - `IDENTITY_SERVICE_TIMEOUT_SECS` - Identity call timeout (default: 5)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error event sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Redis connection URL (may contain password)
    pub redis_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Deadline applied to every inbound request
    pub request_timeout: Duration,
    /// Identity service client configuration
    pub identity: IdentityConfig,
    /// Cart backup queue configuration
    pub backup: BackupConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production", "staging")
    pub sentry_environment: Option<String>,
    /// Fraction of error events sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions sent to Sentry
    pub sentry_traces_sample_rate: f32,
}

/// Identity service client configuration.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Base URL, e.g. `http://identity.internal:8080`
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Cart write-behind backup configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupConfig {
    /// Number of worker tasks (at least 1)
    pub workers: usize,
    /// Bounded queue length per worker (at least 1)
    pub queue_capacity: usize,
    /// How long shutdown waits for queued backups
    pub drain_timeout: Duration,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or any value
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let redis_url =
            SecretString::from(get_env_or_default("STOREFRONT_REDIS_URL", DEFAULT_REDIS_URL));
        let host = parse_env_or("STOREFRONT_HOST", IpAddr::V4(Ipv4Addr::LOCALHOST))?;
        let port = parse_env_or("STOREFRONT_PORT", 3000u16)?;
        let request_timeout =
            Duration::from_secs(parse_env_or("STOREFRONT_REQUEST_TIMEOUT_SECS", 10u64)?);

        let identity = IdentityConfig::from_env()?;
        let backup = BackupConfig::from_env()?;

        Ok(Self {
            database_url,
            redis_url,
            host,
            port,
            request_timeout,
            identity,
            backup,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env_or("SENTRY_SAMPLE_RATE", 1.0)?,
            sentry_traces_sample_rate: parse_env_or("SENTRY_TRACES_SAMPLE_RATE", 0.0)?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl IdentityConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: get_required_env("IDENTITY_SERVICE_URL")?,
            timeout_secs: parse_env_or("IDENTITY_SERVICE_TIMEOUT_SECS", 5)?,
        })
    }
}

impl BackupConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let workers = parse_env_or("STOREFRONT_BACKUP_WORKERS", defaults.workers)?;
        let queue_capacity = parse_env_or(
            "STOREFRONT_BACKUP_QUEUE_CAPACITY",
            defaults.queue_capacity,
        )?;
        let drain_secs = parse_env_or(
            "STOREFRONT_BACKUP_DRAIN_SECS",
            defaults.drain_timeout.as_secs(),
        )?;

        let config = Self {
            workers,
            queue_capacity,
            drain_timeout: Duration::from_secs(drain_secs),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "STOREFRONT_BACKUP_WORKERS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "STOREFRONT_BACKUP_QUEUE_CAPACITY".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional_env(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
