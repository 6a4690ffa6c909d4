//! CLI subcommands.

pub mod migrate;
pub mod seed;

use secrecy::SecretString;
use thiserror::Error;

use tillpoint_storefront::db::RepositoryError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed to apply.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A repository write failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The input file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input file is not valid YAML for the expected shape.
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The input parsed but failed validation.
    #[error("{0}")]
    Invalid(String),
}

/// Storefront database URL, falling back to the generic `DATABASE_URL`.
fn database_url() -> Result<SecretString, CliError> {
    // Load .env file if present (ignore errors if not found)
    dotenvy::dotenv().ok();

    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CliError::MissingEnvVar("STOREFRONT_DATABASE_URL"))
}
