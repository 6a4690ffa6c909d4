//! Identity service client for bearer-token validation.
//!
//! The identity service owns users and tokens. The storefront only asks it
//! whether a token is valid and who it belongs to.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use tillpoint_core::{Role, UserId};

use crate::config::IdentityConfig;
use crate::models::CurrentUser;

/// Token validation endpoint, relative to the configured base URL.
const VALIDATE_PATH: &str = "/v1/tokens/validate";

/// Errors that can occur when validating a token.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The identity service rejected the token.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// HTTP request failed (connection refused, timeout, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The identity service answered with an unexpected status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The identity service answered with a payload we cannot use.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Resolves bearer tokens to identities.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Validate `token` and return the identity it belongs to.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidToken` for a rejected token; any other
    /// variant means the verifier could not be consulted.
    async fn validate_token(&self, token: &str) -> Result<CurrentUser, IdentityError>;
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ValidateResponse {
    fn into_user(self) -> Result<CurrentUser, IdentityError> {
        if !self.valid {
            return Err(IdentityError::InvalidToken(
                self.message.unwrap_or_else(|| "token rejected".to_owned()),
            ));
        }

        let user_id: UserId = self
            .user_id
            .as_deref()
            .ok_or_else(|| IdentityError::Malformed("missing user_id".to_owned()))?
            .parse()
            .map_err(|e| IdentityError::Malformed(format!("invalid user_id: {e}")))?;
        let role: Role = self
            .role
            .as_deref()
            .ok_or_else(|| IdentityError::Malformed("missing role".to_owned()))?
            .parse()
            .map_err(|e| IdentityError::Malformed(format!("invalid role: {e}")))?;

        Ok(CurrentUser {
            user_id,
            username: self.username.unwrap_or_default(),
            role,
        })
    }
}

/// Identity verifier reached over HTTP.
#[derive(Clone)]
pub struct HttpIdentityVerifier {
    client: reqwest::Client,
    validate_url: String,
}

impl HttpIdentityVerifier {
    /// Create a new identity client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            validate_url: format!("{}{VALIDATE_PATH}", config.base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    #[instrument(skip_all)]
    async fn validate_token(&self, token: &str) -> Result<CurrentUser, IdentityError> {
        let response = self
            .client
            .post(&self.validate_url)
            .json(&ValidateRequest { token })
            .send()
            .await?;
        let status = response.status();

        // 401 carries the same body shape as a successful check with valid=false.
        if !status.is_success() && status != reqwest::StatusCode::UNAUTHORIZED {
            let message = response.text().await.unwrap_or_default();
            return Err(IdentityError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ValidateResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::Malformed(e.to_string()))?;

        body.into_user()
    }
}
