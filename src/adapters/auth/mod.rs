//! Credential acquisition
//!
//! The export workflow only needs an opaque bearer credential. Two providers are
//! available behind the [`TokenProvider`] trait:
//!
//! - [`StaticTokenProvider`] hands out a pre-issued token from configuration
//! - [`ClientAssertionTokenProvider`] exchanges a signed JWT client assertion for
//!   a token (SMART backend services)

pub mod assertion;
pub mod static_token;

pub use assertion::ClientAssertionTokenProvider;
pub use static_token::StaticTokenProvider;

use crate::config::{secret_string, AuthConfig, AuthMethod, SecretString};
use crate::domain::Result;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Bearer credential used for kickoff, polling and downloads
#[derive(Clone)]
pub struct AccessToken {
    value: SecretString,
    expires_in: Option<u64>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: secret_string(value.into()),
            expires_in: None,
        }
    }

    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    /// Lifetime in seconds as reported by the token endpoint
    pub fn expires_in(&self) -> Option<u64> {
        self.expires_in
    }

    /// `Authorization` header value
    pub fn bearer(&self) -> String {
        let token: &str = self.value.expose_secret().as_ref();
        format!("Bearer {token}")
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Source of bearer credentials
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a credential valid for the whole run
    async fn access_token(&self) -> Result<AccessToken>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Builds the provider selected by `auth.method`
///
/// # Errors
///
/// Returns a configuration error if required settings are missing or the
/// private key cannot be read.
pub fn provider_from_config(
    config: &AuthConfig,
    http: reqwest::Client,
    request_timeout: Duration,
) -> Result<Arc<dyn TokenProvider>> {
    match config.method {
        AuthMethod::Static => Ok(Arc::new(StaticTokenProvider::from_config(config)?)),
        AuthMethod::ClientAssertion => Ok(Arc::new(ClientAssertionTokenProvider::from_config(
            config,
            http,
            request_timeout,
        )?)),
    }
}
