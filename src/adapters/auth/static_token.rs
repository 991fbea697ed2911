//! Pre-issued bearer token

use super::{AccessToken, TokenProvider};
use crate::config::{AuthConfig, SecretString};
use crate::domain::{ReportError, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;

/// Returns the token configured in `auth.access_token`
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        config
            .access_token
            .clone()
            .filter(|token| !token.expose_secret().is_empty())
            .map(Self::new)
            .ok_or_else(|| {
                ReportError::Configuration(
                    "auth.access_token is required for static authentication".to_string(),
                )
            })
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<AccessToken> {
        let token: &str = self.token.expose_secret().as_ref();
        Ok(AccessToken::new(token))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    #[tokio::test]
    async fn test_static_token() {
        let provider = StaticTokenProvider::new(secret_string("abc".to_string()));
        let token = provider.access_token().await.unwrap();
        assert_eq!(token.bearer(), "Bearer abc");
    }

    #[test]
    fn test_from_config_rejects_blank_token() {
        let config = AuthConfig {
            access_token: Some(secret_string("  ".to_string())),
            ..Default::default()
        };
        assert!(matches!(
            StaticTokenProvider::from_config(&config),
            Err(ReportError::Configuration(_))
        ));
    }
}
