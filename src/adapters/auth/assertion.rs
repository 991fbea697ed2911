//! SMART backend services token exchange
//!
//! A short-lived RS384 JWT signed with the client's private key is posted to the
//! token endpoint as a `client_credentials` grant.

use super::{AccessToken, TokenProvider};
use crate::config::AuthConfig;
use crate::domain::{ReportError, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Assertion lifetime in seconds
const ASSERTION_TTL_SECONDS: i64 = 4 * 60;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub jti: String,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Exchanges a signed client assertion for an access token
pub struct ClientAssertionTokenProvider {
    http: Client,
    token_endpoint: String,
    client_id: String,
    key: EncodingKey,
    request_timeout: Duration,
}

impl ClientAssertionTokenProvider {
    /// Creates a provider from a PEM-encoded RSA private key
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key is not a valid RSA PEM key
    pub fn new(
        http: Client,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        private_key_pem: &[u8],
        request_timeout: Duration,
    ) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| ReportError::Configuration(format!("Invalid RSA private key: {e}")))?;

        Ok(Self {
            http,
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            key,
            request_timeout,
        })
    }

    pub fn from_config(config: &AuthConfig, http: Client, request_timeout: Duration) -> Result<Self> {
        let missing = |field: &str| {
            ReportError::Configuration(format!(
                "auth.{field} is required for client_assertion authentication"
            ))
        };

        let token_endpoint = config
            .token_endpoint
            .as_deref()
            .ok_or_else(|| missing("token_endpoint"))?;
        let client_id = config.client_id.as_deref().ok_or_else(|| missing("client_id"))?;
        let key_path = config
            .private_key_path
            .as_deref()
            .ok_or_else(|| missing("private_key_path"))?;

        let pem = std::fs::read(key_path).map_err(|e| {
            ReportError::Configuration(format!("Failed to read private key {key_path}: {e}"))
        })?;

        Self::new(http, token_endpoint, client_id, &pem, request_timeout)
    }

    pub(crate) fn claims(&self) -> AssertionClaims {
        AssertionClaims {
            iss: self.client_id.clone(),
            sub: self.client_id.clone(),
            aud: self.token_endpoint.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            exp: chrono::Utc::now().timestamp() + ASSERTION_TTL_SECONDS,
        }
    }

    pub(crate) fn sign_assertion(&self) -> Result<String> {
        jsonwebtoken::encode(&Header::new(Algorithm::RS384), &self.claims(), &self.key)
            .map_err(|e| ReportError::Authentication(format!("Failed to sign client assertion: {e}")))
    }
}

#[async_trait]
impl TokenProvider for ClientAssertionTokenProvider {
    async fn access_token(&self) -> Result<AccessToken> {
        let assertion = self.sign_assertion()?;

        tracing::debug!(
            token_endpoint = %self.token_endpoint,
            client_id = %self.client_id,
            "Requesting access token"
        );

        let response = self
            .http
            .post(&self.token_endpoint)
            .timeout(self.request_timeout)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ReportError::Authentication(format!("Token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Authentication(format!(
                "Token endpoint returned status {status}: {body}"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            ReportError::Authentication(format!("Invalid token endpoint response: {e}"))
        })?;

        tracing::info!(expires_in = ?token.expires_in, "Access token acquired");

        let access_token = AccessToken::new(token.access_token);
        Ok(match token.expires_in {
            Some(seconds) => access_token.with_expires_in(seconds),
            None => access_token,
        })
    }

    fn name(&self) -> &'static str {
        "client_assertion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};

    const PRIVATE_KEY: &[u8] = include_bytes!("../../../tests/fixtures/client_assertion_key.pem");
    const PUBLIC_KEY: &[u8] = include_bytes!("../../../tests/fixtures/client_assertion_key.pub.pem");

    fn provider(endpoint: &str) -> ClientAssertionTokenProvider {
        ClientAssertionTokenProvider::new(
            Client::new(),
            endpoint,
            "client-123",
            PRIVATE_KEY,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_key_rejected() {
        let result = ClientAssertionTokenProvider::new(
            Client::new(),
            "https://auth.example.com/token",
            "client",
            b"not a key",
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(ReportError::Configuration(_))));
    }

    #[test]
    fn test_assertion_claims() {
        let provider = provider("https://auth.example.com/token");
        let jwt = provider.sign_assertion().unwrap();

        let mut validation = Validation::new(Algorithm::RS384);
        validation.set_audience(&["https://auth.example.com/token"]);
        let decoded = jsonwebtoken::decode::<AssertionClaims>(
            &jwt,
            &DecodingKey::from_rsa_pem(PUBLIC_KEY).unwrap(),
            &validation,
        )
        .unwrap();

        assert_eq!(decoded.header.alg, Algorithm::RS384);
        assert_eq!(decoded.claims.iss, "client-123");
        assert_eq!(decoded.claims.sub, "client-123");
        assert!(uuid::Uuid::parse_str(&decoded.claims.jti).is_ok());

        let ttl = decoded.claims.exp - chrono::Utc::now().timestamp();
        assert!(ttl > 200 && ttl <= ASSERTION_TTL_SECONDS);
    }

    #[test]
    fn test_assertion_jti_unique() {
        let provider = provider("https://auth.example.com/token");
        assert_ne!(provider.claims().jti, provider.claims().jti);
    }

    #[tokio::test]
    async fn test_token_exchange() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded(
                    "grant_type".to_string(),
                    "client_credentials".to_string(),
                ),
                mockito::Matcher::UrlEncoded(
                    "client_assertion_type".to_string(),
                    CLIENT_ASSERTION_TYPE.to_string(),
                ),
                mockito::Matcher::Regex("client_assertion=".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"issued-token","token_type":"bearer","expires_in":3600}"#)
            .create_async()
            .await;

        let provider = provider(&format!("{}/oauth2/token", server.url()));
        let token = provider.access_token().await.unwrap();

        assert_eq!(token.bearer(), "Bearer issued-token");
        assert_eq!(token.expires_in(), Some(3600));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_token_exchange_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_client"}"#)
            .create_async()
            .await;

        let provider = provider(&format!("{}/oauth2/token", server.url()));
        let err = provider.access_token().await.unwrap_err();

        assert!(matches!(err, ReportError::Authentication(ref msg) if msg.contains("401")));
    }
}
