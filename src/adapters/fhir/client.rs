//! Shared HTTP plumbing for the FHIR server

use super::stream::LineLimits;
use crate::adapters::auth::AccessToken;
use crate::config::FhirConfig;
use crate::domain::{ReportError, Result};
use reqwest::{Client, ClientBuilder, RequestBuilder};
use std::time::Duration;

pub const FHIR_JSON: &str = "application/fhir+json";

/// HTTP client bound to one FHIR base URL
///
/// No client-wide timeout is set: download streams may legitimately run for a
/// long time, so bounded requests set their own timeout and streams rely on the
/// idle timeout.
#[derive(Debug, Clone)]
pub struct FhirClient {
    base_url: String,
    http: Client,
    request_timeout: Duration,
    idle_timeout: Duration,
    max_line_bytes: usize,
}

impl FhirClient {
    /// Builds the client from configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built
    pub fn new(config: &FhirConfig) -> Result<Self> {
        Ok(Self::with_client(build_http_client(config)?, config))
    }

    /// Wraps an existing `reqwest::Client`
    pub fn with_client(http: Client, config: &FhirConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            request_timeout: Duration::from_secs(config.timeout_seconds),
            idle_timeout: Duration::from_secs(config.stream_idle_timeout_seconds),
            max_line_bytes: config.max_line_bytes,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Read bounds for NDJSON downloads
    pub fn line_limits(&self) -> LineLimits {
        LineLimits {
            idle_timeout: self.idle_timeout,
            max_line_bytes: self.max_line_bytes,
        }
    }

    /// GET with bearer auth and the per-request timeout
    pub fn get(&self, url: &str, token: &AccessToken) -> RequestBuilder {
        self.http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, token.bearer())
            .timeout(self.request_timeout)
    }

    /// GET with bearer auth and no total timeout, for NDJSON downloads
    pub fn stream_get(&self, url: &str, token: &AccessToken) -> RequestBuilder {
        self.http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, token.bearer())
    }
}

/// Builds the shared `reqwest::Client` (connect timeout and TLS settings)
pub fn build_http_client(config: &FhirConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new()
        .connect_timeout(Duration::from_secs(30))
        .user_agent(concat!("labwatch/", env!("CARGO_PKG_VERSION")));

    if !config.tls_verify {
        tracing::warn!("TLS certificate verification is disabled for the FHIR client");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| ReportError::Configuration(format!("Failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = FhirConfig {
            base_url: "https://fhir.example.com/R4/".to_string(),
            group_id: "g".to_string(),
            ..Default::default()
        };
        let client = FhirClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "https://fhir.example.com/R4");
        assert_eq!(client.request_timeout(), Duration::from_secs(60));
        assert_eq!(client.idle_timeout(), Duration::from_secs(300));
        assert_eq!(client.line_limits().max_line_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn test_request_carries_bearer() {
        let client = FhirClient::new(&FhirConfig::default()).unwrap();
        let request = client
            .get("http://localhost/status", &AccessToken::new("tok"))
            .build()
            .unwrap();
        assert_eq!(
            request.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer tok"
        );
        assert_eq!(request.timeout(), Some(&Duration::from_secs(60)));
    }
}
