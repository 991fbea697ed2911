//! Configuration schema types
//!
//! This module defines the configuration structure for labwatch. One
//! [`LabwatchConfig`] value is built at startup and handed to every component
//! that needs it.

use crate::config::SecretString;
use crate::core::schedule::Schedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main labwatch configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabwatchConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// FHIR server and bulk export settings
    pub fhir: FhirConfig,

    /// Credential acquisition
    #[serde(default)]
    pub auth: AuthConfig,

    /// Report content settings
    #[serde(default)]
    pub report: ReportConfig,

    /// Report delivery settings
    #[serde(default)]
    pub notification: NotificationConfig,

    /// Run cadence for `labwatch schedule`
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LabwatchConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.fhir.validate()?;
        self.auth.validate()?;
        self.report.validate(&self.fhir)?;
        self.notification.validate()?;
        self.schedule.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dry run mode (print the report instead of sending it)
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

/// FHIR server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FhirConfig {
    /// Base URL of the FHIR R4 endpoint
    pub base_url: String,

    /// Group whose members are exported
    pub group_id: String,

    /// Resource types requested through `_type`
    #[serde(default = "default_resource_types")]
    pub resource_types: Vec<String>,

    /// Filters sent with the kickoff under `type_filter_parameter`
    #[serde(default = "default_type_filters")]
    pub type_filters: Vec<String>,

    /// Query parameter name carrying `type_filters`
    ///
    /// Defaults to `typeFilter`; servers following the Bulk Data IG expect `_typeFilter`.
    #[serde(default = "default_type_filter_parameter")]
    pub type_filter_parameter: String,

    /// Per-request timeout for token, kickoff and status requests
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Maximum silence on a download stream before the entry is abandoned
    #[serde(default = "default_stream_idle_timeout_seconds")]
    pub stream_idle_timeout_seconds: u64,

    /// Longest NDJSON line buffered before it is skipped as malformed
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,

    /// Capacity of the record channel between download readers and the consumer
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,

    /// TLS certificate verification enabled
    ///
    /// **SECURITY WARNING**: Disabling TLS verification exposes the application to
    /// man-in-the-middle attacks and should only be used against local test servers.
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    /// Status polling policy
    #[serde(default)]
    pub poll: PollConfig,
}

impl FhirConfig {
    fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("fhir.base_url cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!(
                "fhir.base_url must start with http:// or https://, got '{}'",
                self.base_url
            ));
        }

        url::Url::parse(&self.base_url)
            .map_err(|e| format!("fhir.base_url is not a valid URL: {e}"))?;

        if self.group_id.trim().is_empty() {
            return Err("fhir.group_id cannot be empty".to_string());
        }

        if self.type_filter_parameter.trim().is_empty() {
            return Err("fhir.type_filter_parameter cannot be empty".to_string());
        }

        if self.timeout_seconds == 0 {
            return Err("fhir.timeout_seconds must be > 0".to_string());
        }

        if self.stream_idle_timeout_seconds == 0 {
            return Err("fhir.stream_idle_timeout_seconds must be > 0".to_string());
        }

        if self.max_line_bytes == 0 {
            return Err("fhir.max_line_bytes must be > 0".to_string());
        }

        if self.stream_buffer == 0 {
            return Err("fhir.stream_buffer must be > 0".to_string());
        }

        self.poll.validate()
    }
}

impl Default for FhirConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/fhir".to_string(),
            group_id: String::new(),
            resource_types: default_resource_types(),
            type_filters: default_type_filters(),
            type_filter_parameter: default_type_filter_parameter(),
            timeout_seconds: default_timeout_seconds(),
            stream_idle_timeout_seconds: default_stream_idle_timeout_seconds(),
            max_line_bytes: default_max_line_bytes(),
            stream_buffer: default_stream_buffer(),
            tls_verify: true,
            poll: PollConfig::default(),
        }
    }
}

/// Export status polling policy
///
/// With the defaults the server is polled every `interval_seconds`; a
/// `backoff_multiplier` above 1.0 stretches the delay up to `max_interval_seconds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between status checks
    #[serde(default = "default_poll_interval_seconds")]
    pub interval_seconds: u64,

    /// Upper bound for the delay, including server `Retry-After` hints
    #[serde(default = "default_poll_max_interval_seconds")]
    pub max_interval_seconds: u64,

    /// Growth factor applied to the delay after each check
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Total number of status checks before the job is declared timed out
    #[serde(default = "default_poll_max_attempts")]
    pub max_attempts: u32,

    /// Consecutive transient failures tolerated before giving up
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

impl PollConfig {
    fn validate(&self) -> Result<(), String> {
        if self.interval_seconds == 0 {
            return Err("fhir.poll.interval_seconds must be > 0".to_string());
        }

        if self.max_interval_seconds < self.interval_seconds {
            return Err(format!(
                "fhir.poll.max_interval_seconds ({}) must be >= interval_seconds ({})",
                self.max_interval_seconds, self.interval_seconds
            ));
        }

        if !(1.0..=10.0).contains(&self.backoff_multiplier) {
            return Err(format!(
                "fhir.poll.backoff_multiplier must be between 1.0 and 10.0, got {}",
                self.backoff_multiplier
            ));
        }

        if self.max_attempts == 0 {
            return Err("fhir.poll.max_attempts must be > 0".to_string());
        }

        if self.max_consecutive_failures == 0 {
            return Err("fhir.poll.max_consecutive_failures must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_poll_interval_seconds(),
            max_interval_seconds: default_poll_max_interval_seconds(),
            backoff_multiplier: default_backoff_multiplier(),
            max_attempts: default_poll_max_attempts(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

/// How the bearer credential is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Use `auth.access_token` as is
    #[default]
    Static,
    /// SMART backend services: signed JWT assertion exchanged for a token
    ClientAssertion,
}

/// Credential configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub method: AuthMethod,

    /// Pre-issued bearer token (method = "static")
    #[serde(default)]
    pub access_token: Option<SecretString>,

    /// OAuth token endpoint (method = "client_assertion")
    #[serde(default)]
    pub token_endpoint: Option<String>,

    /// Registered client id (method = "client_assertion")
    #[serde(default)]
    pub client_id: Option<String>,

    /// PEM-encoded RSA private key used to sign the assertion
    #[serde(default)]
    pub private_key_path: Option<String>,
}

impl AuthConfig {
    fn validate(&self) -> Result<(), String> {
        use secrecy::ExposeSecret;

        match self.method {
            AuthMethod::Static => match &self.access_token {
                Some(token) if !token.expose_secret().is_empty() => Ok(()),
                _ => Err("auth.access_token is required when auth.method = 'static'".to_string()),
            },
            AuthMethod::ClientAssertion => {
                let endpoint = self.token_endpoint.as_deref().unwrap_or_default();
                if endpoint.is_empty() {
                    return Err(
                        "auth.token_endpoint is required when auth.method = 'client_assertion'"
                            .to_string(),
                    );
                }
                if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
                    return Err(format!(
                        "auth.token_endpoint must start with http:// or https://, got '{endpoint}'"
                    ));
                }
                if self.client_id.as_deref().unwrap_or_default().is_empty() {
                    return Err(
                        "auth.client_id is required when auth.method = 'client_assertion'"
                            .to_string(),
                    );
                }
                if self.private_key_path.as_deref().unwrap_or_default().is_empty() {
                    return Err(
                        "auth.private_key_path is required when auth.method = 'client_assertion'"
                            .to_string(),
                    );
                }
                Ok(())
            }
        }
    }
}

/// Report content configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Resource type indexed in the first pass
    #[serde(default = "default_subject_type")]
    pub subject_type: String,

    /// Resource type classified in the second pass
    #[serde(default = "default_measurement_type")]
    pub measurement_type: String,

    /// First line of the report, followed by the run date
    #[serde(default = "default_report_title")]
    pub title: String,

    /// Mail subject, followed by the run date
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl ReportConfig {
    fn validate(&self, fhir: &FhirConfig) -> Result<(), String> {
        if self.subject_type.trim().is_empty() || self.measurement_type.trim().is_empty() {
            return Err("report.subject_type and report.measurement_type cannot be empty".to_string());
        }

        if self.subject_type == self.measurement_type {
            return Err(format!(
                "report.subject_type and report.measurement_type must differ, both are '{}'",
                self.subject_type
            ));
        }

        // An empty _type list exports everything, so only check explicit lists
        if !fhir.resource_types.is_empty() {
            for required in [&self.subject_type, &self.measurement_type] {
                if !fhir.resource_types.contains(required) {
                    return Err(format!(
                        "fhir.resource_types must include '{required}' (got {:?})",
                        fhir.resource_types
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            subject_type: default_subject_type(),
            measurement_type: default_measurement_type(),
            title: default_report_title(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

/// SMTP delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Send the report by mail; when false the report is only logged
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub smtp_host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: Option<String>,

    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub smtp_password: Option<SecretString>,

    /// Sender mailbox, e.g. `"Lab Reports <reports@example.org>"`
    #[serde(default)]
    pub from: Option<String>,

    /// Recipient mailboxes
    #[serde(default)]
    pub to: Vec<String>,
}

impl NotificationConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }

        if self.smtp_host.as_deref().unwrap_or_default().is_empty() {
            return Err("notification.smtp_host is required when notification is enabled".to_string());
        }

        if self.from.as_deref().unwrap_or_default().is_empty() {
            return Err("notification.from is required when notification is enabled".to_string());
        }

        if self.to.is_empty() {
            return Err("notification.to must list at least one recipient".to_string());
        }

        if self.smtp_username.is_some() != self.smtp_password.is_some() {
            return Err(
                "notification.smtp_username and notification.smtp_password must be set together"
                    .to_string(),
            );
        }

        Ok(())
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from: None,
            to: Vec::new(),
        }
    }
}

/// Scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Daily cron expression (`minute hour * * *`, UTC)
    #[serde(default = "default_cron")]
    pub cron: String,
}

impl ScheduleConfig {
    fn validate(&self) -> Result<(), String> {
        Schedule::from_str(&self.cron)
            .map(|_| ())
            .map_err(|e| format!("Invalid schedule.cron '{}': {e}", self.cron))
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path cannot be empty when local logging is enabled".to_string());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_resource_types() -> Vec<String> {
    vec!["Patient".to_string(), "Observation".to_string()]
}

fn default_type_filters() -> Vec<String> {
    vec!["Observation?category=laboratory".to_string()]
}

fn default_type_filter_parameter() -> String {
    "typeFilter".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_stream_idle_timeout_seconds() -> u64 {
    300
}

fn default_max_line_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_stream_buffer() -> usize {
    1024
}

fn default_poll_interval_seconds() -> u64 {
    30
}

fn default_poll_max_interval_seconds() -> u64 {
    300
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_poll_max_attempts() -> u32 {
    720
}

fn default_max_consecutive_failures() -> u32 {
    10
}

fn default_subject_type() -> String {
    "Patient".to_string()
}

fn default_measurement_type() -> String {
    "Observation".to_string()
}

fn default_report_title() -> String {
    "Results of Lab Tests".to_string()
}

fn default_subject_prefix() -> String {
    "Lab Reports".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_cron() -> String {
    "0 0 * * *".to_string()
}

fn default_local_path() -> String {
    "/var/log/labwatch".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}
