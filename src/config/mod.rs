//! Configuration management for labwatch.
//!
//! # Overview
//!
//! labwatch uses a TOML configuration file with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `LABWATCH_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Validation on load
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use labwatch::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("labwatch.toml")?;
//!
//! println!("FHIR server: {}", config.fhir.base_url);
//! println!("Group: {}", config.fhir.group_id);
//! println!("Poll interval: {}s", config.fhir.poll.interval_seconds);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level and dry-run mode
//! - [`FhirConfig`] / [`PollConfig`] - Bulk export endpoint, timeouts and polling policy
//! - [`AuthConfig`] - Static bearer token or signed client assertion
//! - [`ReportConfig`] - Correlated resource types and report wording
//! - [`NotificationConfig`] - SMTP delivery
//! - [`ScheduleConfig`] - Daily cron cadence
//! - [`LoggingConfig`] - Local file logging
//!
//! # Example Configuration
//!
//! ```toml
//! [fhir]
//! base_url = "https://fhir.example.com/api/FHIR/R4"
//! group_id = "e3iabhmS8rsueyz7vaimuiaSmfGvi"
//!
//! [fhir.poll]
//! interval_seconds = 30
//! max_attempts = 720
//!
//! [auth]
//! method = "client_assertion"
//! token_endpoint = "https://fhir.example.com/oauth2/token"
//! client_id = "${LABWATCH_CLIENT_ID}"
//! private_key_path = "/etc/labwatch/private_key.pem"
//!
//! [notification]
//! enabled = true
//! smtp_host = "smtp.example.com"
//! smtp_password = "${LABWATCH_SMTP_PASSWORD}"
//! from = "Lab Reports <reports@example.com>"
//! to = ["lab-team@example.com"]
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::load_config;
pub use schema::{
    ApplicationConfig, AuthConfig, AuthMethod, FhirConfig, LabwatchConfig, LoggingConfig,
    NotificationConfig, PollConfig, ReportConfig, ScheduleConfig,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
