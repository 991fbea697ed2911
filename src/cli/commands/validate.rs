//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the labwatch configuration file.

use super::{EXIT_CONFIG, EXIT_SUCCESS};
use crate::config::{load_config, AuthMethod};
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates before returning
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                println!("✅ Configuration is valid");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                println!();
                return Ok(EXIT_CONFIG);
            }
        };

        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  FHIR Server: {}", config.fhir.base_url);
        println!("  Group: {}", config.fhir.group_id);
        println!("  Resource Types: {:?}", config.fhir.resource_types);
        println!(
            "  Type Filters: {:?} (as {})",
            config.fhir.type_filters, config.fhir.type_filter_parameter
        );
        println!(
            "  Poll: every {}s (max {}s, x{}), {} attempts",
            config.fhir.poll.interval_seconds,
            config.fhir.poll.max_interval_seconds,
            config.fhir.poll.backoff_multiplier,
            config.fhir.poll.max_attempts
        );
        match config.auth.method {
            AuthMethod::Static => println!("  Auth: static bearer token"),
            AuthMethod::ClientAssertion => println!(
                "  Auth: client assertion ({})",
                config.auth.token_endpoint.as_deref().unwrap_or("-")
            ),
        }
        println!(
            "  Report: {} -> {}",
            config.report.subject_type, config.report.measurement_type
        );
        if config.notification.enabled {
            println!(
                "  Mail: {}:{} -> {}",
                config.notification.smtp_host.as_deref().unwrap_or("-"),
                config.notification.smtp_port,
                config.notification.to.join(", ")
            );
        } else {
            println!("  Mail: disabled (report is logged)");
        }
        println!("  Schedule: {} (UTC)", config.schedule.cron);
        println!();
        Ok(EXIT_SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[fhir]
base_url = "https://fhir.example.com/r4"
group_id = "lab-group"

[auth]
access_token = "tok"
"#
        )
        .unwrap();

        let code = ValidateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, EXIT_SUCCESS);
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[fhir]
base_url = "ftp://fhir.example.com"
group_id = "lab-group"
"#
        )
        .unwrap();

        let code = ValidateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, EXIT_CONFIG);
    }
}
