//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use super::{EXIT_CONFIG, EXIT_FATAL, EXIT_SUCCESS};
use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "labwatch.toml")]
    pub output: String,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing labwatch configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(EXIT_CONFIG);
        }

        match fs::write(&self.output, Self::sample_config()) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your FHIR server and group id", self.output);
                println!("  2. Create a .env file with your credentials:");
                println!("     - Set LABWATCH_FHIR_TOKEN (static auth)");
                println!("     - Set LABWATCH_SMTP_PASSWORD (if mail is enabled)");
                println!("  3. Validate configuration: labwatch validate-config");
                println!("  4. Try a dry run: labwatch run --dry-run");
                println!();
                Ok(EXIT_SUCCESS)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {}", e);
                Ok(EXIT_FATAL)
            }
        }
    }

    /// Sample configuration with every section and its defaults
    fn sample_config() -> &'static str {
        r#"# labwatch configuration
# FHIR bulk-export lab report generator

[application]
log_level = "info"
# Print the report instead of mailing it
dry_run = false

# ============================================================================
# FHIR server and bulk export
# ============================================================================
[fhir]
base_url = "https://fhir.example.com/r4"
group_id = "lab-cohort"

# Resource types requested through _type
resource_types = ["Patient", "Observation"]
# Search filters sent with the export request
type_filters = ["Observation?category=laboratory"]
# Query parameter carrying the filters (use "_typeFilter" for Bulk Data IG servers)
type_filter_parameter = "typeFilter"

# Per-request timeout in seconds
timeout_seconds = 60
# Abandon a download when no data arrives for this long
stream_idle_timeout_seconds = 300
# Longer NDJSON lines are skipped as malformed
max_line_bytes = 16777216
# Records buffered between downloads and the report builder
stream_buffer = 1024
tls_verify = true

[fhir.poll]
interval_seconds = 30
max_interval_seconds = 300
# 1.0 = fixed interval
backoff_multiplier = 1.0
max_attempts = 720
max_consecutive_failures = 10

# ============================================================================
# Credentials
# ============================================================================
[auth]
# static | client_assertion
method = "static"
access_token = "${LABWATCH_FHIR_TOKEN}"

# SMART backend services
# method = "client_assertion"
# token_endpoint = "https://auth.example.com/oauth2/token"
# client_id = "labwatch"
# private_key_path = "/etc/labwatch/client_key.pem"

# ============================================================================
# Report
# ============================================================================
[report]
subject_type = "Patient"
measurement_type = "Observation"
title = "Results of Lab Tests"
subject_prefix = "Lab Reports"

# ============================================================================
# Mail delivery (the report is logged when disabled)
# ============================================================================
[notification]
enabled = false
# smtp_host = "smtp.example.com"
# smtp_port = 587
# smtp_username = "reports@example.com"
# smtp_password = "${LABWATCH_SMTP_PASSWORD}"
# from = "Lab Reports <reports@example.com>"
# to = ["lab-team@example.com"]

# ============================================================================
# Schedule (minute hour * * *, UTC)
# ============================================================================
[schedule]
cron = "0 0 * * *"

# ============================================================================
# Logging
# ============================================================================
[logging]
local_enabled = false
local_path = "/var/log/labwatch"
# daily | hourly | never
local_rotation = "daily"
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LabwatchConfig;
    use tempfile::TempDir;

    #[test]
    fn test_sample_config_parses() {
        let raw = InitArgs::sample_config().replace("${LABWATCH_FHIR_TOKEN}", "tok");
        let config: LabwatchConfig = toml::from_str(&raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.fhir.group_id, "lab-cohort");
        assert_eq!(config.schedule.cron, "0 0 * * *");
    }

    #[tokio::test]
    async fn test_init_writes_file() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("labwatch.toml");
        let args = InitArgs {
            output: output.to_string_lossy().into_owned(),
            force: false,
        };

        assert_eq!(args.execute().await.unwrap(), EXIT_SUCCESS);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_init_refuses_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("labwatch.toml");
        fs::write(&output, "existing").unwrap();

        let mut args = InitArgs {
            output: output.to_string_lossy().into_owned(),
            force: false,
        };
        assert_eq!(args.execute().await.unwrap(), EXIT_CONFIG);
        assert_eq!(fs::read_to_string(&output).unwrap(), "existing");

        args.force = true;
        assert_eq!(args.execute().await.unwrap(), EXIT_SUCCESS);
        assert!(fs::read_to_string(&output).unwrap().contains("[fhir]"));
    }
}
