//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::LabwatchConfig;
use super::secret::secret_string;
use crate::domain::errors::ReportError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into LabwatchConfig
/// 4. Applies environment variable overrides (LABWATCH_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if the file cannot be read, a referenced environment
/// variable is missing, parsing fails, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use labwatch::config::loader::load_config;
///
/// let config = load_config("labwatch.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<LabwatchConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ReportError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ReportError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: LabwatchConfig = toml::from_str(&contents)
        .map_err(|e| ReportError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config);

    config.validate().map_err(|e| {
        ReportError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is a valid regex")
    })
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = env_var_pattern();
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&format!("${{{var_name}}}"), &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(ReportError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using the LABWATCH_* prefix
///
/// Environment variables follow the pattern LABWATCH_<SECTION>_<KEY>, for
/// example LABWATCH_FHIR_BASE_URL or LABWATCH_SCHEDULE_CRON. Values that fail
/// to parse are ignored.
fn apply_env_overrides(config: &mut LabwatchConfig) {
    let var = |name: &str| std::env::var(name).ok();

    // Application overrides
    if let Some(val) = var("LABWATCH_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = var("LABWATCH_APPLICATION_DRY_RUN") {
        config.application.dry_run = val.parse().unwrap_or(false);
    }

    // FHIR overrides
    if let Some(val) = var("LABWATCH_FHIR_BASE_URL") {
        config.fhir.base_url = val;
    }
    if let Some(val) = var("LABWATCH_FHIR_GROUP_ID") {
        config.fhir.group_id = val;
    }
    if let Some(val) = var("LABWATCH_FHIR_TIMEOUT_SECONDS") {
        if let Ok(timeout) = val.parse() {
            config.fhir.timeout_seconds = timeout;
        }
    }
    if let Some(val) = var("LABWATCH_FHIR_TLS_VERIFY") {
        config.fhir.tls_verify = val.parse().unwrap_or(true);
    }
    if let Some(val) = var("LABWATCH_FHIR_POLL_INTERVAL_SECONDS") {
        if let Ok(interval) = val.parse() {
            config.fhir.poll.interval_seconds = interval;
        }
    }
    if let Some(val) = var("LABWATCH_FHIR_POLL_MAX_ATTEMPTS") {
        if let Ok(attempts) = val.parse() {
            config.fhir.poll.max_attempts = attempts;
        }
    }

    // Auth overrides
    if let Some(val) = var("LABWATCH_AUTH_ACCESS_TOKEN") {
        config.auth.access_token = Some(secret_string(val));
    }
    if let Some(val) = var("LABWATCH_AUTH_TOKEN_ENDPOINT") {
        config.auth.token_endpoint = Some(val);
    }
    if let Some(val) = var("LABWATCH_AUTH_CLIENT_ID") {
        config.auth.client_id = Some(val);
    }
    if let Some(val) = var("LABWATCH_AUTH_PRIVATE_KEY_PATH") {
        config.auth.private_key_path = Some(val);
    }

    // Notification overrides
    if let Some(val) = var("LABWATCH_NOTIFICATION_ENABLED") {
        config.notification.enabled = val.parse().unwrap_or(config.notification.enabled);
    }
    if let Some(val) = var("LABWATCH_NOTIFICATION_SMTP_HOST") {
        config.notification.smtp_host = Some(val);
    }
    if let Some(val) = var("LABWATCH_NOTIFICATION_SMTP_USERNAME") {
        config.notification.smtp_username = Some(val);
    }
    if let Some(val) = var("LABWATCH_NOTIFICATION_SMTP_PASSWORD") {
        config.notification.smtp_password = Some(secret_string(val));
    }
    if let Some(val) = var("LABWATCH_NOTIFICATION_TO") {
        config.notification.to = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    // Schedule overrides
    if let Some(val) = var("LABWATCH_SCHEDULE_CRON") {
        config.schedule.cron = val;
    }

    // Logging overrides
    if let Some(val) = var("LABWATCH_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(false);
    }
    if let Some(val) = var("LABWATCH_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
}
