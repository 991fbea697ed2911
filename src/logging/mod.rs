//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - Configurable log levels (overridable through `RUST_LOG`)
//! - Console output
//! - Local JSON file logging with rotation
//!
//! # Example
//!
//! ```no_run
//! use labwatch::logging::init_logging;
//! use labwatch::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

// Re-export commonly used items
pub use structured::{init_logging, parse_log_level, LoggingGuard};

/// Log the start of a report run
///
/// # Example
///
/// ```no_run
/// use labwatch::log_run_start;
///
/// log_run_start!("group-1", "smtp");
/// ```
#[macro_export]
macro_rules! log_run_start {
    ($group_id:expr, $notifier:expr) => {
        tracing::info!(
            group_id = %$group_id,
            notifier = %$notifier,
            "Starting report run"
        )
    };
}

/// Log one export status check
///
/// # Example
///
/// ```no_run
/// use labwatch::log_poll_attempt;
///
/// let progress: Option<String> = Some("42%".to_string());
/// log_poll_attempt!("https://fhir.example.com/status/1", 202u16, progress);
/// ```
#[macro_export]
macro_rules! log_poll_attempt {
    ($location:expr, $status:expr, $progress:expr) => {
        tracing::info!(
            location = %$location,
            status = $status,
            progress = ?$progress,
            "Export status checked"
        )
    };
}

/// Log a manifest entry that stopped streaming early
///
/// # Example
///
/// ```no_run
/// use labwatch::log_entry_failure;
///
/// log_entry_failure!("https://fhir.example.com/out/1.ndjson", "Observation", "status 500", 12u64);
/// ```
#[macro_export]
macro_rules! log_entry_failure {
    ($url:expr, $record_type:expr, $error:expr, $records:expr) => {
        tracing::warn!(
            url = %$url,
            record_type = %$record_type,
            error = %$error,
            records_before_failure = $records,
            "Manifest entry failed, treating as drained"
        )
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use labwatch::log_error_with_context;
/// use labwatch::domain::ReportError;
///
/// let error = ReportError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        )
    };
}
