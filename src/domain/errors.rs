//! Domain error types
//!
//! This module defines the error hierarchy for labwatch. Errors are domain-specific
//! and don't expose third-party HTTP or mail client types.

use thiserror::Error;

/// Main labwatch error type
///
/// This is the primary error type used throughout the application.
/// Only errors that abort a run end up here; per-entry stream failures are
/// reported through [`StreamEntryError`] inside the correlation summary.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Bulk export errors (kickoff or polling)
    #[error("Bulk export error: {0}")]
    Export(#[from] BulkExportError),

    /// Credential acquisition errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Notification delivery errors
    #[error("Notification error: {0}")]
    Notification(String),

    /// Another run holds the run lock
    #[error("A report run is already in progress")]
    RunInProgress,

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Bulk Data export errors
///
/// Errors raised while starting an export job or waiting for it to finish.
/// All of them are terminal for the run.
#[derive(Debug, Error)]
pub enum BulkExportError {
    /// The kickoff request was rejected by the server
    #[error("Export kickoff failed with status {status}: {message}")]
    KickoffFailed { status: u16, message: String },

    /// The kickoff response carried no usable Content-Location header
    #[error("Export kickoff response is missing the Content-Location header")]
    MissingContentLocation,

    /// Transport-level failure on a request that has no retry policy
    #[error("Failed to connect to FHIR server: {0}")]
    ConnectionFailed(String),

    /// The server reported the job as failed, deleted or cancelled
    #[error("Export job failed with status {status}: {message}")]
    JobFailed { status: u16, message: String },

    /// Too many consecutive transient polling failures
    #[error("Export polling gave up after {attempts} consecutive failures: {last_error}")]
    TooManyFailures { attempts: u32, last_error: String },

    /// The job did not complete within the configured number of polls
    #[error("Export job did not complete after {attempts} status checks")]
    Timeout { attempts: u32 },

    /// The completion response could not be parsed as a manifest
    #[error("Invalid export manifest: {0}")]
    InvalidManifest(String),

    /// Polling was interrupted by a shutdown signal
    #[error("Export polling cancelled by shutdown")]
    Cancelled,
}

/// Failure of a single manifest entry stream
///
/// Never propagated past the correlator: the entry is treated as drained and
/// its sibling entries keep streaming.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamEntryError {
    /// The download request returned a non-success status
    #[error("Download failed with status {0}")]
    Status(u16),

    /// The connection failed before or while reading the body
    #[error("Transport error: {0}")]
    Transport(String),

    /// No bytes arrived within the idle timeout
    #[error("No data received for {0} seconds")]
    IdleTimeout(u64),
}

// Conversion from std::io::Error
impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        ReportError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for ReportError {
    fn from(err: serde_json::Error) -> Self {
        ReportError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for ReportError {
    fn from(err: toml::de::Error) -> Self {
        ReportError::Configuration(format!("TOML parse error: {err}"))
    }
}
