//! CLI command implementations
//!
//! This module contains all CLI command implementations and the mapping from
//! run errors to process exit codes.

pub mod init;
pub mod run;
pub mod schedule;
pub mod validate;

use crate::domain::{BulkExportError, ReportError};

/// Report completed and every manifest entry streamed
pub const EXIT_SUCCESS: i32 = 0;
/// Report completed but some manifest entries failed
pub const EXIT_ENTRY_FAILURES: i32 = 1;
/// Configuration could not be loaded or is invalid
pub const EXIT_CONFIG: i32 = 2;
/// Another run holds the run lock
pub const EXIT_RUN_IN_PROGRESS: i32 = 3;
/// FHIR server or token endpoint unreachable or refused the request
pub const EXIT_CONNECTION: i32 = 4;
/// Anything else
pub const EXIT_FATAL: i32 = 5;

/// Exit code for an error that aborted a run
pub fn exit_code_for(error: &ReportError) -> i32 {
    match error {
        ReportError::Configuration(_) => EXIT_CONFIG,
        ReportError::RunInProgress => EXIT_RUN_IN_PROGRESS,
        ReportError::Authentication(_) => EXIT_CONNECTION,
        ReportError::Export(
            BulkExportError::ConnectionFailed(_)
            | BulkExportError::KickoffFailed { .. }
            | BulkExportError::MissingContentLocation,
        ) => EXIT_CONNECTION,
        _ => EXIT_FATAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ReportError::Configuration("x".into()), EXIT_CONFIG ; "configuration")]
    #[test_case(ReportError::RunInProgress, EXIT_RUN_IN_PROGRESS ; "run in progress")]
    #[test_case(ReportError::Authentication("401".into()), EXIT_CONNECTION ; "authentication")]
    #[test_case(BulkExportError::ConnectionFailed("refused".into()).into(), EXIT_CONNECTION ; "connection")]
    #[test_case(BulkExportError::MissingContentLocation.into(), EXIT_CONNECTION ; "missing location")]
    #[test_case(BulkExportError::Timeout { attempts: 3 }.into(), EXIT_FATAL ; "poll timeout")]
    #[test_case(BulkExportError::JobFailed { status: 404, message: String::new() }.into(), EXIT_FATAL ; "job failed")]
    #[test_case(ReportError::Io("disk".into()), EXIT_FATAL ; "io")]
    fn test_exit_code_for(error: ReportError, expected: i32) {
        assert_eq!(exit_code_for(&error), expected);
    }
}
