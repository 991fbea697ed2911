//! Run summary and reporting
//!
//! This module defines the structure returned by one report run.

use super::builder::ReportCounts;
use crate::adapters::fhir::CorrelationSummary;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Summary of one report run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Number of output files listed in the manifest
    pub manifest_outputs: usize,

    /// Number of OperationOutcome files listed in the manifest
    pub manifest_errors: usize,

    /// Subjects held in the index after the first pass
    pub subjects_indexed: usize,

    /// Subject records without an id
    pub subjects_skipped: u64,

    /// Outcome of the subject pass
    pub subject_stream: CorrelationSummary,

    /// Outcome of the measurement pass
    pub measurement_stream: CorrelationSummary,

    /// How measurements were dispositioned
    pub counts: ReportCounts,

    /// Report body as handed to the notifier
    pub report_text: String,

    /// Whether the notifier acknowledged the report
    pub delivered: bool,

    /// Notifier acknowledgment or failure message
    pub delivery_detail: Option<String>,
}

impl RunSummary {
    /// Number of manifest entries that failed while streaming
    pub fn entry_failures(&self) -> usize {
        self.subject_stream.failed_entries().count()
            + self.measurement_stream.failed_entries().count()
    }

    /// Check if every manifest entry streamed to completion
    pub fn is_successful(&self) -> bool {
        self.entry_failures() == 0
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            duration_secs = self.duration.as_secs(),
            manifest_outputs = self.manifest_outputs,
            subjects = self.subjects_indexed,
            measurements = self.measurement_stream.records(),
            abnormal = self.counts.abnormal,
            normal = self.counts.normal,
            undetermined = self.counts.undetermined,
            unresolved_subject = self.counts.unresolved_subject,
            missing_subject_reference = self.counts.missing_subject_reference,
            delivered = self.delivered,
            "Report run completed"
        );

        if !self.is_successful() {
            tracing::warn!(
                failed_entries = self.entry_failures(),
                "Report run completed with failed manifest entries"
            );
            for entry in self
                .subject_stream
                .failed_entries()
                .chain(self.measurement_stream.failed_entries())
            {
                tracing::warn!(
                    record_type = %entry.record_type,
                    url = %entry.url,
                    records_before_failure = entry.records,
                    error = ?entry.error,
                    "Failed manifest entry"
                );
            }
        }
    }
}
