//! Report text assembly
//!
//! Measurements are appended to an abnormal or a normal section as they stream
//! in; [`ReportBuilder::finish`] adds the header and the placeholders for empty
//! sections.

use crate::core::evaluate::classify;
use crate::domain::{MeasurementRecord, SubjectIndex};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::fmt::Write as _;

const SECTION_RULE: &str = "======================";
const UNKNOWN: &str = "Unknown";

/// What happened to one measurement record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDisposition {
    Normal,
    Abnormal,
    /// No reference range; left out of the report
    Undetermined,
    /// No `subject.reference`
    MissingSubjectReference,
    /// The referenced subject is not in the index
    UnresolvedSubject,
}

/// Per-disposition counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCounts {
    pub normal: u64,
    pub abnormal: u64,
    pub undetermined: u64,
    pub missing_subject_reference: u64,
    pub unresolved_subject: u64,
}

impl ReportCounts {
    fn record(&mut self, disposition: RecordDisposition) {
        let counter = match disposition {
            RecordDisposition::Normal => &mut self.normal,
            RecordDisposition::Abnormal => &mut self.abnormal,
            RecordDisposition::Undetermined => &mut self.undetermined,
            RecordDisposition::MissingSubjectReference => &mut self.missing_subject_reference,
            RecordDisposition::UnresolvedSubject => &mut self.unresolved_subject,
        };
        *counter += 1;
    }

    /// Measurements that made it into the report
    pub fn reported(&self) -> u64 {
        self.normal + self.abnormal
    }

    /// Measurements seen in total
    pub fn total(&self) -> u64 {
        self.reported() + self.undetermined + self.missing_subject_reference + self.unresolved_subject
    }
}

/// A finished report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub header: String,
    pub abnormal_section: String,
    pub normal_section: String,
    pub counts: ReportCounts,
}

impl Report {
    /// Full message body: header, abnormal section, normal section
    pub fn text(&self) -> String {
        let mut text = String::with_capacity(
            self.header.len() + self.abnormal_section.len() + self.normal_section.len(),
        );
        text.push_str(&self.header);
        text.push_str(&self.abnormal_section);
        text.push_str(&self.normal_section);
        text
    }

    /// Mail subject, e.g. `Lab Reports on Mon Jan 01 2024`
    pub fn subject(&self, prefix: &str) -> String {
        format!("{prefix} on {}", self.generated_at.format("%a %b %d %Y"))
    }
}

/// Accumulates report sections across the measurement stream
#[derive(Debug)]
pub struct ReportBuilder {
    title: String,
    abnormal: String,
    normal: String,
    counts: ReportCounts,
}

impl ReportBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            abnormal: section_banner("Abnormal"),
            normal: section_banner("Normal"),
            counts: ReportCounts::default(),
        }
    }

    /// Classifies a raw measurement resource and appends it to a section
    pub fn add_measurement(&mut self, resource: &Value, subjects: &SubjectIndex) -> RecordDisposition {
        let record = MeasurementRecord::from_resource(resource);
        let disposition = self.add_record(&record, subjects);
        self.counts.record(disposition);
        disposition
    }

    fn add_record(&mut self, record: &MeasurementRecord, subjects: &SubjectIndex) -> RecordDisposition {
        let classification = classify(record);
        let Some(is_normal) = classification.is_normal else {
            return RecordDisposition::Undetermined;
        };

        let Some(reference) = record.subject_reference.as_deref() else {
            tracing::warn!(observation_id = ?record.id, "Measurement has no subject reference");
            return RecordDisposition::MissingSubjectReference;
        };

        let Some(subject) = subjects.get(reference) else {
            tracing::warn!(
                observation_id = ?record.id,
                reference = %reference,
                "Subject not found for reference"
            );
            return RecordDisposition::UnresolvedSubject;
        };

        let section = if is_normal {
            &mut self.normal
        } else {
            &mut self.abnormal
        };

        let value = record
            .value
            .map_or_else(|| UNKNOWN.to_string(), |v| v.to_string());
        // Writing to a String cannot fail
        let _ = write!(
            section,
            "Observation: {}\nValue: {}\nReason: {}\nPatient Name: {}, Patient MRN: {}\n\n",
            record.code_text.as_deref().unwrap_or(UNKNOWN),
            value,
            classification.reason,
            subject.display_name.as_deref().unwrap_or(UNKNOWN),
            subject.id,
        );

        if is_normal {
            RecordDisposition::Normal
        } else {
            RecordDisposition::Abnormal
        }
    }

    pub fn counts(&self) -> ReportCounts {
        self.counts
    }

    /// Adds the header and empty-section placeholders
    pub fn finish(self, generated_at: DateTime<Utc>) -> Report {
        let header = format!(
            "{} (Date: {})\n\n",
            self.title,
            generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        );

        let mut abnormal_section = self.abnormal;
        if self.counts.abnormal == 0 {
            abnormal_section.push_str("No abnormal observations found.\n\n");
        }

        let mut normal_section = self.normal;
        if self.counts.normal == 0 {
            normal_section.push_str("No normal observations found.\n\n");
        }

        Report {
            generated_at,
            header,
            abnormal_section,
            normal_section,
            counts: self.counts,
        }
    }
}

fn section_banner(kind: &str) -> String {
    format!("{SECTION_RULE}\n{kind} Observations:\n{SECTION_RULE}\n")
}
