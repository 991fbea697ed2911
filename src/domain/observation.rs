//! Measurement records and their classification
//!
//! A [`MeasurementRecord`] is a lenient, read-only view over an exported FHIR
//! `Observation`. Missing or oddly typed fields become `None` instead of failing
//! the record, because classification has to be total.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Fields of an observation that matter for range evaluation and reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Resource id
    pub id: Option<String>,

    /// `valueQuantity.value`
    pub value: Option<f64>,

    /// `valueQuantity.unit`
    pub unit: Option<String>,

    /// Whether the record carries a `referenceRange` element at all
    pub has_reference_range: bool,

    /// `referenceRange[0].low.value`
    pub reference_range_low: Option<f64>,

    /// `referenceRange[0].high.value`
    pub reference_range_high: Option<f64>,

    /// `subject.reference`, e.g. `Patient/123`
    pub subject_reference: Option<String>,

    /// `code.text`
    pub code_text: Option<String>,
}

impl MeasurementRecord {
    /// Extracts the measurement view from a raw Observation resource
    ///
    /// # Examples
    ///
    /// ```
    /// use labwatch::domain::MeasurementRecord;
    /// use serde_json::json;
    ///
    /// let record = MeasurementRecord::from_resource(&json!({
    ///     "resourceType": "Observation",
    ///     "code": {"text": "Glucose"},
    ///     "valueQuantity": {"value": 5.4, "unit": "mmol/L"},
    ///     "referenceRange": [{"low": {"value": 3.9}, "high": {"value": 7.8}}],
    ///     "subject": {"reference": "Patient/1"}
    /// }));
    ///
    /// assert_eq!(record.value, Some(5.4));
    /// assert_eq!(record.subject_reference.as_deref(), Some("Patient/1"));
    /// ```
    pub fn from_resource(resource: &Value) -> Self {
        let text = |pointer: &str| {
            resource
                .pointer(pointer)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let number = |pointer: &str| resource.pointer(pointer).and_then(Value::as_f64);

        Self {
            id: text("/id"),
            value: number("/valueQuantity/value"),
            unit: text("/valueQuantity/unit"),
            has_reference_range: resource
                .get("referenceRange")
                .is_some_and(|range| !range.is_null()),
            reference_range_low: number("/referenceRange/0/low/value"),
            reference_range_high: number("/referenceRange/0/high/value"),
            subject_reference: text("/subject/reference"),
            code_text: text("/code/text"),
        }
    }
}

/// Why a measurement was classified the way it was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassificationReason {
    NoReferenceRange,
    IncompleteData,
    WithinRange,
    OutsideRange,
}

impl ClassificationReason {
    /// Human-readable reason used in the report body
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoReferenceRange => "No Reference Range Found",
            Self::IncompleteData => "Incomplete Data",
            Self::WithinRange => "Within Reference Range",
            Self::OutsideRange => "Outside Reference Range",
        }
    }
}

impl fmt::Display for ClassificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state outcome of evaluating a measurement against its reference range
///
/// `is_normal == None` means undetermined: the record is left out of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub is_normal: Option<bool>,
    pub reason: ClassificationReason,
}

impl Classification {
    pub fn undetermined(reason: ClassificationReason) -> Self {
        Self {
            is_normal: None,
            reason,
        }
    }

    pub fn normal(reason: ClassificationReason) -> Self {
        Self {
            is_normal: Some(true),
            reason,
        }
    }

    pub fn abnormal(reason: ClassificationReason) -> Self {
        Self {
            is_normal: Some(false),
            reason,
        }
    }

    pub fn is_undetermined(&self) -> bool {
        self.is_normal.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_resource_full() {
        let record = MeasurementRecord::from_resource(&json!({
            "id": "obs-1",
            "code": {"text": "Hemoglobin"},
            "valueQuantity": {"value": 13, "unit": "g/dL"},
            "referenceRange": [{"low": {"value": 12}, "high": {"value": 16}}],
            "subject": {"reference": "Patient/p1"}
        }));

        assert_eq!(record.id.as_deref(), Some("obs-1"));
        assert_eq!(record.value, Some(13.0));
        assert_eq!(record.unit.as_deref(), Some("g/dL"));
        assert!(record.has_reference_range);
        assert_eq!(record.reference_range_low, Some(12.0));
        assert_eq!(record.reference_range_high, Some(16.0));
        assert_eq!(record.code_text.as_deref(), Some("Hemoglobin"));
    }

    #[test]
    fn test_from_resource_missing_fields() {
        let record = MeasurementRecord::from_resource(&json!({"resourceType": "Observation"}));
        assert_eq!(record, MeasurementRecord::default());
    }

    #[test]
    fn test_from_resource_null_reference_range_is_absent() {
        let record = MeasurementRecord::from_resource(&json!({"referenceRange": null}));
        assert!(!record.has_reference_range);
    }

    #[test]
    fn test_from_resource_empty_reference_range_is_present() {
        let record = MeasurementRecord::from_resource(&json!({"referenceRange": []}));
        assert!(record.has_reference_range);
        assert!(record.reference_range_low.is_none());
    }

    #[test]
    fn test_from_resource_non_numeric_value() {
        let record = MeasurementRecord::from_resource(&json!({
            "valueQuantity": {"value": "high"}
        }));
        assert!(record.value.is_none());
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(
            ClassificationReason::OutsideRange.to_string(),
            "Outside Reference Range"
        );
        assert_eq!(
            ClassificationReason::NoReferenceRange.to_string(),
            "No Reference Range Found"
        );
    }
}
