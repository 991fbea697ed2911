//! Reference range evaluation
//!
//! [`classify`] decides whether a measurement lies inside its reference range.
//! A zero value or bound is treated the same as a missing one, so a result of
//! exactly `0` is reported as incomplete data rather than compared.

use crate::domain::{Classification, ClassificationReason, MeasurementRecord};

/// Classifies a measurement against its first reference range
///
/// 1. No reference range: undetermined (`NoReferenceRange`)
/// 2. Value, low or high missing or zero: abnormal (`IncompleteData`)
/// 3. `low <= value <= high`: normal (`WithinRange`)
/// 4. Otherwise: abnormal (`OutsideRange`)
pub fn classify(record: &MeasurementRecord) -> Classification {
    if !record.has_reference_range {
        return Classification::undetermined(ClassificationReason::NoReferenceRange);
    }

    let (Some(value), Some(low), Some(high)) = (
        present(record.value),
        present(record.reference_range_low),
        present(record.reference_range_high),
    ) else {
        return Classification::abnormal(ClassificationReason::IncompleteData);
    };

    if low <= value && value <= high {
        Classification::normal(ClassificationReason::WithinRange)
    } else {
        Classification::abnormal(ClassificationReason::OutsideRange)
    }
}

/// Zero and NaN count as absent
fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0 && !v.is_nan())
}
