//! Domain models and types for labwatch.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Export job types** ([`ExportRequest`], [`PollLocation`], [`Manifest`], [`OutputEntry`])
//! - **Correlation types** ([`Subject`], [`SubjectIndex`])
//! - **Measurement types** ([`MeasurementRecord`], [`Classification`], [`ClassificationReason`])
//! - **Error types** ([`ReportError`], [`BulkExportError`], [`StreamEntryError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, ReportError>`]:
//!
//! ```rust
//! use labwatch::domain::{ReportError, Result};
//!
//! fn example() -> Result<()> {
//!     // Errors are automatically converted using the ? operator
//!     let config = labwatch::config::load_config("labwatch.toml")?;
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod export;
pub mod observation;
pub mod result;
pub mod subject;

// Re-export commonly used types for convenience
pub use errors::{BulkExportError, ReportError, StreamEntryError};
pub use export::{ExportRequest, Manifest, OutputEntry, PollLocation};
pub use observation::{Classification, ClassificationReason, MeasurementRecord};
pub use result::Result;
pub use subject::{Subject, SubjectIndex};
