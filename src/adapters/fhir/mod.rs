//! FHIR Bulk Data adapter
//!
//! - [`client`] - shared HTTP client bound to the FHIR base URL
//! - [`bulk`] - `$export` kickoff and status polling state machine
//! - [`stream`] - concurrent NDJSON download and record delivery

pub mod bulk;
pub mod client;
pub mod stream;

pub use bulk::{BulkExportPoller, PollObservation, PollState};
pub use client::{build_http_client, FhirClient};
pub use stream::{drain_lines, CorrelationSummary, EntryOutcome, LineLimits, StreamCorrelator};
