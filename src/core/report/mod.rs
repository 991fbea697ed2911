//! Report assembly and run orchestration
//!
//! - [`coordinator`] - runs export, correlation, evaluation and delivery
//! - [`builder`] - accumulates the normal/abnormal report sections
//! - [`summary`] - per-run counters and entry failures

pub mod builder;
pub mod coordinator;
pub mod summary;

pub use builder::{RecordDisposition, Report, ReportBuilder, ReportCounts};
pub use coordinator::ReportCoordinator;
pub use summary::RunSummary;
