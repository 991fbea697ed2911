// labwatch - FHIR bulk-export lab report generator
// Copyright (c) 2025 Labwatch Contributors
// Licensed under the MIT License

//! # labwatch - FHIR bulk-export lab report generator
//!
//! labwatch starts a FHIR Bulk Data export for a patient group, waits for the
//! export job to finish, streams the exported NDJSON files and mails a plain
//! text report that splits lab results into abnormal and normal sections based
//! on each result's reference range.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Exporting** `Group/{id}/$export` jobs and polling them to completion
//! - **Correlating** exported measurements with their subjects
//! - **Evaluating** each numeric result against its reference range
//! - **Reporting** the results by mail on a daily schedule
//!
//! ## Architecture
//!
//! labwatch follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (evaluation, report assembly, scheduling)
//! - [`adapters`] - External integrations (FHIR server, token endpoint, SMTP)
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use labwatch::config::load_config;
//! use labwatch::core::report::ReportCoordinator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("labwatch.toml")?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//!     let coordinator = ReportCoordinator::new(config, shutdown_rx)?;
//!     let summary = coordinator.run().await?;
//!
//!     println!("{} abnormal, {} normal", summary.counts.abnormal, summary.counts.normal);
//!     Ok(())
//! }
//! ```
//!
//! ## Reference Range Evaluation
//!
//! ```rust
//! use labwatch::core::evaluate::classify;
//! use labwatch::domain::{ClassificationReason, MeasurementRecord};
//! use serde_json::json;
//!
//! let record = MeasurementRecord::from_resource(&json!({
//!     "resourceType": "Observation",
//!     "valueQuantity": { "value": 15.0 },
//!     "referenceRange": [{ "low": { "value": 3.9 }, "high": { "value": 6.1 } }]
//! }));
//! let classification = classify(&record);
//! assert_eq!(classification.is_normal, Some(false));
//! assert_eq!(classification.reason, ClassificationReason::OutsideRange);
//! ```
//!
//! ## Error Handling
//!
//! labwatch uses the [`domain::ReportError`] type for all errors that abort a
//! run. A failed download only marks its manifest entry as failed.
//!
//! ## Logging
//!
//! labwatch uses structured logging with the `tracing` crate:
//!
//! ```rust,no_run
//! use tracing::{info, warn};
//!
//! info!(group_id = "lab-cohort", "Starting report run");
//! warn!(url = "https://fhir.example.com/out/1.ndjson", "Manifest entry failed");
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
