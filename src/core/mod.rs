//! Core business logic for labwatch.
//!
//! # Modules
//!
//! - [`evaluate`] - Reference range classification
//! - [`report`] - Report assembly and run orchestration
//! - [`schedule`] - Daily scheduling and the run lock
//!
//! # Report Workflow
//!
//! 1. **Authenticate**: Obtain a bearer credential
//! 2. **Export**: Kick off `Group/{id}/$export` and poll until the manifest is ready
//! 3. **Index**: Stream every subject file into the subject index
//! 4. **Evaluate**: Stream every measurement file, classify each record against
//!    its reference range and append it to the normal or abnormal section
//! 5. **Deliver**: Send the report and log the acknowledgment
//!
//! Step 3 completes before step 4 starts.
//!
//! # Example
//!
//! ```rust,no_run
//! use labwatch::config::load_config;
//! use labwatch::core::report::ReportCoordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("labwatch.toml")?;
//!
//! // Create shutdown signal
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let coordinator = ReportCoordinator::new(config, shutdown_rx)?;
//! let summary = coordinator.run().await?;
//!
//! println!("Abnormal: {}", summary.counts.abnormal);
//! println!("Normal: {}", summary.counts.normal);
//! println!("Failed entries: {}", summary.entry_failures());
//! # Ok(())
//! # }
//! ```

pub mod evaluate;
pub mod report;
pub mod schedule;
