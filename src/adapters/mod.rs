//! External system integrations for labwatch.
//!
//! This module provides adapters for the systems a report run talks to:
//!
//! - [`fhir`] - FHIR Bulk Data export (kickoff, status polling, NDJSON download)
//! - [`auth`] - Bearer credential acquisition
//! - [`notify`] - Report delivery (SMTP or log)
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies and
//! enable testing with mock implementations. Credentials and delivery sit behind
//! the [`auth::TokenProvider`] and [`notify::Notifier`] traits so the report
//! workflow never sees a concrete transport.
//!
//! # FHIR Adapter
//!
//! ```rust,no_run
//! use labwatch::adapters::auth::AccessToken;
//! use labwatch::adapters::fhir::{BulkExportPoller, FhirClient, StreamCorrelator};
//! use labwatch::config::FhirConfig;
//! use labwatch::domain::ExportRequest;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FhirConfig {
//!     base_url: "https://fhir.example.com/api/FHIR/R4".to_string(),
//!     group_id: "group-1".to_string(),
//!     ..Default::default()
//! };
//! let client = FhirClient::new(&config)?;
//! let token = AccessToken::new("token");
//!
//! let poller = BulkExportPoller::new(client.clone(), config.poll.clone());
//! let manifest = poller
//!     .export(&ExportRequest::new(&config.group_id).with_types(["Patient"]), &token)
//!     .await?;
//!
//! let correlator = StreamCorrelator::new(client, config.stream_buffer);
//! let summary = correlator
//!     .correlate(&manifest.output, "Patient", &token, |record| println!("{record}"))
//!     .await;
//! println!("{} records", summary.records());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod fhir;
pub mod notify;
