//! Report coordinator - main orchestrator for one report run
//!
//! A run acquires a credential, waits for the bulk export to finish, indexes
//! the exported subjects, then streams the measurements through the range
//! evaluator into a report that is handed to the notifier.

use super::builder::ReportBuilder;
use super::summary::RunSummary;
use crate::adapters::auth::{provider_from_config, TokenProvider};
use crate::adapters::fhir::{build_http_client, BulkExportPoller, FhirClient, StreamCorrelator};
use crate::adapters::notify::{notifier_from_config, Notifier, ReportMessage};
use crate::config::LabwatchConfig;
use crate::core::schedule::RunLock;
use crate::domain::{ExportRequest, Result, SubjectIndex};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Report coordinator
///
/// # Example
///
/// ```no_run
/// use labwatch::config::load_config;
/// use labwatch::core::report::ReportCoordinator;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config("labwatch.toml")?;
/// let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
///
/// let coordinator = ReportCoordinator::new(config, shutdown_rx)?;
/// let summary = coordinator.run().await?;
/// println!("{} abnormal results", summary.counts.abnormal);
/// # Ok(())
/// # }
/// ```
pub struct ReportCoordinator {
    config: LabwatchConfig,
    tokens: Arc<dyn TokenProvider>,
    notifier: Arc<dyn Notifier>,
    poller: BulkExportPoller,
    correlator: StreamCorrelator,
    run_lock: RunLock,
}

impl ReportCoordinator {
    /// Create a new report coordinator from configuration
    ///
    /// The notifier is the log notifier when `application.dry_run` is set or
    /// mail delivery is disabled.
    pub fn new(config: LabwatchConfig, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let http = build_http_client(&config.fhir)?;
        let tokens = provider_from_config(
            &config.auth,
            http.clone(),
            Duration::from_secs(config.fhir.timeout_seconds),
        )?;
        let notifier = notifier_from_config(&config.notification, config.application.dry_run)?;
        let client = FhirClient::with_client(http, &config.fhir);

        Ok(Self::with_components(
            config, client, tokens, notifier, shutdown,
        ))
    }

    /// Create a coordinator around explicit collaborators
    pub fn with_components(
        config: LabwatchConfig,
        client: FhirClient,
        tokens: Arc<dyn TokenProvider>,
        notifier: Arc<dyn Notifier>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let poller =
            BulkExportPoller::new(client.clone(), config.fhir.poll.clone()).with_shutdown(shutdown);
        let correlator = StreamCorrelator::new(client, config.fhir.stream_buffer);

        Self {
            config,
            tokens,
            notifier,
            poller,
            correlator,
            run_lock: RunLock::new(),
        }
    }

    /// Export request built from `[fhir]`
    pub fn export_request(&self) -> ExportRequest {
        let fhir = &self.config.fhir;
        fhir.type_filters.iter().fold(
            ExportRequest::new(&fhir.group_id)
                .with_types(fhir.resource_types.iter().cloned())
                .with_type_filter_parameter(&fhir.type_filter_parameter),
            |request, filter| request.with_type_filter(filter.clone()),
        )
    }

    pub fn run_lock(&self) -> &RunLock {
        &self.run_lock
    }

    /// Execute one report run
    ///
    /// 1. Takes the run lock (fails with `RunInProgress` if held)
    /// 2. Acquires a bearer credential
    /// 3. Starts the bulk export and waits for the manifest
    /// 4. Indexes every subject record
    /// 5. Classifies every measurement record into the report sections
    /// 6. Hands the report to the notifier; delivery failures are only logged
    pub async fn run(&self) -> Result<RunSummary> {
        let _guard = self.run_lock.try_acquire()?;
        let start_time = Instant::now();
        let started_at = Utc::now();
        let report_config = &self.config.report;

        crate::log_run_start!(&self.config.fhir.group_id, self.notifier.name());

        let token = self.tokens.access_token().await?;
        tracing::debug!(provider = self.tokens.name(), "Credential acquired");

        let manifest = self.poller.export(&self.export_request(), &token).await?;
        if !manifest.error.is_empty() {
            tracing::warn!(
                error_files = manifest.error.len(),
                "Export manifest lists OperationOutcome error files"
            );
        }

        let mut subjects = SubjectIndex::new(&report_config.subject_type);
        let mut subjects_skipped: u64 = 0;
        let subject_stream = self
            .correlator
            .correlate(&manifest.output, &report_config.subject_type, &token, |resource| {
                if subjects.insert(resource).is_none() {
                    subjects_skipped += 1;
                }
            })
            .await;

        if subjects_skipped > 0 {
            tracing::warn!(skipped = subjects_skipped, "Subject records without an id were skipped");
        }
        tracing::info!(subjects = subjects.len(), "Subject index built");

        let mut builder = ReportBuilder::new(&report_config.title);
        let measurement_stream = self
            .correlator
            .correlate(
                &manifest.output,
                &report_config.measurement_type,
                &token,
                |resource| {
                    builder.add_measurement(&resource, &subjects);
                },
            )
            .await;

        let report = builder.finish(Utc::now());
        let report_text = report.text();

        let message = ReportMessage {
            from: self.config.notification.from.clone(),
            to: self.config.notification.to.clone(),
            subject: report.subject(&report_config.subject_prefix),
            text: report_text.clone(),
        };

        let (delivered, delivery_detail) = match self.notifier.send(&message).await {
            Ok(ack) => {
                tracing::info!(transport = ack.transport, ack = %ack.detail, "Report delivered");
                (true, Some(ack.detail))
            }
            Err(e) => {
                crate::log_error_with_context!(e, "Report delivery failed");
                (false, Some(e.to_string()))
            }
        };

        let summary = RunSummary {
            started_at,
            duration: start_time.elapsed(),
            manifest_outputs: manifest.output.len(),
            manifest_errors: manifest.error.len(),
            subjects_indexed: subjects.len(),
            subjects_skipped,
            subject_stream,
            measurement_stream,
            counts: report.counts,
            report_text,
            delivered,
            delivery_detail,
        };

        summary.log_summary();
        Ok(summary)
    }
}
