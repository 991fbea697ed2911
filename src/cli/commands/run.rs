//! Run command implementation
//!
//! This module implements the `run` command: one export, one report, one
//! delivery.

use super::{exit_code_for, EXIT_CONFIG, EXIT_ENTRY_FAILURES, EXIT_SUCCESS};
use crate::config::load_config;
use crate::core::report::{ReportCoordinator, ReportCounts, RunSummary};
use clap::Args;
use tokio::sync::watch;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Dry run mode - print the report instead of mailing it
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting run command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        if config.application.dry_run {
            println!("🔍 DRY RUN MODE - The report will be printed, not mailed");
            println!();
        }

        tracing::info!("Creating report coordinator");
        let coordinator = match ReportCoordinator::new(config, shutdown_signal) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create report coordinator");
                eprintln!("Failed to initialize run: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        println!("🚀 Starting report run...");
        println!();

        let summary = match coordinator.run().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Report run failed");
                eprintln!("Report run failed: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        print_summary(&summary);

        if summary.is_successful() {
            println!("✅ Report run completed successfully");
            Ok(EXIT_SUCCESS)
        } else {
            println!(
                "⚠️  Report run completed with {} failed manifest entries",
                summary.entry_failures()
            );
            Ok(EXIT_ENTRY_FAILURES)
        }
    }
}

/// Print the run summary block shared by `run` and `schedule`
pub(crate) fn print_summary(summary: &RunSummary) {
    println!();
    println!("📊 Report Summary:");
    println!("  Manifest Files: {}", summary.manifest_outputs);
    println!("  Subjects Indexed: {}", summary.subjects_indexed);
    println!("  Measurements: {}", summary.measurement_stream.records());
    for (label, count) in disposition_lines(&summary.counts) {
        println!("  {label}: {count}");
    }
    println!(
        "  Malformed Lines: {}",
        summary.subject_stream.malformed() + summary.measurement_stream.malformed()
    );
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!(
        "  Delivered: {}",
        if summary.delivered { "yes" } else { "no" }
    );
    if let Some(detail) = &summary.delivery_detail {
        println!("  Delivery: {detail}");
    }

    let failed: Vec<_> = summary
        .subject_stream
        .failed_entries()
        .chain(summary.measurement_stream.failed_entries())
        .collect();
    if !failed.is_empty() {
        println!();
        println!("  ⚠️  Failed Manifest Entries:");
        for entry in failed {
            let reason = entry
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            println!("    - {} ({}): {}", entry.url, entry.record_type, reason);
        }
    }
    println!();
}

fn disposition_lines(counts: &ReportCounts) -> [(&'static str, u64); 5] {
    [
        ("Abnormal", counts.abnormal),
        ("Normal", counts.normal),
        ("Undetermined (No Reference Range)", counts.undetermined),
        ("Missing Subject Reference", counts.missing_subject_reference),
        ("Unresolved Subject", counts.unresolved_subject),
    ]
}
