//! Schedule command implementation
//!
//! This module implements the `schedule` command: a long-running process that
//! fires one report run per day at `schedule.cron` (UTC) until SIGINT/SIGTERM.

use super::{exit_code_for, EXIT_CONFIG, EXIT_SUCCESS};
use crate::config::load_config;
use crate::core::report::ReportCoordinator;
use crate::core::schedule::{run_scheduled, Schedule};
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the schedule command
#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Run once immediately before waiting for the first scheduled time
    #[arg(long)]
    pub run_now: bool,
}

impl ScheduleArgs {
    /// Execute the schedule command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting schedule command");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(EXIT_CONFIG);
            }
        };

        let schedule: Schedule = match config.schedule.cron.parse() {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Invalid schedule.cron '{}': {e}", config.schedule.cron);
                return Ok(EXIT_CONFIG);
            }
        };

        let coordinator = match ReportCoordinator::new(config, shutdown_signal.clone()) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create report coordinator");
                eprintln!("Failed to initialize scheduler: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        println!("⏰ Scheduling daily report at {} UTC ({schedule})", schedule.time());
        println!("   Press Ctrl+C to stop");
        println!();

        if self.run_now {
            match coordinator.run().await {
                Ok(summary) => super::run::print_summary(&summary),
                Err(e) => crate::log_error_with_context!(e, "Initial run failed"),
            }
        }

        run_scheduled(
            move || {
                let coordinator = Arc::clone(&coordinator);
                async move { coordinator.run().await }
            },
            schedule,
            shutdown_signal,
        )
        .await;

        println!("👋 Scheduler stopped");
        Ok(EXIT_SUCCESS)
    }
}
