//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for labwatch using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// labwatch - FHIR bulk-export lab report generator
#[derive(Parser, Debug)]
#[command(name = "labwatch")]
#[command(version, about, long_about = None)]
#[command(author = "Labwatch Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "labwatch.toml", env = "LABWATCH_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "LABWATCH_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one export and deliver the lab report
    Run(commands::run::RunArgs),

    /// Run the report on the configured daily schedule until stopped
    Schedule(commands::schedule::ScheduleArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
