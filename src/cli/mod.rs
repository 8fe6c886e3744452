//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Launch CI/CD pipelines through the web console and wait for the outcome
#[derive(Debug, Parser, Clone)]
#[command(name = "pipeline-launcher")]
#[command(author = "Pipeline Launcher Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Launches CI/CD pipeline runs through the web console and reports the outcome", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to launcher configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Launch pipelines and monitor them to completion
    Run(RunCommand),

    /// Validate the configuration file
    Validate(ValidateCommand),

    /// List configured environments and pipelines
    List(ListCommand),

    /// Show past batch reports
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
