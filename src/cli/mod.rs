//! Command-line interface

pub mod commands;
pub mod output;

use crate::core::settings::SETTINGS_FILE;
use clap::{Parser, Subcommand};
use commands::{GenerateCommand, InitCommand, SetCommand, TestCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Pipelines-as-code for Concourse
#[derive(Debug, Parser, Clone)]
#[command(name = "cck")]
#[command(version)]
#[command(about = "Render Concourse pipelines per environment and set them with fly", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the settings file
    #[arg(long, global = true, default_value = SETTINGS_FILE)]
    pub settings: PathBuf,

    /// fly executable to use
    #[arg(long, global = true, default_value = "fly")]
    pub fly: String,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Create a concourse-kit managed directory
    Init(InitCommand),

    /// Render a pipeline for one environment and keep the file
    GeneratePipeline(GenerateCommand),

    /// Run the checks written for a pipeline
    TestPipeline(TestCommand),

    /// Plan or set pipelines with fly
    SetPipeline(SetCommand),
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

    /// Log filter used when `RUST_LOG` is not set
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}
