//! CLI command definitions

use clap::Args;
use std::path::PathBuf;

/// Create a managed directory
#[derive(Debug, Args, Clone)]
pub struct InitCommand {
    /// Directory to initialize
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
}

/// Render a pipeline for one environment
#[derive(Debug, Args, Clone)]
pub struct GenerateCommand {
    /// Pipeline module name
    #[arg(short, long)]
    pub name: String,

    /// Environment to render for (the first one is used)
    #[arg(short, long, required = true)]
    pub env: Vec<String>,
}

impl GenerateCommand {
    pub fn environment(&self) -> &str {
        self.env.first().map(String::as_str).unwrap_or_default()
    }
}

/// Run pipeline checks
#[derive(Debug, Args, Clone)]
pub struct TestCommand {
    /// Pipeline module name
    #[arg(short, long, conflicts_with = "all", required_unless_present = "all")]
    pub name: Option<String>,

    /// Check every pipeline with a check file
    #[arg(long)]
    pub all: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Plan or set pipelines
#[derive(Debug, Args, Clone)]
pub struct SetCommand {
    /// Pipeline module name
    #[arg(short, long, conflicts_with = "all", required_unless_present = "all")]
    pub name: Option<String>,

    /// Process every pipeline in the pipelines directory
    #[arg(long)]
    pub all: bool,

    /// Environments to include; prefix with ! to exclude
    #[arg(short, long, value_delimiter = ',')]
    pub env: Vec<String>,

    /// Validate only, without changing Concourse
    #[arg(long)]
    pub plan: bool,

    /// Output the report in JSON format
    #[arg(long)]
    pub json: bool,

    /// Skip the pause before setting every pipeline
    #[arg(short, long)]
    pub yes: bool,
}
