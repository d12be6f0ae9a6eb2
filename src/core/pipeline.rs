//! Pipeline domain model

use crate::core::{
    context::RenderContext,
    module::PipelineModule,
    options::{FlyOption, FlyOptions},
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// A pipeline module evaluated for one environment
///
/// Every optional attribute keeps its absence: `None` means the documented
/// default applies.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    /// The loaded module this definition was evaluated from
    pub module: Arc<PipelineModule>,

    /// Context the attributes were evaluated with
    pub context: RenderContext,

    /// Appended to the pipeline name (`-{suffix}`)
    pub suffix: Option<String>,

    /// Environments the pipeline may be set in (all discovered when absent)
    pub allowed_environments: Option<Vec<String>>,

    /// Concourse target (settings target when absent)
    pub target: Option<String>,

    /// Option overrides (none when absent)
    pub options: Option<Vec<FlyOption>>,
}

impl PipelineDefinition {
    /// Active environment of this definition
    pub fn environment(&self) -> &str {
        self.context.environment().unwrap_or_default()
    }

    /// Pipeline name without the environment prefix
    pub fn final_name(&self) -> String {
        final_name(&self.module.name, self.suffix.as_deref())
    }

    /// Environment-qualified pipeline name
    pub fn run_name(&self) -> String {
        run_name(self.environment(), &self.final_name())
    }

    pub fn target_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.target.as_deref().unwrap_or(default)
    }

    pub fn options_or_empty(&self) -> &[FlyOption] {
        self.options.as_deref().unwrap_or(&[])
    }
}

/// Lower-case a module name and turn underscores into hyphens
pub fn slugify(name: &str) -> String {
    name.replace('_', "-").to_lowercase()
}

/// `slugify(name)`, with `-{suffix}` when the suffix is non-empty
pub fn final_name(name: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) if !suffix.is_empty() => format!("{}-{}", slugify(name), suffix),
        _ => slugify(name),
    }
}

pub fn run_name(environment: &str, final_name: &str) -> String {
    format!("{}-{}", environment, final_name)
}

/// Everything decided for one pipeline in one environment
///
/// Built once per iteration of the driver and dropped after the artifact is
/// cleaned up.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedRun {
    /// Module name the run came from
    pub pipeline: String,

    /// Path of the module file
    pub origin: PathBuf,

    pub environment: String,

    /// Environment-qualified pipeline name
    pub run_name: String,

    pub target: String,

    pub options: FlyOptions,

    /// Where the rendered document is written
    pub artifact: PathBuf,
}
