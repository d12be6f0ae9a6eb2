//! Run planning - decides what one pipeline does in each environment
//!
//! Plan and apply mode both go through [`PipelinePlan`], so a plan shows
//! exactly the names, targets and options an apply would use.

use crate::core::{
    environment::{discover_environments, resolve_environments, EnvironmentRequest, EnvironmentResolution},
    module::{load_module, ModuleError, PipelineModule},
    options::reconcile,
    pipeline::{PipelineDefinition, ResolvedRun},
    settings::Settings,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised while preparing a pipeline
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("Failed to list environments in {}: {source}", path.display())]
    Environments {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A loaded pipeline together with the environments it applies to
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    pub module: Arc<PipelineModule>,
    pub resolution: EnvironmentResolution,
}

impl PipelinePlan {
    /// Load `name` and resolve the environments for `request`
    pub fn prepare(name: &str, request: &EnvironmentRequest, settings: &Settings) -> Result<Self, PlanError> {
        let module = Arc::new(load_module(name, &settings.pipelines_dir)?);
        let discovered = discover_environments(&settings.environments_dir).map_err(|source| PlanError::Environments {
            path: settings.environments_dir.clone(),
            source,
        })?;
        let allowed = module.allowed_environments()?;
        let resolution = resolve_environments(allowed.as_deref(), request, &discovered, &settings.ignored_environments);
        debug!("Pipeline {} applies to {:?}", module.name, resolution.environments);
        Ok(PipelinePlan { module, resolution })
    }

    pub fn name(&self) -> &str {
        &self.module.name
    }

    pub fn environments(&self) -> &[String] {
        &self.resolution.environments
    }

    /// Evaluate the pipeline for one environment and decide its run
    pub fn resolve_run(
        &self,
        environment: &str,
        settings: &Settings,
        work_dir: &Path,
    ) -> Result<(PipelineDefinition, ResolvedRun), ModuleError> {
        let definition = self.module.definition(environment)?;
        let run = resolved_run(&definition, settings, work_dir);
        Ok((definition, run))
    }
}

/// Combine a definition with the settings defaults
pub fn resolved_run(definition: &PipelineDefinition, settings: &Settings, work_dir: &Path) -> ResolvedRun {
    let run_name = definition.run_name();
    ResolvedRun {
        pipeline: definition.module.name.clone(),
        origin: definition.module.path.clone(),
        environment: definition.environment().to_string(),
        target: definition.target_or(&settings.target).to_string(),
        options: reconcile(&settings.default_options, definition.options_or_empty()),
        artifact: work_dir.join(format!("{}.yml", run_name)),
        run_name,
    }
}
