//! Render pipeline - turns a pipeline definition into a document on disk

use crate::core::{module::ENTRY_POINT, pipeline::PipelineDefinition, template, template::TemplateError};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while rendering one pipeline in one environment
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Pipeline: {} - pipeline_config must produce a mapping, found {found}", path.display())]
    ConfigShape { path: PathBuf, found: &'static str },

    #[error("Pipeline: {} - has no pipeline_config", path.display())]
    MissingEntryPoint { path: PathBuf },

    #[error("Pipeline: {} - failed for environment {environment} at {frame}: {source}", path.display())]
    UserConfig {
        path: PathBuf,
        environment: String,
        /// `line N: <excerpt>` of the faulting template
        frame: String,
        #[source]
        source: TemplateError,
    },

    #[error("Failed to serialize pipeline {pipeline}: {source}")]
    Serialize {
        pipeline: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Evaluate the entry point of a definition into the document root
pub fn evaluate(definition: &PipelineDefinition) -> Result<Mapping, RenderError> {
    let module = &definition.module;
    let entry_point = module.entry_point().ok_or_else(|| RenderError::MissingEntryPoint {
        path: module.path.clone(),
    })?;

    let rendered = template::render_value(entry_point, &definition.context).map_err(|source| {
        let frame = match module.locate(ENTRY_POINT, source.template()) {
            Some((line, excerpt)) => format!("line {}: {}", line, excerpt),
            None => "an unknown line".to_string(),
        };
        RenderError::UserConfig {
            path: module.path.clone(),
            environment: definition.environment().to_string(),
            frame,
            source,
        }
    })?;

    match rendered {
        Value::Mapping(document) => Ok(document),
        other => Err(RenderError::ConfigShape {
            path: module.path.clone(),
            found: kind_of(&other),
        }),
    }
}

/// Render a definition to `output`
///
/// The returned guard removes the file when dropped unless it is kept.
pub fn render(definition: &PipelineDefinition, output: &Path) -> Result<RenderedArtifact, RenderError> {
    let document = evaluate(definition)?;
    let text = serde_yaml::to_string(&document).map_err(|source| RenderError::Serialize {
        pipeline: definition.module.name.clone(),
        source,
    })?;

    std::fs::write(output, text).map_err(|source| RenderError::Write {
        path: output.to_path_buf(),
        source,
    })?;
    debug!("Rendered {} for {} to {}", definition.module.name, definition.environment(), output.display());

    Ok(RenderedArtifact {
        path: output.to_path_buf(),
        armed: true,
    })
}

/// A rendered document on disk
#[derive(Debug)]
pub struct RenderedArtifact {
    path: PathBuf,
    armed: bool,
}

impl RenderedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now
    pub fn remove(mut self) -> std::io::Result<()> {
        self.armed = false;
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Leave the file in place and return its path
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for RenderedArtifact {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
