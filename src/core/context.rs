//! Render context - the active environment and variables for one evaluation
//!
//! A context is built for each (pipeline, environment) pair and passed
//! explicitly to template evaluation. Nothing is stored in process-wide state.

use serde_yaml::{Mapping, Value};

/// Name under which the active environment is exposed to `env.` lookups
pub const ENVIRONMENT_VAR: &str = "ENVIRONMENT";

/// Values a pipeline definition can read while it is evaluated
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Active environment (None while resolving which environments apply)
    environment: Option<String>,

    /// Name of the pipeline module being evaluated
    pipeline: String,

    /// Variables from the module and its imports
    vars: Mapping,
}

impl RenderContext {
    /// Context for rendering a pipeline in one environment
    pub fn for_environment(pipeline: &str, environment: &str, vars: Mapping) -> Self {
        Self {
            environment: Some(environment.to_string()),
            pipeline: pipeline.to_string(),
            vars,
        }
    }

    /// Context used before any environment is active
    pub fn for_resolution(pipeline: &str, vars: Mapping) -> Self {
        Self {
            environment: None,
            pipeline: pipeline.to_string(),
            vars,
        }
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Look up an environment-style variable
    ///
    /// `ENVIRONMENT` is answered from the context; any other name falls
    /// through to the process environment.
    pub fn env(&self, name: &str) -> Option<String> {
        if name == ENVIRONMENT_VAR {
            self.environment.clone()
        } else {
            std::env::var(name).ok()
        }
    }

    /// Look up a variable by dotted path (`a.b.0.c`)
    pub fn var(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.vars.get(first)?;
        for segment in segments {
            current = lookup_segment(current, segment)?;
        }
        Some(current)
    }
}

/// Step one segment into a mapping key or a sequence index
pub fn lookup_segment<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Mapping(map) => map.get(segment),
        Value::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Tagged(tagged) => lookup_segment(&tagged.value, segment),
        _ => None,
    }
}
