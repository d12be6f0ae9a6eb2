//! Pipeline module loading
//!
//! A pipeline module is a YAML file directly inside the pipelines directory.
//! Loading inspects it once and builds a typed record of its attributes;
//! their values are evaluated later against a [`RenderContext`].

use crate::core::{
    context::RenderContext,
    options::{find_conflict, FlyOption},
    pipeline::PipelineDefinition,
    template::{self, TemplateError},
};
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Sub-directory of the pipelines directory holding shared fragments
pub const LIB_DIR: &str = "lib";

pub const ENTRY_POINT: &str = "pipeline_config";
const MODULE_KEYS: [&str; 7] = [
    ENTRY_POINT,
    "suffix",
    "allowed_environments",
    "target",
    "options",
    "imports",
    "vars",
];
const FRAGMENT_KEYS: [&str; 2] = ["imports", "vars"];

/// Errors raised while resolving a pipeline module
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Pipeline {name}.yml does not exist within the {} directory", dir.display())]
    NotFound { name: String, dir: PathBuf },

    #[error("Pipeline {pipeline} imports {dependency}, which does not exist within the {} directory", dir.display())]
    MissingDependency {
        pipeline: String,
        dependency: String,
        dir: PathBuf,
    },

    #[error("Pipeline: {} - contains a syntax error: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Pipeline: {} - {message}", path.display())]
    InvalidAttribute { path: PathBuf, message: String },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ModuleError {
    /// Whether the module (or one of its imports) could not be found
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModuleError::NotFound { .. } | ModuleError::MissingDependency { .. })
    }
}

/// A loaded pipeline module
#[derive(Debug, Clone)]
pub struct PipelineModule {
    /// Module name (file stem)
    pub name: String,

    /// Path of the module file
    pub path: PathBuf,

    /// Raw file content, for locating faults
    source: String,

    entry_point: Option<Value>,
    suffix: Option<String>,
    allowed_environments: Option<Vec<String>>,
    target: Option<String>,
    options: Option<Vec<FlyOption>>,

    /// Variables from imports, overridden by the module's own
    vars: Mapping,
}

impl PipelineModule {
    /// Parse a module from its source text
    ///
    /// `pipelines_dir` is used to resolve `imports`.
    pub fn from_source(
        name: &str,
        path: &Path,
        source: &str,
        pipelines_dir: &Path,
    ) -> Result<Self, ModuleError> {
        let root = parse_root(path, source, &MODULE_KEYS)?;

        let invalid = |message: String| ModuleError::InvalidAttribute {
            path: path.to_path_buf(),
            message,
        };

        let suffix = optional_string(&root, "suffix").map_err(invalid)?;
        let target = optional_string(&root, "target").map_err(invalid)?;
        let allowed_environments = optional_strings(&root, "allowed_environments").map_err(invalid)?;
        let options = optional_options(&root).map_err(invalid)?;
        let imports = optional_strings(&root, "imports").map_err(invalid)?.unwrap_or_default();
        let own_vars = optional_mapping(&root, "vars").map_err(invalid)?.unwrap_or_default();

        let mut vars = Mapping::new();
        let mut visited = HashSet::new();
        collect_imports(name, &imports, pipelines_dir, &mut visited, &mut vars)?;
        for (key, value) in own_vars {
            vars.insert(key, value);
        }

        Ok(PipelineModule {
            name: name.to_string(),
            path: path.to_path_buf(),
            source: source.to_string(),
            entry_point: root.get(ENTRY_POINT).cloned(),
            suffix,
            allowed_environments,
            target,
            options,
            vars,
        })
    }

    /// The config-producing template (`pipeline_config`)
    pub fn entry_point(&self) -> Option<&Value> {
        self.entry_point.as_ref()
    }

    pub fn vars(&self) -> &Mapping {
        &self.vars
    }

    /// Context for rendering this module in one environment
    pub fn context_for(&self, environment: &str) -> RenderContext {
        RenderContext::for_environment(&self.name, environment, self.vars.clone())
    }

    /// Declared allow-list, evaluated without an active environment
    pub fn allowed_environments(&self) -> Result<Option<Vec<String>>, ModuleError> {
        let ctx = RenderContext::for_resolution(&self.name, self.vars.clone());
        match &self.allowed_environments {
            None => Ok(None),
            Some(templates) => templates
                .iter()
                .map(|t| template::render_str(t, &ctx).map_err(|e| self.attribute_error("allowed_environments", e)))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
        }
    }

    /// Evaluate every attribute for one environment
    pub fn definition(self: &Arc<Self>, environment: &str) -> Result<PipelineDefinition, ModuleError> {
        let context = self.context_for(environment);
        let render = |key: &str, value: &Option<String>| -> Result<Option<String>, ModuleError> {
            value
                .as_deref()
                .map(|t| template::render_str(t, &context).map_err(|e| self.attribute_error(key, e)))
                .transpose()
        };

        let suffix = render("suffix", &self.suffix)?.filter(|s| !s.is_empty());
        let target = render("target", &self.target)?;
        let allowed_environments = self.allowed_environments()?;

        debug!(
            "Evaluated pipeline {} for {}: suffix={:?} target={:?}",
            self.name, environment, suffix, target
        );

        Ok(PipelineDefinition {
            module: Arc::clone(self),
            context,
            suffix,
            allowed_environments,
            target,
            options: self.options.clone(),
        })
    }

    /// Find the source line a template of the top-level `key` came from (1-based)
    ///
    /// Lines inside the `key:` block are searched first, so the same text
    /// elsewhere in the file (in `vars`, say) is not reported.
    pub fn locate(&self, key: &str, template: &str) -> Option<(usize, String)> {
        let needle = template.lines().find(|line| !line.trim().is_empty())?.trim();
        let lines: Vec<&str> = self.source.lines().collect();
        let in_block = block_range(&lines, key).and_then(|mut range| range.find(|&i| lines[i].contains(needle)));
        let index = in_block.or_else(|| lines.iter().position(|line| line.contains(needle)))?;
        Some((index + 1, lines[index].trim().to_string()))
    }

    fn attribute_error(&self, key: &str, err: TemplateError) -> ModuleError {
        let location = self
            .locate(key, err.template())
            .map(|(line, _)| format!(" (line {})", line))
            .unwrap_or_default();
        ModuleError::InvalidAttribute {
            path: self.path.clone(),
            message: format!("{} could not be evaluated{}: {}", key, location, err),
        }
    }
}

/// Load the module called `name` from the pipelines directory
///
/// A trailing `.yml`/`.yaml` on the name is accepted.
pub fn load_module(name: &str, pipelines_dir: &Path) -> Result<PipelineModule, ModuleError> {
    let name = name
        .strip_suffix(".yml")
        .or_else(|| name.strip_suffix(".yaml"))
        .unwrap_or(name);

    let path = find_yaml(pipelines_dir, name).ok_or_else(|| ModuleError::NotFound {
        name: name.to_string(),
        dir: pipelines_dir.to_path_buf(),
    })?;

    debug!("Loading pipeline module {} from {}", name, path.display());
    let source = std::fs::read_to_string(&path).map_err(|source| ModuleError::Io {
        path: path.clone(),
        source,
    })?;
    PipelineModule::from_source(name, &path, &source, pipelines_dir)
}

/// Names of every module in the pipelines directory, sorted
pub fn discover_modules(pipelines_dir: &Path) -> Result<Vec<String>, ModuleError> {
    let entries = std::fs::read_dir(pipelines_dir).map_err(|source| ModuleError::Io {
        path: pipelines_dir.to_path_buf(),
        source,
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| ModuleError::Io {
                path: pipelines_dir.to_path_buf(),
                source,
            })?
            .path();
        let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yml" | "yaml"));
        if path.is_file() && is_yaml {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    names.dedup();
    Ok(names)
}

fn find_yaml(dir: &Path, name: &str) -> Option<PathBuf> {
    // names with separators would escape the directory
    if name.is_empty() || name.contains(|c: char| c == '/' || c == '\\') || name == ".." {
        return None;
    }
    ["yml", "yaml"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", name, ext)))
        .find(|path| path.is_file())
}

fn parse_root(path: &Path, source: &str, allowed_keys: &[&str]) -> Result<Mapping, ModuleError> {
    let value: Value = serde_yaml::from_str(source).map_err(|source| ModuleError::Load {
        path: path.to_path_buf(),
        source,
    })?;

    let root = match value {
        Value::Mapping(root) => root,
        Value::Null => Mapping::new(),
        _ => {
            return Err(ModuleError::InvalidAttribute {
                path: path.to_path_buf(),
                message: "the top level must be a mapping".to_string(),
            })
        }
    };

    for key in root.keys() {
        let known = key.as_str().is_some_and(|k| allowed_keys.contains(&k));
        if !known {
            return Err(ModuleError::InvalidAttribute {
                path: path.to_path_buf(),
                message: format!(
                    "unknown attribute {} (expected one of: {})",
                    serde_yaml::to_string(key).unwrap_or_default().trim(),
                    allowed_keys.join(", ")
                ),
            });
        }
    }
    Ok(root)
}

fn collect_imports(
    pipeline: &str,
    imports: &[String],
    pipelines_dir: &Path,
    visited: &mut HashSet<String>,
    vars: &mut Mapping,
) -> Result<(), ModuleError> {
    let lib_dir = pipelines_dir.join(LIB_DIR);
    for dependency in imports {
        if !visited.insert(dependency.clone()) {
            continue;
        }

        let path = find_yaml(&lib_dir, dependency).ok_or_else(|| ModuleError::MissingDependency {
            pipeline: pipeline.to_string(),
            dependency: dependency.clone(),
            dir: lib_dir.clone(),
        })?;
        let source = std::fs::read_to_string(&path).map_err(|source| ModuleError::Io {
            path: path.clone(),
            source,
        })?;
        let root = parse_root(&path, &source, &FRAGMENT_KEYS)?;
        let invalid = |message: String| ModuleError::InvalidAttribute {
            path: path.clone(),
            message,
        };

        let nested = optional_strings(&root, "imports").map_err(invalid)?.unwrap_or_default();
        collect_imports(pipeline, &nested, pipelines_dir, visited, vars)?;

        let fragment_vars = optional_mapping(&root, "vars").map_err(invalid)?.unwrap_or_default();
        for (key, value) in fragment_vars {
            vars.insert(key, value);
        }
    }
    Ok(())
}

/// `null` counts as absent
fn present<'a>(root: &'a Mapping, key: &str) -> Option<&'a Value> {
    root.get(key).filter(|value| !value.is_null())
}

fn optional_string(root: &Mapping, key: &str) -> Result<Option<String>, String> {
    match present(root, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("the {} attribute must be a string", key)),
    }
}

fn optional_strings(root: &Mapping, key: &str) -> Result<Option<Vec<String>>, String> {
    let error = || format!("the {} attribute must be a list of strings", key);
    match present(root, key) {
        None => Ok(None),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(error))
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(error()),
    }
}

fn optional_mapping(root: &Mapping, key: &str) -> Result<Option<Mapping>, String> {
    match present(root, key) {
        None => Ok(None),
        Some(Value::Mapping(map)) => Ok(Some(map.clone())),
        Some(_) => Err(format!("the {} attribute must be a mapping", key)),
    }
}

/// Lines of the top-level `key:` block, header included
fn block_range(lines: &[&str], key: &str) -> Option<Range<usize>> {
    let header = format!("{}:", key);
    let start = lines.iter().position(|line| line.starts_with(&header))?;
    let end = lines[start + 1..]
        .iter()
        .position(|line| starts_top_level_key(line))
        .map_or(lines.len(), |offset| start + 1 + offset);
    Some(start..end)
}

fn starts_top_level_key(line: &str) -> bool {
    line.chars()
        .next()
        .is_some_and(|c| !c.is_whitespace() && c != '#' && c != '-')
}

fn optional_options(root: &Mapping) -> Result<Option<Vec<FlyOption>>, String> {
    let Some(names) = optional_strings(root, "options")? else {
        return Ok(None);
    };
    let options = names
        .iter()
        .map(|name| name.parse::<FlyOption>())
        .collect::<Result<Vec<_>, _>>()?;
    if let Some((first, second)) = find_conflict(&options) {
        return Err(format!("options lists both {} and {}", first, second));
    }
    Ok(Some(options))
}
