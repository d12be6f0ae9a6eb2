//! Pipeline checks - declarative expectations against rendered documents
//!
//! `pipelines_test_dir/<name>_test.yml` lists cases; each case renders the
//! pipeline for one environment in memory and checks values by dotted path.

use crate::{
    core::{
        context::lookup_segment,
        module::{load_module, ModuleError},
        settings::Settings,
    },
    execution::render::evaluate,
};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

const TEST_FILE_SUFFIX: &str = "_test";

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Check file {} is invalid: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckFile {
    cases: Vec<CheckCase>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckCase {
    environment: String,
    #[serde(default)]
    expect: Vec<Expectation>,
}

/// One expectation; with no assertion it only requires the path to exist
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Expectation {
    path: String,
    equals: Option<Value>,
    length: Option<usize>,
    #[serde(default)]
    absent: bool,
}

impl Expectation {
    fn check(&self, document: &Value) -> Result<(), String> {
        let found = lookup_path(document, &self.path);
        if self.absent {
            return match found {
                None => Ok(()),
                Some(_) => Err(format!("{} is present", self.path)),
            };
        }

        let value = found.ok_or_else(|| format!("{} is missing", self.path))?;
        if let Some(expected) = &self.equals {
            if value != expected {
                return Err(format!(
                    "{} is {}, expected {}",
                    self.path,
                    inline(value),
                    inline(expected)
                ));
            }
        }
        if let Some(expected) = self.length {
            let actual = match value {
                Value::Sequence(items) => items.len(),
                Value::Mapping(map) => map.len(),
                Value::String(s) => s.chars().count(),
                other => return Err(format!("{} has no length ({})", self.path, inline(other))),
            };
            if actual != expected {
                return Err(format!("{} has length {}, expected {}", self.path, actual, expected));
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        if self.absent {
            format!("{} is absent", self.path)
        } else if let Some(expected) = &self.equals {
            format!("{} == {}", self.path, inline(expected))
        } else if let Some(length) = self.length {
            format!("len({}) == {}", self.path, length)
        } else {
            format!("{} is present", self.path)
        }
    }
}

/// Outcome of a single check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum CheckOutcome {
    Passed,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub environment: String,
    pub description: String,
    pub outcome: CheckOutcome,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.outcome == CheckOutcome::Passed
    }
}

/// Checks of one pipeline
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub pipeline: String,

    /// None when the pipeline has no check file
    pub test_file: Option<PathBuf>,

    pub results: Vec<CheckResult>,

    /// Set when the checks could not run at all
    pub error: Option<String>,
}

impl CheckReport {
    pub fn has_checks(&self) -> bool {
        self.test_file.is_some()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.passed()).count()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failed() == 0
    }
}

/// Run the checks of one pipeline
pub fn run_checks(name: &str, settings: &Settings) -> Result<CheckReport, CheckError> {
    let module = Arc::new(load_module(name, &settings.pipelines_dir)?);
    let test_file = settings.test_file_for(&module.name);
    if !test_file.is_file() {
        debug!("No check file for {} at {}", module.name, test_file.display());
        return Ok(CheckReport {
            pipeline: module.name.clone(),
            test_file: None,
            results: Vec::new(),
            error: None,
        });
    }

    let file = read_check_file(&test_file)?;
    let mut results = Vec::new();
    for case in &file.cases {
        let document = module
            .definition(&case.environment)
            .map_err(|e| e.to_string())
            .and_then(|definition| evaluate(&definition).map_err(|e| e.to_string()));

        let document = match document {
            Ok(document) => Value::Mapping(document),
            Err(reason) => {
                results.push(CheckResult {
                    environment: case.environment.clone(),
                    description: "render".to_string(),
                    outcome: CheckOutcome::Failed(reason),
                });
                continue;
            }
        };

        for expectation in &case.expect {
            let outcome = match expectation.check(&document) {
                Ok(()) => CheckOutcome::Passed,
                Err(reason) => CheckOutcome::Failed(reason),
            };
            results.push(CheckResult {
                environment: case.environment.clone(),
                description: expectation.describe(),
                outcome,
            });
        }
    }

    Ok(CheckReport {
        pipeline: module.name.clone(),
        test_file: Some(test_file),
        results,
        error: None,
    })
}

/// Run every check file in the pipeline tests directory
pub fn run_all_checks(settings: &Settings) -> Result<Vec<CheckReport>, CheckError> {
    let dir = &settings.pipelines_test_dir;
    if !dir.is_dir() {
        warn!("Pipeline tests directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|source| CheckError::Read {
        path: dir.clone(),
        source,
    })?;
    for entry in entries {
        let path = entry
            .map_err(|source| CheckError::Read {
                path: dir.clone(),
                source,
            })?
            .path();
        if path.extension().and_then(|e| e.to_str()) != Some("yml") {
            continue;
        }
        if let Some(name) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_suffix(TEST_FILE_SUFFIX))
        {
            names.push(name.to_string());
        }
    }
    names.sort();

    Ok(names
        .iter()
        .map(|name| {
            run_checks(name, settings).unwrap_or_else(|e| CheckReport {
                pipeline: name.clone(),
                test_file: Some(settings.test_file_for(name)),
                results: Vec::new(),
                error: Some(e.to_string()),
            })
        })
        .collect())
}

fn read_check_file(path: &Path) -> Result<CheckFile, CheckError> {
    let content = std::fs::read_to_string(path).map_err(|source| CheckError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| CheckError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn lookup_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| lookup_segment(current, segment))
}

fn inline(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
    }
}
