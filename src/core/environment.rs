//! Environment discovery and resolution
//!
//! Decides which environments one pipeline run applies to, from the
//! pipeline's allow-list (or every discovered environment), the caller's
//! `--env` requests and the global ignore-list.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::{debug, warn};

/// Shared configuration directory, never a deployable environment
pub const COMMON_ENVIRONMENT: &str = "common";

/// Prefix that turns a requested environment into an exclusion
pub const NEGATION_MARKER: char = '!';

/// What the caller asked for with `--env`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentRequest {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl EnvironmentRequest {
    /// Split tokens into inclusions and `!`-prefixed exclusions
    pub fn parse<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut request = EnvironmentRequest::default();
        for token in tokens {
            let token = token.as_ref().trim();
            match token.strip_prefix(NEGATION_MARKER) {
                Some(negated) => {
                    let negated = negated.trim();
                    if !negated.is_empty() {
                        request.exclude.push(negated.to_string());
                    }
                }
                None if !token.is_empty() => request.include.push(token.to_string()),
                None => {}
            }
        }
        request
    }

    pub fn includes(&self) -> &[String] {
        &self.include
    }

    pub fn excludes(&self) -> &[String] {
        &self.exclude
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

}

/// Outcome of resolving environments for one pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentResolution {
    /// Environments to process, in base-set order
    pub environments: Vec<String>,

    /// Requested environments outside the base set (dropped)
    pub unknown: Vec<String>,

    /// Requested environments removed by the ignore-list
    pub ignored: Vec<String>,
}

/// Names of the sub-directories of the environments directory, sorted
///
/// Only one level deep. Names come from the file system entries themselves,
/// so no path-separator handling is involved.
pub fn discover_environments(environments_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(environments_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Last component of a path-like environment entry
///
/// Accepts both `/` and `\` so allow-lists written on any platform work.
pub fn environment_name(entry: &str) -> &str {
    entry
        .trim_end_matches(&['/', '\\'][..])
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or(entry)
}

/// Resolve the environments a pipeline applies to
///
/// 1. The base set is `allowed` when declared, otherwise `discovered`.
/// 2. Plain requests outside the base set are dropped and reported.
/// 3. Negated requests, the ignore-list and `common` are removed.
/// 4. When a requested environment survived step 2, only those remain.
pub fn resolve_environments(
    allowed: Option<&[String]>,
    request: &EnvironmentRequest,
    discovered: &[String],
    ignored: &BTreeSet<String>,
) -> EnvironmentResolution {
    let mut seen = HashSet::new();
    let base: Vec<String> = allowed
        .unwrap_or(discovered)
        .iter()
        .map(|entry| environment_name(entry).to_string())
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect();

    let mut unknown = Vec::new();
    let mut explicit = HashSet::new();
    for name in request.includes() {
        if seen.contains(name) {
            explicit.insert(name.as_str());
        } else if !unknown.contains(name) {
            warn!("Requested environment {} is not available and will be ignored", name);
            unknown.push(name.clone());
        }
    }

    let mut negated: HashSet<&str> = request.excludes().iter().map(String::as_str).collect();
    negated.extend(ignored.iter().map(String::as_str));
    negated.insert(COMMON_ENVIRONMENT);

    let ignored_requests: Vec<String> = request
        .includes()
        .iter()
        .filter(|name| explicit.contains(name.as_str()))
        .filter(|name| ignored.contains(*name) || name.as_str() == COMMON_ENVIRONMENT)
        .cloned()
        .collect();

    let narrow = !explicit.is_empty();
    let environments: Vec<String> = base
        .into_iter()
        .filter(|name| !negated.contains(name.as_str()))
        .filter(|name| !narrow || explicit.contains(name.as_str()))
        .collect();

    debug!("Resolved environments: {:?}", environments);

    EnvironmentResolution {
        environments,
        unknown,
        ignored: ignored_requests,
    }
}
