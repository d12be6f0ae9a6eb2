//! Settings loaded from the `.cck.yml` file of a managed directory

use crate::core::options::{FlyOption, OptionPair};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the settings file that marks a managed directory
pub const SETTINGS_FILE: &str = ".cck.yml";

/// Contents written by `cck init`
pub const DEFAULT_SETTINGS: &str = r#"# The default concourse target to use
target: concourse

# When setting a pipeline fly will use these options.
# Exactly one option of each pair must be listed:
# - interactive | non-interactive
# - hide-pipeline | expose-pipeline
# - unpause-pipeline | pause-pipeline
default_options:
- interactive
- hide-pipeline
- unpause-pipeline

# The directory to load <pipeline_name>.yml files from.
pipelines_dir: pipelines

# The directory to load <pipeline_name>_test.yml files from.
pipelines_test_dir: pipeline_tests

# Every sub-directory of this directory names a target environment.
environments_dir: target_environments

# Environments that are never set, even when requested with --env.
ignored_environments: []
"#;

/// Errors raised while loading or creating settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("You are not in a concourse-kit managed directory ({} not found). You can run cck init to create one.", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML load failure for {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("default_options lists both {first} and {second}")]
    ConflictingDefaults { first: FlyOption, second: FlyOption },

    #[error("default_options must list one of {first} or {second}")]
    IncompleteDefaults { first: FlyOption, second: FlyOption },

    #[error("{key} points to {}, which does not exist", path.display())]
    MissingDirectory { key: &'static str, path: PathBuf },

    #[error("{} already exists; refusing to overwrite it", path.display())]
    AlreadyInitialized { path: PathBuf },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Settings file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    target: String,
    default_options: Vec<FlyOption>,
    pipelines_dir: PathBuf,
    pipelines_test_dir: PathBuf,
    environments_dir: PathBuf,
    ignored_environments: Vec<String>,
}

/// Validated, immutable settings for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    /// Concourse target used when a pipeline does not name its own
    pub target: String,

    /// Options applied unless a pipeline overrides them
    pub default_options: Vec<FlyOption>,

    pub pipelines_dir: PathBuf,
    pub pipelines_test_dir: PathBuf,
    pub environments_dir: PathBuf,

    /// Environments that never resolve, whatever was requested
    pub ignored_environments: BTreeSet<String>,
}

impl Settings {
    /// Load settings from a file
    ///
    /// Relative directories are resolved against the file's own directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::NotFound { path: path.to_path_buf() });
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml(&content, base_dir).map_err(|err| match err {
            ConfigError::Malformed { source, .. } => ConfigError::Malformed {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate settings from a YAML string
    pub fn from_yaml(yaml: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let file: SettingsFile =
            serde_yaml::from_str(yaml).map_err(|source| ConfigError::Malformed {
                path: PathBuf::from(SETTINGS_FILE),
                source,
            })?;

        validate_default_options(&file.default_options)?;

        let pipelines_dir = resolve_dir(base_dir, &file.pipelines_dir);
        let environments_dir = resolve_dir(base_dir, &file.environments_dir);
        for (key, dir) in [("pipelines_dir", &pipelines_dir), ("environments_dir", &environments_dir)] {
            if !dir.is_dir() {
                return Err(ConfigError::MissingDirectory { key, path: dir.clone() });
            }
        }

        Ok(Settings {
            target: file.target,
            default_options: file.default_options,
            pipelines_dir,
            pipelines_test_dir: resolve_dir(base_dir, &file.pipelines_test_dir),
            environments_dir,
            ignored_environments: file.ignored_environments.into_iter().collect(),
        })
    }

    /// Path of a pipeline's check file
    pub fn test_file_for(&self, pipeline: &str) -> PathBuf {
        self.pipelines_test_dir.join(format!("{}_test.yml", pipeline))
    }
}

fn resolve_dir(base_dir: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        base_dir.join(dir)
    }
}

/// Every pair must be decided exactly once by the defaults
fn validate_default_options(options: &[FlyOption]) -> Result<(), ConfigError> {
    for pair in OptionPair::ALL {
        let (first, second) = pair.members();
        match (options.contains(&first), options.contains(&second)) {
            (true, true) => return Err(ConfigError::ConflictingDefaults { first, second }),
            (false, false) => return Err(ConfigError::IncompleteDefaults { first, second }),
            _ => {}
        }
    }
    Ok(())
}

/// Initialize a managed directory
///
/// Writes the default settings file and creates the directories it names.
/// Returns the path of the new settings file.
pub fn init<P: AsRef<Path>>(dir: P) -> Result<PathBuf, ConfigError> {
    let dir = dir.as_ref();
    let path = dir.join(SETTINGS_FILE);
    if path.exists() {
        return Err(ConfigError::AlreadyInitialized { path });
    }

    std::fs::write(&path, DEFAULT_SETTINGS).map_err(|source| ConfigError::Write {
        path: path.clone(),
        source,
    })?;

    for sub_dir in ["pipelines", "pipeline_tests", "target_environments"] {
        let sub_dir = dir.join(sub_dir);
        std::fs::create_dir_all(&sub_dir).map_err(|source| ConfigError::Write {
            path: sub_dir,
            source,
        })?;
    }

    Ok(path)
}
