//! Test utilities: a temporary managed directory and a recording fly

use async_trait::async_trait;
use concourse_kit::core::settings::Settings;
use concourse_kit::execution::{ExecutionEngine, ExecutionEvent};
use concourse_kit::fly::{FlyError, FlyRunner, OutputMode};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const ENVIRONMENTS: [&str; 4] = ["common", "dev", "prod", "stage"];

/// A managed directory in a temporary location
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        for env in ENVIRONMENTS {
            fs::create_dir_all(dir.path().join("target_environments").join(env)).unwrap();
        }
        fs::create_dir_all(dir.path().join("pipelines/lib")).unwrap();
        fs::create_dir_all(dir.path().join("pipeline_tests")).unwrap();
        fs::create_dir_all(dir.path().join("work")).unwrap();
        Self { dir }
    }

    /// Workspace with the standard set of pipelines
    pub fn with_fixtures() -> Self {
        let workspace = Self::new();
        workspace.write_pipeline("foo_mgmt", FOO_MGMT);
        workspace.write_pipeline("bar", BAR);
        workspace.write_pipeline("zoo", ZOO);
        workspace.write_fragment("shared", SHARED);
        workspace
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn write_pipeline(&self, name: &str, yaml: &str) {
        fs::write(self.dir.path().join("pipelines").join(format!("{}.yml", name)), yaml).unwrap();
    }

    pub fn write_fragment(&self, name: &str, yaml: &str) {
        fs::write(self.dir.path().join("pipelines/lib").join(format!("{}.yml", name)), yaml).unwrap();
    }

    pub fn write_check(&self, pipeline: &str, yaml: &str) {
        fs::write(
            self.dir.path().join("pipeline_tests").join(format!("{}_test.yml", pipeline)),
            yaml,
        )
        .unwrap();
    }

    pub fn settings(&self) -> Settings {
        self.settings_ignoring(&[])
    }

    pub fn settings_ignoring(&self, ignored: &[&str]) -> Settings {
        let yaml = format!(
            r#"
target: concourse
default_options:
  - interactive
  - hide-pipeline
  - unpause-pipeline
pipelines_dir: pipelines
pipelines_test_dir: pipeline_tests
environments_dir: target_environments
ignored_environments: [{}]
"#,
            ignored.join(", ")
        );
        Settings::from_yaml(&yaml, self.dir.path()).unwrap()
    }

    /// Engine writing artifacts to the work directory, without a pre-flight delay
    pub fn engine(&self, fly: RecordingFly) -> ExecutionEngine<RecordingFly> {
        ExecutionEngine::new(fly, self.settings())
            .with_work_dir(self.work_dir())
            .with_preflight_delay(Duration::ZERO)
    }

    /// Files left behind in the work directory
    pub fn leftovers(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.work_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// One recorded fly invocation
#[derive(Debug, Clone)]
pub struct FlyCall {
    pub args: Vec<String>,
    pub output: OutputMode,
    /// Whether the `--config` file existed when fly was called
    pub artifact_existed: Option<bool>,
}

impl FlyCall {
    pub fn subcommand(&self) -> &str {
        if self.args.first().map(String::as_str) == Some("-t") {
            &self.args[2]
        } else {
            &self.args[0]
        }
    }

    pub fn pipeline(&self) -> Option<&str> {
        self.value_of("--pipeline")
    }

    pub fn config(&self) -> Option<&str> {
        self.value_of("--config")
    }

    fn value_of(&self, flag: &str) -> Option<&str> {
        let index = self.args.iter().position(|a| a == flag)?;
        self.args.get(index + 1).map(String::as_str)
    }
}

/// Fly double that records every call
///
/// Exit codes are 0 unless configured per sub-command.
#[derive(Default)]
pub struct RecordingFly {
    calls: Arc<Mutex<Vec<FlyCall>>>,
    exit_codes: HashMap<String, i32>,
    missing: bool,
}

impl RecordingFly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `subcommand` with `code`
    pub fn failing(mut self, subcommand: &str, code: i32) -> Self {
        self.exit_codes.insert(subcommand.to_string(), code);
        self
    }

    /// Behave as if fly were not installed
    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<FlyCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn subcommands(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.subcommand().to_string()).collect()
    }

    pub fn mutating_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.subcommand() != "validate-pipeline").count()
    }
}

#[async_trait]
impl FlyRunner for RecordingFly {
    async fn run(&self, args: &[String], output: OutputMode) -> Result<i32, FlyError> {
        let mut call = FlyCall {
            args: args.to_vec(),
            output,
            artifact_existed: None,
        };
        call.artifact_existed = call.config().map(|config| Path::new(config).exists());
        let code = self.exit_codes.get(call.subcommand()).copied().unwrap_or(0);
        self.calls.lock().unwrap().push(call);

        if self.missing {
            return Err(FlyError::NotInstalled {
                binary: "fly".to_string(),
            });
        }
        Ok(code)
    }
}

/// Collects events emitted by an engine
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl EventLog {
    pub fn attach(engine: &mut ExecutionEngine<RecordingFly>) -> Self {
        let log = Self::default();
        let events = log.events.clone();
        engine.add_event_handler(move |event| events.lock().unwrap().push(event));
        log
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }
}

pub const FOO_MGMT: &str = r#"
suffix: install
options:
  - expose-pipeline
pipeline_config:
  jobs:
    - name: "foo-job-{{ environment }}"
      plan: []
"#;

pub const BAR: &str = r#"
allowed_environments:
  - dev
  - prod
target: "{{ environment }}-concourse"
options:
  - non-interactive
  - pause-pipeline
pipeline_config:
  jobs:
    - name: bar-job
      plan: []
"#;

pub const ZOO: &str = r#"
imports:
  - shared
vars:
  team: zookeepers
pipeline_config:
  resources:
    - name: repo
      type: git
      source:
        uri: "{{ vars.repo }}"
        branch: "{{ vars.branch }}"
  jobs:
    - name: "{{ vars.team }}-build"
      plan: []
    - include_when:
        environment: prod
      items:
        - name: "{{ vars.team }}-release"
          plan: []
"#;

pub const SHARED: &str = r#"
vars:
  repo: https://example.com/zoo.git
  branch: main
  team: shared
"#;

/// Renders everywhere except prod, where a variable is missing
pub const BROKEN: &str = r#"
pipeline_config:
  jobs:
    - name: "broken-{{ environment }}"
      plan: []
    - include_when:
        environment: prod
      items:
        - name: "{{ vars.release_job }}"
"#;
