//! Orchestration driver - renders, validates or applies, and cleans up
//!
//! Every (pipeline, environment) pair is processed to completion before the
//! next one starts: render, talk to fly, remove the artifact.

use crate::{
    core::{
        environment::{EnvironmentRequest, COMMON_ENVIRONMENT},
        module::{discover_modules, load_module, ModuleError},
        options::FlyOptions,
        pipeline::{slugify, ResolvedRun},
        settings::Settings,
    },
    execution::{
        planner::{PipelinePlan, PlanError},
        render::{render, RenderError},
    },
    fly::{FlyCommand, FlyError, FlyRunner},
};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Time to abort a bulk apply before anything is sent to fly
pub const PREFLIGHT_DELAY: Duration = Duration::from_secs(10);

/// Whether to only validate or to change the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Plan,
    Apply,
}

/// Result of `fly validate-pipeline`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Validity {
    Valid,
    Invalid,
}

impl Validity {
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            Validity::Valid
        } else {
            Validity::Invalid
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Validity::Valid => "valid",
            Validity::Invalid => "invalid",
        }
    }
}

/// One line of a plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanRow {
    /// Module file the run came from
    pub origin: PathBuf,
    pub run_name: String,
    pub target: String,
    pub options: FlyOptions,
    pub validity: Validity,
}

/// A (pipeline, environment) pair, or a whole pipeline, that failed
#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    pub pipeline: String,

    /// None when the pipeline could not be prepared at all
    pub environment: Option<String>,

    pub error: String,
}

/// Everything a set-pipeline invocation did
#[derive(Debug, Clone, Default, Serialize)]
pub struct SetReport {
    pub plans: Vec<PlanRow>,
    pub applied: Vec<ResolvedRun>,
    pub failures: Vec<RunFailure>,

    /// Stopped by an interrupt before every pair was processed
    pub interrupted: bool,
}

impl SetReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.interrupted
    }

    fn merge(&mut self, other: SetReport) {
        self.plans.extend(other.plans);
        self.applied.extend(other.applied);
        self.failures.extend(other.failures);
        self.interrupted |= other.interrupted;
    }
}

/// How a bulk run ended
#[derive(Debug, Clone)]
pub enum SetOutcome {
    Completed(SetReport),
    /// Cancelled during the pre-flight delay; no command was run
    Aborted,
}

/// A fly command that exited non-zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExit {
    pub command: &'static str,
    pub code: i32,
}

impl fmt::Display for CommandExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} exited with status {}", self.command, self.code)
    }
}

fn join_exits(exits: &[CommandExit]) -> String {
    exits.iter().map(CommandExit::to_string).collect::<Vec<_>>().join(", ")
}

/// Errors raised by the driver
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Fly(#[from] FlyError),

    #[error("fly failed for {pipeline}: {}", join_exits(.exits))]
    CommandFailed {
        pipeline: String,
        exits: Vec<CommandExit>,
    },

    #[error("Failed to remove {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    /// Whether the whole batch has to stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, RunError::Fly(FlyError::NotInstalled { .. }))
    }
}

/// Why a requested environment was left out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentNotice {
    /// Not in the pipeline's base set
    Unknown,
    /// Listed in `ignored_environments`
    Ignored,
}

/// Events emitted while the driver runs
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PreflightStarted {
        delay: Duration,
        pipelines: usize,
    },
    PreflightFinished {
        cancelled: bool,
    },
    PipelineStarted {
        pipeline: String,
        mode: Mode,
        environments: Vec<String>,
    },
    EnvironmentSkipped {
        pipeline: String,
        environment: String,
        notice: EnvironmentNotice,
    },
    NoEnvironments {
        pipeline: String,
    },
    /// Emitted before the first plan row of a pipeline
    PlanHeader {
        pipeline: String,
    },
    Planned(PlanRow),
    RunApplied(ResolvedRun),
    RunFailed {
        pipeline: String,
        environment: String,
        error: String,
    },
    PipelineFailed {
        pipeline: String,
        error: String,
    },
    /// The interrupt flag stopped the run between two pairs
    Interrupted,
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

enum Step {
    Planned(PlanRow),
    Applied(ResolvedRun),
}

/// The orchestration driver
pub struct ExecutionEngine<F> {
    fly: F,
    settings: Settings,
    work_dir: PathBuf,
    preflight_delay: Duration,
    interrupt: Arc<AtomicBool>,
    event_handlers: Vec<EventHandler>,
}

impl<F: FlyRunner> ExecutionEngine<F> {
    pub fn new(fly: F, settings: Settings) -> Self {
        Self {
            fly,
            settings,
            work_dir: PathBuf::from("."),
            preflight_delay: PREFLIGHT_DELAY,
            interrupt: Arc::new(AtomicBool::new(false)),
            event_handlers: Vec::new(),
        }
    }

    /// Directory rendered artifacts are written to
    pub fn with_work_dir<P: Into<PathBuf>>(mut self, work_dir: P) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_preflight_delay(mut self, delay: Duration) -> Self {
        self.preflight_delay = delay;
        self
    }

    /// Flag checked before each (pipeline, environment) pair
    ///
    /// Once set, the pair in progress finishes and no further pair starts.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Add an event handler
    pub fn add_event_handler<H>(&mut self, handler: H)
    where
        H: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    pub fn fly(&self) -> &F {
        &self.fly
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    fn finish(&self, report: SetReport) -> SetReport {
        if report.interrupted {
            warn!("Interrupted, stopped before processing every pipeline");
            self.emit_event(ExecutionEvent::Interrupted);
        }
        report
    }

    /// Plan or apply one pipeline
    ///
    /// A pipeline that cannot be prepared is an error. Failures of single
    /// environments are collected in the report.
    pub async fn set_pipeline(
        &self,
        name: &str,
        request: &EnvironmentRequest,
        mode: Mode,
    ) -> Result<SetReport, RunError> {
        let plan = PipelinePlan::prepare(name, request, &self.settings)?;
        let report = self.process(&plan, mode).await?;
        Ok(self.finish(report))
    }

    /// Plan or apply every pipeline in the pipelines directory
    ///
    /// In apply mode the driver first waits for the pre-flight delay;
    /// if `cancel` resolves during it, nothing is run.
    pub async fn set_all_pipelines<C>(
        &self,
        request: &EnvironmentRequest,
        mode: Mode,
        cancel: C,
    ) -> Result<SetOutcome, RunError>
    where
        C: Future,
    {
        let names = discover_modules(&self.settings.pipelines_dir)?;
        info!("Found {} pipelines", names.len());

        if mode == Mode::Apply && !self.preflight_delay.is_zero() {
            self.emit_event(ExecutionEvent::PreflightStarted {
                delay: self.preflight_delay,
                pipelines: names.len(),
            });
            let cancelled = tokio::select! {
                _ = tokio::time::sleep(self.preflight_delay) => false,
                _ = cancel => true,
            };
            self.emit_event(ExecutionEvent::PreflightFinished { cancelled });
            if cancelled {
                info!("Bulk apply cancelled before any command was run");
                return Ok(SetOutcome::Aborted);
            }
        }

        let mut report = SetReport::default();
        for name in &names {
            if report.interrupted || self.is_interrupted() {
                report.interrupted = true;
                break;
            }
            match PipelinePlan::prepare(name, request, &self.settings) {
                Ok(plan) => report.merge(self.process(&plan, mode).await?),
                Err(e) => {
                    warn!("Skipping pipeline {}: {}", name, e);
                    self.emit_event(ExecutionEvent::PipelineFailed {
                        pipeline: name.clone(),
                        error: e.to_string(),
                    });
                    report.failures.push(RunFailure {
                        pipeline: name.clone(),
                        environment: None,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(SetOutcome::Completed(self.finish(report)))
    }

    /// Render one pipeline for one environment into `{name}.yml` and keep it
    pub fn generate_pipeline(&self, name: &str, environment: &str) -> Result<PathBuf, RunError> {
        let module = Arc::new(load_module(name, &self.settings.pipelines_dir)?);
        let definition = module.definition(environment)?;
        let output = self.work_dir.join(format!("{}.yml", module.name));
        let path = render(&definition, &output)?.keep();
        info!("Generated {} for {} at {}", module.name, environment, path.display());
        Ok(path)
    }

    async fn process(&self, plan: &PipelinePlan, mode: Mode) -> Result<SetReport, RunError> {
        let pipeline = plan.name().to_string();
        self.emit_event(ExecutionEvent::PipelineStarted {
            pipeline: pipeline.clone(),
            mode,
            environments: plan.environments().to_vec(),
        });

        for environment in &plan.resolution.unknown {
            self.emit_event(ExecutionEvent::EnvironmentSkipped {
                pipeline: pipeline.clone(),
                environment: environment.clone(),
                notice: EnvironmentNotice::Unknown,
            });
        }
        for environment in &plan.resolution.ignored {
            self.emit_event(ExecutionEvent::EnvironmentSkipped {
                pipeline: pipeline.clone(),
                environment: environment.clone(),
                notice: EnvironmentNotice::Ignored,
            });
        }
        if plan.environments().is_empty() {
            self.emit_event(ExecutionEvent::NoEnvironments {
                pipeline: pipeline.clone(),
            });
        }

        let mut report = SetReport::default();
        let has_runs = plan.environments().iter().any(|e| e != COMMON_ENVIRONMENT);
        if mode == Mode::Plan && has_runs {
            self.emit_event(ExecutionEvent::PlanHeader {
                pipeline: slugify(&pipeline),
            });
        }

        for environment in plan.environments() {
            if environment == COMMON_ENVIRONMENT {
                continue;
            }
            if self.is_interrupted() {
                info!("Interrupted before {} in {}", pipeline, environment);
                report.interrupted = true;
                break;
            }
            match self.run_environment(plan, environment, mode).await {
                Ok(Step::Planned(row)) => report.plans.push(row),
                Ok(Step::Applied(run)) => report.applied.push(run),
                Err(e) => {
                    warn!("{} failed in {}: {}", pipeline, environment, e);
                    self.emit_event(ExecutionEvent::RunFailed {
                        pipeline: pipeline.clone(),
                        environment: environment.clone(),
                        error: e.to_string(),
                    });
                    if e.is_fatal() {
                        return Err(e);
                    }
                    report.failures.push(RunFailure {
                        pipeline: pipeline.clone(),
                        environment: Some(environment.clone()),
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    async fn run_environment(
        &self,
        plan: &PipelinePlan,
        environment: &str,
        mode: Mode,
    ) -> Result<Step, RunError> {
        let (definition, run) = plan.resolve_run(environment, &self.settings, &self.work_dir)?;

        let artifact = render(&definition, &run.artifact)?;
        let result = match mode {
            Mode::Plan => self.validate(&run).await.map(Step::Planned),
            Mode::Apply => self.apply(&run).await.map(Step::Applied),
        };

        let path = artifact.path().to_path_buf();
        let cleanup = artifact.remove().map_err(|source| RunError::Cleanup { path, source });
        let step = result?;
        cleanup?;
        Ok(step)
    }

    async fn validate(&self, run: &ResolvedRun) -> Result<PlanRow, RunError> {
        let code = self.invoke(&FlyCommand::validate(run)?).await?;
        let row = PlanRow {
            origin: run.origin.clone(),
            run_name: run.run_name.clone(),
            target: run.target.clone(),
            options: run.options.clone(),
            validity: Validity::from_exit_code(code),
        };
        self.emit_event(ExecutionEvent::Planned(row.clone()));
        Ok(row)
    }

    /// Set the pipeline, then its visibility and pause state
    ///
    /// All three commands run even when one exits non-zero; the run fails
    /// with every non-zero exit. A `FlyError` stops the run at once.
    async fn apply(&self, run: &ResolvedRun) -> Result<ResolvedRun, RunError> {
        let commands = [
            FlyCommand::set(run)?,
            FlyCommand::visibility(run),
            FlyCommand::pause_state(run),
        ];
        let mut exits = Vec::new();
        for command in &commands {
            let code = self.invoke(command).await?;
            if code != 0 {
                warn!("{} exited with status {}", command, code);
                exits.push(CommandExit {
                    command: command.name(),
                    code,
                });
            }
        }
        if !exits.is_empty() {
            return Err(RunError::CommandFailed {
                pipeline: run.run_name.clone(),
                exits,
            });
        }
        info!("Applied {} to {}", run.run_name, run.target);
        self.emit_event(ExecutionEvent::RunApplied(run.clone()));
        Ok(run.clone())
    }

    async fn invoke(&self, command: &FlyCommand) -> Result<i32, RunError> {
        debug!("Running {}", command);
        Ok(self.fly.run(&command.args(), command.output_mode()).await?)
    }
}
