//! Fly command lines

use super::FlyError;
use crate::core::{
    options::{PauseState, Visibility},
    pipeline::ResolvedRun,
};
use std::fmt;

/// What to do with fly's standard output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Pass through to the terminal
    Inherit,
    /// Discard
    Quiet,
}

/// A fly invocation the driver can issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlyCommand {
    /// `fly validate-pipeline --config <file>`
    Validate { config: String },

    /// `fly -t <target> set-pipeline --pipeline <name> --config <file>`
    Set {
        target: String,
        pipeline: String,
        config: String,
        non_interactive: bool,
    },

    /// `fly -t <target> hide-pipeline|expose-pipeline --pipeline <name>`
    Visibility {
        target: String,
        pipeline: String,
        visibility: Visibility,
    },

    /// `fly -t <target> pause-pipeline|unpause-pipeline --pipeline <name>`
    PauseState {
        target: String,
        pipeline: String,
        state: PauseState,
    },
}

impl FlyCommand {
    pub fn validate(run: &ResolvedRun) -> Result<Self, FlyError> {
        Ok(FlyCommand::Validate {
            config: artifact_arg(run)?,
        })
    }

    pub fn set(run: &ResolvedRun) -> Result<Self, FlyError> {
        Ok(FlyCommand::Set {
            target: run.target.clone(),
            pipeline: run.run_name.clone(),
            config: artifact_arg(run)?,
            non_interactive: run.options.is_non_interactive(),
        })
    }

    pub fn visibility(run: &ResolvedRun) -> Self {
        FlyCommand::Visibility {
            target: run.target.clone(),
            pipeline: run.run_name.clone(),
            visibility: run.options.visibility(),
        }
    }

    pub fn pause_state(run: &ResolvedRun) -> Self {
        FlyCommand::PauseState {
            target: run.target.clone(),
            pipeline: run.run_name.clone(),
            state: run.options.pause_state(),
        }
    }

    /// The fly sub-command name
    pub fn name(&self) -> &'static str {
        match self {
            FlyCommand::Validate { .. } => "validate-pipeline",
            FlyCommand::Set { .. } => "set-pipeline",
            FlyCommand::Visibility { visibility: Visibility::Hidden, .. } => "hide-pipeline",
            FlyCommand::Visibility { visibility: Visibility::Exposed, .. } => "expose-pipeline",
            FlyCommand::PauseState { state: PauseState::Paused, .. } => "pause-pipeline",
            FlyCommand::PauseState { state: PauseState::Unpaused, .. } => "unpause-pipeline",
        }
    }

    /// Validation output is only noise; its exit code is what matters
    pub fn output_mode(&self) -> OutputMode {
        match self {
            FlyCommand::Validate { .. } => OutputMode::Quiet,
            _ => OutputMode::Inherit,
        }
    }

    /// Argument vector, without the fly executable itself
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        match self {
            FlyCommand::Validate { config } => {
                args.push(self.name().to_string());
                args.push("--config".to_string());
                args.push(config.clone());
            }
            FlyCommand::Set {
                target,
                pipeline,
                config,
                non_interactive,
            } => {
                args.extend(["-t".to_string(), target.clone(), self.name().to_string()]);
                args.extend(["--pipeline".to_string(), pipeline.clone()]);
                args.extend(["--config".to_string(), config.clone()]);
                if *non_interactive {
                    args.push("--non-interactive".to_string());
                }
            }
            FlyCommand::Visibility { target, pipeline, .. } | FlyCommand::PauseState { target, pipeline, .. } => {
                args.extend(["-t".to_string(), target.clone(), self.name().to_string()]);
                args.extend(["--pipeline".to_string(), pipeline.clone()]);
            }
        }
        args
    }
}

impl fmt::Display for FlyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fly {}", self.args().join(" "))
    }
}

/// fly only takes string arguments, so the artifact path must be UTF-8
fn artifact_arg(run: &ResolvedRun) -> Result<String, FlyError> {
    run.artifact
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| FlyError::NonUtf8Path {
            path: run.artifact.clone(),
        })
}
