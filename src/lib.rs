//! concourse-kit - resolve Concourse pipelines per environment and set them with fly

pub mod cli;
pub mod core;
pub mod execution;
pub mod fly;

// Re-export commonly used types
pub use crate::core::{EnvironmentRequest, FlyOption, FlyOptions, PipelineDefinition, ResolvedRun, Settings};
pub use execution::{ExecutionEngine, ExecutionEvent, Mode, SetOutcome, SetReport};
pub use fly::{FlyClient, FlyClientConfig, FlyError, FlyRunner};
