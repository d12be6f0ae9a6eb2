//! Core domain models for concourse-kit
//!
//! Settings, pipeline modules and the rules that decide where and how a
//! pipeline is set.

pub mod context;
pub mod environment;
pub mod module;
pub mod options;
pub mod pipeline;
pub mod settings;
pub mod template;

pub use context::RenderContext;
pub use environment::{EnvironmentRequest, EnvironmentResolution};
pub use module::PipelineModule;
pub use options::{FlyOption, FlyOptions};
pub use pipeline::{PipelineDefinition, ResolvedRun};
pub use settings::Settings;
