//! Pipeline rendering and orchestration

pub mod checks;
pub mod engine;
pub mod planner;
pub mod render;

pub use checks::{run_all_checks, run_checks, CheckReport};
pub use engine::{ExecutionEngine, ExecutionEvent, Mode, SetOutcome, SetReport};
pub use planner::PipelinePlan;
pub use render::{render, RenderedArtifact};
