//! Scenario-based tests for concourse-kit

mod helpers;

mod checks;
mod generate;
mod plan_mode;
mod set_all;
mod set_pipeline;
