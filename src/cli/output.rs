//! CLI output formatting

use crate::execution::{
    checks::{CheckOutcome, CheckReport},
    engine::{EnvironmentNotice, ExecutionEvent, Mode, PlanRow, SetReport, Validity},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Column names printed under each plan header
pub const PLAN_LEGEND: &str = "origin | pipeline-name | concourse-target | fly options | validity";

/// Spinner shown while waiting out the pre-flight delay
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.yellow} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

pub fn format_validity(validity: Validity) -> String {
    match validity {
        Validity::Valid => style(validity.as_str()).green().to_string(),
        Validity::Invalid => style(validity.as_str()).red().to_string(),
    }
}

/// `{origin} | {run name} | {target} | {options} | {valid|invalid}`
pub fn format_plan_row(row: &PlanRow) -> String {
    format!(
        "{} | {} | {} | {} | {}",
        style(row.origin.display()).dim(),
        style(&row.run_name).bold(),
        row.target,
        row.options,
        format_validity(row.validity)
    )
}

/// Format an execution event for display
///
/// Pre-flight events are handled by the caller's spinner and yield `None`.
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::PreflightStarted { .. } | ExecutionEvent::PreflightFinished { .. } => return None,
        ExecutionEvent::PipelineStarted {
            pipeline,
            mode,
            environments,
        } => {
            let verb = match mode {
                Mode::Plan => "Planning",
                Mode::Apply => "Setting",
            };
            format!(
                "{} {} {} ({})",
                ROCKET,
                verb,
                style(pipeline).bold(),
                style(environments.join(", ")).cyan()
            )
        }
        ExecutionEvent::EnvironmentSkipped {
            pipeline,
            environment,
            notice,
        } => {
            let reason = match notice {
                EnvironmentNotice::Unknown => "is not available",
                EnvironmentNotice::Ignored => "is ignored in the settings",
            };
            format!(
                "{} Environment {} {} for {}; skipping it",
                WARN,
                style(environment).yellow(),
                reason,
                style(pipeline).bold()
            )
        }
        ExecutionEvent::NoEnvironments { pipeline } => {
            format!("{} No environments to process for {}", WARN, style(pipeline).bold())
        }
        ExecutionEvent::PlanHeader { pipeline } => format!(
            "\n{} {} - {}",
            INFO,
            style(format!("Plan for {}", pipeline)).bold().underlined(),
            style(PLAN_LEGEND).dim()
        ),
        ExecutionEvent::Planned(row) => format!("  {}", format_plan_row(row)),
        ExecutionEvent::RunApplied(run) => format!(
            "{} {} on {} ({})",
            CHECK,
            style(&run.run_name).green(),
            style(&run.target).cyan(),
            style(&run.options).dim()
        ),
        ExecutionEvent::RunFailed {
            pipeline,
            environment,
            error,
        } => format!(
            "{} {} in {}: {}",
            CROSS,
            style(pipeline).red(),
            style(environment).bold(),
            style(error).dim()
        ),
        ExecutionEvent::PipelineFailed { pipeline, error } => {
            format!("{} {}: {}", CROSS, style(pipeline).red(), style(error).dim())
        }
        ExecutionEvent::Interrupted => format!(
            "{} {}",
            WARN,
            style("Interrupted, remaining pipelines were not processed").yellow()
        ),
    };
    Some(line)
}

/// Final summary of a set-pipeline run
pub fn format_set_summary(report: &SetReport, mode: Mode) -> String {
    let done = match mode {
        Mode::Plan => format!("{} planned", report.plans.len()),
        Mode::Apply => format!("{} set", report.applied.len()),
    };
    if report.is_success() {
        format!("{} {} {}", CHECK, done, style("successfully").green())
    } else if report.interrupted {
        format!(
            "{} {}, {} failed, {}",
            WARN,
            done,
            report.failures.len(),
            style("interrupted").yellow()
        )
    } else {
        format!(
            "{} {}, {} {}",
            CROSS,
            done,
            report.failures.len(),
            style("failed").red()
        )
    }
}

/// Check results of one pipeline
pub fn format_check_report(report: &CheckReport) -> String {
    let mut lines = Vec::new();
    if let Some(error) = &report.error {
        lines.push(format!("{} {}: {}", CROSS, style(&report.pipeline).red(), style(error).dim()));
        return lines.join("\n");
    }
    if !report.has_checks() {
        lines.push(format!("{} {}: no checks", INFO, style(&report.pipeline).bold()));
        return lines.join("\n");
    }

    let icon = if report.is_success() { CHECK } else { CROSS };
    lines.push(format!(
        "{} {} ({}/{} passed)",
        icon,
        style(&report.pipeline).bold(),
        report.results.len() - report.failed(),
        report.results.len()
    ));
    for result in &report.results {
        match &result.outcome {
            CheckOutcome::Passed => lines.push(format!(
                "    {} [{}] {}",
                style("ok").green(),
                result.environment,
                style(&result.description).dim()
            )),
            CheckOutcome::Failed(reason) => lines.push(format!(
                "    {} [{}] {}: {}",
                style("FAIL").red(),
                result.environment,
                result.description,
                style(reason).red()
            )),
        }
    }
    lines.join("\n")
}
