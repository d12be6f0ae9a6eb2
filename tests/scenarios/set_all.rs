//! Test: processing every pipeline

use crate::helpers::*;
use concourse_kit::execution::Mode;
use concourse_kit::{EnvironmentRequest, ExecutionEngine, ExecutionEvent, SetOutcome};
use std::future;
use std::time::Duration;

/// Cancelling during the pre-flight delay runs nothing
#[tokio::test]
async fn test_cancel_before_any_command() {
    let workspace = Workspace::with_fixtures();
    let mut engine = ExecutionEngine::new(RecordingFly::new(), workspace.settings())
        .with_work_dir(workspace.work_dir())
        .with_preflight_delay(Duration::from_secs(60));
    let log = EventLog::attach(&mut engine);

    let outcome = engine
        .set_all_pipelines(&EnvironmentRequest::default(), Mode::Apply, future::ready(()))
        .await
        .unwrap();

    assert!(matches!(outcome, SetOutcome::Aborted));
    assert!(engine.fly().calls().is_empty());
    assert!(workspace.leftovers().is_empty());
    assert!(log
        .events()
        .iter()
        .any(|e| matches!(e, ExecutionEvent::PreflightFinished { cancelled: true })));
}

/// The delay elapses and every pipeline is set
#[tokio::test]
async fn test_apply_all_after_delay() {
    let workspace = Workspace::with_fixtures();
    let engine = ExecutionEngine::new(RecordingFly::new(), workspace.settings())
        .with_work_dir(workspace.work_dir())
        .with_preflight_delay(Duration::from_millis(10));

    let outcome = engine
        .set_all_pipelines(&EnvironmentRequest::parse(["dev"]), Mode::Apply, future::pending::<()>())
        .await
        .unwrap();

    let report = match outcome {
        SetOutcome::Completed(report) => report,
        SetOutcome::Aborted => panic!("bulk apply was aborted"),
    };
    let applied: Vec<&str> = report.applied.iter().map(|r| r.run_name.as_str()).collect();
    assert_eq!(applied, ["dev-bar", "dev-foo-mgmt-install", "dev-zoo"]);
    assert_eq!(engine.fly().subcommands().len(), 9);
}

/// Plan mode never waits, so a cancel signal has no effect
#[tokio::test]
async fn test_plan_all_skips_delay() {
    let workspace = Workspace::with_fixtures();
    let engine = ExecutionEngine::new(RecordingFly::new(), workspace.settings())
        .with_work_dir(workspace.work_dir())
        .with_preflight_delay(Duration::from_secs(60));

    let outcome = engine
        .set_all_pipelines(&EnvironmentRequest::parse(["prod"]), Mode::Plan, future::ready(()))
        .await
        .unwrap();

    match outcome {
        SetOutcome::Completed(report) => assert_eq!(report.plans.len(), 3),
        SetOutcome::Aborted => panic!("plan mode was aborted"),
    }
    assert_eq!(engine.fly().mutating_calls(), 0);
}

/// A pipeline that fails to load does not stop the others
#[tokio::test]
async fn test_broken_pipeline_is_isolated() {
    let workspace = Workspace::with_fixtures();
    workspace.write_pipeline("aaa_typo", "pipline_config: {}\n");
    workspace.write_pipeline("missing_import", "imports: [nowhere]\npipeline_config: {}\n");
    let engine = workspace.engine(RecordingFly::new());

    let outcome = engine
        .set_all_pipelines(&EnvironmentRequest::parse(["dev"]), Mode::Apply, future::pending::<()>())
        .await
        .unwrap();

    let report = match outcome {
        SetOutcome::Completed(report) => report,
        SetOutcome::Aborted => panic!("bulk apply was aborted"),
    };
    assert_eq!(report.applied.len(), 3);
    let failed: Vec<&str> = report.failures.iter().map(|f| f.pipeline.as_str()).collect();
    assert_eq!(failed, ["aaa_typo", "missing_import"]);
    assert!(report.failures.iter().all(|f| f.environment.is_none()));
    assert!(report.failures[1].error.contains("nowhere"));
    assert!(!report.is_success());
}
