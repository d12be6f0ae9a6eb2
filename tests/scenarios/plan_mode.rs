//! Test: plan mode validates without touching Concourse

use crate::helpers::*;
use concourse_kit::execution::engine::Validity;
use concourse_kit::execution::Mode;
use concourse_kit::fly::OutputMode;
use concourse_kit::{EnvironmentRequest, ExecutionEvent};

#[tokio::test]
async fn test_plan_only_validates() {
    let workspace = Workspace::with_fixtures();
    let engine = workspace.engine(RecordingFly::new());

    let report = engine
        .set_pipeline("foo_mgmt", &EnvironmentRequest::default(), Mode::Plan)
        .await
        .unwrap();

    let fly = engine.fly();
    assert_eq!(fly.mutating_calls(), 0);
    assert_eq!(fly.calls().len(), 3);
    for call in fly.calls() {
        assert_eq!(call.subcommand(), "validate-pipeline");
        assert_eq!(call.output, OutputMode::Quiet);
        assert_eq!(call.artifact_existed, Some(true));
    }

    assert!(report.applied.is_empty());
    let row = &report.plans[0];
    assert_eq!(row.run_name, "dev-foo-mgmt-install");
    assert_eq!(row.target, "concourse");
    assert_eq!(row.options.to_string(), "expose-pipeline interactive unpause-pipeline");
    assert_eq!(row.validity, Validity::Valid);
    assert!(row.origin.ends_with("pipelines/foo_mgmt.yml"));
    assert!(workspace.leftovers().is_empty());
}

/// A non-zero validation exit is reported, not raised
#[tokio::test]
async fn test_invalid_pipeline_is_classified() {
    let workspace = Workspace::with_fixtures();
    let engine = workspace.engine(RecordingFly::new().failing("validate-pipeline", 1));

    let report = engine
        .set_pipeline("bar", &EnvironmentRequest::default(), Mode::Plan)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.plans.len(), 2);
    assert!(report.plans.iter().all(|row| row.validity == Validity::Invalid));
}

/// The header names the pipeline once, without its suffix, before its first row
#[tokio::test]
async fn test_plan_header_emitted_once() {
    let workspace = Workspace::with_fixtures();
    let mut engine = workspace.engine(RecordingFly::new());
    let log = EventLog::attach(&mut engine);

    engine
        .set_pipeline("foo_mgmt", &EnvironmentRequest::default(), Mode::Plan)
        .await
        .unwrap();

    let events = log.events();
    let headers: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, ExecutionEvent::PlanHeader { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(headers.len(), 1);
    match &events[headers[0]] {
        ExecutionEvent::PlanHeader { pipeline } => assert_eq!(pipeline, "foo-mgmt"),
        other => panic!("unexpected event: {other:?}"),
    }
    let first_row = events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::Planned(_)))
        .unwrap();
    assert!(headers[0] < first_row);
}

/// Plan and apply decide the same names, targets and options
#[tokio::test]
async fn test_plan_matches_apply() {
    let workspace = Workspace::with_fixtures();
    let engine = workspace.engine(RecordingFly::new());
    let request = EnvironmentRequest::default();

    let plan = engine.set_pipeline("bar", &request, Mode::Plan).await.unwrap();
    let apply = engine.set_pipeline("bar", &request, Mode::Apply).await.unwrap();

    assert_eq!(plan.plans.len(), apply.applied.len());
    for (row, run) in plan.plans.iter().zip(&apply.applied) {
        assert_eq!(row.run_name, run.run_name);
        assert_eq!(row.target, run.target);
        assert_eq!(row.options, run.options);
    }
}
