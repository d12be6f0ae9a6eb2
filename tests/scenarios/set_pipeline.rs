//! Test: apply mode for a single pipeline

use crate::helpers::*;
use concourse_kit::execution::Mode;
use concourse_kit::fly::OutputMode;
use concourse_kit::EnvironmentRequest;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Every discovered environment except common gets set, hidden or exposed, and unpaused
#[tokio::test]
async fn test_set_pipeline_in_every_environment() {
    let workspace = Workspace::with_fixtures();
    let engine = workspace.engine(RecordingFly::new());

    let report = engine
        .set_pipeline("foo_mgmt", &EnvironmentRequest::default(), Mode::Apply)
        .await
        .unwrap();

    assert!(report.is_success());
    let applied: Vec<&str> = report.applied.iter().map(|r| r.run_name.as_str()).collect();
    assert_eq!(applied, ["dev-foo-mgmt-install", "prod-foo-mgmt-install", "stage-foo-mgmt-install"]);

    let fly = engine.fly();
    assert_eq!(
        fly.subcommands(),
        strings(&[
            "set-pipeline", "expose-pipeline", "unpause-pipeline",
            "set-pipeline", "expose-pipeline", "unpause-pipeline",
            "set-pipeline", "expose-pipeline", "unpause-pipeline",
        ])
    );

    let calls = fly.calls();
    let artifact = workspace.work_dir().join("dev-foo-mgmt-install.yml");
    assert_eq!(
        calls[0].args,
        strings(&[
            "-t", "concourse", "set-pipeline",
            "--pipeline", "dev-foo-mgmt-install",
            "--config", artifact.to_str().unwrap(),
        ])
    );
    assert_eq!(calls[0].output, OutputMode::Inherit);
    assert_eq!(calls[0].artifact_existed, Some(true));
    assert_eq!(
        calls[1].args,
        strings(&["-t", "concourse", "expose-pipeline", "--pipeline", "dev-foo-mgmt-install"])
    );

    assert!(workspace.leftovers().is_empty());
}

/// Pipeline options and target override the settings
#[tokio::test]
async fn test_pipeline_overrides() {
    let workspace = Workspace::with_fixtures();
    let engine = workspace.engine(RecordingFly::new());

    engine
        .set_pipeline("bar", &EnvironmentRequest::default(), Mode::Apply)
        .await
        .unwrap();

    let calls = engine.fly().calls();
    assert_eq!(calls.len(), 6);
    assert_eq!(&calls[0].args[..2], ["-t", "dev-concourse"]);
    assert_eq!(calls[0].args.last().map(String::as_str), Some("--non-interactive"));
    assert_eq!(calls[1].subcommand(), "hide-pipeline");
    assert_eq!(calls[2].subcommand(), "pause-pipeline");
    assert_eq!(calls[3].pipeline(), Some("prod-bar"));
    assert_eq!(&calls[3].args[..2], ["-t", "prod-concourse"]);
}

/// Requests narrow the set; negations and the ignore-list remove from it
#[tokio::test]
async fn test_environment_requests() {
    let workspace = Workspace::with_fixtures();
    let engine = workspace.engine(RecordingFly::new());

    let report = engine
        .set_pipeline("foo_mgmt", &EnvironmentRequest::parse(["!prod"]), Mode::Apply)
        .await
        .unwrap();
    let applied: Vec<&str> = report.applied.iter().map(|r| r.environment.as_str()).collect();
    assert_eq!(applied, ["dev", "stage"]);

    let report = engine
        .set_pipeline("foo_mgmt", &EnvironmentRequest::parse(["dev", "!dev"]), Mode::Apply)
        .await
        .unwrap();
    assert!(report.applied.is_empty());
    assert!(report.is_success());

    let report = engine
        .set_pipeline("bar", &EnvironmentRequest::parse(["stage", "prod"]), Mode::Apply)
        .await
        .unwrap();
    let applied: Vec<&str> = report.applied.iter().map(|r| r.environment.as_str()).collect();
    assert_eq!(applied, ["prod"]);
}

/// Ignored environments never run, even when asked for
#[tokio::test]
async fn test_ignored_environments_win() {
    let workspace = Workspace::with_fixtures();
    let mut engine = concourse_kit::ExecutionEngine::new(RecordingFly::new(), workspace.settings_ignoring(&["stage"]))
        .with_work_dir(workspace.work_dir());
    let log = EventLog::attach(&mut engine);

    let report = engine
        .set_pipeline("foo_mgmt", &EnvironmentRequest::parse(["stage", "dev"]), Mode::Apply)
        .await
        .unwrap();

    let applied: Vec<&str> = report.applied.iter().map(|r| r.environment.as_str()).collect();
    assert_eq!(applied, ["dev"]);
    assert!(log.events().iter().any(|e| matches!(
        e,
        concourse_kit::ExecutionEvent::EnvironmentSkipped { environment, .. } if environment == "stage"
    )));
}

/// Imported variables and conditional blocks end up in the artifact
#[tokio::test]
async fn test_rendered_artifact_content() {
    let workspace = Workspace::with_fixtures();
    let mut engine = workspace.engine(RecordingFly::new());
    let contents = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = contents.clone();
    engine.add_event_handler(move |event| {
        if let concourse_kit::ExecutionEvent::RunApplied(run) = event {
            let text = std::fs::read_to_string(&run.artifact).unwrap_or_default();
            seen.lock().unwrap().push((run.environment.clone(), text));
        }
    });

    engine
        .set_pipeline("zoo", &EnvironmentRequest::parse(["dev", "prod"]), Mode::Apply)
        .await
        .unwrap();

    let contents = contents.lock().unwrap();
    let (_, dev) = &contents[0];
    assert!(dev.contains("zookeepers-build"));
    assert!(dev.contains("https://example.com/zoo.git"));
    assert!(!dev.contains("zookeepers-release"));
    let (_, prod) = &contents[1];
    assert!(prod.contains("zookeepers-release"));
}
