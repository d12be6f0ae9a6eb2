//! Test: generate-pipeline keeps the rendered file

use crate::helpers::*;
use concourse_kit::execution::engine::RunError;
use concourse_kit::execution::render::RenderError;

#[tokio::test]
async fn test_generate_keeps_file() {
    let workspace = Workspace::with_fixtures();
    let engine = workspace.engine(RecordingFly::new());

    let path = engine.generate_pipeline("zoo", "prod").unwrap();

    assert_eq!(path, workspace.work_dir().join("zoo.yml"));
    let document: serde_yaml::Value = serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let jobs = document["jobs"].as_sequence().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[1]["name"].as_str(), Some("zookeepers-release"));
    assert_eq!(document["resources"][0]["source"]["branch"].as_str(), Some("main"));
    assert!(engine.fly().calls().is_empty());
}

#[tokio::test]
async fn test_generate_reports_user_fault() {
    let workspace = Workspace::with_fixtures();
    workspace.write_pipeline("broken", BROKEN);
    let engine = workspace.engine(RecordingFly::new());

    assert!(engine.generate_pipeline("broken", "dev").is_ok());
    let err = engine.generate_pipeline("broken", "prod").unwrap_err();
    match err {
        RunError::Render(RenderError::UserConfig { environment, frame, .. }) => {
            assert_eq!(environment, "prod");
            assert!(frame.starts_with("line 9:"), "{frame}");
        }
        other => panic!("unexpected error: {other}"),
    }
}
