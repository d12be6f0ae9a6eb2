//! Test: declarative pipeline checks

use crate::helpers::*;
use concourse_kit::execution::checks::{run_all_checks, run_checks, CheckOutcome};

const FOO_CHECKS: &str = r#"
cases:
  - environment: dev
    expect:
      - path: jobs
        length: 1
      - path: jobs.0.name
        equals: foo-job-dev
      - path: resources
        absent: true
  - environment: prod
    expect:
      - path: jobs.0.name
        equals: foo-job-dev
"#;

#[test]
fn test_checks_report_passes_and_failures() {
    let workspace = Workspace::with_fixtures();
    workspace.write_check("foo_mgmt", FOO_CHECKS);

    let report = run_checks("foo_mgmt", &workspace.settings()).unwrap();

    assert!(report.has_checks());
    assert_eq!(report.results.len(), 4);
    assert_eq!(report.failed(), 1);
    assert!(!report.is_success());
    let failed = report.results.iter().find(|r| !r.passed()).unwrap();
    assert_eq!(failed.environment, "prod");
    match &failed.outcome {
        CheckOutcome::Failed(reason) => assert!(reason.contains("foo-job-prod"), "{reason}"),
        CheckOutcome::Passed => unreachable!(),
    }
}

#[test]
fn test_pipeline_without_checks() {
    let workspace = Workspace::with_fixtures();
    let report = run_checks("bar", &workspace.settings()).unwrap();
    assert!(!report.has_checks());
    assert!(report.is_success());
}

#[test]
fn test_render_error_fails_the_case() {
    let workspace = Workspace::with_fixtures();
    workspace.write_pipeline("broken", BROKEN);
    workspace.write_check("broken", "cases:\n  - environment: prod\n    expect:\n      - path: jobs\n");

    let report = run_checks("broken", &workspace.settings()).unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].description, "render");
    assert!(!report.is_success());
}

#[test]
fn test_run_all_checks() {
    let workspace = Workspace::with_fixtures();
    workspace.write_check("zoo", "cases:\n  - environment: dev\n    expect:\n      - path: jobs\n        length: 1\n");
    workspace.write_check("foo_mgmt", FOO_CHECKS);
    workspace.write_check("ghost", "cases: []\n");

    let reports = run_all_checks(&workspace.settings()).unwrap();
    let names: Vec<&str> = reports.iter().map(|r| r.pipeline.as_str()).collect();
    assert_eq!(names, ["foo_mgmt", "ghost", "zoo"]);
    assert!(!reports[0].is_success());
    assert!(reports[1].error.as_deref().unwrap_or_default().contains("ghost.yml does not exist"));
    assert!(reports[2].is_success());
}
