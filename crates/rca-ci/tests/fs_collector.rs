use std::fs;
use std::path::Path;
use std::sync::Arc;

use rca_ci::{FsCollector, TailCondenser};
use rca_core::{CollectedJob, Collector, CollectorError, JobInfo};

fn write(root: &Path, rel: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, contents).expect("write");
}

fn job() -> JobInfo {
    JobInfo::new("pull-ci-acme-widgets-main-e2e-aws", "1790")
}

/// A job with two failed steps (one ignorable), one passed step, a JUnit
/// export and a mix of text and binary artifacts.
fn job_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();

    write(root, "step-graph.json", r#"{"e2e": ["install"], "gather": []}"#);
    write(root, "steps/e2e/finished.json", r#"{"passed": false}"#);
    write(root, "steps/e2e/build-log.txt", "level=error msg=\"cluster install timed out\"\n");
    write(root, "steps/gather/finished.json", r#"{"passed": false}"#);
    write(root, "steps/gather/build-log.txt", "gather failed\n");
    write(root, "steps/install/finished.json", r#"{"passed": true}"#);
    write(root, "steps/install/build-log.txt", "ok\n");

    write(
        root,
        "tests/junit_e2e.json",
        r#"[
            {"name": "reconciles", "classname": "Controller", "failure_type": "AssertionError",
             "message": "expected Ready", "content": "controller_test.go:88"},
            {"name": "bare_case", "stderr": "panic: nil map"}
        ]"#,
    );
    write(root, "tests/notes.txt", "not a test file");

    write(root, "artifacts/pods/web.txt", "web-0 CrashLoopBackOff");
    write(root, "artifacts/pods/nested/db.txt", "db-0 Running");
    write(root, "artifacts/pods/core.bin.txt", b"\x7fELF\x00\x00binary");
    write(root, "artifacts/events.json", r#"{"reason": "FailedScheduling"}"#);
    dir
}

#[tokio::test]
async fn failed_steps_are_listed_with_dependencies() {
    let dir = job_dir();
    let collector = FsCollector::new(dir.path())
        .with_ignored_steps(&["gath*"])
        .expect("valid globs");

    let steps = collector.list_failed_steps(&job()).await.expect("steps");

    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].name, "e2e");
    assert_eq!(steps[0].dependencies, vec!["install".to_string()]);
    assert!(steps[0].log.contains("cluster install timed out"));
    assert!(steps[0].size_tokens > 0);
}

#[tokio::test]
async fn failed_tests_come_from_json_exports() {
    let dir = job_dir();
    let tests = FsCollector::new(dir.path())
        .list_failed_tests(&job())
        .await
        .expect("tests");

    let ids: Vec<&str> = tests.iter().map(|t| t.identifier.as_str()).collect();
    assert_eq!(ids, vec!["Controller.reconciles", "bare_case"]);
    assert_eq!(tests[0].failure_type.as_deref(), Some("AssertionError"));
    assert_eq!(tests[0].source_file.as_deref(), Some("junit_e2e.json"));
    assert!(tests[1].details.contains("panic: nil map"));
}

#[tokio::test]
async fn artifacts_follow_globs_and_skip_binaries() {
    let dir = job_dir();
    let collector = FsCollector::new(dir.path());
    let include = vec!["pods/*".to_string(), "events.json".to_string()];

    let artifacts = collector
        .list_included_artifacts(&job(), &include, &[])
        .await
        .expect("artifacts");
    let paths: Vec<&str> = artifacts.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(paths, vec!["events.json", "pods/web.txt"]);

    let excluded = collector
        .list_included_artifacts(&job(), &include, &["events.*".to_string()])
        .await
        .expect("artifacts");
    assert_eq!(excluded.len(), 1);

    let none = collector
        .list_included_artifacts(&job(), &[], &[])
        .await
        .expect("artifacts");
    assert!(none.is_empty());
}

#[tokio::test]
async fn preprocessor_condenses_large_logs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut log = String::new();
    for i in 0..2_000 {
        log.push_str(&format!("progress {i}\n"));
    }
    log.push_str("FATAL: etcd quorum lost\n");
    write(dir.path(), "steps/e2e/finished.json", r#"{"passed": false}"#);
    write(dir.path(), "steps/e2e/build-log.txt", &log);

    let collector =
        FsCollector::new(dir.path()).with_preprocessor(Arc::new(TailCondenser::new(500)));
    let steps = collector.list_failed_steps(&job()).await.expect("steps");

    assert!(steps[0].log.len() < log.len());
    assert!(steps[0].log.contains("FATAL: etcd quorum lost"));
    assert!(steps[0].size_tokens <= 600);
}

#[tokio::test]
async fn collect_gathers_everything() {
    let dir = job_dir();
    let collector = FsCollector::new(dir.path());

    let collected = CollectedJob::collect(&collector, &job(), &["pods/**".to_string()], &[])
        .await
        .expect("collect");

    assert_eq!(collected.steps.len(), 2);
    assert_eq!(collected.tests.len(), 2);
    assert_eq!(collected.artifacts.len(), 2);
    assert!(!collected.has_no_failures());
}

#[tokio::test]
async fn missing_job_directory_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let collector = FsCollector::new(dir.path().join("nope"));

    let err = collector.list_failed_steps(&job()).await.expect_err("missing");
    assert!(matches!(err, CollectorError::JobNotFound(_)));
}

#[tokio::test]
async fn malformed_finished_json_is_invalid_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "steps/e2e/finished.json", "{passed: nope");

    let err = FsCollector::new(dir.path())
        .list_failed_steps(&job())
        .await
        .expect_err("malformed");
    assert!(matches!(err, CollectorError::InvalidData { .. }));
}
