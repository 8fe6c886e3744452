//! Status monitoring after a confirmed launch

use crate::helpers::*;
use pipeline_launcher::core::{RunStatus, Settings};

#[tokio::test(start_paused = true)]
async fn test_stale_terminal_reading_is_ignored() {
    let script = ConsoleScript::completes("run-fresh")
        .with_stale_status("FAILED")
        .with_statuses(vec!["RUNNING", "COMPLETED"]);

    let (result, _, events) = run_single(script, fast_settings()).await;

    assert_eq!(result.status, RunStatus::Completed);
    let statuses: Vec<_> = progress_of(&events, "single")
        .into_iter()
        .map(|r| r.status.clone())
        .collect();
    assert_eq!(statuses, vec![RunStatus::Running, RunStatus::Completed]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_is_reported_as_failed() {
    let script = ConsoleScript::completes("run-red").with_statuses(vec!["RUNNING", "FAILED"]);

    let (result, _, _) = run_single(script, fast_settings()).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert!(!result.status.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_detail_url_is_refined_once_and_never_regresses() {
    let script = ConsoleScript::completes("run-link")
        .with_statuses(vec!["RUNNING", "RUNNING", "COMPLETED"])
        .with_ids(vec![("p-1", "pl-a"), ("p-9", "pl-z")]);

    let (result, _, events) = run_single(script, fast_settings()).await;

    let refined = "https://console.example.com/cicd/project/p-1/pipeline/detail/pl-a/run-link?v=1";
    assert_eq!(result.detail_url, refined);

    let mut seen_refined = false;
    for progress in progress_of(&events, "single") {
        if seen_refined {
            assert_eq!(progress.detail_url, refined);
        }
        seen_refined |= progress.detail_url.contains("run-link");
    }
    assert!(seen_refined);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_timeout_keeps_collected_fields() {
    let settings = Settings {
        monitor_timeout_ms: 30_000,
        ..fast_settings()
    };
    let script = ConsoleScript::completes("run-slow").with_statuses(vec!["RUNNING"]);

    let (result, _, _) = run_single(script, settings).await;

    assert_eq!(result.status, RunStatus::MonitorTimeout);
    assert_eq!(result.run_id.as_deref(), Some("run-slow"));
    assert_eq!(result.executor.as_deref(), Some("ci-bot"));
    assert!(result.detail_url.contains("run-slow"));
    assert!(result.duration_ms().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_one_progress_event_per_distinct_status() {
    let script = ConsoleScript::completes("run-chatty")
        .with_statuses(vec!["INIT", "RUNNING", "RUNNING", "RUNNING", "COMPLETED"]);

    let (result, _, events) = run_single(script, fast_settings()).await;

    assert_eq!(result.status, RunStatus::Completed);
    let statuses: Vec<_> = progress_of(&events, "single")
        .into_iter()
        .map(|r| r.status.clone())
        .collect();
    assert_eq!(
        statuses,
        vec![RunStatus::Init, RunStatus::Running, RunStatus::Completed]
    );
}
