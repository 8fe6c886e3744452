//! Launch confirmation: retries, timeouts and rejections

use crate::helpers::*;
use pipeline_launcher::core::{RunStatus, Settings};
use pipeline_launcher::execution::LaunchEvent;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_concurrency_limit_on_every_attempt_exhausts_retries() {
    let settings = Settings {
        max_confirm_retries: 3,
        launch_timeout_ms: 600_000,
        ..fast_settings()
    };
    let script = ConsoleScript::completes("run-busy")
        .with_replies(vec![ConsoleReply::Concurrency("DEVPIPE.00011104")]);

    let (result, browser, events) = run_single(script, settings).await;

    assert_eq!(result.status, RunStatus::RetryLimitExceeded);
    assert_eq!(browser.stats.confirmations_for(&entry_url("single")), 3);
    assert!(result.run_id.is_none());
    assert_eq!(result.detail_url, entry_url("single"));

    let warnings = events
        .iter()
        .filter(|e| matches!(e, LaunchEvent::Log { message, .. } if message.starts_with("Concurrency limit")))
        .count();
    assert_eq!(warnings, 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_ceiling_ends_the_launch_before_the_deadline() {
    let settings = Settings {
        max_confirm_retries: 3,
        retry_interval_ms: 25_000,
        launch_timeout_ms: 60_000,
        ..fast_settings()
    };
    let script = ConsoleScript::completes("run-crowded")
        .with_replies(vec![ConsoleReply::Concurrency("DEVPIPE.00011104")]);

    let started = Instant::now();
    let (result, browser, _) = run_single(script, settings).await;
    let elapsed = started.elapsed();

    assert_eq!(result.status, RunStatus::RetryLimitExceeded);
    assert_eq!(browser.stats.confirmations_for(&entry_url("single")), 3);
    // Two 25s pauses between three attempts, none after the last
    assert!(elapsed >= Duration::from_secs(50), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(55), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_limit_then_accepted() {
    let script = ConsoleScript::completes("run-second").with_replies(vec![
        ConsoleReply::Concurrency("DEVPIPE.00011105"),
        ConsoleReply::Accept,
    ]);

    let (result, browser, _) = run_single(script, fast_settings()).await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.run_id.as_deref(), Some("run-second"));
    assert_eq!(browser.stats.confirmations_for(&entry_url("single")), 2);
}

#[tokio::test(start_paused = true)]
async fn test_silent_console_times_out_with_retries_left() {
    let settings = Settings {
        max_confirm_retries: 50,
        launch_timeout_ms: 20_000,
        confirm_attempt_timeout_ms: 10_000,
        page_settle_ms: 2_000,
        dialog_wait_ms: 2_000,
        ..fast_settings()
    };
    let script = ConsoleScript::completes("never").with_replies(vec![ConsoleReply::Silent]);

    let started = Instant::now();
    let (result, browser, _) = run_single(script, settings).await;
    let elapsed = started.elapsed();

    assert_eq!(result.status, RunStatus::StartupTimeout);
    // Two attempts fit: 10s, a 2s pause, then the 8s left
    assert_eq!(browser.stats.confirmations_for(&entry_url("single")), 2);
    // page settle and dialog wait come before the launch deadline starts
    assert!(elapsed >= Duration::from_secs(24), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(25), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_structured_error_is_a_startup_error_without_retry() {
    let script = ConsoleScript::completes("nope")
        .with_replies(vec![ConsoleReply::Reject("DEVPIPE.00010001", "pipeline is disabled")]);

    let (result, browser, _) = run_single(script, fast_settings()).await;

    assert_eq!(
        result.status,
        RunStatus::StartupError("DEVPIPE.00010001".to_string())
    );
    assert_eq!(result.status.to_string(), "STARTUP_ERROR (DEVPIPE.00010001)");
    assert_eq!(browser.stats.confirmations_for(&entry_url("single")), 1);
}

#[tokio::test(start_paused = true)]
async fn test_redirect_to_run_detail_counts_as_launched() {
    let script = ConsoleScript::completes("run-redirect").with_replies(vec![ConsoleReply::Redirect]);

    let (result, _, _) = run_single(script, fast_settings()).await;

    assert_eq!(result.status, RunStatus::Completed);
    // The id comes from the first detail reading instead of the launch reply
    assert_eq!(result.run_id.as_deref(), Some("run-redirect"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_run_control_ends_in_error() {
    let script = ConsoleScript::completes("r").without_run_button();

    let (result, browser, _) = run_single(script, fast_settings()).await;

    assert_eq!(result.status, RunStatus::Error);
    assert!(result.error.is_some());
    assert_eq!(browser.stats.confirmations_for(&entry_url("single")), 0);
    assert_eq!(
        browser.stats.contexts_closed.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}
