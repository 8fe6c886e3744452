//! Concurrent batches over one shared browser

use crate::helpers::*;
use pipeline_launcher::core::target::resolve_targets;
use pipeline_launcher::core::RunStatus;
use pipeline_launcher::execution::{EventBus, LaunchEvent};
use pipeline_launcher::session::InMemorySessionStore;
use pipeline_launcher::surface::Browser;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_mixed_batch_keeps_order_and_closes_browser_once() {
    let a = target("alpha");
    let b = target("bravo");
    let c = target("charlie");
    let browser = MockBrowser::new(vec![
        (&a, ConsoleScript::completes("run-a").requiring_login()),
        (&b, ConsoleScript::completes("run-b")),
        (
            &c,
            ConsoleScript::completes("run-c").with_replies(vec![
                ConsoleReply::Concurrency("DEVPIPE.00011104"),
                ConsoleReply::Accept,
            ]),
        ),
    ]);

    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let (coordinator, registry) = batch(runner(
        fast_settings(),
        Arc::new(InMemorySessionStore::new()),
        bus,
        None,
    ));

    let shared: Arc<dyn Browser> = browser.clone();
    let result = coordinator
        .execute_targets(shared, vec![a.clone(), b.clone(), c.clone()])
        .await;

    let names: Vec<_> = result.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
    assert_eq!(result.results[0].status, RunStatus::LoginError);
    assert_eq!(result.results[1].status, RunStatus::Completed);
    assert_eq!(result.results[2].status, RunStatus::Completed);
    assert_eq!(result.passed(), 2);
    assert!(!result.all_succeeded());

    assert_eq!(browser.stats.browser_closes(), 1);
    assert_eq!(browser.stats.confirmations_for(&c.entry_url), 2);
    assert!(registry.get(result.batch_id).await.is_none());

    let events = drain(&mut events);
    assert!(matches!(events.first(), Some(LaunchEvent::BatchStarted { total: 3, .. })));
    assert!(matches!(events.last(), Some(LaunchEvent::BatchDone { results, .. }) if results.len() == 3));
    let finished = events
        .iter()
        .filter(|e| matches!(e, LaunchEvent::RunFinished { .. }))
        .count();
    assert_eq!(finished, 3);
}

#[tokio::test(start_paused = true)]
async fn test_only_resolvable_selectors_produce_results() {
    let catalog = vec![target("api"), target("web"), target("docs").in_group("site")];
    let browser = MockBrowser::new(vec![
        (&catalog[0], ConsoleScript::completes("run-api")),
        (&catalog[1], ConsoleScript::completes("run-web").with_statuses(vec!["RUNNING", "FAILED"])),
        (
            &catalog[2],
            ConsoleScript::completes("run-docs")
                .with_replies(vec![ConsoleReply::Reject("DEVPIPE.1", "denied")]),
        ),
    ]);
    let selectors = vec![
        "api".to_string(),
        "web".to_string(),
        "site/docs".to_string(),
        "missing".to_string(),
    ];
    let selection = resolve_targets(&catalog, &selectors);
    assert_eq!(selection.unmatched, vec!["missing".to_string()]);

    let (coordinator, _) = batch(runner(
        fast_settings(),
        Arc::new(InMemorySessionStore::new()),
        EventBus::default(),
        None,
    ));
    let result = coordinator.execute(browser.clone(), selection).await;

    assert_eq!(result.total(), 3);
    assert_eq!(result.unmatched, vec!["missing".to_string()]);
    for run in &result.results {
        assert!(run.status.is_terminal(), "{} ended {}", run.name, run.status);
        assert_ne!(run.status, RunStatus::Unknown);
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_run_becomes_error_without_stopping_the_batch() {
    let ok = target("steady");
    let bad = target("explodes");
    let browser = MockBrowser::new(vec![
        (&ok, ConsoleScript::completes("run-ok")),
        (&bad, ConsoleScript::completes("run-bad").panicking()),
    ]);

    let (coordinator, _) = batch(runner(
        fast_settings(),
        Arc::new(InMemorySessionStore::new()),
        EventBus::default(),
        None,
    ));
    let result = coordinator
        .execute_targets(browser.clone(), vec![bad.clone(), ok.clone()])
        .await;

    assert_eq!(result.results[0].name, "explodes");
    assert_eq!(result.results[0].status, RunStatus::Error);
    assert!(result.results[0].error.is_some());
    assert_eq!(result.results[1].status, RunStatus::Completed);
    assert_eq!(browser.stats.browser_closes(), 1);

    // The panicked run's context is closed on its way down
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(browser.stats.contexts_opened.load(Ordering::SeqCst), 2);
    assert_eq!(browser.stats.contexts_closed.load(Ordering::SeqCst), 2);
}
