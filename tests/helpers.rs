//! Test utilities for pipeline-launcher: a scripted console behind the
//! automation surface traits

#![allow(dead_code)]

use async_trait::async_trait;
use pipeline_launcher::core::{ConsoleProfile, PipelineTarget, RunResult, Settings};
use pipeline_launcher::execution::{
    BatchCoordinator, BatchRegistry, EventBus, LaunchEvent, RunCoordinator,
};
use pipeline_launcher::core::config::Credentials;
use pipeline_launcher::session::{InMemorySessionStore, SessionStore};
use pipeline_launcher::surface::{
    Browser, BrowserContext, DomScan, InterceptedResponse, Page, PersistedState, SurfaceError,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const HOST: &str = "console.example.com";
pub const LOGIN_URL: &str = "https://auth.huaweicloud.com/authui/login.html";

/// Entry URL of a pipeline page in the mock console
pub fn entry_url(name: &str) -> String {
    format!("https://{}/cicd/project/p-1/pipelines/{}", HOST, name)
}

pub fn target(name: &str) -> PipelineTarget {
    PipelineTarget::new(name, entry_url(name))
}

/// What the console answers to one launch confirmation
#[derive(Debug, Clone)]
pub enum ConsoleReply {
    Accept,
    Concurrency(&'static str),
    Reject(&'static str, &'static str),
    /// No launch response at all
    Silent,
    /// No response, but the page moves to the run detail
    Redirect,
}

/// Scripted behaviour of one pipeline page
#[derive(Debug, Clone)]
pub struct ConsoleScript {
    pub login_required: bool,
    pub run_button_visible: bool,
    /// Consumed one per confirmation; the last one repeats
    pub launch_replies: Vec<ConsoleReply>,
    /// Terminal status left over from an earlier run, sent before the rest
    pub stale_status: Option<&'static str>,
    /// Statuses the detail endpoint reports once the run started
    pub statuses: Vec<&'static str>,
    /// Project/pipeline ids per status reading (defaults to p-1/pl-<name>)
    pub ids: Vec<(&'static str, &'static str)>,
    pub run_id: String,
    pub executor: &'static str,
    pub detail_interval: Duration,
    pub launch_delay: Duration,
    pub panic_on_navigate: bool,
}

impl ConsoleScript {
    /// A page that accepts the first confirmation and completes
    pub fn completes(run_id: &str) -> Self {
        Self {
            login_required: false,
            run_button_visible: true,
            launch_replies: vec![ConsoleReply::Accept],
            stale_status: None,
            statuses: vec!["RUNNING", "COMPLETED"],
            ids: Vec::new(),
            run_id: run_id.to_string(),
            executor: "ci-bot",
            detail_interval: Duration::from_millis(500),
            launch_delay: Duration::from_millis(100),
            panic_on_navigate: false,
        }
    }

    pub fn with_replies(mut self, replies: Vec<ConsoleReply>) -> Self {
        self.launch_replies = replies;
        self
    }

    pub fn with_statuses(mut self, statuses: Vec<&'static str>) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn with_stale_status(mut self, status: &'static str) -> Self {
        self.stale_status = Some(status);
        self
    }

    pub fn with_ids(mut self, ids: Vec<(&'static str, &'static str)>) -> Self {
        self.ids = ids;
        self
    }

    pub fn requiring_login(mut self) -> Self {
        self.login_required = true;
        self
    }

    pub fn without_run_button(mut self) -> Self {
        self.run_button_visible = false;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_navigate = true;
        self
    }
}

/// Counters shared by everything a [`MockBrowser`] creates
#[derive(Debug, Default)]
pub struct MockStats {
    pub browser_closes: AtomicUsize,
    pub contexts_opened: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub seeded_contexts: AtomicUsize,
    /// Launch confirmations the console received, per entry URL
    pub confirmations: Mutex<HashMap<String, usize>>,
    /// Every fill, as (selector, value)
    pub fills: Mutex<Vec<(String, String)>>,
}

impl MockStats {
    pub fn browser_closes(&self) -> usize {
        self.browser_closes.load(Ordering::SeqCst)
    }

    pub fn confirmations_for(&self, url: &str) -> usize {
        self.confirmations.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

/// Browser whose pages follow per-URL scripts
pub struct MockBrowser {
    scripts: Arc<HashMap<String, ConsoleScript>>,
    pub stats: Arc<MockStats>,
}

impl MockBrowser {
    pub fn new(scripts: Vec<(&PipelineTarget, ConsoleScript)>) -> Arc<Self> {
        let scripts = scripts
            .into_iter()
            .map(|(target, script)| (target.entry_url.clone(), script))
            .collect();
        Arc::new(Self {
            scripts: Arc::new(scripts),
            stats: Arc::new(MockStats::default()),
        })
    }
}

#[async_trait]
impl Browser for MockBrowser {
    async fn new_context(
        &self,
        state: Option<PersistedState>,
    ) -> Result<Arc<dyn BrowserContext>, SurfaceError> {
        self.stats.contexts_opened.fetch_add(1, Ordering::SeqCst);
        if state.is_some() {
            self.stats.seeded_contexts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Arc::new(MockContext {
            scripts: self.scripts.clone(),
            stats: self.stats.clone(),
            has_session: state.is_some(),
        }))
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        self.stats.browser_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockContext {
    scripts: Arc<HashMap<String, ConsoleScript>>,
    stats: Arc<MockStats>,
    has_session: bool,
}

#[async_trait]
impl BrowserContext for MockContext {
    async fn new_page(&self) -> Result<Arc<dyn Page>, SurfaceError> {
        let (events, _) = broadcast::channel(256);
        Ok(Arc::new(MockPage {
            scripts: self.scripts.clone(),
            stats: self.stats.clone(),
            profile: ConsoleProfile::default(),
            events,
            state: Mutex::new(PageState {
                logged_in: self.has_session,
                ..PageState::default()
            }),
        }))
    }

    async fn storage_state(&self) -> Result<PersistedState, SurfaceError> {
        Ok(PersistedState(json!({ "cookies": [{ "name": "sid", "value": "mock" }] })))
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        self.stats.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct PageState {
    url: String,
    entry: String,
    script: Option<ConsoleScript>,
    logged_in: bool,
    dialog_open: bool,
    replies_used: usize,
}

pub struct MockPage {
    scripts: Arc<HashMap<String, ConsoleScript>>,
    stats: Arc<MockStats>,
    profile: ConsoleProfile,
    events: broadcast::Sender<InterceptedResponse>,
    state: Mutex<PageState>,
}

impl MockPage {
    fn script(&self) -> Result<ConsoleScript, SurfaceError> {
        self.state
            .lock()
            .unwrap()
            .script
            .clone()
            .ok_or_else(|| SurfaceError::Driver("no page loaded".to_string()))
    }

    /// The console received a confirmation: answer it as scripted
    fn confirm_launch(&self) -> Result<(), SurfaceError> {
        let script = self.script()?;
        let (reply, entry) = {
            let mut state = self.state.lock().unwrap();
            let index = state.replies_used.min(script.launch_replies.len().saturating_sub(1));
            state.replies_used += 1;
            (script.launch_replies.get(index).cloned(), state.entry.clone())
        };
        *self
            .stats
            .confirmations
            .lock()
            .unwrap()
            .entry(entry.clone())
            .or_insert(0) += 1;

        let body = match reply.unwrap_or(ConsoleReply::Silent) {
            ConsoleReply::Accept => {
                self.start_run(&script, false);
                json!({ "result": { "pipeline_run_id": script.run_id } })
            }
            ConsoleReply::Concurrency(code) => {
                json!({ "error_code": code, "error_msg": "too many concurrent runs" })
            }
            ConsoleReply::Reject(code, message) => json!({ "error_code": code, "error_msg": message }),
            ConsoleReply::Silent => return Ok(()),
            ConsoleReply::Redirect => {
                self.start_run(&script, true);
                return Ok(());
            }
        };

        let response = InterceptedResponse {
            url: format!("https://{}/cicd/api/pipelines/pl-1/run", HOST),
            method: "POST".to_string(),
            status: 200,
            body: Some(body),
        };
        let events = self.events.clone();
        let delay = script.launch_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(response);
        });
        Ok(())
    }

    /// Begin publishing run-detail readings
    fn start_run(&self, script: &ConsoleScript, redirect: bool) {
        if redirect {
            self.state.lock().unwrap().url = format!(
                "https://{}/cicd/project/p-1/pipeline-runs/detail/{}",
                HOST, script.run_id
            );
        }

        let mut readings = Vec::new();
        if let Some(stale) = script.stale_status {
            readings.push(detail_response(script, stale, 0));
        }
        for (i, status) in script.statuses.iter().enumerate() {
            readings.push(detail_response(script, status, i));
        }

        let events = self.events.clone();
        let interval = script.detail_interval;
        tokio::spawn(async move {
            for reading in readings {
                tokio::time::sleep(interval).await;
                let _ = events.send(reading);
            }
        });
    }
}

fn detail_response(script: &ConsoleScript, status: &str, index: usize) -> InterceptedResponse {
    let (project, pipeline) = script
        .ids
        .get(index)
        .or_else(|| script.ids.last())
        .copied()
        .unwrap_or(("p-1", "pl-1"));
    InterceptedResponse {
        url: format!(
            "https://{}/cicd/api/pipeline-runs/detail?pipeline_run_id={}",
            HOST, script.run_id
        ),
        method: "GET".to_string(),
        status: 200,
        body: Some(json!({ "result": {
            "status": status,
            "pipeline_run_id": script.run_id,
            "executor_name": script.executor,
            "project_id": project,
            "pipeline_id": pipeline,
            "start_time": 1_700_000_000_000i64,
            "update_time": 1_700_000_000_000i64 + 60_000 * (index as i64 + 1)
        }})),
    }
}

#[async_trait]
impl Page for MockPage {
    async fn navigate(&self, url: &str) -> Result<(), SurfaceError> {
        let script = self
            .scripts
            .get(url)
            .cloned()
            .ok_or_else(|| SurfaceError::Navigation {
                url: url.to_string(),
                message: "404".to_string(),
            })?;
        if script.panic_on_navigate {
            panic!("scripted panic while opening {}", url);
        }

        let mut state = self.state.lock().unwrap();
        state.entry = url.to_string();
        state.url = if script.login_required && !state.logged_in {
            LOGIN_URL.to_string()
        } else {
            url.to_string()
        };
        state.script = Some(script);
        Ok(())
    }

    async fn current_url(&self) -> Result<String, SurfaceError> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, SurfaceError> {
        let state = self.state.lock().unwrap();
        let on_login = state.url == LOGIN_URL;
        let run_button = state.script.as_ref().map_or(false, |s| s.run_button_visible);

        Ok(if selector == self.profile.login.iam_switch {
            on_login
        } else if selector == self.profile.run_button_selector {
            !on_login && run_button
        } else if selector == self.profile.dialog_confirm_selectors[0] {
            state.dialog_open
        } else {
            false
        })
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<(), SurfaceError> {
        if self.is_visible(selector).await? {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        Err(SurfaceError::Timeout(timeout, selector.to_string()))
    }

    async fn click(&self, selector: &str, _force: bool) -> Result<(), SurfaceError> {
        if selector == self.profile.login.submit {
            let mut state = self.state.lock().unwrap();
            state.logged_in = true;
            state.url = state.entry.clone();
            return Ok(());
        }
        if selector == self.profile.run_button_selector {
            self.state.lock().unwrap().dialog_open = true;
            return Ok(());
        }
        if self.profile.dialog_confirm_selectors.iter().any(|s| s == selector) {
            return self.confirm_launch();
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str, _force: bool) -> Result<(), SurfaceError> {
        self.stats
            .fills
            .lock()
            .unwrap()
            .push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn wait_for_url(&self, fragment: &str, timeout: Duration) -> Result<(), SurfaceError> {
        if self.state.lock().unwrap().url.contains(fragment) {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        Err(SurfaceError::Timeout(timeout, fragment.to_string()))
    }

    async fn evaluate(&self, _scan: &DomScan) -> Result<Value, SurfaceError> {
        Ok(json!(false))
    }

    fn responses(&self) -> broadcast::Receiver<InterceptedResponse> {
        self.events.subscribe()
    }
}

/// Short timings so scenarios finish in little virtual time
pub fn fast_settings() -> Settings {
    Settings {
        max_confirm_retries: 5,
        retry_interval_ms: 1_000,
        launch_timeout_ms: 60_000,
        monitor_timeout_ms: 120_000,
        login_timeout_ms: 10_000,
        page_settle_ms: 100,
        dialog_wait_ms: 100,
        confirm_attempt_timeout_ms: 2_000,
        run_button_timeout_ms: 1_000,
        terminal_settle_ms: 500,
        url_poll_interval_ms: 200,
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        tenant: "acme".to_string(),
        username: "robot".to_string(),
        password: "s3cret".to_string(),
    }
}

/// Run coordinator for the `default` environment
pub fn runner(
    settings: Settings,
    sessions: Arc<dyn SessionStore>,
    bus: EventBus,
    credentials: Option<Credentials>,
) -> RunCoordinator {
    RunCoordinator::new("default", settings, sessions, bus).with_credentials(credentials)
}

/// Run one scripted target, returning its result and every event emitted
pub async fn run_single(
    script: ConsoleScript,
    settings: Settings,
) -> (RunResult, Arc<MockBrowser>, Vec<LaunchEvent>) {
    let target = target("single");
    let browser = MockBrowser::new(vec![(&target, script)]);
    let bus = EventBus::default();
    let mut events = bus.subscribe();

    let coordinator = runner(settings, Arc::new(InMemorySessionStore::new()), bus, None);
    let result = coordinator.run(browser.as_ref(), &target).await;

    (result, browser, drain(&mut events))
}

/// Batch coordinator over a fresh registry
pub fn batch(runner: RunCoordinator) -> (BatchCoordinator, Arc<BatchRegistry>) {
    let registry = Arc::new(BatchRegistry::new());
    (BatchCoordinator::new(runner, registry.clone()), registry)
}

/// Every event currently buffered on `rx`
pub fn drain(rx: &mut broadcast::Receiver<LaunchEvent>) -> Vec<LaunchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Progress events of one run, in order
pub fn progress_of<'a>(events: &'a [LaunchEvent], run: &str) -> Vec<&'a RunResult> {
    events
        .iter()
        .filter_map(|event| match event {
            LaunchEvent::Progress { run: r, result, .. } if r == run => Some(result),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_response_ids_fall_back_to_last() {
        let script = ConsoleScript::completes("r-1").with_ids(vec![("p-1", "pl-a"), ("p-2", "pl-b")]);
        let third = detail_response(&script, "RUNNING", 2);
        let body = third.body.unwrap();
        assert_eq!(body["result"]["project_id"], "p-2");
        assert_eq!(body["result"]["pipeline_run_id"], "r-1");
    }

    #[tokio::test]
    async fn test_mock_page_requires_login() {
        let t = target("x");
        let browser = MockBrowser::new(vec![(&t, ConsoleScript::completes("r").requiring_login())]);
        let context = browser.new_context(None).await.unwrap();
        let page = context.new_page().await.unwrap();

        page.navigate(&t.entry_url).await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), LOGIN_URL);

        let seeded = browser.new_context(Some(PersistedState(json!({})))).await.unwrap();
        let page = seeded.new_page().await.unwrap();
        page.navigate(&t.entry_url).await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), t.entry_url);
    }
}
