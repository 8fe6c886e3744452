//! Launch state machine
//!
//! Drives one pipeline page from navigation to a started run:
//!
//! ```text
//! AUTHENTICATING -> READY -> LAUNCH_REQUESTED -> (CONFIRMING <-> CONCURRENCY_RETRY) -> LAUNCHED
//! ```
//!
//! Success is decided from intercepted traffic (the launch response) or from
//! the page landing on a run-detail URL, never from what the UI shows.

use crate::core::{
    config::{Credentials, Settings},
    ConsoleProfile, LaunchPhase, LaunchReply, PipelineTarget, RunStatus,
};
use crate::execution::confirm::{default_strategies, ConfirmStrategy};
use crate::execution::events::RunLogger;
use crate::session::SessionStore;
use crate::surface::{wait_for_response, BrowserContext, Page, SurfaceError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Pause after switching the login form to sub-user mode
const LOGIN_FORM_SWITCH_WAIT: Duration = Duration::from_millis(1_000);

/// How the launch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The console started a run; the id is known when a launch response
    /// carried it
    Launched { run_id: Option<String> },
    /// Login was demanded and no credentials are configured
    LoginRequired,
    /// The console refused the launch with a non-retryable code
    Rejected { code: String, message: String },
    /// The confirmation loop ran past its wall-clock budget
    TimedOut { attempts: u32 },
    /// The confirmation loop used every attempt
    RetriesExhausted { attempts: u32 },
}

impl LaunchOutcome {
    /// Run status for an outcome that ends the run
    pub fn failure_status(&self) -> Option<RunStatus> {
        match self {
            LaunchOutcome::Launched { .. } => None,
            LaunchOutcome::LoginRequired => Some(RunStatus::LoginError),
            LaunchOutcome::Rejected { code, .. } => Some(RunStatus::StartupError(code.clone())),
            LaunchOutcome::TimedOut { .. } => Some(RunStatus::StartupTimeout),
            LaunchOutcome::RetriesExhausted { .. } => Some(RunStatus::RetryLimitExceeded),
        }
    }

    /// Message recorded with a failed outcome
    pub fn failure_message(&self) -> Option<String> {
        match self {
            LaunchOutcome::Launched { .. } => None,
            LaunchOutcome::LoginRequired => {
                Some("Login required but no credentials are configured".to_string())
            }
            LaunchOutcome::Rejected { code, message } => {
                Some(format!("Launch rejected ({}): {}", code, message))
            }
            LaunchOutcome::TimedOut { attempts } => Some(format!(
                "Launch not confirmed in time after {} attempts",
                attempts
            )),
            LaunchOutcome::RetriesExhausted { attempts } => {
                Some(format!("Launch not confirmed after {} attempts", attempts))
            }
        }
    }
}

/// Everything one launch needs besides the machine's own policy
pub struct LaunchRequest<'a> {
    pub target: &'a PipelineTarget,
    pub env: &'a str,
    pub credentials: Option<&'a Credentials>,
    pub context: &'a dyn BrowserContext,
    pub page: &'a dyn Page,
    pub sessions: &'a dyn SessionStore,
    pub logger: &'a RunLogger,
}

enum Signal {
    Reply(Option<crate::surface::InterceptedResponse>),
    Redirected,
}

/// Launch policy shared by every run of a batch
pub struct LaunchStateMachine {
    settings: Settings,
    profile: Arc<ConsoleProfile>,
    strategies: Vec<Box<dyn ConfirmStrategy>>,
}

impl LaunchStateMachine {
    pub fn new(settings: Settings, profile: Arc<ConsoleProfile>) -> Self {
        let strategies = default_strategies(&profile);
        Self {
            settings,
            profile,
            strategies,
        }
    }

    /// Replace the confirmation strategies
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn ConfirmStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Navigate to the target and get a run started
    ///
    /// # Errors
    /// Surface failures (navigation, a missing run control, a failed login
    /// redirect) are returned as-is; the caller decides what they mean.
    pub async fn launch(&self, request: &LaunchRequest<'_>) -> Result<LaunchOutcome, SurfaceError> {
        let page = request.page;
        let logger = request.logger;

        logger.info(format!("Opening {}", request.target.entry_url));
        page.navigate(&request.target.entry_url).await?;

        let url = page.current_url().await?;
        if self.profile.is_identity_page(&url) {
            self.enter_phase(logger, LaunchPhase::Authenticating);
            if !self.authenticate(request).await? {
                return Ok(LaunchOutcome::LoginRequired);
            }
        }

        self.enter_phase(logger, LaunchPhase::Ready);
        self.request_launch(page, logger).await?;

        self.enter_phase(logger, LaunchPhase::Confirming);
        self.confirm(page, logger).await
    }

    fn enter_phase(&self, logger: &RunLogger, phase: LaunchPhase) {
        logger.debug(format!("Launch phase: {}", phase));
    }

    /// Log in through the identity provider; `Ok(false)` without credentials
    async fn authenticate(&self, request: &LaunchRequest<'_>) -> Result<bool, SurfaceError> {
        let page = request.page;
        let logger = request.logger;
        let selectors = &self.profile.login;

        logger.warn("Login required");

        let Some(credentials) = request.credentials else {
            logger.error("No credentials configured, cannot log in");
            return Ok(false);
        };

        if page.is_visible(&selectors.iam_switch).await? {
            page.click(&selectors.iam_switch, true).await?;
            sleep(LOGIN_FORM_SWITCH_WAIT).await;
        }

        page.fill(&selectors.tenant, &credentials.tenant, true).await?;
        page.fill(&selectors.username, &credentials.username, true).await?;
        page.fill(&selectors.password, &credentials.password, true).await?;
        page.click(&selectors.submit, true).await?;

        page.wait_for_url(&self.profile.project_namespace_marker, self.settings.login_timeout())
            .await?;

        match request.context.storage_state().await {
            Ok(state) => match request.sessions.save(request.env, &state).await {
                Ok(()) => logger.info("Logged in, session saved"),
                Err(e) => logger.warn(format!("Logged in, but saving the session failed: {}", e)),
            },
            Err(e) => logger.warn(format!("Logged in, but capturing the session failed: {}", e)),
        }

        Ok(true)
    }

    /// Wait for the run control and activate it
    async fn request_launch(&self, page: &dyn Page, logger: &RunLogger) -> Result<(), SurfaceError> {
        logger.info("Looking for the run control");
        sleep(self.settings.page_settle()).await;

        let run_button = &self.profile.run_button_selector;
        page.wait_for_visible(run_button, self.settings.run_button_timeout())
            .await?;
        page.click(run_button, true).await?;
        self.enter_phase(logger, LaunchPhase::LaunchRequested);

        sleep(self.settings.dialog_wait()).await;
        Ok(())
    }

    /// Confirmation loop with concurrency retries
    async fn confirm(&self, page: &dyn Page, logger: &RunLogger) -> Result<LaunchOutcome, SurfaceError> {
        let max_attempts = self.settings.max_confirm_retries;
        let deadline = Instant::now() + self.settings.launch_timeout();
        let matcher = self.profile.launch_matcher();
        let mut attempts = 0u32;

        loop {
            let now = Instant::now();
            if now >= deadline {
                logger.error(format!(
                    "Launch not confirmed within {:?}",
                    self.settings.launch_timeout()
                ));
                return Ok(LaunchOutcome::TimedOut { attempts });
            }
            if attempts >= max_attempts {
                return Ok(exhausted(logger, attempts));
            }
            if self.on_run_detail_page(page).await {
                logger.info("Page moved to the run detail, launch confirmed");
                self.enter_phase(logger, LaunchPhase::Launched);
                return Ok(LaunchOutcome::Launched { run_id: None });
            }

            // Subscribe before acting so the launch response cannot slip past
            let mut responses = page.responses();
            self.attempt_confirmation(page, logger).await?;

            let window = self
                .settings
                .confirm_attempt_timeout()
                .min(deadline.saturating_duration_since(Instant::now()));

            let signal = tokio::select! {
                reply = wait_for_response(&mut responses, &matcher, window) => Signal::Reply(reply),
                () = self.watch_for_redirect(page) => Signal::Redirected,
            };

            let reply = match signal {
                Signal::Redirected => {
                    logger.info("Page moved to the run detail, launch confirmed");
                    self.enter_phase(logger, LaunchPhase::Launched);
                    return Ok(LaunchOutcome::Launched { run_id: None });
                }
                Signal::Reply(None) => {
                    logger.debug("No launch response in this attempt");
                    LaunchReply::Unrecognized
                }
                Signal::Reply(Some(response)) => match response.body {
                    Some(body) => self.profile.classify_launch(&body),
                    None => {
                        logger.warn("Launch response carried no JSON body");
                        LaunchReply::Unrecognized
                    }
                },
            };

            match reply {
                LaunchReply::Accepted { run_id } => {
                    logger.info_with(
                        format!("Launch confirmed (run {})", run_id),
                        serde_json::json!({ "runId": run_id }),
                    );
                    self.enter_phase(logger, LaunchPhase::Launched);
                    return Ok(LaunchOutcome::Launched {
                        run_id: Some(run_id),
                    });
                }
                LaunchReply::ConcurrencyLimited { code } => {
                    attempts += 1;
                    self.enter_phase(logger, LaunchPhase::ConcurrencyRetry);
                    logger.warn(format!(
                        "Concurrency limit ({}), retry {}/{}",
                        code, attempts, max_attempts
                    ));
                    if attempts >= max_attempts {
                        return Ok(exhausted(logger, attempts));
                    }
                    self.pause(self.settings.retry_interval(), deadline).await;
                }
                LaunchReply::Rejected { code, message } => {
                    logger.info_with(
                        "Launch rejected",
                        serde_json::json!({ "errorCode": code, "message": message }),
                    );
                    return Ok(LaunchOutcome::Rejected { code, message });
                }
                LaunchReply::Unrecognized => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Ok(exhausted(logger, attempts));
                    }
                    self.pause(self.settings.page_settle(), deadline).await;
                }
            }
        }
    }

    /// Run the strategies in order until one acts
    async fn attempt_confirmation(&self, page: &dyn Page, logger: &RunLogger) -> Result<(), SurfaceError> {
        for strategy in &self.strategies {
            match strategy.attempt(page).await {
                Ok(true) => {
                    logger.debug(format!("Confirmation via {}", strategy.name()));
                    return Ok(());
                }
                Ok(false) => {}
                Err(e @ SurfaceError::Disconnected(_)) => return Err(e),
                Err(e) => logger.debug(format!("Strategy {} failed: {}", strategy.name(), e)),
            }
        }
        logger.debug("No confirmation control found");
        Ok(())
    }

    async fn on_run_detail_page(&self, page: &dyn Page) -> bool {
        page.current_url()
            .await
            .map(|url| self.profile.is_run_detail_page(&url))
            .unwrap_or(false)
    }

    /// Resolves once the page URL reaches a run-detail page
    async fn watch_for_redirect(&self, page: &dyn Page) {
        loop {
            sleep(self.settings.url_poll_interval()).await;
            if self.on_run_detail_page(page).await {
                return;
            }
        }
    }

    /// Sleep for `wait`, but never past `deadline`
    async fn pause(&self, wait: Duration, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep(wait.min(remaining)).await;
    }
}

/// The attempt ceiling wins as soon as it is reached, with no trailing wait
fn exhausted(logger: &RunLogger, attempts: u32) -> LaunchOutcome {
    logger.error(format!("Launch not confirmed after {} attempts", attempts));
    LaunchOutcome::RetriesExhausted { attempts }
}
