//! Run coordinator: one pipeline from a fresh context to a final result

use crate::core::{
    config::{Credentials, Settings},
    ConsoleProfile, PipelineTarget, RunResult, RunStatus,
};
use crate::execution::confirm::ConfirmStrategy;
use crate::execution::events::{EventBus, RunLogger};
use crate::execution::launch::{LaunchOutcome, LaunchRequest, LaunchStateMachine};
use crate::execution::monitor::StatusMonitor;
use crate::session::SessionStore;
use crate::surface::{Browser, BrowserContext, SurfaceError};
use std::sync::Arc;
use tracing::warn;

/// Sequences launch and monitoring for single runs of one environment
///
/// [`RunCoordinator::run`] never fails: every problem ends up in the
/// returned [`RunResult`].
pub struct RunCoordinator {
    env: String,
    credentials: Option<Credentials>,
    sessions: Arc<dyn SessionStore>,
    launcher: LaunchStateMachine,
    monitor: StatusMonitor,
    bus: EventBus,
}

impl RunCoordinator {
    pub fn new(
        env: impl Into<String>,
        settings: Settings,
        sessions: Arc<dyn SessionStore>,
        bus: EventBus,
    ) -> Self {
        let profile = Arc::new(ConsoleProfile::default());
        Self {
            env: env.into(),
            credentials: None,
            sessions,
            launcher: LaunchStateMachine::new(settings.clone(), profile.clone()),
            monitor: StatusMonitor::new(settings, profile),
            bus,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Use a different console profile; resets the confirmation strategies
    /// to that profile's defaults
    pub fn with_profile(mut self, profile: ConsoleProfile) -> Self {
        let settings = self.launcher.settings().clone();
        let profile = Arc::new(profile);
        self.launcher = LaunchStateMachine::new(settings.clone(), profile.clone());
        self.monitor = StatusMonitor::new(settings, profile);
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<Box<dyn ConfirmStrategy>>) -> Self {
        self.launcher = self.launcher.with_strategies(strategies);
        self
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Launch and follow one target in its own context
    ///
    /// The context is always closed; the shared browser never is.
    pub async fn run(&self, browser: &dyn Browser, target: &PipelineTarget) -> RunResult {
        let logger = self.bus.run_logger(&target.name);
        let mut result = RunResult::new(target);

        let state = match self.sessions.load(&self.env).await {
            Ok(state) => state,
            Err(e) => {
                logger.warn(format!("Ignoring saved session: {}", e));
                None
            }
        };

        let context = match browser.new_context(state).await {
            Ok(context) => context,
            Err(e) => {
                logger.error(format!("Could not open a browser context: {}", e));
                result.fail(RunStatus::Error, Some(e.to_string()));
                return result;
            }
        };

        let guard = ContextGuard::new(context.clone());

        if let Err(e) = self.drive(context.as_ref(), target, &mut result, &logger).await {
            logger.error(format!("Run aborted: {}", e));
            result.fail(RunStatus::Error, Some(e.to_string()));
        }

        guard.close(&logger).await;

        logger.info(format!("Finished: {}", result.status));
        result
    }

    async fn drive(
        &self,
        context: &dyn BrowserContext,
        target: &PipelineTarget,
        result: &mut RunResult,
        logger: &RunLogger,
    ) -> Result<(), SurfaceError> {
        let page = context.new_page().await?;
        // Detail polling may start the moment the launch goes through
        let mut responses = page.responses();

        let request = LaunchRequest {
            target,
            env: &self.env,
            credentials: self.credentials.as_ref(),
            context,
            page: page.as_ref(),
            sessions: self.sessions.as_ref(),
            logger,
        };

        match self.launcher.launch(&request).await? {
            LaunchOutcome::Launched { run_id } => {
                if let Some(run_id) = run_id {
                    result.record_run_id(&run_id);
                }
                self.monitor.watch(&mut responses, target, result, logger).await;
            }
            failed => {
                let status = failed.failure_status().unwrap_or(RunStatus::Error);
                logger.error(format!("Launch failed: {}", status));
                result.fail(status, failed.failure_message());
            }
        }

        Ok(())
    }
}

/// Owns the close of a run's context
///
/// Dropped without [`ContextGuard::close`] (the run panicked or its task was
/// aborted), it schedules the close on the current runtime instead.
struct ContextGuard {
    context: Option<Arc<dyn BrowserContext>>,
}

impl ContextGuard {
    fn new(context: Arc<dyn BrowserContext>) -> Self {
        Self {
            context: Some(context),
        }
    }

    async fn close(mut self, logger: &RunLogger) {
        if let Some(context) = self.context.take() {
            if let Err(e) = context.close().await {
                logger.debug(format!("Closing the context failed: {}", e));
            }
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = context.close().await {
                        warn!("Closing an abandoned context failed: {}", e);
                    }
                });
            }
            Err(_) => warn!("No runtime left to close an abandoned context"),
        }
    }
}
