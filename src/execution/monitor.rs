//! Status monitor: follows a launched run through the console's own polling
//! of its run-detail endpoint.

use crate::core::{
    config::Settings,
    console::{canonical_detail_url, RunDetail},
    ConsoleProfile, PipelineTarget, RunResult, RunStatus,
};
use crate::execution::events::RunLogger;
use crate::surface::{next_response, InterceptedResponse, ResponseMatcher};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{timeout_at, Instant};

/// Watches intercepted run-detail responses until a terminal status
pub struct StatusMonitor {
    settings: Settings,
    profile: Arc<ConsoleProfile>,
}

impl StatusMonitor {
    pub fn new(settings: Settings, profile: Arc<ConsoleProfile>) -> Self {
        Self { settings, profile }
    }

    /// Follow the run until it finishes or the monitor deadline passes
    ///
    /// `responses` should be subscribed before the launch was triggered. A
    /// terminal status read before any in-flight one is treated as stale
    /// (left over from an earlier run of the same pipeline) and skipped.
    /// Once the run id is known, readings about any other run are ignored.
    pub async fn watch(
        &self,
        responses: &mut broadcast::Receiver<InterceptedResponse>,
        target: &PipelineTarget,
        result: &mut RunResult,
        logger: &RunLogger,
    ) {
        let matcher = self.profile.detail_matcher();
        let deadline = Instant::now() + self.settings.monitor_timeout();
        let mut seen_in_flight = false;
        let mut announced = HashSet::new();

        logger.info("Run started, monitoring status");

        loop {
            let response = match timeout_at(deadline, next_response(responses, &matcher)).await {
                Ok(Some(response)) => response,
                Ok(None) => {
                    logger.error("Page closed while monitoring");
                    result.fail(
                        RunStatus::Error,
                        Some("Page closed while monitoring".to_string()),
                    );
                    return;
                }
                Err(_) => {
                    let message = format!(
                        "No terminal status within {} minutes",
                        self.settings.monitor_timeout().as_secs() / 60
                    );
                    logger.error(&message);
                    result.fail(RunStatus::MonitorTimeout, Some(message));
                    return;
                }
            };

            let Some(body) = response.body else {
                logger.debug("Run detail response without JSON body");
                continue;
            };
            let detail = RunDetail::from_payload(&body);
            if !belongs_to(&detail, result) {
                logger.debug(format!(
                    "Ignoring reading for run {}",
                    detail.run_id.as_deref().unwrap_or_default()
                ));
                continue;
            }
            let Some(status) = detail.status.clone() else {
                continue;
            };

            if status.is_remote_terminal() && !seen_in_flight {
                logger.debug(format!("Skipping stale {} status", status));
                continue;
            }
            if !status.is_remote_terminal() {
                seen_in_flight = true;
            }

            self.apply(&detail, target, result);
            result.advance(status);

            if announced.insert(result.status.clone()) {
                logger.info(format!("Status: {}", result.status));
                logger.progress(result);
            }

            if result.status.is_remote_terminal() {
                self.settle(responses, &matcher, target, result).await;
                return;
            }
        }
    }

    /// Keep applying late metadata for a short while after a terminal status
    async fn settle(
        &self,
        responses: &mut broadcast::Receiver<InterceptedResponse>,
        matcher: &ResponseMatcher,
        target: &PipelineTarget,
        result: &mut RunResult,
    ) {
        let settle_until = Instant::now() + self.settings.terminal_settle();
        while let Ok(Some(response)) = timeout_at(settle_until, next_response(responses, matcher)).await {
            if let Some(body) = response.body {
                let detail = RunDetail::from_payload(&body);
                if belongs_to(&detail, result) {
                    self.apply(&detail, target, result);
                }
            }
        }
    }

    fn apply(&self, detail: &RunDetail, target: &PipelineTarget, result: &mut RunResult) {
        if let Some(start) = detail.start_time {
            result.start_time = start;
        }
        if let Some(update) = detail.update_time {
            result.update_time = update;
        }
        if let Some(run_id) = &detail.run_id {
            result.record_run_id(run_id);
        }
        if let Some(executor) = &detail.executor {
            result.executor = Some(executor.clone());
        }

        if let (Some(project), Some(pipeline), Some(run_id)) =
            (&detail.project_id, &detail.pipeline_id, result.run_id.clone())
        {
            if let Some(url) = canonical_detail_url(&target.entry_url, project, pipeline, &run_id) {
                result.refine_detail_url(url);
            }
        }
    }
}

/// False only when both sides name a run and the names differ
fn belongs_to(detail: &RunDetail, result: &RunResult) -> bool {
    match (&detail.run_id, &result.run_id) {
        (Some(seen), Some(ours)) => seen == ours,
        _ => true,
    }
}
