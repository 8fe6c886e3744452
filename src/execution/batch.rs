//! Batch coordinator: many runs over one shared browser

use crate::core::{BatchResult, PipelineTarget, RunResult, TargetSelection};
use crate::execution::events::{EventBus, LaunchEvent};
use crate::execution::registry::BatchRegistry;
use crate::execution::runner::RunCoordinator;
use crate::surface::Browser;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Fans targets out to concurrent run coordinators
pub struct BatchCoordinator {
    runner: Arc<RunCoordinator>,
    registry: Arc<BatchRegistry>,
}

impl BatchCoordinator {
    pub fn new(runner: RunCoordinator, registry: Arc<BatchRegistry>) -> Self {
        Self {
            runner: Arc::new(runner),
            registry,
        }
    }

    fn bus(&self) -> &EventBus {
        self.runner.bus()
    }

    /// Run every selected target concurrently and collect the results
    ///
    /// Results come back in selection order, one per target. A run whose
    /// task dies is reported as `ERROR` for that target. The browser is
    /// closed exactly once, after every run has settled.
    pub async fn execute(&self, browser: Arc<dyn Browser>, selection: TargetSelection) -> BatchResult {
        let batch_id = Uuid::new_v4();
        let env = self.runner.env().to_string();
        let targets = selection.targets;
        let started_at = Utc::now();

        info!(
            "Starting batch {} in '{}' with {} pipelines",
            batch_id,
            env,
            targets.len()
        );
        self.registry.register(batch_id, &env, targets.len()).await;
        self.bus().emit(LaunchEvent::BatchStarted {
            batch_id,
            env: env.clone(),
            total: targets.len(),
        });

        let mut tasks = JoinSet::new();
        for (index, target) in targets.iter().cloned().enumerate() {
            let runner = self.runner.clone();
            let browser = browser.clone();
            tasks.spawn(async move {
                let label = target.clone();
                let run = tokio::spawn(async move { runner.run(browser.as_ref(), &target).await });
                let result = match run.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("Run task for {} failed: {}", label.name, e);
                        RunResult::errored(&label, format!("Run task failed: {}", e))
                    }
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<RunResult>> = vec![None; targets.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    self.registry.record_completion(batch_id).await;
                    self.bus().emit(LaunchEvent::RunFinished {
                        batch_id,
                        result: result.clone(),
                    });
                    slots[index] = Some(result);
                }
                Err(e) => error!("Batch task failed: {}", e),
            }
        }

        if let Err(e) = browser.close().await {
            warn!("Closing the browser failed: {}", e);
        }

        let results: Vec<RunResult> = slots
            .into_iter()
            .zip(targets.iter())
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| RunResult::errored(target, "Run produced no result"))
            })
            .collect();

        let batch = BatchResult {
            batch_id,
            env,
            started_at,
            finished_at: Utc::now(),
            results,
            unmatched: selection.unmatched,
        };

        self.registry.complete(batch_id).await;
        info!(
            "Batch {} done: {}/{} completed",
            batch_id,
            batch.passed(),
            batch.total()
        );
        self.bus().emit(LaunchEvent::BatchDone {
            batch_id,
            results: batch.results.clone(),
        });

        batch
    }

    /// Run targets that are already resolved
    pub async fn execute_targets(
        &self,
        browser: Arc<dyn Browser>,
        targets: Vec<PipelineTarget>,
    ) -> BatchResult {
        self.execute(
            browser,
            TargetSelection {
                targets,
                unmatched: Vec::new(),
            },
        )
        .await
    }
}
