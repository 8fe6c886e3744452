//! Per-run and per-batch result records

use crate::core::{state::RunStatus, target::PipelineTarget};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder shown for identifiers that were never observed
pub const NOT_AVAILABLE: &str = "N/A";

/// Everything known about one pipeline run
///
/// Owned by a single run coordinator until it reaches a terminal status.
/// The mutators enforce the record's invariants: status only moves forward,
/// the run id is written once, and the detail link only gets more specific.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub name: String,
    pub status: RunStatus,
    /// Remote start time, epoch millis (0 until known)
    pub start_time: i64,
    /// Remote last-update time, epoch millis (0 until known)
    pub update_time: i64,
    pub run_id: Option<String>,
    pub executor: Option<String>,
    pub detail_url: String,
    /// Failure message for launcher-side errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    /// Create a fresh record for a target
    pub fn new(target: &PipelineTarget) -> Self {
        Self {
            name: target.name.clone(),
            status: RunStatus::Unknown,
            start_time: 0,
            update_time: 0,
            run_id: None,
            executor: None,
            detail_url: target.entry_url.clone(),
            error: None,
        }
    }

    /// Terminal `ERROR` record for a run that never produced its own result
    pub fn errored(target: &PipelineTarget, message: impl Into<String>) -> Self {
        let mut result = Self::new(target);
        result.fail(RunStatus::Error, Some(message.into()));
        result
    }

    /// Move to `status` if that keeps the status moving forward
    pub fn advance(&mut self, status: RunStatus) -> bool {
        if !self.status.can_advance_to(&status) {
            return false;
        }
        self.status = status;
        true
    }

    /// Resolve the run with a failure status, keeping the first message
    pub fn fail(&mut self, status: RunStatus, error: Option<String>) {
        if self.advance(status) && self.error.is_none() {
            self.error = error;
        }
    }

    /// Record the run id unless one is already known
    pub fn record_run_id(&mut self, run_id: &str) -> bool {
        if self.run_id.is_some() || run_id.is_empty() {
            return false;
        }
        self.run_id = Some(run_id.to_string());
        true
    }

    /// Replace the detail link with one that names this run
    ///
    /// Links that do not carry the run id, or a replacement for a link that
    /// already does, are refused.
    pub fn refine_detail_url(&mut self, url: String) -> bool {
        let Some(run_id) = self.run_id.as_deref() else {
            return false;
        };
        if self.detail_url.contains(run_id) || !url.contains(run_id) {
            return false;
        }
        self.detail_url = url;
        true
    }

    /// Remote run duration, if both timestamps are known
    pub fn duration_ms(&self) -> Option<u64> {
        if self.start_time > 0 && self.update_time >= self.start_time {
            Some((self.update_time - self.start_time) as u64)
        } else {
            None
        }
    }

    pub fn run_id_or_na(&self) -> &str {
        self.run_id.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn executor_or_na(&self) -> &str {
        self.executor.as_deref().unwrap_or(NOT_AVAILABLE)
    }
}

/// Results of one batch, in the order the targets were requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub env: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<RunResult>,
    /// Selectors that did not resolve to a configured pipeline
    pub unmatched: Vec<String>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_success()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        !self.results.is_empty() && self.passed() == self.total()
    }
}
