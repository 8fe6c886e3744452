//! Aggregate batch report
//!
//! Rendering (tables, markup, files) is left to whoever consumes the report.

use crate::core::{result::BatchResult, state::RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub name: String,
    pub status: RunStatus,
    pub duration_ms: Option<u64>,
    pub run_id: String,
    pub executor: String,
    pub detail_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a finished batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub env: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub rows: Vec<ReportRow>,
    #[serde(default)]
    pub unmatched: Vec<String>,
}

impl BatchReport {
    pub fn from_batch(batch: &BatchResult) -> Self {
        let rows = batch
            .results
            .iter()
            .map(|r| ReportRow {
                name: r.name.clone(),
                status: r.status.clone(),
                duration_ms: r.duration_ms(),
                run_id: r.run_id_or_na().to_string(),
                executor: r.executor_or_na().to_string(),
                detail_url: r.detail_url.clone(),
                error: r.error.clone(),
            })
            .collect();

        Self {
            batch_id: batch.batch_id,
            env: batch.env.clone(),
            started_at: batch.started_at,
            finished_at: batch.finished_at,
            total: batch.total(),
            passed: batch.passed(),
            rows,
            unmatched: batch.unmatched.clone(),
        }
    }

    /// Pass rate in whole percent
    pub fn pass_rate(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.passed as f64 / self.total as f64) * 100.0).round() as u32
    }

    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }
}

/// `Xm Ys` above a minute, `Ys` below, `N/A` when unknown
pub fn format_duration_ms(duration_ms: Option<u64>) -> String {
    match duration_ms {
        Some(ms) if ms > 0 => {
            let secs = ms / 1000;
            if secs >= 60 {
                format!("{}m {}s", secs / 60, secs % 60)
            } else {
                format!("{}s", secs)
            }
        }
        _ => "N/A".to_string(),
    }
}
