//! Persistence layer for batch report history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteReportStore;

use crate::core::BatchReport;
use anyhow::Result;
use std::collections::HashMap;
use uuid::Uuid;

/// Trait for report history backends
#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    /// Save a finished batch report
    async fn save_report(&self, report: &BatchReport) -> Result<()>;

    /// Load a report by batch ID
    async fn load_report(&self, batch_id: Uuid) -> Result<Option<BatchReport>>;

    /// Most recent reports first, optionally for one environment
    async fn list_reports(&self, env: Option<&str>, limit: usize) -> Result<Vec<BatchReport>>;
}

/// In-memory report store (for testing or ephemeral use)
pub struct InMemoryReportStore {
    reports: tokio::sync::RwLock<HashMap<Uuid, BatchReport>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self {
            reports: tokio::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ReportStore for InMemoryReportStore {
    async fn save_report(&self, report: &BatchReport) -> Result<()> {
        let mut reports = self.reports.write().await;
        reports.insert(report.batch_id, report.clone());
        Ok(())
    }

    async fn load_report(&self, batch_id: Uuid) -> Result<Option<BatchReport>> {
        let reports = self.reports.read().await;
        Ok(reports.get(&batch_id).cloned())
    }

    async fn list_reports(&self, env: Option<&str>, limit: usize) -> Result<Vec<BatchReport>> {
        let reports = self.reports.read().await;
        let mut matching: Vec<_> = reports
            .values()
            .filter(|r| env.map_or(true, |env| r.env == env))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching.truncate(limit);
        Ok(matching)
    }
}
