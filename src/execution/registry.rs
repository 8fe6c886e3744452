//! Registry of batches currently in flight

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Snapshot of one active batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub id: Uuid,
    pub env: String,
    pub total: usize,
    pub completed: usize,
    pub started_at: DateTime<Utc>,
}

/// Process-wide set of active batches
///
/// Entries are added when a batch starts and removed when it is done.
#[derive(Debug, Default)]
pub struct BatchRegistry {
    batches: RwLock<HashMap<Uuid, BatchEntry>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: Uuid, env: &str, total: usize) -> BatchEntry {
        let entry = BatchEntry {
            id,
            env: env.to_string(),
            total,
            completed: 0,
            started_at: Utc::now(),
        };
        self.batches.write().await.insert(id, entry.clone());
        entry
    }

    /// Count one more finished run
    pub async fn record_completion(&self, id: Uuid) {
        if let Some(entry) = self.batches.write().await.get_mut(&id) {
            entry.completed = (entry.completed + 1).min(entry.total);
        }
    }

    /// Remove a finished batch, returning its last snapshot
    pub async fn complete(&self, id: Uuid) -> Option<BatchEntry> {
        self.batches.write().await.remove(&id)
    }

    pub async fn get(&self, id: Uuid) -> Option<BatchEntry> {
        self.batches.read().await.get(&id).cloned()
    }

    /// Active batches, oldest first
    pub async fn active(&self) -> Vec<BatchEntry> {
        let mut entries: Vec<_> = self.batches.read().await.values().cloned().collect();
        entries.sort_by_key(|e| e.started_at);
        entries
    }
}
