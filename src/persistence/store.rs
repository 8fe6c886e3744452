//! SQLite-based report store

use crate::core::BatchReport;
use crate::persistence::ReportStore;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use uuid::Uuid;

/// SQLite batch report store
pub struct SqliteReportStore {
    pool: SqlitePool,
}

impl SqliteReportStore {
    /// Open (creating if needed) a database file
    pub async fn new(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("pipeline-launcher");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        Self::new(&db_dir.join("history.db")).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS batches (
                id TEXT PRIMARY KEY,
                env TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                total INTEGER NOT NULL,
                passed INTEGER NOT NULL,
                report_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_batches_env ON batches(env);
            CREATE INDEX IF NOT EXISTS idx_batches_started_at ON batches(started_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<BatchReport> {
        let json: String = row.get("report_json");
        serde_json::from_str(&json).context("Stored report is not valid JSON")
    }
}

#[async_trait::async_trait]
impl ReportStore for SqliteReportStore {
    async fn save_report(&self, report: &BatchReport) -> Result<()> {
        let json = serde_json::to_string(report).context("Failed to encode report")?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO batches
            (id, env, started_at, finished_at, total, passed, report_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(report.batch_id.to_string())
        .bind(&report.env)
        .bind(Self::to_naive(report.started_at))
        .bind(Self::to_naive(report.finished_at))
        .bind(report.total as i64)
        .bind(report.passed as i64)
        .bind(json)
        .execute(&self.pool)
        .await
        .context("Failed to save report")?;

        Ok(())
    }

    async fn load_report(&self, batch_id: Uuid) -> Result<Option<BatchReport>> {
        let row = sqlx::query("SELECT report_json FROM batches WHERE id = ?1")
            .bind(batch_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load report")?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_reports(&self, env: Option<&str>, limit: usize) -> Result<Vec<BatchReport>> {
        let rows = sqlx::query(
            r#"
            SELECT report_json
            FROM batches
            WHERE ?1 IS NULL OR env = ?1
            ORDER BY started_at DESC
            LIMIT ?2
            "#,
        )
        .bind(env)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list reports")?;

        rows.iter().map(Self::decode).collect()
    }
}
