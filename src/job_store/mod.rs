//! Per-submission status/result record (§4.6), keyed by external job id.

mod types;

pub use types::{JobRecord, JobStatus};

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("job {0} not found")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS jobs (
    id           TEXT PRIMARY KEY,
    status       TEXT NOT NULL,
    config       TEXT NOT NULL,
    output_file  TEXT,
    error        TEXT,
    created_at   INTEGER NOT NULL,
    completed_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
";

/// Job-record handle, cheap to clone (wraps a pooled connection).
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub async fn open(path: &Path) -> Result<Self, JobStoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| JobStoreError::Database(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new `pending` job record. Must be called before the
    /// corresponding queue entry is enqueued (§4.6 ordering rule).
    pub async fn create(&self, job_id: &str, config: &str) -> Result<(), JobStoreError> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO jobs (id, status, config, created_at) VALUES (?, 'pending', ?, ?)",
        )
        .bind(job_id)
        .bind(config)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, JobStoreError> {
        let row = sqlx::query(
            r"SELECT id, status, config, output_file, error, created_at, completed_at
              FROM jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(JobRecord::from_row))
    }

    pub async fn list(&self) -> Result<Vec<JobRecord>, JobStoreError> {
        let rows = sqlx::query(
            r"SELECT id, status, config, output_file, error, created_at, completed_at
              FROM jobs ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(JobRecord::from_row).collect())
    }

    pub async fn delete(&self, job_id: &str) -> Result<(), JobStoreError> {
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Update status plus optional output/error/completion fields.
    pub async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        output_file: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), JobStoreError> {
        let completed_at = matches!(status, JobStatus::Completed | JobStatus::Failed)
            .then(|| Utc::now().timestamp_millis());

        let result = sqlx::query(
            r"UPDATE jobs
              SET status = ?,
                  output_file = COALESCE(?, output_file),
                  error = COALESCE(?, error),
                  completed_at = COALESCE(?, completed_at)
              WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(output_file)
        .bind(error)
        .bind(completed_at)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_id.to_string()));
        }
        Ok(())
    }
}

impl JobStatus {
    fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_test_store() -> (JobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JobStore::open(&dir.path().join("jobs.db"))
            .await
            .expect("open store");
        (store, dir)
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let (store, _dir) = open_test_store().await;
        store.create("job-1", "{\"name\":\"alpha\"}").await.expect("create");

        let record = store.get("job-1").await.expect("get").expect("present");
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.config, "{\"name\":\"alpha\"}");
    }

    #[tokio::test]
    async fn update_status_to_completed_sets_output_and_completed_at() {
        let (store, _dir) = open_test_store().await;
        store.create("job-2", "{}").await.expect("create");

        store
            .update_status(
                "job-2",
                JobStatus::Completed,
                Some("output/jobs/job-2.json"),
                None,
            )
            .await
            .expect("update");

        let record = store.get("job-2").await.expect("get").expect("present");
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.output_file.as_deref(), Some("output/jobs/job-2.json"));
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn update_status_on_missing_job_errors() {
        let (store, _dir) = open_test_store().await;
        let err = store
            .update_status("ghost", JobStatus::Failed, None, Some("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, JobStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_orders_by_created_at_desc() {
        let (store, _dir) = open_test_store().await;
        store.create("job-a", "{}").await.expect("create a");
        store.create("job-b", "{}").await.expect("create b");

        let jobs = store.list().await.expect("list");
        assert_eq!(jobs.len(), 2);
    }
}
