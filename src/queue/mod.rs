//! Persistent, crash-safe work queue (§4.5).
//!
//! Backed by SQLite in WAL mode, following the same pool/transaction
//! discipline the teacher's link index uses: `BEGIN IMMEDIATE` for the claim
//! transaction so two workers can never observe the same row as claimed.

mod types;

pub use types::{QueueEntry, QueueStats, QueueStatus};

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job id {0} already present in queue")]
    DuplicateJobId(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS queue_entries (
    queue_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id       TEXT NOT NULL UNIQUE,
    status       TEXT NOT NULL,
    payload      TEXT NOT NULL,
    priority     INTEGER NOT NULL DEFAULT 0,
    attempts     INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 3,
    next_retry_at INTEGER,
    claimed_at   INTEGER,
    completed_at INTEGER,
    error        TEXT,
    created_at   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_queue_status ON queue_entries(status);
CREATE INDEX IF NOT EXISTS idx_queue_job_id ON queue_entries(job_id);
";

/// Persistent queue handle, cheap to clone (wraps a pooled connection).
#[derive(Clone)]
pub struct PersistentQueue {
    pool: SqlitePool,
}

impl PersistentQueue {
    /// Open (creating if absent) the queue database at `path`.
    pub async fn open(path: &Path) -> Result<Self, QueueError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                QueueError::Database(sqlx::Error::Io(e))
            })?;
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

    /// Insert a new `pending` row. Fails if `job_id` already exists.
    pub async fn add(
        &self,
        job_id: &str,
        payload: &str,
        priority: i64,
        max_attempts: i64,
    ) -> Result<(), QueueError> {
        let now = Utc::now().timestamp_millis();

        let result = sqlx::query(
            r"INSERT INTO queue_entries
                (job_id, status, payload, priority, attempts, max_attempts, created_at)
              VALUES (?, 'pending', ?, ?, 0, ?, ?)",
        )
        .bind(job_id)
        .bind(payload)
        .bind(priority)
        .bind(max_attempts)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(QueueError::DuplicateJobId(job_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically select and claim the highest-priority ready row.
    ///
    /// `BEGIN IMMEDIATE` acquires the write lock up front, on a single
    /// connection checked out from the pool, so the select and the
    /// following update are serialized against every other claimant. The
    /// update additionally re-checks `status = 'pending'` so a claim can
    /// never silently clobber a row another connection already claimed.
    pub async fn claim_next_job(&self) -> Result<Option<QueueEntry>, QueueError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let now = Utc::now().timestamp_millis();

        let row = sqlx::query(
            r"SELECT queue_id FROM queue_entries
              WHERE status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= ?)
              ORDER BY priority DESC, created_at ASC
              LIMIT 1",
        )
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            return Ok(None);
        };

        let queue_id: i64 = row.get("queue_id");

        let update_result = sqlx::query(
            r"UPDATE queue_entries
              SET status = 'claimed', claimed_at = ?, attempts = attempts + 1
              WHERE queue_id = ? AND status = 'pending'",
        )
        .bind(now)
        .bind(queue_id)
        .execute(&mut *conn)
        .await?;

        if update_result.rows_affected() == 0 {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            return Ok(None);
        }

        let entry = fetch_entry(&mut conn, queue_id).await?;
        sqlx::query("COMMIT").execute(&mut *conn).await?;

        Ok(entry)
    }

    /// Mark a claimed row `completed`.
    pub async fn mark_completed(&self, queue_id: i64) -> Result<(), QueueError> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "UPDATE queue_entries SET status = 'completed', completed_at = ? WHERE queue_id = ?",
        )
        .bind(now)
        .bind(queue_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a claimed row failed, scheduling a retry with exponential backoff
    /// when attempts remain, otherwise moving it to the terminal `failed`
    /// state.
    ///
    /// `max_attempts` counts retries, not total tries: with the default of
    /// 3, a row gets a 1st, 2nd, and 3rd retry (backoff `base`, `base*2`,
    /// `base*4`) after its initial attempt, and only goes terminal once a
    /// 4th attempt also fails.
    pub async fn mark_failed(
        &self,
        queue_id: i64,
        error: &str,
        should_retry: bool,
        backoff_ms: i64,
    ) -> Result<(), QueueError> {
        let row = sqlx::query("SELECT attempts, max_attempts FROM queue_entries WHERE queue_id = ?")
            .bind(queue_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(());
        };
        let attempts: i64 = row.get("attempts");
        let max_attempts: i64 = row.get("max_attempts");

        let now = Utc::now().timestamp_millis();

        if should_retry && attempts <= max_attempts {
            let delay = backoff_ms.saturating_mul(1i64 << (attempts - 1).max(0));
            let next_retry_at = now + delay;
            sqlx::query(
                r"UPDATE queue_entries
                  SET status = 'pending', next_retry_at = ?, error = ?
                  WHERE queue_id = ?",
            )
            .bind(next_retry_at)
            .bind(error)
            .bind(queue_id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r"UPDATE queue_entries
                  SET status = 'failed', completed_at = ?, error = ?
                  WHERE queue_id = ?",
            )
            .bind(now)
            .bind(error)
            .bind(queue_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Revert stale `claimed` rows back to `pending`. Returns the count
    /// reset.
    pub async fn reset_stuck_jobs(&self, timeout_ms: i64) -> Result<u64, QueueError> {
        let cutoff = Utc::now().timestamp_millis() - timeout_ms;
        let result = sqlx::query(
            r"UPDATE queue_entries
              SET status = 'pending', claimed_at = NULL
              WHERE status = 'claimed' AND claimed_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete terminal rows older than `age_ms`.
    pub async fn cleanup_old_jobs(&self, age_ms: i64) -> Result<u64, QueueError> {
        let cutoff = Utc::now().timestamp_millis() - age_ms;
        let result = sqlx::query(
            r"DELETE FROM queue_entries
              WHERE status IN ('completed', 'failed') AND completed_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete all terminal rows regardless of age.
    pub async fn clear_completed_jobs(&self) -> Result<u64, QueueError> {
        let result = sqlx::query("DELETE FROM queue_entries WHERE status IN ('completed', 'failed')")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Counts by status.
    pub async fn get_stats(&self) -> Result<QueueStats, QueueError> {
        let rows = sqlx::query("SELECT status, COUNT(*) as n FROM queue_entries GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            match status.as_str() {
                "pending" => stats.pending = n,
                "claimed" => stats.claimed = n,
                "completed" => stats.completed = n,
                "failed" => stats.failed = n,
                _ => {}
            }
        }
        Ok(stats)
    }
}

async fn fetch_entry(
    conn: &mut sqlx::SqliteConnection,
    queue_id: i64,
) -> Result<Option<QueueEntry>, QueueError> {
    let row = sqlx::query(
        r"SELECT queue_id, job_id, status, payload, priority, attempts, max_attempts,
                 next_retry_at, claimed_at, completed_at, error, created_at
          FROM queue_entries WHERE queue_id = ?",
    )
    .bind(queue_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(QueueEntry::from_row))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_test_queue() -> (PersistentQueue, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = PersistentQueue::open(&dir.path().join("queue.db"))
            .await
            .expect("open queue");
        (queue, dir)
    }

    #[tokio::test]
    async fn add_and_claim_roundtrip() {
        let (queue, _dir) = open_test_queue().await;
        queue.add("job-1", "{}", 0, 3).await.expect("add");

        let claimed = queue.claim_next_job().await.expect("claim").expect("some");
        assert_eq!(claimed.job_id, "job-1");
        assert_eq!(claimed.status, QueueStatus::Claimed);
        assert_eq!(claimed.attempts, 1);

        assert!(queue.claim_next_job().await.expect("claim2").is_none());
    }

    #[tokio::test]
    async fn duplicate_job_id_rejected() {
        let (queue, _dir) = open_test_queue().await;
        queue.add("dup", "{}", 0, 3).await.expect("first add");
        let err = queue.add("dup", "{}", 0, 3).await.unwrap_err();
        assert!(matches!(err, QueueError::DuplicateJobId(_)));
    }

    #[tokio::test]
    async fn mark_failed_schedules_retry_then_terminal_failure() {
        let (queue, _dir) = open_test_queue().await;
        queue.add("job-2", "{}", 0, 2).await.expect("add");
        let claimed = queue.claim_next_job().await.expect("claim").expect("some");

        queue
            .mark_failed(claimed.queue_id, "boom", true, 1000)
            .await
            .expect("mark failed 1");

        let stats = queue.get_stats().await.expect("stats");
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn attempts_climb_monotonically_until_terminal_failure() {
        let (queue, _dir) = open_test_queue().await;
        queue.add("job-retry", "{}", 0, 3).await.expect("add");

        let mut seen_attempts = Vec::new();
        for _ in 0..4 {
            let claimed = queue
                .claim_next_job()
                .await
                .expect("claim")
                .expect("still pending");
            seen_attempts.push(claimed.attempts);
            queue
                .mark_failed(claimed.queue_id, "boom", true, 0)
                .await
                .expect("mark failed");
        }

        assert_eq!(
            seen_attempts,
            vec![1, 2, 3, 4],
            "attempts never goes backwards"
        );
        assert!(
            queue.claim_next_job().await.expect("claim").is_none(),
            "terminal row is never reclaimed"
        );

        let stats = queue.get_stats().await.expect("stats");
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn backoff_matches_s4_sequence_before_terminal_failure() {
        let (queue, _dir) = open_test_queue().await;
        queue.add("job-s4", "{}", 0, 3).await.expect("add");

        // next_retry_at is set in the future by design, so force each row
        // eligible again before re-claiming rather than waiting out the
        // real backoff in a unit test.
        let force_eligible = || async {
            sqlx::query("UPDATE queue_entries SET next_retry_at = NULL WHERE job_id = 'job-s4'")
                .execute(&queue.pool)
                .await
                .expect("reset eligibility");
        };

        let mut delays = Vec::new();
        for _ in 0..3 {
            force_eligible().await;
            let claimed = queue
                .claim_next_job()
                .await
                .expect("claim")
                .expect("still pending");
            let before = Utc::now().timestamp_millis();
            queue
                .mark_failed(claimed.queue_id, "boom", true, 5000)
                .await
                .expect("mark failed");

            let row = sqlx::query("SELECT next_retry_at FROM queue_entries WHERE queue_id = ?")
                .bind(claimed.queue_id)
                .fetch_one(&queue.pool)
                .await
                .expect("fetch next_retry_at");
            let next_retry_at: i64 = row.get("next_retry_at");
            delays.push(next_retry_at - before);
        }

        for (delay, expected) in delays.iter().zip([5000i64, 10000, 20000]) {
            assert!(
                (*delay - expected).abs() < 200,
                "delay {delay} not within tolerance of expected {expected} (S4: 5s, 10s, 20s)"
            );
        }

        // 4th attempt exhausts retries and goes terminal.
        force_eligible().await;
        let claimed = queue
            .claim_next_job()
            .await
            .expect("claim")
            .expect("still pending");
        queue
            .mark_failed(claimed.queue_id, "boom", true, 5000)
            .await
            .expect("mark failed");
        let stats = queue.get_stats().await.expect("stats");
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn reset_stuck_jobs_reverts_to_pending() {
        let (queue, _dir) = open_test_queue().await;
        queue.add("job-3", "{}", 0, 3).await.expect("add");
        queue.claim_next_job().await.expect("claim").expect("some");

        let reset = queue.reset_stuck_jobs(-1).await.expect("reset");
        assert_eq!(reset, 1);

        let stats = queue.get_stats().await.expect("stats");
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.claimed, 0);
    }

    #[tokio::test]
    async fn terminal_rows_absorb() {
        let (queue, _dir) = open_test_queue().await;
        queue.add("job-4", "{}", 0, 3).await.expect("add");
        let claimed = queue.claim_next_job().await.expect("claim").expect("some");
        queue.mark_completed(claimed.queue_id).await.expect("complete");

        let stats = queue.get_stats().await.expect("stats");
        assert_eq!(stats.completed, 1);
    }
}
