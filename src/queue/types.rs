use sqlx::Row;

/// Lifecycle state of a queue entry (§3 Data Model).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Pending,
    Claimed,
    Completed,
    Failed,
}

impl QueueStatus {
    fn from_str(s: &str) -> Self {
        match s {
            "claimed" => QueueStatus::Claimed,
            "completed" => QueueStatus::Completed,
            "failed" => QueueStatus::Failed,
            _ => QueueStatus::Pending,
        }
    }
}

/// One row of the persistent queue.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub queue_id: i64,
    pub job_id: String,
    pub status: QueueStatus,
    pub payload: String,
    pub priority: i64,
    pub attempts: i64,
    pub max_attempts: i64,
    pub next_retry_at: Option<i64>,
    pub claimed_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error: Option<String>,
    pub created_at: i64,
}

impl QueueEntry {
    pub(super) fn from_row(row: sqlx::sqlite::SqliteRow) -> Self {
        Self {
            queue_id: row.get("queue_id"),
            job_id: row.get("job_id"),
            status: QueueStatus::from_str(row.get::<String, _>("status").as_str()),
            payload: row.get("payload"),
            priority: row.get("priority"),
            attempts: row.get("attempts"),
            max_attempts: row.get("max_attempts"),
            next_retry_at: row.get("next_retry_at"),
            claimed_at: row.get("claimed_at"),
            completed_at: row.get("completed_at"),
            error: row.get("error"),
            created_at: row.get("created_at"),
        }
    }
}

/// Aggregate counts by status, returned by `getStats`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub pending: i64,
    pub claimed: i64,
    pub completed: i64,
    pub failed: i64,
}
