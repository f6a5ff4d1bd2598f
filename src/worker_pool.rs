//! Worker Pool (§4.7): N-bounded polling loop that claims queue entries and
//! dispatches them to the Task Runner.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::GlobalConfig;
use crate::job_store::{JobStatus, JobStore};
use crate::queue::{PersistentQueue, QueueEntry};
use crate::task_runner;
use crate::utils::{
    DEFAULT_BACKOFF_DELAY_MS, DEFAULT_CLEANUP_AGE_MS, DEFAULT_JOB_TIMEOUT_MS,
    DEFAULT_MAX_POLL_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WORKER_CONCURRENCY,
};

/// Environment-derived worker settings, read once at startup (§6/§10).
#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolConfig {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    pub job_timeout_ms: i64,
    pub backoff_delay_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_WORKER_CONCURRENCY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_interval_ms: DEFAULT_MAX_POLL_INTERVAL_MS,
            job_timeout_ms: DEFAULT_JOB_TIMEOUT_MS as i64,
            backoff_delay_ms: DEFAULT_BACKOFF_DELAY_MS,
        }
    }
}

impl WorkerPoolConfig {
    /// Read overrides from the environment, falling back to defaults for
    /// anything absent or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            concurrency: env_usize("WORKER_CONCURRENCY", default.concurrency),
            poll_interval_ms: env_u64("POLL_INTERVAL_MS", default.poll_interval_ms),
            max_poll_interval_ms: env_u64("MAX_POLL_INTERVAL_MS", default.max_poll_interval_ms),
            job_timeout_ms: env_u64("JOB_TIMEOUT_MS", default.job_timeout_ms as u64) as i64,
            backoff_delay_ms: env_u64("BACKOFF_DELAY_MS", default.backoff_delay_ms),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Runs the polling loop until `shutdown` resolves. Active tasks are
/// allowed to finish before this function returns (§4.7: completion over
/// interruption).
pub async fn run(
    config: WorkerPoolConfig,
    global: GlobalConfig,
    queue: Arc<PersistentQueue>,
    job_store: Arc<JobStore>,
    storage_root: std::path::PathBuf,
    output_root: std::path::PathBuf,
    shutdown: impl std::future::Future<Output = ()>,
) {
    let reset = queue.reset_stuck_jobs(config.job_timeout_ms).await.unwrap_or(0);
    let purged = queue
        .cleanup_old_jobs(DEFAULT_CLEANUP_AGE_MS)
        .await
        .unwrap_or(0);
    if let Ok(stats) = queue.get_stats().await {
        info!(?stats, reset, purged, "worker pool starting");
    }

    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let mut interval = config.poll_interval_ms;
    let mut active = tokio::task::JoinSet::new();

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received, draining active tasks");
                break;
            }
            () = tokio::time::sleep(Duration::from_millis(interval)) => {}
            Some(_) = active.join_next(), if !active.is_empty() => {
                continue;
            }
        }

        let mut claimed_this_cycle = 0u32;
        while semaphore.available_permits() > 0 {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                break;
            };

            match queue.claim_next_job().await {
                Ok(Some(entry)) => {
                    claimed_this_cycle += 1;
                    let queue = Arc::clone(&queue);
                    let job_store = Arc::clone(&job_store);
                    let backoff_delay_ms = config.backoff_delay_ms;
                    let storage_root = storage_root.clone();
                    let output_root = output_root.clone();

                    active.spawn(async move {
                        let _permit = permit;
                        run_one_entry(
                            entry,
                            &queue,
                            &job_store,
                            &global,
                            backoff_delay_ms,
                            &storage_root,
                            &output_root,
                        )
                        .await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    break;
                }
                Err(e) => {
                    error!(error = %e, "failed to claim next job");
                    drop(permit);
                    break;
                }
            }
        }

        if claimed_this_cycle > 0 {
            interval = config.poll_interval_ms;
        } else {
            interval = ((interval as f64 * 1.5) as u64).min(config.max_poll_interval_ms);
        }
    }

    while active.join_next().await.is_some() {}
    info!("worker pool stopped");
}

#[allow(clippy::too_many_arguments)]
async fn run_one_entry(
    entry: QueueEntry,
    queue: &PersistentQueue,
    job_store: &JobStore,
    global: &GlobalConfig,
    backoff_delay_ms: u64,
    storage_root: &std::path::Path,
    output_root: &std::path::Path,
) {
    let payload: crate::submission::QueuePayload = match serde_json::from_str(&entry.payload) {
        Ok(p) => p,
        Err(e) => {
            error!(queue_id = entry.queue_id, error = %e, "malformed task payload, failing permanently");
            let _ = queue.mark_failed(entry.queue_id, &e.to_string(), false, backoff_delay_ms as i64).await;
            let _ = job_store
                .update_status(&entry.job_id, JobStatus::Failed, None, Some(&e.to_string()))
                .await;
            return;
        }
    };

    if let Err(e) = job_store.update_status(&entry.job_id, JobStatus::Running, None, None).await {
        warn!(job_id = %entry.job_id, error = %e, "failed to mark job running");
    }

    let outcome = task_runner::run_task(
        &payload.task,
        &payload.job_name,
        global,
        storage_root,
        output_root,
    )
    .await;

    if outcome.success {
        if let Err(e) = queue.mark_completed(entry.queue_id).await {
            warn!(queue_id = entry.queue_id, error = %e, "failed to mark queue entry completed");
        }
        let output_file = outcome.output_files.first().map(|p| p.display().to_string());
        if let Err(e) = job_store
            .update_status(&entry.job_id, JobStatus::Completed, output_file.as_deref(), None)
            .await
        {
            warn!(job_id = %entry.job_id, error = %e, "failed to mark job completed");
        }
        let _ = queue.clear_completed_jobs().await;
        debug!(job_id = %entry.job_id, "task completed");
    } else {
        let error = outcome.error.unwrap_or_else(|| "unknown task failure".to_string());
        let should_retry = entry.attempts <= entry.max_attempts;
        // Jitter the base delay here; `mark_failed` applies the
        // attempts-driven exponential growth on top, so the effective delay
        // is backoff_delay_ms * jitter * 2^(attempts-1), matching the single
        // exponential backoff sequence (e.g. 5s, 10s, 20s ± jitter).
        let jitter = 0.5 + rand::rng().random_range(0.0..0.5);
        let jittered_base = (backoff_delay_ms as f64 * jitter) as i64;

        if let Err(e) = queue
            .mark_failed(entry.queue_id, &error, should_retry, jittered_base)
            .await
        {
            warn!(queue_id = entry.queue_id, error = %e, "failed to mark queue entry failed");
        }

        if !should_retry {
            if let Err(e) = job_store
                .update_status(&entry.job_id, JobStatus::Failed, None, Some(&error))
                .await
            {
                warn!(job_id = %entry.job_id, error = %e, "failed to mark job failed");
            }
        }
        warn!(job_id = %entry.job_id, error = %error, should_retry, "task failed");
    }
}
