//! Submission API library surface (§4.9): the primitives an HTTP façade
//! binds to routes. Enqueueing always writes the `JobStore` record before
//! the corresponding queue entry becomes observable (§4.6 ordering rule).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TaskConfig;
use crate::job_store::JobStore;
use crate::queue::PersistentQueue;

/// What actually gets serialized onto a queue row: the task plus the name
/// of the job it was submitted under (§3 QueueEntry: "payload (serialized
/// task+jobName)"). Ad-hoc submissions use the job name `"custom"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePayload {
    pub job_name: String,
    pub task: TaskConfig,
}

/// A named job: a stable name plus the tasks it runs, all sharing that name
/// when enqueued (§9: static `jobName -> TaskConfig[]` registry).
#[derive(Debug, Clone)]
pub struct JobDefinition {
    pub name: String,
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate task name '{0}' across registered jobs")]
    DuplicateTaskName(String),
}

/// Static registry of known job names, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Vec<JobDefinition>,
}

impl JobRegistry {
    /// Build a registry, rejecting duplicate task names across jobs at load
    /// time rather than letting two tasks collide at crawl time (§9).
    pub fn new(jobs: Vec<JobDefinition>) -> Result<Self, RegistryError> {
        let mut seen = std::collections::HashSet::new();
        for job in &jobs {
            for task in &job.tasks {
                if !seen.insert(task.name.clone()) {
                    return Err(RegistryError::DuplicateTaskName(task.name.clone()));
                }
            }
        }
        Ok(Self { jobs })
    }

    #[must_use]
    pub fn get(&self, job_name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|j| j.name == job_name)
    }

    /// Job name plus per-task count, for the "list jobs" surface.
    #[must_use]
    pub fn list(&self) -> Vec<(String, usize)> {
        self.jobs.iter().map(|j| (j.name.clone(), j.tasks.len())).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("unknown job name '{0}'")]
    UnknownJob(String),
    #[error("job store error: {0}")]
    JobStore(#[from] crate::job_store::JobStoreError),
    #[error("queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),
    #[error("failed to serialize task config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Enqueue every task of a registered job, each under its own job id but
/// sharing the job's name as their `jobName` grouping.
pub async fn submit_named_job(
    registry: &JobRegistry,
    job_name: &str,
    job_store: &JobStore,
    queue: &PersistentQueue,
) -> Result<Vec<String>, SubmissionError> {
    let job = registry
        .get(job_name)
        .ok_or_else(|| SubmissionError::UnknownJob(job_name.to_string()))?;

    let mut job_ids = Vec::with_capacity(job.tasks.len());
    for task in &job.tasks {
        let job_id = enqueue_task(job_name, task, job_store, queue).await?;
        job_ids.push(job_id);
    }
    Ok(job_ids)
}

/// Validate and enqueue a single ad-hoc task (job name `"custom"`).
pub async fn submit_ad_hoc_task(
    task: &TaskConfig,
    job_store: &JobStore,
    queue: &PersistentQueue,
) -> Result<String, SubmissionError> {
    enqueue_task("custom", task, job_store, queue).await
}

async fn enqueue_task(
    job_name: &str,
    task: &TaskConfig,
    job_store: &JobStore,
    queue: &PersistentQueue,
) -> Result<String, SubmissionError> {
    let job_id = Uuid::new_v4().to_string();
    let payload = serde_json::to_string(&QueuePayload {
        job_name: job_name.to_string(),
        task: task.clone(),
    })?;

    job_store.create(&job_id, &payload).await?;
    queue.add(&job_id, &payload, 0, crate::utils::DEFAULT_MAX_ATTEMPTS).await?;

    Ok(job_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task(name: &str) -> TaskConfig {
        TaskConfig::builder()
            .name(name)
            .entry("https://example.test/")
            .build()
            .expect("build task")
    }

    #[test]
    fn registry_rejects_duplicate_task_names() {
        let jobs = vec![
            JobDefinition {
                name: "a".to_string(),
                tasks: vec![sample_task("shared")],
            },
            JobDefinition {
                name: "b".to_string(),
                tasks: vec![sample_task("shared")],
            },
        ];
        let err = JobRegistry::new(jobs).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTaskName(_)));
    }

    #[tokio::test]
    async fn submit_ad_hoc_task_creates_job_and_queue_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job_store = JobStore::open(&dir.path().join("jobs.db")).await.expect("open job store");
        let queue = PersistentQueue::open(&dir.path().join("queue.db")).await.expect("open queue");

        let task = sample_task("adhoc");
        let job_id = submit_ad_hoc_task(&task, &job_store, &queue).await.expect("submit");

        assert!(job_store.get(&job_id).await.expect("get").is_some());
        let stats = queue.get_stats().await.expect("stats");
        assert_eq!(stats.pending, 1);
    }
}
