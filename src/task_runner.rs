//! Task Runner (§4.4): runs one task end to end — launches an isolated
//! browser and storage directory, drives the crawl session, writes output,
//! and tears down its private state regardless of outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::config::{GlobalConfig, TaskConfig};
use crate::crawl_engine::{cleanup_browser_and_data, run_session, CleanupResult};
use crate::output_writer::{self, Cap};
use crate::utils::sanitize_output_filename;

/// Outcome of running a single task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub success: bool,
    pub output_files: Vec<PathBuf>,
    pub error: Option<String>,
}

fn random_dataset_name() -> String {
    let suffix: String = (0..8)
        .map(|_| {
            let n = rand::rng().random_range(0..16);
            std::char::from_digit(n, 16).unwrap_or('0')
        })
        .collect();
    format!("ds-{suffix}")
}

/// Run `task` to completion under `storage_root`/`output_root`.
///
/// The task's storage directory is always removed before returning, whether
/// the crawl succeeded or not (§4.4 cleanup invariant).
pub async fn run_task(
    task: &TaskConfig,
    job_name: &str,
    global: &GlobalConfig,
    storage_root: &Path,
    output_root: &Path,
) -> TaskOutcome {
    let dataset_name = random_dataset_name();
    let storage_dir = storage_root.join(&dataset_name);

    let result = run_task_inner(task, job_name, global, &storage_dir, output_root).await;

    if let Err(e) = tokio::fs::remove_dir_all(&storage_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %storage_dir.display(), error = %e, "failed to remove task storage dir");
        }
    }

    match result {
        Ok(output_files) => TaskOutcome {
            success: true,
            output_files,
            error: None,
        },
        Err(e) => TaskOutcome {
            success: false,
            output_files: Vec::new(),
            error: Some(e.to_string()),
        },
    }
}

async fn run_task_inner(
    task: &TaskConfig,
    job_name: &str,
    global: &GlobalConfig,
    storage_dir: &Path,
    output_root: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(storage_dir).await?;

    let (browser, handler, chrome_data_dir) =
        crate::browser_setup::launch_browser(true, None).await?;
    let browser = Arc::new(browser);

    info!(task = %task.name, entry = %task.entry, "starting crawl session");

    let session_result = run_session(task, global, Arc::clone(&browser)).await;

    let browser_owned = Arc::try_unwrap(browser).ok();
    if let Some(b) = browser_owned {
        match cleanup_browser_and_data(b, chrome_data_dir).await {
            Ok(CleanupResult::Success) => {}
            Ok(CleanupResult::PartialFailure(errors)) => {
                warn!(task = %task.name, ?errors, "browser cleanup had partial failures");
            }
            Err(e) => warn!(task = %task.name, error = %e, "browser cleanup failed"),
        }
    }
    handler.abort();

    let records = session_result.map_err(|e| anyhow::anyhow!("{e}"))?;
    info!(task = %task.name, records = records.len(), "crawl session finished");

    if records.is_empty() {
        return Err(anyhow::anyhow!("crawl returned zero records"));
    }

    let output_path = sanitize_output_filename(
        task.output_file_name.as_deref(),
        job_name,
        &output_root.join("jobs"),
    );

    let max_bytes = Cap::from_optional(task.max_file_size_mb.map(|mb| mb * 1_000_000));
    let max_tokens = Cap::from_optional(global.max_tokens);

    let files = output_writer::write_segments(&records, &output_path, max_bytes, max_tokens).await?;
    Ok(files)
}
