//! Aggregator (§4.8): sequential multi-task execution for the direct
//! (non-queued) submission path, followed by a streaming merge of each
//! task's transient output file into one canonical job artifact.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::{GlobalConfig, TaskConfig};
use crate::task_runner::{self, TaskOutcome};

fn random_suffix() -> String {
    let suffix: String = (0..8)
        .map(|_| {
            let n = rand::rng().random_range(0..16);
            std::char::from_digit(n, 16).unwrap_or('0')
        })
        .collect();
    format!("context-crawler-{suffix}")
}

/// Run every task of a job sequentially, then merge their transient output
/// files into `<output_root>/jobs/<job_name>.json`.
///
/// Returns the path to the merged file, or `None` if every task failed.
pub async fn run_job(
    job_name: &str,
    tasks: &[TaskConfig],
    global: &GlobalConfig,
    output_root: &Path,
) -> Result<Option<PathBuf>> {
    let temp_root = std::env::temp_dir().join(random_suffix());
    tokio::fs::create_dir_all(&temp_root)
        .await
        .with_context(|| format!("creating temp dir {}", temp_root.display()))?;

    let storage_root = temp_root.join("storage");
    let transient_output_root = temp_root.join("output");

    let mut successful_files = Vec::new();
    for task in tasks {
        info!(job = job_name, task = %task.name, "running task sequentially for aggregation");
        let outcome: TaskOutcome =
            task_runner::run_task(task, job_name, global, &storage_root, &transient_output_root)
                .await;
        if outcome.success {
            successful_files.extend(outcome.output_files);
        } else {
            warn!(job = job_name, task = %task.name, error = ?outcome.error, "task failed during aggregation");
        }
    }

    let merged = if successful_files.is_empty() {
        None
    } else {
        let final_path = output_root.join("jobs").join(format!("{job_name}.json"));
        merge_into(&successful_files, &final_path).await?;
        Some(final_path)
    };

    if let Err(e) = tokio::fs::remove_dir_all(&temp_root).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %temp_root.display(), error = %e, "failed to remove aggregator temp dir");
        }
    }

    Ok(merged)
}

/// Stream-merge the JSON array/object in each of `transient_files`, in
/// order, into one pretty-printed JSON array at `final_path`. Only one
/// transient file is held in memory at a time.
async fn merge_into(transient_files: &[PathBuf], final_path: &Path) -> Result<()> {
    if let Some(parent) = final_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating output dir {}", parent.display()))?;
    }

    let mut writer = tokio::io::BufWriter::new(
        tokio::fs::File::create(final_path)
            .await
            .with_context(|| format!("creating {}", final_path.display()))?,
    );
    writer.write_all(b"[\n").await?;

    let mut first = true;
    for path in transient_files {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping unreadable transient file");
                continue;
            }
        };
        let value: serde_json::Value = match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping unparseable transient file");
                continue;
            }
        };
        let elements: Vec<serde_json::Value> = match value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };

        for element in elements {
            if !first {
                writer.write_all(b",\n").await?;
            }
            first = false;
            let pretty = serde_json::to_string_pretty(&element)?;
            let indented = indent_lines(&pretty, "  ");
            writer.write_all(indented.as_bytes()).await?;
        }
    }

    writer.write_all(b"\n]\n").await?;
    writer.flush().await?;
    Ok(())
}

fn indent_lines(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn merge_combines_arrays_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file_a = dir.path().join("a.json");
        let file_b = dir.path().join("b.json");
        tokio::fs::write(&file_a, serde_json::to_string(&json!([{"n": 1}, {"n": 2}])).unwrap())
            .await
            .unwrap();
        tokio::fs::write(&file_b, serde_json::to_string(&json!([{"n": 3}])).unwrap())
            .await
            .unwrap();

        let final_path = dir.path().join("merged.json");
        merge_into(&[file_a, file_b], &final_path).await.expect("merge");

        let merged: Vec<serde_json::Value> =
            serde_json::from_str(&tokio::fs::read_to_string(&final_path).await.unwrap()).unwrap();
        assert_eq!(merged, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
    }

    #[tokio::test]
    async fn merge_handles_single_object_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file_a = dir.path().join("a.json");
        tokio::fs::write(&file_a, serde_json::to_string(&json!({"n": 1})).unwrap())
            .await
            .unwrap();

        let final_path = dir.path().join("merged.json");
        merge_into(&[file_a], &final_path).await.expect("merge");

        let merged: Vec<serde_json::Value> =
            serde_json::from_str(&tokio::fs::read_to_string(&final_path).await.unwrap()).unwrap();
        assert_eq!(merged, vec![json!({"n": 1})]);
    }
}
