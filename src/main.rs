//! Worker pool binary: polls the persistent queue and runs crawl tasks to
//! completion, recording results in the job store (§4.7, §6).

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use context_crawler::{GlobalConfig, JobStore, PersistentQueue, WorkerPoolConfig};

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cwd = std::env::current_dir().context("reading working directory")?;
    let data_dir = cwd.join("data");
    let storage_root = cwd.join("storage").join("jobs");
    let output_root = cwd.join("output");

    let queue = Arc::new(
        PersistentQueue::open(&data_dir.join("queue.db"))
            .await
            .context("opening queue database")?,
    );
    let job_store = Arc::new(
        JobStore::open(&data_dir.join("jobs.db"))
            .await
            .context("opening job-record database")?,
    );

    let config = WorkerPoolConfig::from_env();
    let global = GlobalConfig::default();

    context_crawler::run_worker_pool(
        config,
        global,
        queue,
        job_store,
        storage_root,
        output_root,
        shutdown_signal(),
    )
    .await;

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!(error = ?e, "fatal initialization error");
        std::process::exit(1);
    }
}
