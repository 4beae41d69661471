use stagehand::job::{JobId, JobStatus};
use stagehand::registry::JobRegistry;

#[tokio::test]
async fn registered_job_starts_processing() {
    let registry = JobRegistry::new();
    let id = JobId::generate();

    registry.register(id.clone()).await;

    let record = registry.get(&id).await.expect("job should be registered");
    assert_eq!(record.status, JobStatus::Processing);
}

#[tokio::test]
async fn unknown_job_is_none() {
    let registry = JobRegistry::new();
    assert!(registry.get(&JobId::from("1700000000000-deadbeef")).await.is_none());
}

#[tokio::test]
async fn finish_transitions_exactly_once() {
    let registry = JobRegistry::new();
    let id = JobId::generate();
    registry.register(id.clone()).await;

    assert!(registry.finish(&id, JobStatus::Completed).await);
    // A terminal status never reverts, even to the other terminal state.
    assert!(!registry.finish(&id, JobStatus::Failed).await);

    let record = registry.get(&id).await.unwrap();
    assert_eq!(record.status, JobStatus::Completed);
}

#[tokio::test]
async fn finish_unknown_job_is_false() {
    let registry = JobRegistry::new();
    assert!(!registry.finish(&JobId::from("nope"), JobStatus::Failed).await);
}

#[tokio::test]
async fn all_is_sorted_by_start_time() {
    let registry = JobRegistry::new();
    let first = JobId::from("a");
    let second = JobId::from("b");

    registry.register(first.clone()).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    registry.register(second.clone()).await;

    let all = registry.all().await;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].0, first);
    assert_eq!(all[1].0, second);
}

#[tokio::test]
async fn retention_prunes_oldest_terminal_entries() {
    let registry = JobRegistry::with_retention(Some(2));

    let old = JobId::from("old");
    registry.register(old.clone()).await;
    registry.finish(&old, JobStatus::Completed).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let kept = JobId::from("kept");
    registry.register(kept.clone()).await;
    registry.finish(&kept, JobStatus::Failed).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let active = JobId::from("active");
    registry.register(active.clone()).await;

    assert_eq!(registry.len().await, 2);
    assert!(registry.get(&old).await.is_none());
    assert!(registry.get(&kept).await.is_some());
    assert!(registry.get(&active).await.is_some());
}

#[tokio::test]
async fn retention_never_evicts_active_jobs() {
    let registry = JobRegistry::with_retention(Some(1));

    registry.register(JobId::from("a")).await;
    registry.register(JobId::from("b")).await;
    registry.register(JobId::from("c")).await;

    // All three are still processing; nothing is safe to prune.
    assert_eq!(registry.len().await, 3);
}

#[tokio::test]
async fn default_retention_keeps_everything() {
    let registry = JobRegistry::new();
    for i in 0..100 {
        let id = JobId::from(format!("job-{i}"));
        registry.register(id.clone()).await;
        registry.finish(&id, JobStatus::Completed).await;
    }
    assert_eq!(registry.len().await, 100);
}
