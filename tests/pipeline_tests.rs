use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stagehand::config::{ExecutableConfig, ServiceConfig};
use stagehand::context::AppContext;
use stagehand::job::{JobId, JobStatus, ProcessingConfig};
use stagehand::metrics::RecordingMetrics;
use stagehand::orchestrator::{self, StagingPaths};
use stagehand::shipper::LogPipeline;
use stagehand::storage::{MemoryStore, ObjectStore};
use tempfile::TempDir;

/// A stand-in batch executable: reads the descriptor it was handed, copies
/// every .txt file from the source staging dir into the target staging dir,
/// and drops a copy of the descriptor so tests can prove it was received.
const PROCESS_SCRIPT: &str = r#"#!/bin/sh
CONF="$2"
TARGET=$(sed -n 's/.*"Target Folder Path": "\([^"]*\)".*/\1/p' "$CONF")
for f in "$(dirname "$CONF")"/*.txt; do
  cp "$f" "$TARGET"/
done
cp "$CONF" "$TARGET"/descriptor-seen.json
echo processed
"#;

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("process.sh");
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert("data", "input/batch-1/a.txt", "alpha");
    store.insert("data", "input/batch-1/b.txt", "bravo");
    store.insert("data", "input/batch-1/c.txt", "charlie");
    store.create_bucket("results");
    store
}

struct Harness {
    ctx: Arc<AppContext>,
    metrics: Arc<RecordingMetrics>,
    staging_root: PathBuf,
    _staging_dir: TempDir,
    _script_dir: TempDir,
}

fn harness(store: Arc<MemoryStore>, script: &str, fail_on_nonzero_exit: bool) -> Harness {
    let staging_dir = TempDir::new().unwrap();
    let script_dir = TempDir::new().unwrap();
    let script_path = write_script(script_dir.path(), script);

    let config = ServiceConfig::default()
        .with_staging_root(staging_dir.path().to_path_buf())
        .with_executable(ExecutableConfig {
            path: script_path,
            descriptor_flag: "--job-config".to_string(),
            fail_on_nonzero_exit,
            max_run_secs: None,
        });

    let metrics = Arc::new(RecordingMetrics::new());
    let ctx = Arc::new(AppContext::new(
        config,
        store,
        LogPipeline::local_only(),
        metrics.clone(),
    ));

    Harness {
        ctx,
        metrics,
        staging_root: staging_dir.path().to_path_buf(),
        _staging_dir: staging_dir,
        _script_dir: script_dir,
    }
}

fn job_config(source: &str, target: &str) -> ProcessingConfig {
    serde_json::from_value(serde_json::json!({
        "Source Folder Path": source,
        "Target Folder Path": target,
    }))
    .unwrap()
}

async fn submit_and_run(h: &Harness, config: ProcessingConfig) -> (JobId, JobStatus) {
    let id = JobId::generate();
    h.ctx.registry.register(id.clone()).await;
    let status = orchestrator::run_job(h.ctx.clone(), id.clone(), config).await;
    (id, status)
}

#[tokio::test]
async fn full_pipeline_stages_runs_uploads_and_cleans_up() {
    let store = seeded_store();
    let h = harness(store.clone(), PROCESS_SCRIPT, false);

    let (id, status) = submit_and_run(
        &h,
        job_config("mem://data/input/batch-1", "mem://results/output/batch-1"),
    )
    .await;

    assert_eq!(status, JobStatus::Completed);
    assert_eq!(
        h.ctx.registry.get(&id).await.unwrap().status,
        JobStatus::Completed
    );

    // The three source files plus the descriptor copy made it to the target
    // prefix, proving download, descriptor hand-off, and upload all ran.
    let keys = store.keys("results");
    assert!(keys.contains(&"output/batch-1/a.txt".to_string()));
    assert!(keys.contains(&"output/batch-1/b.txt".to_string()));
    assert!(keys.contains(&"output/batch-1/c.txt".to_string()));
    assert!(keys.contains(&"output/batch-1/descriptor-seen.json".to_string()));
    assert_eq!(
        store.get("results", "output/batch-1/a.txt").await.unwrap(),
        bytes::Bytes::from("alpha")
    );

    // The descriptor was written inside the source staging directory and
    // its remote paths were rewritten to local staging paths.
    let descriptor = store
        .get("results", "output/batch-1/descriptor-seen.json")
        .await
        .unwrap();
    let descriptor: serde_json::Value = serde_json::from_slice(&descriptor).unwrap();
    let staging = StagingPaths::for_job(&h.staging_root, &id);
    assert_eq!(
        descriptor["Source Folder Path"],
        staging.source.display().to_string()
    );
    assert_eq!(
        descriptor["Target Folder Path"],
        staging.target.display().to_string()
    );

    // Both staging directories are gone.
    assert!(!staging.source.exists());
    assert!(!staging.target.exists());

    // One duration metric, tagged with the host identity.
    let points = h.metrics.points();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].1.name, "ProcessingDuration");
    assert_eq!(points[0].1.unit, "Seconds");
    assert!(points[0]
        .1
        .dimensions
        .iter()
        .any(|(name, _)| name == "Host"));
}

#[tokio::test]
async fn nonzero_exit_completes_under_default_policy() {
    let store = seeded_store();
    // Copies results, then exits non-zero.
    let script = PROCESS_SCRIPT.replace("echo processed", "exit 7");
    let h = harness(store.clone(), &script, false);

    let (_, status) = submit_and_run(
        &h,
        job_config("mem://data/input/batch-1", "mem://results/output/batch-1"),
    )
    .await;

    // Exit-code-blind completion: the run finished, so the job completed
    // and results were uploaded.
    assert_eq!(status, JobStatus::Completed);
    assert!(!store.keys("results").is_empty());
}

#[tokio::test]
async fn nonzero_exit_fails_under_strict_policy() {
    let store = seeded_store();
    let script = PROCESS_SCRIPT.replace("echo processed", "exit 7");
    let h = harness(store.clone(), &script, true);

    let (id, status) = submit_and_run(
        &h,
        job_config("mem://data/input/batch-1", "mem://results/output/batch-1"),
    )
    .await;

    assert_eq!(status, JobStatus::Failed);
    // No upload after the failed run.
    assert!(store.keys("results").is_empty());

    // Cleanup is unconditional and the metric is still emitted.
    let staging = StagingPaths::for_job(&h.staging_root, &id);
    assert!(!staging.source.exists());
    assert!(!staging.target.exists());
    assert_eq!(h.metrics.points().len(), 1);
}

#[tokio::test]
async fn missing_source_bucket_fails_without_uploading() {
    let store = Arc::new(MemoryStore::new());
    store.create_bucket("results");
    let h = harness(store.clone(), PROCESS_SCRIPT, false);

    let (id, status) = submit_and_run(
        &h,
        job_config("mem://no-such-bucket/input", "mem://results/output"),
    )
    .await;

    assert_eq!(status, JobStatus::Failed);
    assert!(store.keys("results").is_empty());

    let staging = StagingPaths::for_job(&h.staging_root, &id);
    assert!(!staging.source.exists());
    assert!(!staging.target.exists());
}

#[tokio::test]
async fn empty_source_prefix_still_completes() {
    let store = seeded_store();
    let h = harness(store.clone(), PROCESS_SCRIPT, false);

    // Valid but suspicious: the prefix matches nothing.
    let (_, status) = submit_and_run(
        &h,
        job_config("mem://data/input/empty-batch", "mem://results/output/empty"),
    )
    .await;

    assert_eq!(status, JobStatus::Completed);
}

#[tokio::test]
async fn jobs_beyond_the_slot_limit_still_complete() {
    let store = seeded_store();
    let staging_dir = TempDir::new().unwrap();
    let script_dir = TempDir::new().unwrap();
    let script_path = write_script(script_dir.path(), PROCESS_SCRIPT);

    let config = ServiceConfig {
        max_concurrent_jobs: 1,
        ..ServiceConfig::default()
    }
    .with_staging_root(staging_dir.path().to_path_buf())
    .with_executable(ExecutableConfig {
        path: script_path,
        descriptor_flag: "--job-config".to_string(),
        fail_on_nonzero_exit: false,
        max_run_secs: None,
    });

    let ctx = Arc::new(AppContext::new(
        config,
        store.clone(),
        LogPipeline::local_only(),
        Arc::new(RecordingMetrics::new()),
    ));

    let mut handles = Vec::new();
    for i in 0..3 {
        let id = JobId::from(format!("job-{i}"));
        ctx.registry.register(id.clone()).await;
        let config = job_config(
            "mem://data/input/batch-1",
            &format!("mem://results/output/run-{i}"),
        );
        handles.push(tokio::spawn(orchestrator::run_job(
            ctx.clone(),
            id,
            config,
        )));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), JobStatus::Completed);
    }
}
