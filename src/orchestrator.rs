//! The per-job pipeline: download → run → upload → report → cleanup.
//!
//! One orchestration unit (a spawned task) drives a single job from
//! `processing` to a terminal status. Pipeline errors are caught at the unit
//! boundary and become a `failed` status plus a diagnostic; they never reach
//! the HTTP layer or the process. Cleanup of the staging directories is
//! unconditional and best-effort.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs;

use crate::context::AppContext;
use crate::error::{Result, StagehandError};
use crate::job::{JobId, JobStatus, ProcessingConfig};
use crate::metrics::MetricPoint;
use crate::runner::ProcessRunner;
use crate::storage::{sync, RemoteUri};

/// Name of the descriptor file written into the source staging directory.
/// Its schema belongs to the external executable.
const DESCRIPTOR_FILE: &str = "config.json";

/// Local staging locations for one job, derived from its id. Ids are unique
/// per active job, so no cross-job locking is needed here.
#[derive(Debug, Clone)]
pub struct StagingPaths {
    pub source: PathBuf,
    pub target: PathBuf,
}

impl StagingPaths {
    pub fn for_job(staging_root: &Path, id: &JobId) -> Self {
        Self {
            source: staging_root.join(format!("src_{id}")),
            target: staging_root.join(format!("target_{id}")),
        }
    }
}

/// Drive one job to completion or failure, updating the registry and
/// emitting a duration metric either way. Returns the terminal status.
pub async fn run_job(ctx: Arc<AppContext>, job_id: JobId, config: ProcessingConfig) -> JobStatus {
    // Bounded fan-out: wait here for an execution slot. The submission call
    // has already returned, so nothing upstream blocks on this.
    let _slot = match ctx.job_slots.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            tracing::error!(job_id = %job_id, "Job slots closed, failing job");
            ctx.registry.finish(&job_id, JobStatus::Failed).await;
            return JobStatus::Failed;
        }
    };

    ctx.logs
        .info(format!("Starting processing task for job {job_id}"));

    let staging = StagingPaths::for_job(&ctx.config.staging_root, &job_id);
    let started = Instant::now();

    let status = match execute_pipeline(&ctx, &job_id, config, &staging).await {
        Ok(()) => JobStatus::Completed,
        Err(e) => {
            ctx.logs
                .error(format!("Error processing job {job_id}: {e}"));
            JobStatus::Failed
        }
    };

    let elapsed = started.elapsed();
    report_duration(&ctx, elapsed).await;

    ctx.registry.finish(&job_id, status).await;
    ctx.logs.info(format!(
        "Job {job_id} {status} in {:.2} seconds",
        elapsed.as_secs_f64()
    ));

    cleanup_staging(&staging).await;
    status
}

/// Steps 2–5 of the pipeline. Any error here fails the job.
async fn execute_pipeline(
    ctx: &AppContext,
    job_id: &JobId,
    mut config: ProcessingConfig,
    staging: &StagingPaths,
) -> Result<()> {
    let source_uri = RemoteUri::parse(&config.source_folder_path)?;
    let target_uri = RemoteUri::parse(&config.target_folder_path)?;

    fs::create_dir_all(&staging.source).await?;
    fs::create_dir_all(&staging.target).await?;

    let downloaded = sync::download(ctx.store.as_ref(), &source_uri, &staging.source).await?;
    ctx.logs.info(format!(
        "Downloaded {downloaded} objects from {source_uri} for job {job_id}"
    ));

    // The executable sees only local paths: rewrite the descriptor to point
    // at the staging directories before handing it over.
    config.source_folder_path = staging.source.display().to_string();
    config.target_folder_path = staging.target.display().to_string();

    let descriptor_path = staging.source.join(DESCRIPTOR_FILE);
    let descriptor = serde_json::to_vec_pretty(&config)
        .map_err(|e| StagehandError::Execution(format!("encode descriptor: {e}")))?;
    fs::write(&descriptor_path, descriptor).await?;

    let exe = &ctx.config.executable;
    let args = vec![
        exe.descriptor_flag.clone(),
        descriptor_path.display().to_string(),
    ];
    let runner = ProcessRunner::new(exe.max_run_secs.map(Duration::from_secs));
    let outcome = runner
        .run(&exe.path, &args, &staging.source, &ctx.logs)
        .await?;

    if outcome.timed_out {
        return Err(StagehandError::Execution(format!(
            "run exceeded the {}s limit and was killed",
            exe.max_run_secs.unwrap_or_default()
        )));
    }
    if exe.fail_on_nonzero_exit && outcome.exit_code != Some(0) {
        return Err(StagehandError::Execution(format!(
            "executable exited with code {:?}",
            outcome.exit_code
        )));
    }

    let uploaded = sync::upload(ctx.store.as_ref(), &staging.target, &target_uri).await?;
    ctx.logs.info(format!(
        "Uploaded {uploaded} objects to {target_uri} for job {job_id}"
    ));

    Ok(())
}

async fn report_duration(ctx: &AppContext, elapsed: Duration) {
    ctx.metrics
        .put_metric(
            &ctx.config.metric_namespace,
            MetricPoint {
                name: "ProcessingDuration".to_string(),
                value: elapsed.as_secs_f64(),
                unit: "Seconds".to_string(),
                dimensions: vec![("Host".to_string(), ctx.config.host_id.clone())],
            },
        )
        .await;
}

/// Remove both staging directories. Failures are logged and swallowed; they
/// never change the job's status and are not retried.
async fn cleanup_staging(staging: &StagingPaths) {
    for dir in [&staging.source, &staging.target] {
        match fs::remove_dir_all(dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                let fault = StagehandError::Cleanup(format!("remove {dir:?}: {e}"));
                tracing::warn!(error = %fault, "Staging cleanup failed");
            }
        }
    }
}
