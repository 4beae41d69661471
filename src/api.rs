//! HTTP surface for job submission and status polling.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::context::AppContext;
use crate::job::{JobId, JobStatus, ProcessingConfig};
use crate::orchestrator;
use crate::storage::RemoteUri;

#[derive(Serialize)]
struct SubmitResponse {
    job_id: String,
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct JobStatusResponse {
    job_id: String,
    status: String,
}

#[derive(Serialize)]
struct JobListItem {
    job_id: String,
    status: String,
    /// Elapsed seconds so far; present only while the job is processing.
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/process", post(submit_handler))
        .route("/job/:job_id", get(job_status_handler))
        .route("/jobs", get(list_jobs_handler))
        .route("/status/health", get(health_handler))
        .layer(cors)
        .with_state(ctx)
}

/// Bind and serve until the shutdown token fires.
pub async fn serve(addr: SocketAddr, ctx: Arc<AppContext>, shutdown: CancellationToken) {
    let app = router(ctx);

    tracing::info!(addr = %addr, "Starting API server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind API server");
            return;
        }
    };

    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });
    if let Err(e) = serve.await {
        tracing::error!(error = %e, "API server failed");
    }
}

/// Accepts a processing config, registers the job, and hands it to a
/// concurrently-scheduled orchestration unit. Returns 202 immediately; the
/// caller polls `/job/{id}` for the outcome.
async fn submit_handler(
    State(ctx): State<Arc<AppContext>>,
    Json(config): Json<ProcessingConfig>,
) -> impl IntoResponse {
    // Reject malformed URIs up front; everything downstream assumes they parse.
    for uri in [&config.source_folder_path, &config.target_folder_path] {
        if let Err(e) = RemoteUri::parse(uri) {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    }

    let job_id = JobId::generate();
    ctx.registry.register(job_id.clone()).await;

    tracing::info!(job_id = %job_id, "Job accepted");
    tokio::spawn(orchestrator::run_job(ctx.clone(), job_id.clone(), config));

    (
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job_id.to_string(),
            status: "started",
        }),
    )
        .into_response()
}

async fn job_status_handler(
    State(ctx): State<Arc<AppContext>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let status = match ctx.registry.get(&JobId::from(job_id.as_str())).await {
        Some(record) => record.status.to_string(),
        None => "not_found".to_string(),
    };
    Json(JobStatusResponse { job_id, status })
}

async fn list_jobs_handler(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let now = Utc::now();
    let jobs: Vec<JobListItem> = ctx
        .registry
        .all()
        .await
        .into_iter()
        .map(|(id, record)| {
            let duration_secs = (record.status == JobStatus::Processing).then(|| {
                (now - record.started_at).num_milliseconds().max(0) as f64 / 1000.0
            });
            JobListItem {
                job_id: id.to_string(),
                status: record.status.to_string(),
                duration_secs,
            }
        })
        .collect();

    Json(jobs)
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "ready" })
}
