use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stagehand::api;
use stagehand::config::{ExecutableConfig, ServiceConfig, ShippingConfig};
use stagehand::context::AppContext;
use stagehand::metrics::LogMetrics;
use stagehand::shipper::{FileSink, LogPipeline, LogShipper};
use stagehand::shutdown::install_shutdown_handler;
use stagehand::storage::FsStore;

const SHIPPING_QUEUE_DEPTH: usize = 1024;

#[derive(Parser, Debug)]
#[command(name = "stagehand")]
#[command(version)]
#[command(about = "Staged batch-job execution service")]
struct Args {
    /// Port for the HTTP API
    #[arg(long, default_value = "5000")]
    port: u16,

    /// Root directory for per-job staging directories
    #[arg(long, default_value = "/var/lib/stagehand/staging")]
    staging_root: PathBuf,

    /// Root directory for the filesystem object store (bucket = subdirectory)
    #[arg(long, default_value = "/var/lib/stagehand/store")]
    store_root: PathBuf,

    /// Path to the external batch executable
    #[arg(long, default_value = "/usr/local/bin/batch-process")]
    executable: PathBuf,

    /// Flag placed before the descriptor file path
    #[arg(long, default_value = "--job-config")]
    descriptor_flag: String,

    /// Treat a non-zero exit code as job failure
    #[arg(long)]
    fail_on_nonzero_exit: bool,

    /// Kill the executable after this many seconds (unbounded when omitted)
    #[arg(long)]
    max_run_secs: Option<u64>,

    /// Number of jobs allowed to execute simultaneously
    #[arg(long, default_value = "4")]
    max_concurrent_jobs: usize,

    /// Prune the oldest finished registry entries beyond this count
    #[arg(long)]
    registry_max_entries: Option<usize>,

    /// Root for the append-only log sink; omitting disables remote shipping
    #[arg(long)]
    log_root: Option<PathBuf>,

    /// Remote log group name
    #[arg(long, default_value = "stagehand")]
    log_group: String,

    /// Remote log stream name
    #[arg(long, default_value = "jobs")]
    log_stream: String,

    /// Namespace for emitted metrics
    #[arg(long, default_value = "CustomMetrics")]
    metric_namespace: String,

    /// Host identity tag attached to metric data points
    #[arg(long, default_value = "local")]
    host_id: String,
}

impl Args {
    fn into_config(self) -> ServiceConfig {
        ServiceConfig {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], self.port)),
            staging_root: self.staging_root,
            store_root: self.store_root,
            executable: ExecutableConfig {
                path: self.executable,
                descriptor_flag: self.descriptor_flag,
                fail_on_nonzero_exit: self.fail_on_nonzero_exit,
                max_run_secs: self.max_run_secs,
            },
            shipping: ShippingConfig {
                log_path: self.log_root,
                log_group: self.log_group,
                log_stream: self.log_stream,
            },
            max_concurrent_jobs: self.max_concurrent_jobs,
            registry_max_entries: self.registry_max_entries,
            metric_namespace: self.metric_namespace,
            host_id: self.host_id,
        }
    }
}

/// Construct the logging pipeline, degrading to local-only logging when the
/// remote sink cannot be initialized.
async fn build_log_pipeline(shipping: &ShippingConfig) -> LogPipeline {
    let Some(log_root) = &shipping.log_path else {
        return LogPipeline::local_only();
    };

    let sink = Arc::new(FileSink::new(log_root.clone()));
    match LogShipper::initialize(sink, shipping.log_group.as_str(), shipping.log_stream.as_str())
        .await
    {
        Ok(shipper) => {
            let (handle, _worker) = shipper.spawn(SHIPPING_QUEUE_DEPTH);
            tracing::info!(
                group = %shipping.log_group,
                stream = %shipping.log_stream,
                "Remote log shipping enabled"
            );
            LogPipeline::with_shipper(handle)
        }
        Err(e) => {
            tracing::error!(error = %e, "Log shipper init failed, using local-only logging");
            LogPipeline::local_only()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config();

    tokio::fs::create_dir_all(&config.staging_root).await?;
    tokio::fs::create_dir_all(&config.store_root).await?;

    let logs = build_log_pipeline(&config.shipping).await;
    let store = Arc::new(FsStore::new(config.store_root.clone()));
    let metrics = Arc::new(LogMetrics);

    tracing::info!(
        listen_addr = %config.listen_addr,
        staging_root = ?config.staging_root,
        executable = ?config.executable.path,
        max_concurrent_jobs = config.max_concurrent_jobs,
        shipping = logs.is_shipping(),
        "Starting stagehand"
    );

    let listen_addr = config.listen_addr;
    let ctx = Arc::new(AppContext::new(config, store, logs, metrics));

    let shutdown = install_shutdown_handler();
    api::serve(listen_addr, ctx, shutdown).await;

    Ok(())
}
