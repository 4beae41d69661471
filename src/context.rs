use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::ServiceConfig;
use crate::metrics::MetricsSink;
use crate::registry::JobRegistry;
use crate::shipper::LogPipeline;
use crate::storage::ObjectStore;

/// Everything an orchestration unit needs, constructed once at startup and
/// shared via `Arc`. Explicit construction (no global clients) keeps every
/// collaborator swappable for a test double.
pub struct AppContext {
    pub config: ServiceConfig,
    pub registry: JobRegistry,
    pub store: Arc<dyn ObjectStore>,
    pub logs: LogPipeline,
    pub metrics: Arc<dyn MetricsSink>,
    /// Gates how many jobs execute simultaneously; submissions beyond the
    /// limit wait here without blocking the HTTP layer.
    pub job_slots: Arc<Semaphore>,
}

impl AppContext {
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn ObjectStore>,
        logs: LogPipeline,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let registry = JobRegistry::with_retention(config.registry_max_entries);
        let job_slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            config,
            registry,
            store,
            logs,
            metrics,
            job_slots,
        }
    }
}
