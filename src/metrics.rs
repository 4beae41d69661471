use std::sync::Mutex;

use async_trait::async_trait;

/// One metric data point submitted to the metrics backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub name: String,
    pub value: f64,
    pub unit: String,
    /// Dimension name/value pairs (e.g. host identity).
    pub dimensions: Vec<(String, String)>,
}

/// Metrics submission client. Injected so tests can observe emitted points
/// and deployments can plug in a real backend.
#[async_trait]
pub trait MetricsSink: Send + Sync + 'static {
    async fn put_metric(&self, namespace: &str, point: MetricPoint);
}

/// Default backend: surfaces metric points as structured log events.
#[derive(Debug, Default)]
pub struct LogMetrics;

#[async_trait]
impl MetricsSink for LogMetrics {
    async fn put_metric(&self, namespace: &str, point: MetricPoint) {
        tracing::info!(
            namespace,
            metric = %point.name,
            value = point.value,
            unit = %point.unit,
            dimensions = ?point.dimensions,
            "Metric emitted"
        );
    }
}

/// Recording double for tests.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    points: Mutex<Vec<(String, MetricPoint)>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> Vec<(String, MetricPoint)> {
        self.points.lock().expect("metrics lock poisoned").clone()
    }
}

#[async_trait]
impl MetricsSink for RecordingMetrics {
    async fn put_metric(&self, namespace: &str, point: MetricPoint) {
        self.points
            .lock()
            .expect("metrics lock poisoned")
            .push((namespace.to_string(), point));
    }
}
