use std::net::SocketAddr;
use std::path::PathBuf;

/// Configuration for invoking the external batch executable.
///
/// The executable is an opaque program: it receives a single descriptor-file
/// argument and is observed only through its standard streams and exit code.
#[derive(Debug, Clone)]
pub struct ExecutableConfig {
    /// Path to the external executable.
    pub path: PathBuf,
    /// Flag placed before the descriptor file path (e.g. "--scan-complete").
    pub descriptor_flag: String,
    /// Treat a non-zero exit code as job failure.
    ///
    /// The original service declared completion regardless of exit code, so
    /// this defaults to false. Set it when the executable follows the usual
    /// zero-means-success convention.
    pub fail_on_nonzero_exit: bool,
    /// Maximum wall-clock run duration in seconds. The child is killed on
    /// expiry and the job fails. None means unbounded.
    pub max_run_secs: Option<u64>,
}

impl Default for ExecutableConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/usr/local/bin/batch-process"),
            descriptor_flag: "--job-config".to_string(),
            fail_on_nonzero_exit: false,
            max_run_secs: None,
        }
    }
}

/// Remote log shipping configuration. When unset the service runs with
/// local-only logging.
#[derive(Debug, Clone, Default)]
pub struct ShippingConfig {
    /// Append-only log file path for the file-backed sink. None disables
    /// remote shipping entirely.
    pub log_path: Option<PathBuf>,
    pub log_group: String,
    pub log_stream: String,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the HTTP API listens on.
    pub listen_addr: SocketAddr,
    /// Root directory for per-job staging directories.
    pub staging_root: PathBuf,
    /// Root directory for the filesystem object-store backend
    /// (bucket = subdirectory).
    pub store_root: PathBuf,
    pub executable: ExecutableConfig,
    pub shipping: ShippingConfig,
    /// Number of jobs allowed to execute simultaneously. Submissions beyond
    /// this are accepted and wait for a slot.
    pub max_concurrent_jobs: usize,
    /// Prune the oldest terminal registry entries beyond this count.
    /// None keeps every entry for the life of the process.
    pub registry_max_entries: Option<usize>,
    /// Namespace for emitted metrics.
    pub metric_namespace: String,
    /// Host identity tag attached to metric data points.
    pub host_id: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000"
                .parse()
                .expect("default listen address is valid"),
            staging_root: PathBuf::from("/var/lib/stagehand/staging"),
            store_root: PathBuf::from("/var/lib/stagehand/store"),
            executable: ExecutableConfig::default(),
            shipping: ShippingConfig::default(),
            max_concurrent_jobs: 4,
            registry_max_entries: None,
            metric_namespace: "CustomMetrics".to_string(),
            host_id: "local".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn with_staging_root(mut self, root: PathBuf) -> Self {
        self.staging_root = root;
        self
    }

    pub fn with_executable(mut self, executable: ExecutableConfig) -> Self {
        self.executable = executable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_config_default() {
        let cfg = ExecutableConfig::default();
        assert!(!cfg.fail_on_nonzero_exit);
        assert!(cfg.max_run_secs.is_none());
        assert_eq!(cfg.descriptor_flag, "--job-config");
    }

    #[test]
    fn shipping_config_default_is_disabled() {
        let cfg = ShippingConfig::default();
        assert!(cfg.log_path.is_none());
        assert!(cfg.log_group.is_empty());
        assert!(cfg.log_stream.is_empty());
    }

    #[test]
    fn service_config_default() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:5000");
        assert_eq!(cfg.max_concurrent_jobs, 4);
        assert!(cfg.registry_max_entries.is_none());
        assert_eq!(cfg.metric_namespace, "CustomMetrics");
    }

    #[test]
    fn service_config_builders() {
        let cfg = ServiceConfig::default()
            .with_staging_root(PathBuf::from("/tmp/stage"))
            .with_executable(ExecutableConfig {
                path: PathBuf::from("/bin/true"),
                fail_on_nonzero_exit: true,
                ..ExecutableConfig::default()
            });
        assert_eq!(cfg.staging_root, PathBuf::from("/tmp/stage"));
        assert_eq!(cfg.executable.path, PathBuf::from("/bin/true"));
        assert!(cfg.executable.fail_on_nonzero_exit);
    }
}
