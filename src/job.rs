use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque job identifier: submission-time millis plus a short random suffix.
///
/// Time-derived so staging paths sort chronologically on disk, with the
/// suffix guaranteeing uniqueness across jobs submitted in the same instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis();
        let random = Uuid::new_v4().simple().to_string();
        Self(format!("{millis}-{}", &random[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// A job leaves `processing` exactly once and never returns.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Registry entry for one job.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new() -> Self {
        Self {
            status: JobStatus::Processing,
            started_at: Utc::now(),
        }
    }
}

impl Default for JobRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// The processing configuration submitted with a job.
///
/// Only the source and target folder paths are interpreted by this service;
/// every other field is passed through verbatim to the descriptor file, whose
/// schema belongs to the external executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(rename = "Source Folder Path")]
    pub source_folder_path: String,

    #[serde(rename = "Target Folder Path")]
    pub target_folder_path: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_unique() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn job_id_starts_with_millis() {
        let id = JobId::generate();
        let prefix = id.as_str().split('-').next().unwrap();
        assert!(prefix.parse::<i64>().is_ok());
    }

    #[test]
    fn status_display_matches_api_strings() {
        assert_eq!(JobStatus::Processing.to_string(), "processing");
        assert_eq!(JobStatus::Completed.to_string(), "completed");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn status_terminality() {
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn processing_config_preserves_extra_fields() {
        let raw = serde_json::json!({
            "Source Folder Path": "store://input/batch-1",
            "Target Folder Path": "store://output/batch-1",
            "Scan Mode": "full",
            "Retries": 3,
        });
        let cfg: ProcessingConfig = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(cfg.source_folder_path, "store://input/batch-1");
        assert_eq!(cfg.extra["Scan Mode"], "full");

        let back = serde_json::to_value(&cfg).unwrap();
        assert_eq!(back, raw);
    }
}
