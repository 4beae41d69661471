use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::job::{JobId, JobRecord, JobStatus};

/// Concurrent map from job id to its current record.
///
/// Each id is written by exactly one orchestration unit; status queries read
/// concurrently. Entries are kept for the life of the process unless a
/// retention bound is set, in which case the oldest *terminal* entries are
/// pruned once the bound is exceeded. An in-flight job's entry is never
/// evicted.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
    max_entries: Option<usize>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_retention(None)
    }

    pub fn with_retention(max_entries: Option<usize>) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            max_entries,
        }
    }

    /// Register a new job as `processing` with the current time.
    pub async fn register(&self, id: JobId) {
        let mut jobs = self.jobs.write().await;
        jobs.insert(id, JobRecord::new());

        if let Some(max) = self.max_entries {
            if jobs.len() > max {
                Self::prune(&mut jobs, max);
            }
        }
    }

    /// Move a job to a terminal status. Returns false if the job is unknown
    /// or already terminal; a terminal status never reverts.
    pub async fn finish(&self, id: &JobId, status: JobStatus) -> bool {
        debug_assert!(status.is_terminal());
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(id) {
            Some(record) if !record.status.is_terminal() => {
                record.status = status;
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.jobs.read().await.get(id).cloned()
    }

    /// All known jobs sorted chronologically by start time.
    pub async fn all(&self) -> Vec<(JobId, JobRecord)> {
        let jobs = self.jobs.read().await;
        let mut entries: Vec<(JobId, JobRecord)> = jobs
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        entries.sort_by_key(|(_, record)| record.started_at);
        entries
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Drop the oldest terminal entries until at most `max` remain.
    fn prune(jobs: &mut HashMap<JobId, JobRecord>, max: usize) {
        let excess = jobs.len().saturating_sub(max);
        if excess == 0 {
            return;
        }

        let mut terminal: Vec<(JobId, chrono::DateTime<chrono::Utc>)> = jobs
            .iter()
            .filter(|(_, record)| record.status.is_terminal())
            .map(|(id, record)| (id.clone(), record.started_at))
            .collect();
        terminal.sort_by_key(|(_, started_at)| *started_at);

        for (id, _) in terminal.into_iter().take(excess) {
            jobs.remove(&id);
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
