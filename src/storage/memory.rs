use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StagehandError};

use super::{ListPage, ObjectStore};

const DEFAULT_PAGE_SIZE: usize = 1_000;

/// In-memory object store for tests. Thread-safe, deterministic listing
/// order (keys sorted), pagination driven by a configurable page size so
/// multi-page listings can be exercised without thousands of objects.
#[derive(Debug)]
pub struct MemoryStore {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, Bytes>>>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Create an empty bucket.
    pub fn create_bucket(&self, bucket: &str) {
        let mut buckets = self.buckets.write().expect("store lock poisoned");
        buckets.entry(bucket.to_string()).or_default();
    }

    /// Seed an object, creating the bucket if needed.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        let mut buckets = self.buckets.write().expect("store lock poisoned");
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
    }

    /// All keys in a bucket, sorted. Empty if the bucket is unknown.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let buckets = self.buckets.read().expect("store lock poisoned");
        buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage> {
        let buckets = self
            .buckets
            .read()
            .map_err(|_| StagehandError::Transfer("store lock poisoned".to_string()))?;

        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StagehandError::NotFound(format!("bucket {bucket}")))?;

        // Token is the last key of the previous page; resume strictly after it.
        let matching = objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| token.map_or(true, |t| key.as_str() > t));

        let mut keys: Vec<String> = matching.take(self.page_size + 1).cloned().collect();
        let next_token = if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            keys.last().cloned()
        } else {
            None
        };

        Ok(ListPage { keys, next_token })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let buckets = self
            .buckets
            .read()
            .map_err(|_| StagehandError::Transfer("store lock poisoned".to_string()))?;

        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StagehandError::NotFound(format!("bucket {bucket}")))?;

        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StagehandError::Transfer(format!("object {bucket}/{key} missing")))
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let mut buckets = self
            .buckets
            .write()
            .map_err(|_| StagehandError::Transfer("store lock poisoned".to_string()))?;

        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StagehandError::NotFound(format!("bucket {bucket}")))?;

        objects.insert(key.to_string(), data);
        Ok(())
    }
}
