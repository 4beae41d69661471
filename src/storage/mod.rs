//! Remote object storage abstraction and staged tree sync.
//!
//! The storage contract is a trait so the orchestrator can be wired to a
//! cloud backend, the filesystem backend, or an in-memory double without
//! changing the pipeline:
//!
//! - [`ObjectStore`]: paginated listing plus whole-object get/put
//! - [`FsStore`]: bucket-as-subdirectory local backend
//! - [`MemoryStore`]: test double with deterministic pagination
//! - [`sync`]: recursive prefix download/upload between a store and a local
//!   directory tree

pub mod fs;
pub mod memory;
pub mod sync;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StagehandError};

pub use fs::FsStore;
pub use memory::MemoryStore;

/// A remote location addressed as `scheme://bucket/prefix/...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUri {
    pub bucket: String,
    pub prefix: String,
}

impl RemoteUri {
    /// Parse a URI of the form `scheme://bucket/prefix`. The prefix may be
    /// empty; the bucket may not.
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .split_once("://")
            .map(|(_, rest)| rest)
            .ok_or_else(|| StagehandError::InvalidUri(uri.to_string()))?;

        let (bucket, prefix) = match rest.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix),
            None => (rest, ""),
        };

        if bucket.is_empty() {
            return Err(StagehandError::InvalidUri(uri.to_string()));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            prefix: prefix.trim_end_matches('/').to_string(),
        })
    }

    /// Join a forward-slash relative path onto the prefix.
    pub fn key_for(&self, relative: &str) -> String {
        if self.prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.prefix, relative)
        }
    }
}

impl std::fmt::Display for RemoteUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store://{}/{}", self.bucket, self.prefix)
    }
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Object keys in this page (full keys, not relative paths).
    pub keys: Vec<String>,
    /// Continuation token for the next page, if any.
    pub next_token: Option<String>,
}

/// Object storage contract.
///
/// Backends report a missing **bucket** as `NotFound` and any other
/// transport fault as `Transfer`; an empty prefix is a normal empty listing.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// List one page of keys under a prefix.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage>;

    /// Read an entire object.
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Write an entire object. The bucket must already exist.
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()>;
}
