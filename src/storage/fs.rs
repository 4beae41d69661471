use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use crate::error::{Result, StagehandError};

use super::{ListPage, ObjectStore};

/// Filesystem-backed object store: each bucket is a subdirectory of the
/// root and keys map to relative paths inside it. The local and dev-mode
/// backend; cloud backends implement the same trait behind the same
/// failure taxonomy.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    /// Map a key to a path inside the bucket directory. Keys with empty,
    /// `.` or `..` segments are rejected so no object can resolve outside
    /// its bucket.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let mut path = self.bucket_dir(bucket);
        for part in key.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(StagehandError::Transfer(format!("unsafe object key {key:?}")));
            }
            path.push(part);
        }
        Ok(path)
    }

    /// Collect every file under `dir` as a forward-slash key relative to the
    /// bucket directory. Iterative walk; symlinks are not followed.
    async fn walk_keys(dir: &Path, bucket_dir: &Path) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let mut entries = fs::read_dir(&current)
                .await
                .map_err(|e| StagehandError::Transfer(format!("list {current:?}: {e}")))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StagehandError::Transfer(format!("list {current:?}: {e}")))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StagehandError::Transfer(format!("stat {path:?}: {e}")))?;

                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let relative = path
                        .strip_prefix(bucket_dir)
                        .map_err(|e| StagehandError::Transfer(format!("key for {path:?}: {e}")))?;
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage> {
        let bucket_dir = self.bucket_dir(bucket);
        if !bucket_dir.is_dir() {
            return Err(StagehandError::NotFound(format!("bucket {bucket}")));
        }

        // The whole tree fits comfortably in memory for a local backend, so
        // a single page is returned and the token is never set.
        let _ = token;
        let keys = Self::walk_keys(&bucket_dir, &bucket_dir)
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect();

        Ok(ListPage {
            keys,
            next_token: None,
        })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        if !self.bucket_dir(bucket).is_dir() {
            return Err(StagehandError::NotFound(format!("bucket {bucket}")));
        }

        let path = self.object_path(bucket, key)?;
        let data = fs::read(&path)
            .await
            .map_err(|e| StagehandError::Transfer(format!("read {path:?}: {e}")))?;
        Ok(Bytes::from(data))
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        if !self.bucket_dir(bucket).is_dir() {
            return Err(StagehandError::NotFound(format!("bucket {bucket}")));
        }

        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StagehandError::Transfer(format!("mkdir {parent:?}: {e}")))?;
        }
        fs::write(&path, &data)
            .await
            .map_err(|e| StagehandError::Transfer(format!("write {path:?}: {e}")))?;
        Ok(())
    }
}
