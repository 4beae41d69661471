//! Recursive prefix sync between an [`ObjectStore`] and a local directory.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;

use crate::error::{Result, StagehandError};

use super::{ObjectStore, RemoteUri};

/// Download every object under `uri` into `local_root`, preserving the key
/// structure relative to the prefix. Returns the number of objects
/// transferred; zero matches is valid but suspicious and logged as a
/// warning. Directory-marker keys (trailing `/`) are skipped.
pub async fn download(
    store: &dyn ObjectStore,
    uri: &RemoteUri,
    local_root: &Path,
) -> Result<usize> {
    let mut count = 0usize;
    let mut token: Option<String> = None;

    loop {
        let page = store
            .list_page(&uri.bucket, &uri.prefix, token.as_deref())
            .await?;

        for key in &page.keys {
            if key.ends_with('/') {
                continue;
            }

            let relative = key
                .strip_prefix(&uri.prefix)
                .unwrap_or(key)
                .trim_start_matches('/');
            if relative.is_empty() {
                continue;
            }

            // A hostile bucket must not be able to write outside the
            // staging root via `..` components in its keys.
            let Some(local_path) = join_local(local_root, relative) else {
                tracing::warn!(key = %key, "Skipping object with unsafe relative path");
                continue;
            };
            if let Some(parent) = local_path.parent() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    StagehandError::Transfer(format!("mkdir {parent:?}: {e}"))
                })?;
            }

            let data = store.get(&uri.bucket, key).await?;
            fs::write(&local_path, &data).await.map_err(|e| {
                StagehandError::Transfer(format!("write {local_path:?}: {e}"))
            })?;

            tracing::debug!(key = %key, path = ?local_path, "Downloaded object");
            count += 1;
        }

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    if count == 0 {
        tracing::warn!(uri = %uri, "Source prefix matched no objects");
    } else {
        tracing::info!(uri = %uri, count, "Download complete");
    }
    Ok(count)
}

/// Upload every file under `local_root` to `uri`, joining relative paths
/// onto the prefix with forward slashes regardless of the host separator.
/// Returns the number of objects transferred.
pub async fn upload(
    store: &dyn ObjectStore,
    local_root: &Path,
    uri: &RemoteUri,
) -> Result<usize> {
    let mut count = 0usize;
    let mut pending = vec![local_root.to_path_buf()];

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
                let relative = path.strip_prefix(local_root).map_err(|e| {
                    StagehandError::Transfer(format!("relative path for {path:?}: {e}"))
                })?;
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                let data = fs::read(&path)
                    .await
                    .map_err(|e| StagehandError::Transfer(format!("read {path:?}: {e}")))?;

                let key = uri.key_for(&relative);
                store.put(&uri.bucket, &key, Bytes::from(data)).await?;

                tracing::debug!(path = ?path, key = %key, "Uploaded object");
                count += 1;
            }
        }
    }

    if count == 0 {
        tracing::warn!(uri = %uri, "Local tree contained no files to upload");
    } else {
        tracing::info!(uri = %uri, count, "Upload complete");
    }
    Ok(count)
}

/// Join a forward-slash relative key onto a local root using host
/// separators. Returns None when any segment would step outside the root.
fn join_local(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for part in relative.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            return None;
        }
        path.push(part);
    }
    Some(path)
}
