//! Shipped sink backends: an in-memory double for tests and a file-backed
//! sink that enforces real sequence-token semantics for local deployments.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;

use super::{LogRecord, LogSink, SinkError};

/// In-memory sink. Accepts appends only with the token it handed out last,
/// and can be scripted to reject upcoming appends to exercise the shipper's
/// retry path.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemorySinkState>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    batches: Vec<Vec<LogRecord>>,
    streams: Vec<(String, String)>,
    seq: u64,
    /// Queued forced rejections; each entry is the token the rejection
    /// message will name as expected.
    forced_rejections: VecDeque<String>,
    create_failure: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn token_for(seq: u64) -> String {
        format!("token-{seq}")
    }

    /// Script the next append to be rejected, naming `expected` as the
    /// token the sink wants.
    pub fn reject_next_with(&self, expected: &str) {
        self.state
            .lock()
            .expect("sink lock poisoned")
            .forced_rejections
            .push_back(expected.to_string());
    }

    /// Make `create_stream` fail with the given message.
    pub fn fail_creation(&self, message: &str) {
        self.state.lock().expect("sink lock poisoned").create_failure = Some(message.to_string());
    }

    /// Every batch accepted so far, flattened in append order.
    pub fn records(&self) -> Vec<LogRecord> {
        self.state
            .lock()
            .expect("sink lock poisoned")
            .batches
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn batches_accepted(&self) -> usize {
        self.state.lock().expect("sink lock poisoned").batches.len()
    }

    /// The token the sink expects on the next append.
    pub fn current_token(&self) -> Option<String> {
        let state = self.state.lock().expect("sink lock poisoned");
        (state.seq > 0).then(|| Self::token_for(state.seq))
    }

    pub fn streams_created(&self) -> Vec<(String, String)> {
        self.state.lock().expect("sink lock poisoned").streams.clone()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn create_stream(
        &self,
        group: &str,
        stream: &str,
    ) -> std::result::Result<(), SinkError> {
        let mut state = self.state.lock().expect("sink lock poisoned");
        if let Some(message) = &state.create_failure {
            return Err(SinkError::Other(message.clone()));
        }

        let pair = (group.to_string(), stream.to_string());
        if state.streams.contains(&pair) {
            return Err(SinkError::AlreadyExists);
        }
        state.streams.push(pair);
        Ok(())
    }

    async fn put_records(
        &self,
        _group: &str,
        _stream: &str,
        batch: &[LogRecord],
        token: Option<&str>,
    ) -> std::result::Result<String, SinkError> {
        let mut state = self.state.lock().expect("sink lock poisoned");

        if let Some(expected) = state.forced_rejections.pop_front() {
            return Err(SinkError::TokenRejected(format!(
                "invalid sequence token, expected token is: {expected}"
            )));
        }

        let expected = (state.seq > 0).then(|| Self::token_for(state.seq));
        if token != expected.as_deref() {
            let expected = expected.unwrap_or_else(|| "token-0".to_string());
            return Err(SinkError::TokenRejected(format!(
                "invalid sequence token, expected token is: {expected}"
            )));
        }

        state.batches.push(batch.to_vec());
        state.seq += 1;
        Ok(Self::token_for(state.seq))
    }
}

/// Append-only JSONL file enforcing sequence tokens, the local stand-in for
/// the remote log service. One file per group/stream pair under the root.
#[derive(Debug)]
pub struct FileSink {
    root: PathBuf,
    seq: AsyncMutex<u64>,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seq: AsyncMutex::new(0),
        }
    }

    fn stream_path(&self, group: &str, stream: &str) -> PathBuf {
        self.root.join(group).join(format!("{stream}.log"))
    }

    fn token_for(seq: u64) -> String {
        format!("seq-{seq}")
    }
}

#[async_trait]
impl LogSink for FileSink {
    async fn create_stream(
        &self,
        group: &str,
        stream: &str,
    ) -> std::result::Result<(), SinkError> {
        let path = self.stream_path(group, stream);
        if path.exists() {
            return Err(SinkError::AlreadyExists);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::Other(format!("mkdir {parent:?}: {e}")))?;
        }
        fs::write(&path, b"")
            .await
            .map_err(|e| SinkError::Other(format!("create {path:?}: {e}")))?;
        Ok(())
    }

    async fn put_records(
        &self,
        group: &str,
        stream: &str,
        batch: &[LogRecord],
        token: Option<&str>,
    ) -> std::result::Result<String, SinkError> {
        // Held across the append so the token check and the write that
        // consumes it stay atomic under concurrent callers.
        let mut seq = self.seq.lock().await;
        let expected = (*seq > 0).then(|| Self::token_for(*seq));
        if token != expected.as_deref() {
            return Err(SinkError::TokenRejected(format!(
                "invalid sequence token, expected token is: {}",
                expected.unwrap_or_else(|| Self::token_for(0))
            )));
        }

        let path = self.stream_path(group, stream);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| SinkError::Other(format!("open {path:?}: {e}")))?;

        let mut body = String::new();
        for record in batch {
            let line = serde_json::json!({
                "timestamp": record.timestamp_ms,
                "message": record.message,
            });
            body.push_str(&line.to_string());
            body.push('\n');
        }
        file.write_all(body.as_bytes())
            .await
            .map_err(|e| SinkError::Other(format!("append {path:?}: {e}")))?;

        *seq += 1;
        Ok(Self::token_for(*seq))
    }
}
