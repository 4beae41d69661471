//! Best-effort shipping of log records to an append-only remote sink.
//!
//! The remote append API demands a strictly-ordered sequence token: every
//! `put` must present the token returned by the previous successful `put`.
//! That makes the token a single shared mutable value, so all emission is
//! funneled through one worker task ([`LogShipper::spawn`]); only one
//! append is ever in flight process-wide.
//!
//! Delivery is best-effort by design: a rejected or dropped record produces
//! a local diagnostic and never fails the job being logged.

pub mod sinks;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, StagehandError};

pub use sinks::{FileSink, MemorySink};

/// One ordered log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Millisecond epoch timestamp.
    pub timestamp_ms: i64,
    /// Formatted message text.
    pub message: String,
}

impl LogRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: Utc::now().timestamp_millis(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by a log sink.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The presented sequence token was rejected. The message carries the
    /// expected token as its trailing text.
    #[error("sequence token rejected: {0}")]
    TokenRejected(String),

    /// Stream creation found the stream already present.
    #[error("log stream already exists")]
    AlreadyExists,

    #[error("sink error: {0}")]
    Other(String),
}

/// Append-only remote log sink.
#[async_trait]
pub trait LogSink: Send + Sync + 'static {
    /// Create the group/stream pair. Backends return `AlreadyExists` when
    /// the stream is already present; callers treat that as success.
    async fn create_stream(&self, group: &str, stream: &str)
        -> std::result::Result<(), SinkError>;

    /// Append a batch with the given sequence token (None on the very first
    /// call) and return the token for the next append.
    async fn put_records(
        &self,
        group: &str,
        stream: &str,
        batch: &[LogRecord],
        token: Option<&str>,
    ) -> std::result::Result<String, SinkError>;
}

/// Pull the expected token out of a rejection message (trailing text).
fn extract_expected_token(message: &str) -> Option<String> {
    message.split_whitespace().last().map(str::to_string)
}

/// Owns the sequence token and drives appends one record at a time.
pub struct LogShipper {
    sink: Arc<dyn LogSink>,
    group: String,
    stream: String,
    token: Option<String>,
}

impl LogShipper {
    /// Create the remote stream (idempotently) and return a ready shipper.
    ///
    /// A non-"already exists" creation error is fatal to shipper
    /// initialization; the caller falls back to local-only logging.
    pub async fn initialize(
        sink: Arc<dyn LogSink>,
        group: impl Into<String>,
        stream: impl Into<String>,
    ) -> Result<Self> {
        let group = group.into();
        let stream = stream.into();

        match sink.create_stream(&group, &stream).await {
            Ok(()) | Err(SinkError::AlreadyExists) => {}
            Err(e) => return Err(StagehandError::Shipping(e.to_string())),
        }

        Ok(Self {
            sink,
            group,
            stream,
            token: None,
        })
    }

    /// The token returned by the last successful append.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Deliver one record. On a token rejection the expected token is
    /// extracted from the error text and the record retried exactly once;
    /// a second consecutive rejection drops the record with a diagnostic.
    /// Never propagates an error.
    pub async fn emit(&mut self, record: &LogRecord) {
        let batch = std::slice::from_ref(record);

        let first = self
            .sink
            .put_records(&self.group, &self.stream, batch, self.token.as_deref())
            .await;

        let rejection = match first {
            Ok(token) => {
                self.token = Some(token);
                return;
            }
            Err(SinkError::TokenRejected(message)) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping log record, sink append failed");
                return;
            }
        };

        let Some(corrected) = extract_expected_token(&rejection) else {
            tracing::warn!(rejection = %rejection, "Dropping log record, no token in rejection");
            return;
        };

        match self
            .sink
            .put_records(&self.group, &self.stream, batch, Some(&corrected))
            .await
        {
            Ok(token) => {
                self.token = Some(token);
            }
            Err(SinkError::TokenRejected(message)) => {
                // Keep whatever the sink now expects so later records can land.
                self.token = extract_expected_token(&message);
                tracing::warn!(
                    rejection = %message,
                    "Dropping log record after retry, token rejected twice"
                );
            }
            Err(e) => {
                self.token = Some(corrected);
                tracing::warn!(error = %e, "Dropping log record, retry append failed");
            }
        }
    }

    /// Spawn the single worker task that serializes all emissions. The
    /// returned handle is clonable and non-blocking; the worker exits when
    /// every handle is dropped, yielding the shipper back for inspection.
    pub fn spawn(mut self, capacity: usize) -> (ShipperHandle, JoinHandle<Self>) {
        let (tx, mut rx) = mpsc::channel::<LogRecord>(capacity);

        let worker = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                self.emit(&record).await;
            }
            self
        });

        (ShipperHandle { tx }, worker)
    }
}

/// Clonable, non-blocking sender into the shipping worker.
#[derive(Debug, Clone)]
pub struct ShipperHandle {
    tx: mpsc::Sender<LogRecord>,
}

impl ShipperHandle {
    /// Queue a record for delivery. A full queue or stopped worker drops the
    /// record with a local diagnostic.
    pub fn ship(&self, record: LogRecord) {
        if let Err(e) = self.tx.try_send(record) {
            tracing::debug!(error = %e, "Dropping log record, shipping queue unavailable");
        }
    }
}

/// The logging pipeline handed to the orchestrator and process runner:
/// every line goes to local tracing, and to the remote shipper when one is
/// attached.
#[derive(Debug, Clone, Default)]
pub struct LogPipeline {
    handle: Option<ShipperHandle>,
}

impl LogPipeline {
    pub fn local_only() -> Self {
        Self { handle: None }
    }

    pub fn with_shipper(handle: ShipperHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    pub fn is_shipping(&self) -> bool {
        self.handle.is_some()
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.ship("INFO", message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.ship("ERROR", message);
    }

    fn ship(&self, level: &str, message: String) {
        if let Some(handle) = &self.handle {
            handle.ship(LogRecord::new(format!("{level} {message}")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_trailing_token() {
        let msg = "invalid sequence token, expected token is: tok-42";
        assert_eq!(extract_expected_token(msg), Some("tok-42".to_string()));
    }

    #[test]
    fn record_carries_millis_timestamp() {
        let record = LogRecord::new("hello");
        assert!(record.timestamp_ms > 0);
        assert_eq!(record.message, "hello");
    }
}
