//! Fire-and-forget append-only record sinks.
//!
//! Routing decisions, audit entries, and alert history are best-effort:
//! a `write` call never blocks the turn and never propagates an error
//! into the caller. Records flow through a bounded queue to a writer
//! task that appends JSON lines; a full queue or a failing disk costs a
//! warning, nothing more.

use std::path::PathBuf;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Queue capacity before records are dropped (with a warning).
const QUEUE_CAPACITY: usize = 256;

/// Contract for all persistence in the core: append one record,
/// never throw into the caller.
pub trait RecordSink: Send + Sync {
    fn write(&self, record: Value);
}

/// Sink that discards everything (tests, disabled persistence).
pub struct NullSink;

impl RecordSink for NullSink {
    fn write(&self, _record: Value) {}
}

/// JSONL file sink backed by a bounded work queue.
pub struct JsonlSink {
    name: &'static str,
    tx: mpsc::Sender<Value>,
}

impl JsonlSink {
    /// Spawn the writer task. The file is created on first write; IO
    /// errors are logged and swallowed.
    pub fn spawn(name: &'static str, path: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::channel::<Value>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(e) = append_line(&path, &record).await {
                    tracing::warn!(sink = %path.display(), error = %e, "record write failed");
                }
            }
        });

        Self { name, tx }
    }
}

impl RecordSink for JsonlSink {
    fn write(&self, record: Value) {
        if let Err(e) = self.tx.try_send(record) {
            tracing::warn!(sink = self.name, error = %e, "record dropped (queue full or closed)");
        }
    }
}

async fn append_line(path: &PathBuf, record: &Value) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let mut line = record.to_string();
    line.push('\n');
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}
