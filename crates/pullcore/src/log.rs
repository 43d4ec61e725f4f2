use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

pub type RunId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Error,
}

/// Per-node line of a run summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummaryItem {
    pub component_id: String,
    pub outcome: Option<String>,
    pub result: Value,
    pub return_value: Option<Value>,
    pub execution_environment: Value,
    pub execution_time_in_seconds: f64,
}

/// Snapshot of one top-level run, written once after it succeeds or fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub run_id: RunId,
    pub title: String,
    pub severity: LogSeverity,
    pub message: String,
    pub summary: Vec<ExecutionSummaryItem>,
    pub return_value: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Destination for execution log entries.
pub trait ExecutionLogSink: Send + Sync {
    fn append(&self, entry: ExecutionLogEntry);
}

/// Broadcasts entries to any number of subscribers.
pub struct LogBus {
    sender: broadcast::Sender<ExecutionLogEntry>,
}

impl LogBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionLogEntry> {
        self.sender.subscribe()
    }
}

impl ExecutionLogSink for LogBus {
    fn append(&self, entry: ExecutionLogEntry) {
        // No subscribers is not an error.
        let _ = self.sender.send(entry);
    }
}

/// Keeps every entry in memory.
#[derive(Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<ExecutionLogEntry>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ExecutionLogEntry> {
        self.entries.lock().clone()
    }

    pub fn count(&self, severity: LogSeverity) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }
}

impl ExecutionLogSink for MemoryLogSink {
    fn append(&self, entry: ExecutionLogEntry) {
        self.entries.lock().push(entry);
    }
}

pub struct NoopLogSink;

impl ExecutionLogSink for NoopLogSink {
    fn append(&self, _entry: ExecutionLogEntry) {}
}
