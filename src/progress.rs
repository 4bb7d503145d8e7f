use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

/// One progress record, keyed by a caller-supplied request id.
/// Consumed by a UI poller; not required for correctness.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressRecord {
    pub message: String,
    /// 0-100
    pub value: u8,
    pub timestamp: DateTime<Utc>,
}

/// Side channel for incremental progress reporting
pub trait ProgressSink: Send + Sync {
    fn report(&self, request_id: Uuid, message: &str, value: u8);
    fn snapshot(&self, request_id: Uuid) -> Option<ProgressRecord>;
    fn clear(&self, request_id: Uuid);
    /// Drop every record from previous runs
    fn clear_all(&self);
}

/// In-memory sink backing the default observability channel
#[derive(Default)]
pub struct InMemoryProgress {
    records: RwLock<HashMap<Uuid, ProgressRecord>>,
}

impl InMemoryProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for InMemoryProgress {
    fn report(&self, request_id: Uuid, message: &str, value: u8) {
        self.records.write().insert(
            request_id,
            ProgressRecord {
                message: message.to_string(),
                value: value.min(100),
                timestamp: Utc::now(),
            },
        );
    }

    fn snapshot(&self, request_id: Uuid) -> Option<ProgressRecord> {
        self.records.read().get(&request_id).cloned()
    }

    fn clear(&self, request_id: Uuid) {
        self.records.write().remove(&request_id);
    }

    fn clear_all(&self) {
        self.records.write().clear();
    }
}

/// Reports progress for one request id, or silently drops updates when the
/// caller did not ask for progress.
pub struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    request_id: Option<Uuid>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink, request_id: Option<Uuid>) -> Self {
        Self { sink, request_id }
    }

    pub fn update(&self, message: &str, value: u8) {
        if let Some(id) = self.request_id {
            self.sink.report(id, message, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_and_snapshot() {
        let sink = InMemoryProgress::new();
        let id = Uuid::new_v4();

        sink.report(id, "Syncing blockchain...", 10);
        let record = sink.snapshot(id).unwrap();
        assert_eq!(record.message, "Syncing blockchain...");
        assert_eq!(record.value, 10);

        sink.clear_all();
        assert!(sink.snapshot(id).is_none());
    }

    #[test]
    fn test_reporter_without_request_id_is_silent() {
        let sink = InMemoryProgress::new();
        let reporter = ProgressReporter::new(&sink, None);
        reporter.update("ignored", 50);
        // Nothing recorded anywhere
        assert!(sink.records.read().is_empty());
    }
}
