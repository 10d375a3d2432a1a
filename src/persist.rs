//! The record-log boundary.
//!
//! Once a reviewer confirms (and possibly corrects) a document's fields,
//! the record is appended to an external log — a spreadsheet, a database
//! table, whatever the host application wires in. That integration lives
//! outside this crate; the pipeline only needs the append-a-row shape and
//! a success/failure signal back, captured by [`RecordLog`].
//!
//! [`MemoryLog`] ships for tests and for callers that only want the review
//! workflow without durable persistence.

use crate::pipeline::parse::FieldMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use thiserror::Error;

/// One confirmed document record, ready to append.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Identity of the reviewer who confirmed the record.
    pub user: String,
    /// The caller-supplied document type tag.
    pub document_type: String,
    /// The corrected field mapping, canonical labels.
    pub fields: FieldMap,
    /// Reviewer's correction annotations, if any (free-form JSON).
    pub corrections: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

/// Errors surfaced by a [`RecordLog`] implementation.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Failed to append record: {detail}")]
    Append { detail: String },
}

/// An append-only log of confirmed document records.
#[async_trait]
pub trait RecordLog: Send + Sync {
    async fn append(&self, entry: LogEntry) -> Result<(), LogError>;
}

/// In-memory [`RecordLog`] — the test double, and a reasonable default for
/// hosts that handle persistence elsewhere.
#[derive(Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().expect("memory log poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("memory log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordLog for MemoryLog {
    async fn append(&self, entry: LogEntry) -> Result<(), LogError> {
        self.entries.lock().expect("memory log poisoned").push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_log_appends_in_order() {
        let log = MemoryLog::new();
        for user in ["alice@example.com", "bob@example.com"] {
            log.append(LogEntry {
                user: user.to_string(),
                document_type: "passport".into(),
                fields: FieldMap::new(),
                corrections: None,
                recorded_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].user, "alice@example.com");
        assert_eq!(entries[1].user, "bob@example.com");
    }
}
