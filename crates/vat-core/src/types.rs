//! ============================================================================
//! Core Types for the Vat memory store
//! ============================================================================
//! Records persisted per chunk, the output shape handed back to callers,
//! and the error taxonomy shared by every operation.
//! ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Name of the single collection holding every memory
pub const COLLECTION_NAME: &str = "memory_vectors";

/// Length of every stored embedding
pub const EMBEDDING_DIM: usize = 768;

/// Payload format for `MemoryEntry::timestamp`, always UTC.
/// Fixed width, so lexicographic order equals chronological order. Local
/// wall-clock time would repeat an hour when daylight saving ends.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// What callers get back from `retrieve` and `recent`, and what is stored
/// as the payload of every point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Chunk text
    pub content: String,
    /// Creation time in UTC, ISO-8601 without offset
    pub timestamp: String,
    /// Caller-supplied metadata, shared by all chunks of one `record` call
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl MemoryEntry {
    /// Stamp a new entry with the current UTC time
    pub fn now(content: String, metadata: Map<String, Value>) -> Self {
        Self::at(chrono::Utc::now(), content, metadata)
    }

    pub(crate) fn at(
        when: chrono::DateTime<chrono::Utc>,
        content: String,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            content,
            timestamp: when.naive_utc().format(TIMESTAMP_FORMAT).to_string(),
            metadata,
        }
    }
}

/// The unit persisted per chunk. Immutable once upserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: u64,
    pub vector: Vec<f32>,
    pub entry: MemoryEntry,
}

/// One similarity search hit, best first
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub entry: MemoryEntry,
    pub score: f32,
}

/// One point returned by a bounded scroll
#[derive(Debug, Clone, PartialEq)]
pub struct ScrolledPoint {
    /// Present only when the scroll asked for vectors
    pub vector: Option<Vec<f32>>,
    pub entry: MemoryEntry,
}

/// Distance metric of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cosine,
}

/// Task intent passed to the embedding model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingIntent {
    Document,
    Query,
}

impl EmbeddingIntent {
    /// Wire name understood by the embedding API
    pub fn task_type(&self) -> &'static str {
        match self {
            EmbeddingIntent::Document => "RETRIEVAL_DOCUMENT",
            EmbeddingIntent::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Result of a successful `record` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub status: String,
    /// Ids of the stored chunks, in chunk order
    pub ids: Vec<u64>,
}

/// Collection statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub collection: String,
    pub points_count: u64,
    /// Human description of the backing engine
    pub store: String,
}

/// Error types for memory operations
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("No memories found to visualize")]
    EmptyResult,

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Visualization failed: {0}")]
    Visualization(String),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = MemoryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_sort_chronologically() {
        let early = chrono::NaiveDate::from_ymd_opt(2024, 1, 9)
            .unwrap()
            .and_hms_micro_opt(9, 5, 3, 7)
            .unwrap();
        let late = chrono::NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_micro_opt(10, 0, 0, 0)
            .unwrap();

        let a = early.format(TIMESTAMP_FORMAT).to_string();
        let b = late.format(TIMESTAMP_FORMAT).to_string();
        assert_eq!(a, "2024-01-09T09:05:03.000007");
        assert!(a < b);
    }

    #[test]
    fn test_stamps_are_utc_across_dst_fall_back() {
        // 2024-11-03 01:30 happens twice in America/New_York; in UTC these
        // are 05:30 and 06:30
        let first = chrono::DateTime::parse_from_rfc3339("2024-11-03T01:30:00-04:00").unwrap();
        let second = chrono::DateTime::parse_from_rfc3339("2024-11-03T01:15:00-05:00").unwrap();
        assert!(first < second);

        let a = MemoryEntry::at(first.with_timezone(&chrono::Utc), "a".into(), Map::new());
        let b = MemoryEntry::at(second.with_timezone(&chrono::Utc), "b".into(), Map::new());
        assert_eq!(a.timestamp, "2024-11-03T05:30:00.000000");
        assert_eq!(b.timestamp, "2024-11-03T06:15:00.000000");
        assert!(a.timestamp < b.timestamp);
    }

    #[test]
    fn test_now_stamps_current_utc() {
        let before = chrono::Utc::now().naive_utc();
        let entry = MemoryEntry::now("x".into(), Map::new());
        let after = chrono::Utc::now().naive_utc();

        let stamped =
            chrono::NaiveDateTime::parse_from_str(&entry.timestamp, TIMESTAMP_FORMAT).unwrap();
        assert!(before <= stamped && stamped <= after);
    }

    #[test]
    fn test_entry_metadata_defaults_to_empty() {
        let entry: MemoryEntry =
            serde_json::from_str(r#"{"content":"x","timestamp":"2024-01-01T00:00:00.000000"}"#)
                .unwrap();
        assert!(entry.metadata.is_empty());
    }

    #[test]
    fn test_intent_task_types() {
        assert_eq!(EmbeddingIntent::Document.task_type(), "RETRIEVAL_DOCUMENT");
        assert_eq!(EmbeddingIntent::Query.task_type(), "RETRIEVAL_QUERY");
    }
}
