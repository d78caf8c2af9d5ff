//! Event Store Errors
//!
//! Error types for event store and snapshot store operations.

use uuid::Uuid;

/// Errors that can occur in the event store
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict
    #[error("Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        expected: i64,
        actual: i64,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored payload does not decode into the aggregate's event set
    #[error("Corrupt event {sequence_number} in stream {aggregate_id}: {reason}")]
    CorruptEvent {
        aggregate_id: Uuid,
        sequence_number: i64,
        reason: String,
    },

    /// Stream belongs to an aggregate type this build does not know
    #[error("Unknown aggregate type in event log: {0}")]
    UnknownAggregateType(String),

    /// Storage backend failure without a database error behind it
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl EventStoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EventStoreError::ConcurrencyConflict { .. } | EventStoreError::Database(_)
        )
    }

    /// Invariant violations in the log itself; never fixed by retrying
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EventStoreError::CorruptEvent { .. } | EventStoreError::UnknownAggregateType(_)
        )
    }
}
