//! Event Store module
//!
//! Persistence layer for Event Sourcing.
//! Every aggregate owns one append-only stream; sequence numbers start at 1
//! and have no gaps. Appends are guarded by an expected version.

mod error;
mod memory;
mod postgres;
mod snapshot;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::events::DomainEvent;
use crate::domain::OperationContext;

pub use error::EventStoreError;
pub use memory::InMemoryEventStore;
pub use postgres::PgEventStore;
pub use snapshot::{InMemorySnapshotStore, PgSnapshotStore, Snapshot, SnapshotStore};

/// Event as committed to a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub sequence_number: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
    pub caused_by: Option<OperationContext>,
}

impl StoredEvent {
    /// Decode the payload into the aggregate's event type
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E, EventStoreError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| EventStoreError::CorruptEvent {
            aggregate_id: self.aggregate_id,
            sequence_number: self.sequence_number,
            reason: e.to_string(),
        })
    }
}

/// Event waiting to be appended; the store assigns sequence and timestamp
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub caused_by: Option<OperationContext>,
}

impl NewEvent {
    /// Serialize a domain event for appending
    pub fn new<E>(event: &E, context: Option<&OperationContext>) -> Result<Self, EventStoreError>
    where
        E: DomainEvent + Serialize,
    {
        Ok(Self {
            event_type: event.event_type().to_string(),
            payload: serde_json::to_value(event)?,
            caused_by: context.cloned(),
        })
    }
}

/// Result of a successful append
#[derive(Debug, Clone)]
pub struct Appended {
    pub new_version: i64,
    pub events: Vec<StoredEvent>,
}

/// One stream in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub version: i64,
}

/// Append-only event log with optimistic concurrency per stream
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events if the stream is still at `expected_version`.
    ///
    /// Fails with [`EventStoreError::ConcurrencyConflict`] otherwise; nothing
    /// is written in that case.
    async fn append(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<NewEvent>,
    ) -> Result<Appended, EventStoreError>;

    /// Every event of a stream, in sequence order
    async fn load(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.load_from(aggregate_id, 0).await
    }

    /// Events with a sequence number strictly greater than `after_version`
    async fn load_from(
        &self,
        aggregate_id: Uuid,
        after_version: i64,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Highest sequence number of a stream (0 when it does not exist)
    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, EventStoreError>;

    /// Every non-empty stream
    async fn streams(&self) -> Result<Vec<StreamInfo>, EventStoreError>;
}
