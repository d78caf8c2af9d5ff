//! Snapshot Store
//!
//! Cached folds of a stream. Snapshots are disposable: losing one, or
//! reading a stale one, only costs extra replay.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::EventStoreError;

/// Aggregate state folded up to `version`
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub version: i64,
    pub state: serde_json::Value,
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, EventStoreError>;

    /// Store a snapshot unless a newer one is already present.
    /// Returns whether the snapshot was written.
    async fn put(&self, snapshot: Snapshot) -> Result<bool, EventStoreError>;

    async fn delete(&self, aggregate_id: Uuid) -> Result<(), EventStoreError>;
}

/// Snapshot store kept in process memory
#[derive(Debug, Default, Clone)]
pub struct InMemorySnapshotStore {
    snapshots: Arc<RwLock<HashMap<Uuid, Snapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, EventStoreError> {
        Ok(self.snapshots.read().await.get(&aggregate_id).cloned())
    }

    async fn put(&self, snapshot: Snapshot) -> Result<bool, EventStoreError> {
        let mut snapshots = self.snapshots.write().await;
        match snapshots.get(&snapshot.aggregate_id) {
            Some(existing) if existing.version >= snapshot.version => Ok(false),
            _ => {
                snapshots.insert(snapshot.aggregate_id, snapshot);
                Ok(true)
            }
        }
    }

    async fn delete(&self, aggregate_id: Uuid) -> Result<(), EventStoreError> {
        self.snapshots.write().await.remove(&aggregate_id);
        Ok(())
    }
}

/// Snapshot store backed by the `event_snapshots` table
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn get(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, EventStoreError> {
        let row: Option<(String, i64, serde_json::Value)> = sqlx::query_as(
            r#"
            SELECT aggregate_type, version, state
            FROM event_snapshots
            WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(aggregate_type, version, state)| Snapshot {
            aggregate_id,
            aggregate_type,
            version,
            state,
        }))
    }

    async fn put(&self, snapshot: Snapshot) -> Result<bool, EventStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO event_snapshots (aggregate_id, aggregate_type, version, state)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (aggregate_id)
            DO UPDATE SET version = EXCLUDED.version, state = EXCLUDED.state, created_at = NOW()
            WHERE event_snapshots.version < EXCLUDED.version
            "#,
        )
        .bind(snapshot.aggregate_id)
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.version)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, aggregate_id: Uuid) -> Result<(), EventStoreError> {
        sqlx::query("DELETE FROM event_snapshots WHERE aggregate_id = $1")
            .bind(aggregate_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
