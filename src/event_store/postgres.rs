//! PostgreSQL event store
//!
//! The version check runs inside a transaction; the unique
//! `(aggregate_id, version)` key catches writers that raced past it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::OperationContext;

use super::{Appended, EventStore, EventStoreError, NewEvent, StoredEvent, StreamInfo};

type EventRow = (
    Uuid,
    String,
    Uuid,
    i64,
    String,
    serde_json::Value,
    Option<serde_json::Value>,
    DateTime<Utc>,
);

fn stored_event(row: EventRow) -> Result<StoredEvent, EventStoreError> {
    let (id, aggregate_type, aggregate_id, version, event_type, event_data, context, created_at) = row;
    let caused_by: Option<OperationContext> = context.map(serde_json::from_value).transpose()?;
    Ok(StoredEvent {
        id,
        aggregate_type,
        aggregate_id,
        sequence_number: version,
        event_type,
        payload: event_data,
        recorded_at: created_at,
        caused_by,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

/// Event store backed by the `events` table
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Create a new event store with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Single attempt; the caller maps a unique violation to a conflict
    async fn try_append(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[NewEvent],
    ) -> Result<Appended, EventStoreError> {
        let mut tx = self.pool.begin().await?;

        let current_version = Self::version_in(&mut tx, aggregate_id).await?;
        if current_version != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        let mut stored = Vec::with_capacity(events.len());
        for (idx, event) in events.iter().enumerate() {
            let version = expected_version + idx as i64 + 1;
            let context = event.caused_by.as_ref().map(serde_json::to_value).transpose()?;

            let (id, created_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
                r#"
                INSERT INTO events (
                    aggregate_type, aggregate_id, version,
                    event_type, event_data, context
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, created_at
                "#,
            )
            .bind(aggregate_type)
            .bind(aggregate_id)
            .bind(version)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(context)
            .fetch_one(&mut *tx)
            .await?;

            stored.push(StoredEvent {
                id,
                aggregate_type: aggregate_type.to_string(),
                aggregate_id,
                sequence_number: version,
                event_type: event.event_type.clone(),
                payload: event.payload.clone(),
                recorded_at: created_at,
                caused_by: event.caused_by.clone(),
            });
        }

        tx.commit().await?;

        Ok(Appended {
            new_version: expected_version + stored.len() as i64,
            events: stored,
        })
    }

    async fn version_in(
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: Uuid,
    ) -> Result<i64, EventStoreError> {
        let result: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(version) FROM events WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id)
        .fetch_optional(&mut **tx)
        .await?
        .flatten();

        Ok(result.unwrap_or(0))
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<NewEvent>,
    ) -> Result<Appended, EventStoreError> {
        match self
            .try_append(aggregate_type, aggregate_id, expected_version, &events)
            .await
        {
            Err(EventStoreError::Database(e)) if is_unique_violation(&e) => {
                let actual = self.current_version(aggregate_id).await?;
                tracing::debug!(
                    "Unique violation on stream {} at version {}, reporting conflict",
                    aggregate_id,
                    expected_version + 1
                );
                Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected: expected_version,
                    actual,
                })
            }
            other => other,
        }
    }

    async fn load_from(
        &self,
        aggregate_id: Uuid,
        after_version: i64,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, aggregate_type, aggregate_id, version, event_type, event_data, context, created_at
            FROM events
            WHERE aggregate_id = $1 AND version > $2
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id)
        .bind(after_version)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(stored_event)
        .collect()
    }

    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, EventStoreError> {
        let result: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(version) FROM events WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(result.unwrap_or(0))
    }

    async fn streams(&self) -> Result<Vec<StreamInfo>, EventStoreError> {
        let rows: Vec<(Uuid, String, i64)> = sqlx::query_as(
            r#"
            SELECT aggregate_id, MIN(aggregate_type), MAX(version)
            FROM events
            GROUP BY aggregate_id
            ORDER BY MIN(created_at), aggregate_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(aggregate_id, aggregate_type, version)| StreamInfo {
                aggregate_id,
                aggregate_type,
                version,
            })
            .collect())
    }
}
