//! Aggregate Repository
//!
//! Load (snapshot + tail replay), decide, append with optimistic concurrency,
//! snapshot on cadence, then project. Shared by every command handler.

use std::marker::PhantomData;
use std::sync::Arc;

use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::config::EngineSettings;
use crate::domain::{DomainError, OperationContext};
use crate::error::{AppError, AppResult};
use crate::event_store::{
    EventStore, EventStoreError, NewEvent, Snapshot, SnapshotStore, StoredEvent,
};
use crate::projection::Projector;

/// Aggregate state after a successful command
#[derive(Debug, Clone)]
pub struct Committed<A> {
    pub aggregate: A,
    pub events: Vec<StoredEvent>,
}

/// Event-sourced repository for one aggregate type
pub struct AggregateRepository<A> {
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    projector: Projector,
    settings: EngineSettings,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> Clone for AggregateRepository<A> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            snapshots: self.snapshots.clone(),
            projector: self.projector.clone(),
            settings: self.settings.clone(),
            _aggregate: PhantomData,
        }
    }
}

impl<A: Aggregate> AggregateRepository<A> {
    pub fn new(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
        projector: Projector,
        settings: EngineSettings,
    ) -> Self {
        Self {
            events,
            snapshots,
            projector,
            settings,
            _aggregate: PhantomData,
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Current state; a never-created aggregate loads as the default state.
    ///
    /// An id whose stream belongs to another aggregate type is `NotFound`.
    pub async fn load(&self, aggregate_id: Uuid) -> AppResult<A> {
        let mut initial = self.load_snapshot(aggregate_id).await?;
        let from_version = initial.as_ref().map(|a| a.version()).unwrap_or(0);

        let mut tail = self.events.load_from(aggregate_id, from_version).await?;
        if tail.is_empty() && from_version > 0 {
            let head = self.events.current_version(aggregate_id).await?;
            if head < from_version {
                tracing::warn!(
                    "Discarding snapshot of {} {}: version {} is ahead of the log at {}",
                    A::aggregate_type(),
                    aggregate_id,
                    from_version,
                    head
                );
                self.snapshots.delete(aggregate_id).await?;
                initial = None;
                tail = self.events.load(aggregate_id).await?;
            }
        }

        if let Some(stored) = tail.iter().find(|e| e.aggregate_type != A::aggregate_type()) {
            tracing::debug!(
                "{} is a {} stream, not {}",
                aggregate_id,
                stored.aggregate_type,
                A::aggregate_type()
            );
            return Err(DomainError::NotFound {
                aggregate_type: A::aggregate_type(),
                id: aggregate_id,
            }
            .into());
        }

        let mut aggregate = initial.unwrap_or_default();
        for stored in &tail {
            let event: A::Event = stored.decode().map_err(|e| {
                tracing::error!("Cannot replay {} {}: {}", A::aggregate_type(), aggregate_id, e);
                e
            })?;
            aggregate = aggregate.apply(event);
        }

        Ok(aggregate)
    }

    /// Usable snapshot, or `None` to replay from the start
    async fn load_snapshot(&self, aggregate_id: Uuid) -> Result<Option<A>, EventStoreError> {
        let Some(snapshot) = self.snapshots.get(aggregate_id).await? else {
            return Ok(None);
        };

        if snapshot.aggregate_type != A::aggregate_type() {
            tracing::warn!(
                "Discarding snapshot of {}: stored as {}, loading as {}",
                aggregate_id,
                snapshot.aggregate_type,
                A::aggregate_type()
            );
            return Ok(None);
        }

        match serde_json::from_value::<A>(snapshot.state) {
            Ok(state) if state.version() == snapshot.version => Ok(Some(state)),
            Ok(state) => {
                tracing::warn!(
                    "Discarding snapshot of {}: version {} does not match state version {}",
                    aggregate_id,
                    snapshot.version,
                    state.version()
                );
                self.snapshots.delete(aggregate_id).await?;
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(
                    "Discarding undecodable snapshot of {} {}: {}",
                    A::aggregate_type(),
                    aggregate_id,
                    e
                );
                self.snapshots.delete(aggregate_id).await?;
                Ok(None)
            }
        }
    }

    // =========================================================================
    // Command execution
    // =========================================================================

    /// Run a command with bounded retries on concurrency conflicts
    pub async fn execute(
        &self,
        aggregate_id: Uuid,
        command: &A::Command,
        context: &OperationContext,
    ) -> AppResult<Committed<A>> {
        let attempts = self.settings.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.try_execute(aggregate_id, command, context).await {
                Err(AppError::EventStore(EventStoreError::ConcurrencyConflict {
                    expected,
                    actual,
                    ..
                })) if attempt < attempts => {
                    tracing::warn!(
                        "Concurrency conflict on {} {} (expected {}, found {}), retrying (attempt {}/{})",
                        A::aggregate_type(),
                        aggregate_id,
                        expected,
                        actual,
                        attempt,
                        attempts
                    );
                    tokio::time::sleep(self.settings.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }

    /// Single load-decide-append cycle
    async fn try_execute(
        &self,
        aggregate_id: Uuid,
        command: &A::Command,
        context: &OperationContext,
    ) -> AppResult<Committed<A>> {
        let aggregate = self.load(aggregate_id).await?;
        let expected_version = aggregate.version();

        let events = aggregate.decide(command)?;
        let new_events = events
            .iter()
            .map(|e| NewEvent::new(e, Some(context)))
            .collect::<Result<Vec<_>, _>>()?;

        let appended = self
            .events
            .append(A::aggregate_type(), aggregate_id, expected_version, new_events)
            .await?;

        let aggregate = aggregate.replay(events);

        self.snapshot_if_due(&aggregate, expected_version).await;

        if let Err(e) = self.projector.project_all(&appended.events).await {
            tracing::warn!(
                "Projection of {} {} deferred to catch-up: {}",
                A::aggregate_type(),
                aggregate_id,
                e
            );
        }

        Ok(Committed {
            aggregate,
            events: appended.events,
        })
    }

    /// Snapshot when the append crossed a multiple of the interval
    async fn snapshot_if_due(&self, aggregate: &A, previous_version: i64) {
        let interval = self.settings.snapshot_interval.max(1);
        if aggregate.version() / interval == previous_version / interval {
            return;
        }

        let state = match serde_json::to_value(aggregate) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Cannot serialize snapshot of {}: {}", aggregate.id(), e);
                return;
            }
        };

        let snapshot = Snapshot {
            aggregate_id: aggregate.id(),
            aggregate_type: A::aggregate_type().to_string(),
            version: aggregate.version(),
            state,
        };

        match self.snapshots.put(snapshot).await {
            Ok(_) => tracing::info!(
                "Snapshot saved for {} aggregate {} at version {}",
                A::aggregate_type(),
                aggregate.id(),
                aggregate.version()
            ),
            Err(e) => tracing::warn!("Snapshot of {} not saved: {}", aggregate.id(), e),
        }
    }
}
