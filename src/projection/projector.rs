//! Read Model Projector
//!
//! Applies committed events to the read models. Each aggregate is projected
//! strictly in sequence order; re-delivered events are skipped by comparing
//! against the stored position.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Family, Person};
use crate::domain::{FamilyEvent, PersonEvent};
use crate::event_store::{EventStore, EventStoreError, StoredEvent};

use super::store::{ProjectionBatch, ReadModelStore};
use super::views::{FamilyView, PersonView, ReferentialWarning};
use super::ProjectionError;

/// Bounded retries when a concurrent projector moves the position
const MAX_POSITION_RETRIES: u32 = 3;

/// Page size used when scanning families for referential checks
const SCAN_PAGE: u64 = 500;

/// What happened to a delivered event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    Applied,
    /// Already reflected in the read model
    Skipped,
}

/// Totals of a catch-up pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatchUpReport {
    pub streams_advanced: usize,
    pub events_applied: usize,
}

/// Result of a full rebuild
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RebuildReport {
    pub streams: usize,
    pub events_applied: usize,
    pub warnings: Vec<ReferentialWarning>,
}

/// Projects events from the event store into a read-model store
#[derive(Clone)]
pub struct Projector {
    events: Arc<dyn EventStore>,
    read_models: Arc<dyn ReadModelStore>,
}

impl Projector {
    pub fn new(events: Arc<dyn EventStore>, read_models: Arc<dyn ReadModelStore>) -> Self {
        Self { events, read_models }
    }

    pub fn read_models(&self) -> &Arc<dyn ReadModelStore> {
        &self.read_models
    }

    // =========================================================================
    // Incremental projection
    // =========================================================================

    /// Project one committed event.
    ///
    /// An event ahead of the stored position triggers a catch-up of its
    /// stream, which applies it along with the missing events.
    pub async fn project(&self, event: &StoredEvent) -> Result<ProjectionOutcome, ProjectionError> {
        for _ in 0..MAX_POSITION_RETRIES {
            let last_applied = self.read_models.last_applied(event.aggregate_id).await?;

            if event.sequence_number <= last_applied {
                tracing::debug!(
                    "Skipping {} #{} for {} (already at {})",
                    event.event_type,
                    event.sequence_number,
                    event.aggregate_id,
                    last_applied
                );
                return Ok(ProjectionOutcome::Skipped);
            }

            if event.sequence_number > last_applied + 1 {
                tracing::warn!(
                    "Projection gap for {}: at {}, received #{}; catching up",
                    event.aggregate_id,
                    last_applied,
                    event.sequence_number
                );
                self.catch_up_stream(event.aggregate_id).await?;
                return Ok(ProjectionOutcome::Applied);
            }

            match self.apply_one(event, last_applied).await {
                Ok(()) => return Ok(ProjectionOutcome::Applied),
                Err(ProjectionError::PositionMoved { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        // Lost every race; whoever won applied at least up to here
        Ok(ProjectionOutcome::Skipped)
    }

    /// Project a batch of events from one append
    pub async fn project_all(&self, events: &[StoredEvent]) -> Result<usize, ProjectionError> {
        let mut applied = 0;
        for event in events {
            if self.project(event).await? == ProjectionOutcome::Applied {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Bring one aggregate's views up to the head of its stream
    pub async fn catch_up_stream(&self, aggregate_id: Uuid) -> Result<usize, ProjectionError> {
        let mut applied = 0;

        for _ in 0..MAX_POSITION_RETRIES {
            let mut position = self.read_models.last_applied(aggregate_id).await?;
            let tail = self.events.load_from(aggregate_id, position).await?;

            let mut moved = false;
            for event in &tail {
                match self.apply_one(event, position).await {
                    Ok(()) => {
                        position = event.sequence_number;
                        applied += 1;
                    }
                    Err(ProjectionError::PositionMoved { .. }) => {
                        moved = true;
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }

            if !moved {
                break;
            }
        }

        Ok(applied)
    }

    /// Project the unprojected tail of every stream
    pub async fn catch_up(&self) -> Result<CatchUpReport, ProjectionError> {
        let mut report = CatchUpReport::default();

        for stream in self.events.streams().await? {
            let last_applied = self.read_models.last_applied(stream.aggregate_id).await?;
            if last_applied >= stream.version {
                continue;
            }
            let applied = self.catch_up_stream(stream.aggregate_id).await?;
            if applied > 0 {
                report.streams_advanced += 1;
                report.events_applied += applied;
            }
        }

        if report.events_applied > 0 {
            tracing::info!(
                "Projection catch-up applied {} events across {} streams",
                report.events_applied,
                report.streams_advanced
            );
        }
        Ok(report)
    }

    // =========================================================================
    // Full rebuild
    // =========================================================================

    /// Discard every read model and replay the whole event log
    pub async fn rebuild(&self) -> Result<RebuildReport, ProjectionError> {
        tracing::info!("Rebuilding read models from the event log");
        self.read_models.clear().await?;

        let mut report = RebuildReport::default();
        for stream in self.events.streams().await? {
            report.streams += 1;
            report.events_applied += self.catch_up_stream(stream.aggregate_id).await?;
        }

        report.warnings = self.referential_warnings().await?;
        for warning in &report.warnings {
            tracing::warn!("Referential warning: {}", warning);
        }

        tracing::info!(
            "Rebuild finished: {} streams, {} events, {} warnings",
            report.streams,
            report.events_applied,
            report.warnings.len()
        );
        Ok(report)
    }

    /// Family edges to persons that are missing or tombstoned
    pub async fn referential_warnings(&self) -> Result<Vec<ReferentialWarning>, ProjectionError> {
        let mut warnings = Vec::new();
        let mut offset = 0;

        loop {
            let (families, total) = self.read_models.list_families(offset, SCAN_PAGE).await?;
            for family in &families {
                for person_id in family.members() {
                    if let Some(reason) = self.dangling_reason(person_id).await? {
                        warnings.push(ReferentialWarning {
                            family_id: family.id,
                            person_id,
                            reason: reason.to_string(),
                        });
                    }
                }
            }
            offset += families.len() as u64;
            if families.is_empty() || offset >= total {
                break;
            }
        }

        Ok(warnings)
    }

    pub(crate) async fn dangling_reason(
        &self,
        person_id: Uuid,
    ) -> Result<Option<&'static str>, ProjectionError> {
        Ok(match self.read_models.get_person(person_id).await? {
            None => Some("person does not exist"),
            Some(person) if person.deleted => Some("person is deleted"),
            Some(_) => None,
        })
    }

    // =========================================================================
    // Event application
    // =========================================================================

    async fn apply_one(&self, event: &StoredEvent, last_applied: i64) -> Result<(), ProjectionError> {
        let mut batch = ProjectionBatch {
            aggregate_id: event.aggregate_id,
            expected_last_applied: last_applied,
            last_applied: event.sequence_number,
            person: None,
            family: None,
            membership_changes: Vec::new(),
        };

        match event.aggregate_type.as_str() {
            t if t == Person::aggregate_type() => {
                let decoded: PersonEvent = self.decode(event)?;
                let current = self.read_models.get_person(event.aggregate_id).await?;
                batch.person = PersonView::project(current, &decoded);
            }
            t if t == Family::aggregate_type() => {
                let decoded: FamilyEvent = self.decode(event)?;
                let current = self.read_models.get_family(event.aggregate_id).await?;
                let (family, changes) = FamilyView::project(current, &decoded);
                batch.family = family;
                batch.membership_changes = changes;
            }
            other => {
                tracing::error!(
                    "Event {} #{} belongs to unknown aggregate type {}",
                    event.aggregate_id,
                    event.sequence_number,
                    other
                );
                return Err(EventStoreError::UnknownAggregateType(other.to_string()).into());
            }
        }

        self.read_models.commit(batch).await?;

        tracing::debug!(
            "Projected {} #{} for {}",
            event.event_type,
            event.sequence_number,
            event.aggregate_id
        );
        Ok(())
    }

    fn decode<E: serde::de::DeserializeOwned>(&self, event: &StoredEvent) -> Result<E, ProjectionError> {
        event.decode().map_err(|e| {
            tracing::error!("Undecodable event in log: {}", e);
            ProjectionError::from(e)
        })
    }
}
