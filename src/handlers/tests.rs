//! Handler tests against the in-memory stores

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Family, Person};
use crate::config::EngineSettings;
use crate::domain::{DateKind, DomainError, OperationContext};
use crate::error::{AppError, ErrorKind};
use crate::event_store::{
    Appended, EventStore, EventStoreError, InMemoryEventStore, InMemorySnapshotStore, NewEvent,
    Snapshot, SnapshotStore, StoredEvent, StreamInfo,
};
use crate::handlers::{
    AddChildToFamilyCommand, AggregateRepository, CreateFamilyCommand, CreatePersonCommand,
    FamilyCommandHandler, PersonCommandHandler, RemoveChildCommand, UpdatePersonCommand,
};
use crate::projection::{InMemoryReadModelStore, Projector, ReadModelStore};

struct Harness {
    events: Arc<InMemoryEventStore>,
    snapshots: Arc<InMemorySnapshotStore>,
    read_models: Arc<InMemoryReadModelStore>,
    persons: PersonCommandHandler,
    families: FamilyCommandHandler,
}

fn harness(settings: EngineSettings) -> Harness {
    let events = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let read_models = Arc::new(InMemoryReadModelStore::new());
    let projector = Projector::new(events.clone(), read_models.clone());

    let person_repo = AggregateRepository::<Person>::new(
        events.clone(),
        snapshots.clone(),
        projector.clone(),
        settings.clone(),
    );
    let family_repo =
        AggregateRepository::<Family>::new(events.clone(), snapshots.clone(), projector, settings);

    Harness {
        events,
        snapshots,
        read_models,
        persons: PersonCommandHandler::new(person_repo.clone()),
        families: FamilyCommandHandler::new(family_repo, person_repo),
    }
}

fn fast_settings() -> EngineSettings {
    EngineSettings {
        retry_backoff: Duration::from_millis(1),
        ..EngineSettings::default()
    }
}

// =========================================================================
// Person commands
// =========================================================================

#[tokio::test]
async fn test_ada_lovelace_scenario() {
    let h = harness(fast_settings());
    let ctx = OperationContext::new();

    let ada = h
        .persons
        .create(CreatePersonCommand::new().with_name("Ada", "Lovelace").with_sex("F"), &ctx)
        .await
        .unwrap();
    let log = h.events.load(ada.id()).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].event_type, "PersonCreated");
    assert_eq!(log[0].sequence_number, 1);

    h.persons
        .update(UpdatePersonCommand::new(ada.id()).with_death_date("27 NOV 1852"), &ctx)
        .await
        .unwrap();
    let log = h.events.load(ada.id()).await.unwrap();
    assert_eq!(log[1].event_type, "PersonDetailsUpdated");
    assert_eq!(log[1].sequence_number, 2);

    let replayed = h.persons.load(ada.id()).await.unwrap();
    assert_eq!(replayed.given_name(), Some("Ada"));
    let death = replayed.death_date().unwrap();
    assert_eq!(death.kind(), DateKind::Exact);
    assert_eq!(death.exact_date(), NaiveDate::from_ymd_opt(1852, 11, 27));
    assert!(!replayed.is_living());
}

#[tokio::test]
async fn test_events_record_their_cause() {
    let h = harness(fast_settings());
    let ctx = OperationContext::new().with_source("gedcom-import");

    let person = h.persons.create(CreatePersonCommand::new(), &ctx).await.unwrap();

    let log = h.events.load(person.id()).await.unwrap();
    let caused_by = log[0].caused_by.as_ref().unwrap();
    assert_eq!(caused_by.source.as_deref(), Some("gedcom-import"));
    assert_eq!(caused_by.command.as_deref(), Some("CreatePerson"));
}

#[tokio::test]
async fn test_commands_are_projected_synchronously() {
    let h = harness(fast_settings());
    let person = h
        .persons
        .create(CreatePersonCommand::new().with_name("Ada", "Lovelace"), &OperationContext::new())
        .await
        .unwrap();

    let view = h.read_models.get_person(person.id()).await.unwrap().unwrap();
    assert_eq!(view.surname.as_deref(), Some("Lovelace"));
    assert_eq!(h.read_models.last_applied(person.id()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_sex_appends_nothing() {
    let h = harness(fast_settings());
    let command = CreatePersonCommand::new().with_sex("X");
    let id = command.person_id;

    let err = h.persons.create(command, &OperationContext::new()).await.unwrap_err();

    assert!(matches!(err, AppError::Domain(DomainError::InvalidEnumeration { field: "sex", .. })));
    assert_eq!(h.events.current_version(id).await.unwrap(), 0);
}

// =========================================================================
// Family commands
// =========================================================================

#[tokio::test]
async fn test_add_unknown_child_is_not_found() {
    let h = harness(fast_settings());
    let ctx = OperationContext::new();
    let family = h.families.create(CreateFamilyCommand::new(), &ctx).await.unwrap();
    let unknown = Uuid::new_v4();

    let err = h
        .families
        .add_child(AddChildToFamilyCommand::new(family.id(), unknown), &ctx)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(h.events.current_version(family.id()).await.unwrap(), 1);
    assert!(h.events.load(unknown).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_family_rejects_deleted_partner() {
    let h = harness(fast_settings());
    let ctx = OperationContext::new();
    let person = h.persons.create(CreatePersonCommand::new(), &ctx).await.unwrap();
    h.persons
        .delete(crate::handlers::DeletePersonCommand::new(person.id()), &ctx)
        .await
        .unwrap();

    let command = CreateFamilyCommand::new().with_partners(vec![person.id()]);
    let family_id = command.family_id;
    let err = h.families.create(command, &ctx).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(h.events.current_version(family_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_add_and_remove_child_updates_memberships() {
    let h = harness(fast_settings());
    let ctx = OperationContext::new();
    let parent = h.persons.create(CreatePersonCommand::new(), &ctx).await.unwrap();
    let child = h.persons.create(CreatePersonCommand::new(), &ctx).await.unwrap();
    let family = h
        .families
        .create(CreateFamilyCommand::new().with_partners(vec![parent.id()]), &ctx)
        .await
        .unwrap();

    h.families
        .add_child(AddChildToFamilyCommand::new(family.id(), child.id()), &ctx)
        .await
        .unwrap();
    let membership = h.read_models.memberships(child.id()).await.unwrap();
    assert!(membership.as_child.contains(&family.id()));

    let family = h
        .families
        .remove_child(RemoveChildCommand::new(family.id(), child.id()), &ctx)
        .await
        .unwrap();
    assert!(family.children().is_empty());
    assert!(h.read_models.memberships(child.id()).await.unwrap().is_empty());
}

// =========================================================================
// Snapshots
// =========================================================================

#[tokio::test]
async fn test_snapshot_written_when_interval_crossed() {
    let h = harness(EngineSettings {
        snapshot_interval: 2,
        ..fast_settings()
    });
    let ctx = OperationContext::new();
    let person = h.persons.create(CreatePersonCommand::new(), &ctx).await.unwrap();
    assert!(h.snapshots.get(person.id()).await.unwrap().is_none());

    for name in ["A", "B", "C", "D", "E"] {
        h.persons
            .update(UpdatePersonCommand::new(person.id()).with_given_name(name), &ctx)
            .await
            .unwrap();
    }

    let snapshot = h.snapshots.get(person.id()).await.unwrap().unwrap();
    assert_eq!(snapshot.version, 6);

    let from_snapshot = h.persons.load(person.id()).await.unwrap();
    let full: Person = Person::default().replay(
        h.events
            .load(person.id())
            .await
            .unwrap()
            .iter()
            .map(|e| e.decode().unwrap()),
    );
    assert_eq!(from_snapshot, full);
    assert_eq!(from_snapshot.given_name(), Some("E"));
}

#[tokio::test]
async fn test_undecodable_snapshot_falls_back_to_replay() {
    let h = harness(fast_settings());
    let ctx = OperationContext::new();
    let person = h
        .persons
        .create(CreatePersonCommand::new().with_name("Ada", "Lovelace"), &ctx)
        .await
        .unwrap();
    h.snapshots
        .put(Snapshot {
            aggregate_id: person.id(),
            aggregate_type: "Person".to_string(),
            version: 1,
            state: serde_json::json!({ "garbage": true }),
        })
        .await
        .unwrap();

    let loaded = h.persons.load(person.id()).await.unwrap();

    assert_eq!(loaded, person);
    assert!(h.snapshots.get(person.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_snapshot_ahead_of_log_is_discarded() {
    let h = harness(fast_settings());
    let ctx = OperationContext::new();
    let person = h
        .persons
        .create(CreatePersonCommand::new().with_name("Ada", "Lovelace"), &ctx)
        .await
        .unwrap();

    // state that no event in the log produced
    let mut state = serde_json::to_value(&person).unwrap();
    state["given_name"] = serde_json::json!("X");
    state["version"] = serde_json::json!(2);
    h.snapshots
        .put(Snapshot {
            aggregate_id: person.id(),
            aggregate_type: "Person".to_string(),
            version: 2,
            state,
        })
        .await
        .unwrap();

    let loaded = h.persons.load(person.id()).await.unwrap();
    assert_eq!(loaded, person);
    assert!(h.snapshots.get(person.id()).await.unwrap().is_none());

    let updated = h
        .persons
        .update(UpdatePersonCommand::new(person.id()).with_given_name("Y"), &ctx)
        .await
        .unwrap();
    assert_eq!(updated.version(), 2);
    assert_eq!(updated.given_name(), Some("Y"));
}

// =========================================================================
// Aggregate type mismatch
// =========================================================================

#[tokio::test]
async fn test_family_id_used_as_person_is_not_found() {
    let h = harness(fast_settings());
    let ctx = OperationContext::new();
    let family = h.families.create(CreateFamilyCommand::new(), &ctx).await.unwrap();

    let err = h
        .families
        .add_child(AddChildToFamilyCommand::new(family.id(), family.id()), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = h
        .persons
        .update(UpdatePersonCommand::new(family.id()).with_given_name("Ada"), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.events.current_version(family.id()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_person_id_used_as_family_is_not_found() {
    let h = harness(fast_settings());
    let ctx = OperationContext::new();
    let person = h.persons.create(CreatePersonCommand::new(), &ctx).await.unwrap();
    let child = h.persons.create(CreatePersonCommand::new(), &ctx).await.unwrap();

    let err = h
        .families
        .add_child(AddChildToFamilyCommand::new(person.id(), child.id()), &ctx)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(matches!(
        err,
        AppError::Domain(DomainError::NotFound { aggregate_type: "Family", id }) if id == person.id()
    ));
    assert_eq!(h.events.current_version(person.id()).await.unwrap(), 1);
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test]
async fn test_concurrent_updates_retry_and_both_commit() {
    let h = harness(fast_settings());
    let ctx = OperationContext::new();
    let person = h.persons.create(CreatePersonCommand::new(), &ctx).await.unwrap();

    let (a, b) = tokio::join!(
        h.persons.update(UpdatePersonCommand::new(person.id()).with_given_name("A"), &ctx),
        h.persons.update(UpdatePersonCommand::new(person.id()).with_sex("M"), &ctx),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(h.events.current_version(person.id()).await.unwrap(), 3);
}

/// Event store whose appends always lose the race
struct AlwaysConflicting {
    inner: InMemoryEventStore,
    attempts: AtomicU32,
}

#[async_trait]
impl EventStore for AlwaysConflicting {
    async fn append(
        &self,
        _aggregate_type: &str,
        aggregate_id: Uuid,
        expected_version: i64,
        _events: Vec<NewEvent>,
    ) -> Result<Appended, EventStoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(EventStoreError::ConcurrencyConflict {
            aggregate_id,
            expected: expected_version,
            actual: expected_version + 1,
        })
    }

    async fn load_from(&self, aggregate_id: Uuid, after: i64) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_from(aggregate_id, after).await
    }

    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, EventStoreError> {
        self.inner.current_version(aggregate_id).await
    }

    async fn streams(&self) -> Result<Vec<StreamInfo>, EventStoreError> {
        self.inner.streams().await
    }
}

#[tokio::test]
async fn test_conflict_surfaces_after_retry_bound() {
    let events = Arc::new(AlwaysConflicting {
        inner: InMemoryEventStore::new(),
        attempts: AtomicU32::new(0),
    });
    let projector = Projector::new(events.clone(), Arc::new(InMemoryReadModelStore::new()));
    let repo = AggregateRepository::<Person>::new(
        events.clone(),
        Arc::new(InMemorySnapshotStore::new()),
        projector,
        fast_settings(),
    );
    let handler = PersonCommandHandler::new(repo);

    let err = handler
        .create(CreatePersonCommand::new(), &OperationContext::new())
        .await
        .unwrap_err();

    assert!(err.is_concurrency_conflict());
    assert_eq!(events.attempts.load(Ordering::SeqCst), 3);
}
