//! Application facade
//!
//! Wires the stores, handlers, projector and GEDCOM codec together and
//! exposes the command and query surface of the ledger.

use std::path::Path;
use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::aggregate::{Family, Person};
use crate::config::EngineSettings;
use crate::domain::{DomainError, OperationContext};
use crate::error::AppResult;
use crate::event_store::{
    EventStore, InMemoryEventStore, InMemorySnapshotStore, PgEventStore, PgSnapshotStore,
    SnapshotStore,
};
use crate::gedcom::{GedcomError, GedcomExporter, GedcomImporter, ImportJob, ImportResult};
use crate::handlers::{
    AddChildToFamilyCommand, AggregateRepository, CreateFamilyCommand, CreatePersonCommand,
    DeleteFamilyCommand, DeletePersonCommand, FamilyCommandHandler, PersonCommandHandler,
    RemoveChildCommand, UpdateFamilyCommand, UpdatePersonCommand,
};
use crate::projection::{
    CatchUpReport, FamilyView, InMemoryReadModelStore, Page, Pedigree, PersonView,
    PgReadModelStore, Projector, QueryService, ReadModelStore, RebuildReport,
};

/// The genealogy ledger: commands in, views out
#[derive(Clone)]
pub struct Genealogy {
    persons: PersonCommandHandler,
    families: FamilyCommandHandler,
    queries: QueryService,
    projector: Projector,
    importer: GedcomImporter,
    exporter: GedcomExporter,
}

impl Genealogy {
    pub fn new(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
        read_models: Arc<dyn ReadModelStore>,
        settings: EngineSettings,
    ) -> Self {
        let projector = Projector::new(events.clone(), read_models.clone());
        let person_repo = AggregateRepository::<Person>::new(
            events.clone(),
            snapshots.clone(),
            projector.clone(),
            settings.clone(),
        );
        let family_repo =
            AggregateRepository::<Family>::new(events, snapshots, projector.clone(), settings);

        let persons = PersonCommandHandler::new(person_repo.clone());
        let families = FamilyCommandHandler::new(family_repo, person_repo);

        Self {
            importer: GedcomImporter::new(persons.clone(), families.clone()),
            exporter: GedcomExporter::new(read_models.clone()),
            queries: QueryService::new(read_models),
            persons,
            families,
            projector,
        }
    }

    /// Everything in process memory
    pub fn in_memory(settings: EngineSettings) -> Self {
        Self::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemorySnapshotStore::new()),
            Arc::new(InMemoryReadModelStore::new()),
            settings,
        )
    }

    /// Everything in PostgreSQL
    pub fn postgres(pool: PgPool, settings: EngineSettings) -> Self {
        Self::new(
            Arc::new(PgEventStore::new(pool.clone())),
            Arc::new(PgSnapshotStore::new(pool.clone())),
            Arc::new(PgReadModelStore::new(pool)),
            settings,
        )
    }

    /// Projector driving the read models, for the background scheduler
    pub fn projector(&self) -> Projector {
        self.projector.clone()
    }

    // =========================================================================
    // Commands
    // =========================================================================

    pub async fn create_person(&self, command: CreatePersonCommand, context: &OperationContext) -> AppResult<Person> {
        self.persons.create(command, context).await
    }

    pub async fn update_person(&self, command: UpdatePersonCommand, context: &OperationContext) -> AppResult<Person> {
        self.persons.update(command, context).await
    }

    pub async fn delete_person(&self, command: DeletePersonCommand, context: &OperationContext) -> AppResult<Person> {
        self.persons.delete(command, context).await
    }

    pub async fn create_family(&self, command: CreateFamilyCommand, context: &OperationContext) -> AppResult<Family> {
        self.families.create(command, context).await
    }

    pub async fn update_family(&self, command: UpdateFamilyCommand, context: &OperationContext) -> AppResult<Family> {
        self.families.update(command, context).await
    }

    pub async fn delete_family(&self, command: DeleteFamilyCommand, context: &OperationContext) -> AppResult<Family> {
        self.families.delete(command, context).await
    }

    pub async fn add_child_to_family(
        &self,
        command: AddChildToFamilyCommand,
        context: &OperationContext,
    ) -> AppResult<Family> {
        self.families.add_child(command, context).await
    }

    pub async fn remove_child(&self, command: RemoveChildCommand, context: &OperationContext) -> AppResult<Family> {
        self.families.remove_child(command, context).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn list_persons(&self, offset: u64, limit: u64) -> AppResult<Page<PersonView>> {
        Ok(self.queries.list_persons(offset, limit).await?)
    }

    pub async fn list_families(&self, offset: u64, limit: u64) -> AppResult<Page<FamilyView>> {
        Ok(self.queries.list_families(offset, limit).await?)
    }

    pub async fn get_person(&self, person_id: Uuid) -> AppResult<PersonView> {
        self.queries
            .get_person(person_id)
            .await?
            .ok_or_else(|| DomainError::person_not_found(person_id).into())
    }

    pub async fn get_family(&self, family_id: Uuid) -> AppResult<FamilyView> {
        self.queries
            .get_family(family_id)
            .await?
            .ok_or_else(|| DomainError::family_not_found(family_id).into())
    }

    pub async fn pedigree(&self, root: Uuid, generations: u32) -> AppResult<Pedigree> {
        self.queries
            .pedigree(root, generations)
            .await?
            .ok_or_else(|| DomainError::person_not_found(root).into())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drop and rebuild every read model from the event log
    pub async fn rebuild_read_models(&self) -> AppResult<RebuildReport> {
        Ok(self.projector.rebuild().await?)
    }

    /// Project whatever the read models have not seen yet
    pub async fn catch_up(&self) -> AppResult<CatchUpReport> {
        Ok(self.projector.catch_up().await?)
    }

    // =========================================================================
    // GEDCOM
    // =========================================================================

    pub async fn import_gedcom(&self, text: &str, context: &OperationContext) -> AppResult<ImportResult> {
        self.importer.import(text, context).await
    }

    /// Import through a caller-held job so an interrupted run can be resumed
    pub async fn import_gedcom_with_job(
        &self,
        text: &str,
        job: &mut ImportJob,
        context: &OperationContext,
    ) -> AppResult<ImportResult> {
        self.importer.resume(text, job, context).await
    }

    pub async fn export_gedcom(&self) -> AppResult<String> {
        self.projector.catch_up().await?;
        Ok(self.exporter.export().await?)
    }

    pub async fn import_gedcom_file(&self, path: &Path, context: &OperationContext) -> AppResult<ImportResult> {
        let text = tokio::fs::read_to_string(path).await.map_err(GedcomError::from)?;
        tracing::info!("Importing GEDCOM file {}", path.display());
        self.import_gedcom(&text, context).await
    }

    pub async fn export_gedcom_file(&self, path: &Path) -> AppResult<()> {
        let text = self.export_gedcom().await?;
        tokio::fs::write(path, text).await.map_err(GedcomError::from)?;
        tracing::info!("Exported GEDCOM file {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_missing_views_are_not_found() {
        let app = Genealogy::in_memory(EngineSettings::default());
        let id = Uuid::new_v4();

        assert_eq!(app.get_person(id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(app.get_family(id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(app.pedigree(id, 3).await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_deleted_person_disappears_from_queries() {
        let app = Genealogy::in_memory(EngineSettings::default());
        let ctx = OperationContext::new();
        let person = app
            .create_person(CreatePersonCommand::new().with_name("Ada", "Lovelace"), &ctx)
            .await
            .unwrap();
        assert_eq!(app.list_persons(0, 10).await.unwrap().total, 1);

        app.delete_person(DeletePersonCommand::new(person.id()), &ctx)
            .await
            .unwrap();

        assert!(app.get_person(person.id()).await.unwrap_err().is_not_found());
        assert_eq!(app.list_persons(0, 10).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_missing_import_file_is_storage_failure() {
        let app = Genealogy::in_memory(EngineSettings::default());

        let err = app
            .import_gedcom_file(Path::new("/nonexistent/tree.ged"), &OperationContext::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StorageFailure);
    }
}
