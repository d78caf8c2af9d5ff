//! Family Command Handler
//!
//! Family commands reference persons by id. Those references are checked
//! against the persons' own streams before the family aggregate decides.

use uuid::Uuid;

use crate::aggregate::{Aggregate, Family, FamilyCommand, Person};
use crate::domain::{DomainError, OperationContext};
use crate::error::AppResult;

use super::repository::AggregateRepository;
use super::{
    AddChildToFamilyCommand, CreateFamilyCommand, DeleteFamilyCommand, RemoveChildCommand,
    UpdateFamilyCommand,
};

/// Handler for family commands
#[derive(Clone)]
pub struct FamilyCommandHandler {
    families: AggregateRepository<Family>,
    persons: AggregateRepository<Person>,
}

impl FamilyCommandHandler {
    pub fn new(families: AggregateRepository<Family>, persons: AggregateRepository<Person>) -> Self {
        Self { families, persons }
    }

    /// Every id must name a person that exists and is not deleted
    async fn ensure_active_persons<I>(&self, person_ids: I) -> AppResult<()>
    where
        I: IntoIterator<Item = Uuid>,
    {
        for person_id in person_ids {
            if !self.persons.load(person_id).await?.is_active() {
                return Err(DomainError::person_not_found(person_id).into());
            }
        }
        Ok(())
    }

    async fn run(&self, family_id: Uuid, command: FamilyCommand, context: &OperationContext, name: &str) -> AppResult<Family> {
        let committed = self
            .families
            .execute(family_id, &command, &context.for_command(name))
            .await?;
        Ok(committed.aggregate)
    }

    pub async fn create(&self, command: CreateFamilyCommand, context: &OperationContext) -> AppResult<Family> {
        self.ensure_active_persons(command.members()).await?;

        let family_id = command.family_id;
        let family = self
            .run(family_id, FamilyCommand::Create(command), context, "CreateFamily")
            .await?;

        tracing::info!(
            "Family created: {} ({} partners, {} children)",
            family_id,
            family.partners().len(),
            family.children().len()
        );
        Ok(family)
    }

    pub async fn update(&self, command: UpdateFamilyCommand, context: &OperationContext) -> AppResult<Family> {
        if let Some(partners) = &command.partners {
            self.ensure_active_persons(partners.iter().copied()).await?;
        }

        let family_id = command.family_id;
        self.run(family_id, FamilyCommand::Update(command), context, "UpdateFamily")
            .await
    }

    pub async fn delete(&self, command: DeleteFamilyCommand, context: &OperationContext) -> AppResult<Family> {
        let family_id = command.family_id;
        let family = self
            .run(family_id, FamilyCommand::Delete(command), context, "DeleteFamily")
            .await?;

        tracing::info!("Family deleted: {}", family_id);
        Ok(family)
    }

    pub async fn add_child(&self, command: AddChildToFamilyCommand, context: &OperationContext) -> AppResult<Family> {
        self.ensure_active_persons([command.child_id]).await?;

        let family_id = command.family_id;
        self.run(family_id, FamilyCommand::AddChild(command), context, "AddChildToFamily")
            .await
    }

    /// The child must exist; a deleted child can still be detached
    pub async fn remove_child(&self, command: RemoveChildCommand, context: &OperationContext) -> AppResult<Family> {
        if !self.persons.load(command.child_id).await?.exists() {
            return Err(DomainError::person_not_found(command.child_id).into());
        }

        let family_id = command.family_id;
        self.run(family_id, FamilyCommand::RemoveChild(command), context, "RemoveChild")
            .await
    }

    /// Current state straight from the event log
    pub async fn load(&self, family_id: Uuid) -> AppResult<Family> {
        self.families.load(family_id).await
    }
}
