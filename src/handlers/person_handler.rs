//! Person Command Handler

use uuid::Uuid;

use crate::aggregate::{Aggregate, Person, PersonCommand};
use crate::domain::OperationContext;
use crate::error::AppResult;

use super::repository::AggregateRepository;
use super::{CreatePersonCommand, DeletePersonCommand, UpdatePersonCommand};

/// Handler for person commands
#[derive(Clone)]
pub struct PersonCommandHandler {
    persons: AggregateRepository<Person>,
}

impl PersonCommandHandler {
    pub fn new(persons: AggregateRepository<Person>) -> Self {
        Self { persons }
    }

    pub async fn create(&self, command: CreatePersonCommand, context: &OperationContext) -> AppResult<Person> {
        let person_id = command.person_id;
        let committed = self
            .persons
            .execute(
                person_id,
                &PersonCommand::Create(command),
                &context.for_command("CreatePerson"),
            )
            .await?;

        tracing::info!("Person created: {}", person_id);
        Ok(committed.aggregate)
    }

    pub async fn update(&self, command: UpdatePersonCommand, context: &OperationContext) -> AppResult<Person> {
        let person_id = command.person_id;
        let committed = self
            .persons
            .execute(
                person_id,
                &PersonCommand::Update(command),
                &context.for_command("UpdatePerson"),
            )
            .await?;

        tracing::debug!(
            "Person {} updated to version {}",
            person_id,
            committed.aggregate.version()
        );
        Ok(committed.aggregate)
    }

    pub async fn delete(&self, command: DeletePersonCommand, context: &OperationContext) -> AppResult<Person> {
        let person_id = command.person_id;
        let committed = self
            .persons
            .execute(
                person_id,
                &PersonCommand::Delete(command),
                &context.for_command("DeletePerson"),
            )
            .await?;

        tracing::info!("Person deleted: {}", person_id);
        Ok(committed.aggregate)
    }

    /// Current state straight from the event log
    pub async fn load(&self, person_id: Uuid) -> AppResult<Person> {
        self.persons.load(person_id).await
    }
}
