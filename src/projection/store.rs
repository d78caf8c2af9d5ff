//! Read-model store
//!
//! Views plus the per-aggregate projection position, committed together.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::views::{FamilyView, Membership, MembershipChange, PersonView};
use super::ProjectionError;

/// Everything one projected event writes
#[derive(Debug, Clone)]
pub struct ProjectionBatch {
    pub aggregate_id: Uuid,
    /// Position the batch was computed against
    pub expected_last_applied: i64,
    pub last_applied: i64,
    pub person: Option<PersonView>,
    pub family: Option<FamilyView>,
    pub membership_changes: Vec<MembershipChange>,
}

#[async_trait]
pub trait ReadModelStore: Send + Sync {
    /// Last projected sequence number of an aggregate (0 if none)
    async fn last_applied(&self, aggregate_id: Uuid) -> Result<i64, ProjectionError>;

    async fn get_person(&self, person_id: Uuid) -> Result<Option<PersonView>, ProjectionError>;

    async fn get_family(&self, family_id: Uuid) -> Result<Option<FamilyView>, ProjectionError>;

    async fn memberships(&self, person_id: Uuid) -> Result<Membership, ProjectionError>;

    /// Apply a batch if the position is still `expected_last_applied`,
    /// otherwise fail with [`ProjectionError::PositionMoved`].
    async fn commit(&self, batch: ProjectionBatch) -> Result<(), ProjectionError>;

    /// Active persons ordered by surname, given name and id
    async fn list_persons(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<PersonView>, u64), ProjectionError>;

    /// Active families ordered by id
    async fn list_families(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<FamilyView>, u64), ProjectionError>;

    /// Drop every view and position
    async fn clear(&self) -> Result<(), ProjectionError>;
}

/// Full contents of an in-memory read model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadModelState {
    pub persons: BTreeMap<Uuid, PersonView>,
    pub families: BTreeMap<Uuid, FamilyView>,
    pub memberships: BTreeMap<Uuid, Membership>,
    pub positions: BTreeMap<Uuid, i64>,
}

/// Read-model store kept in process memory
#[derive(Debug, Default, Clone)]
pub struct InMemoryReadModelStore {
    state: Arc<RwLock<ReadModelState>>,
}

impl InMemoryReadModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current contents
    pub async fn dump(&self) -> ReadModelState {
        self.state.read().await.clone()
    }
}

fn page<T: Clone>(items: Vec<&T>, offset: u64, limit: u64) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let page = items
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect();
    (page, total)
}

#[async_trait]
impl ReadModelStore for InMemoryReadModelStore {
    async fn last_applied(&self, aggregate_id: Uuid) -> Result<i64, ProjectionError> {
        Ok(self
            .state
            .read()
            .await
            .positions
            .get(&aggregate_id)
            .copied()
            .unwrap_or(0))
    }

    async fn get_person(&self, person_id: Uuid) -> Result<Option<PersonView>, ProjectionError> {
        Ok(self.state.read().await.persons.get(&person_id).cloned())
    }

    async fn get_family(&self, family_id: Uuid) -> Result<Option<FamilyView>, ProjectionError> {
        Ok(self.state.read().await.families.get(&family_id).cloned())
    }

    async fn memberships(&self, person_id: Uuid) -> Result<Membership, ProjectionError> {
        Ok(self
            .state
            .read()
            .await
            .memberships
            .get(&person_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn commit(&self, batch: ProjectionBatch) -> Result<(), ProjectionError> {
        let mut state = self.state.write().await;

        let actual = state.positions.get(&batch.aggregate_id).copied().unwrap_or(0);
        if actual != batch.expected_last_applied {
            return Err(ProjectionError::PositionMoved {
                aggregate_id: batch.aggregate_id,
                expected: batch.expected_last_applied,
                actual,
            });
        }

        if let Some(person) = batch.person {
            state.persons.insert(person.id, person);
        }
        if let Some(family) = batch.family {
            state.families.insert(family.id, family);
        }
        for change in &batch.membership_changes {
            let membership = state.memberships.entry(change.person_id).or_default();
            membership.apply(change);
            if membership.is_empty() {
                state.memberships.remove(&change.person_id);
            }
        }
        state.positions.insert(batch.aggregate_id, batch.last_applied);

        Ok(())
    }

    async fn list_persons(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<PersonView>, u64), ProjectionError> {
        let state = self.state.read().await;
        let mut persons: Vec<&PersonView> = state.persons.values().filter(|p| !p.deleted).collect();
        persons.sort_by(|a, b| {
            (&a.surname, &a.given_name, a.id).cmp(&(&b.surname, &b.given_name, b.id))
        });
        Ok(page(persons, offset, limit))
    }

    async fn list_families(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<FamilyView>, u64), ProjectionError> {
        let state = self.state.read().await;
        let families: Vec<&FamilyView> = state.families.values().filter(|f| !f.deleted).collect();
        Ok(page(families, offset, limit))
    }

    async fn clear(&self) -> Result<(), ProjectionError> {
        *self.state.write().await = ReadModelState::default();
        Ok(())
    }
}
