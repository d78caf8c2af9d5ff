//! Query Service
//!
//! Read side over the projected views. Results are eventually consistent
//! with the event log.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::store::ReadModelStore;
use super::views::{FamilyView, Page, PersonView, ReferentialWarning};
use super::ProjectionError;

/// A person in a pedigree with its parent edges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PedigreeEntry {
    pub person: PersonView,
    /// 0 for the root, 1 for parents, 2 for grandparents, ...
    pub generation: u32,
    pub parents: Vec<Uuid>,
}

/// Ancestors of a root person plus the root's children
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pedigree {
    pub root: Uuid,
    /// Breadth-first from the root
    pub ancestors: Vec<PedigreeEntry>,
    pub children: Vec<PersonView>,
    pub warnings: Vec<ReferentialWarning>,
}

#[derive(Clone)]
pub struct QueryService {
    read_models: Arc<dyn ReadModelStore>,
}

impl QueryService {
    pub fn new(read_models: Arc<dyn ReadModelStore>) -> Self {
        Self { read_models }
    }

    pub async fn list_persons(&self, offset: u64, limit: u64) -> Result<Page<PersonView>, ProjectionError> {
        let (items, total) = self.read_models.list_persons(offset, limit).await?;
        Ok(Page { items, total, offset, limit })
    }

    pub async fn list_families(&self, offset: u64, limit: u64) -> Result<Page<FamilyView>, ProjectionError> {
        let (items, total) = self.read_models.list_families(offset, limit).await?;
        Ok(Page { items, total, offset, limit })
    }

    /// Active person by id
    pub async fn get_person(&self, person_id: Uuid) -> Result<Option<PersonView>, ProjectionError> {
        Ok(self
            .read_models
            .get_person(person_id)
            .await?
            .filter(|p| !p.deleted))
    }

    /// Active family by id
    pub async fn get_family(&self, family_id: Uuid) -> Result<Option<FamilyView>, ProjectionError> {
        Ok(self
            .read_models
            .get_family(family_id)
            .await?
            .filter(|f| !f.deleted))
    }

    /// Parents of a person through the active families it is a child of
    async fn parent_edges(
        &self,
        person_id: Uuid,
        warnings: &mut Vec<ReferentialWarning>,
    ) -> Result<Vec<(Uuid, PersonView)>, ProjectionError> {
        let membership = self.read_models.memberships(person_id).await?;
        let mut parents = Vec::new();

        for family_id in membership.as_child {
            let Some(family) = self.get_family(family_id).await? else {
                continue;
            };
            for partner in family.partners {
                match self.read_models.get_person(partner).await? {
                    Some(person) if !person.deleted => parents.push((partner, person)),
                    found => warnings.push(ReferentialWarning {
                        family_id,
                        person_id: partner,
                        reason: if found.is_some() { "person is deleted" } else { "person does not exist" }
                            .to_string(),
                    }),
                }
            }
        }

        Ok(parents)
    }

    /// Ancestors up to `generations` above the root, plus the root's children.
    ///
    /// Returns `None` when the root is missing or deleted.
    pub async fn pedigree(&self, root: Uuid, generations: u32) -> Result<Option<Pedigree>, ProjectionError> {
        let Some(root_person) = self.get_person(root).await? else {
            return Ok(None);
        };

        let mut warnings = Vec::new();
        let mut ancestors = Vec::new();
        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([(root_person, 0u32)]);

        while let Some((person, generation)) = queue.pop_front() {
            let parents = if generation < generations {
                self.parent_edges(person.id, &mut warnings).await?
            } else {
                Vec::new()
            };

            let parent_ids = parents.iter().map(|(id, _)| *id).collect();
            for (id, parent) in parents {
                // pedigree collapse: a shared ancestor is listed once
                if seen.insert(id) {
                    queue.push_back((parent, generation + 1));
                }
            }

            ancestors.push(PedigreeEntry {
                person,
                generation,
                parents: parent_ids,
            });
        }

        let mut children = Vec::new();
        let mut seen_children = HashSet::new();
        for family_id in self.read_models.memberships(root).await?.as_partner {
            let Some(family) = self.get_family(family_id).await? else {
                continue;
            };
            for child in family.children {
                if !seen_children.insert(child) {
                    continue;
                }
                match self.read_models.get_person(child).await? {
                    Some(person) if !person.deleted => children.push(person),
                    found => warnings.push(ReferentialWarning {
                        family_id,
                        person_id: child,
                        reason: if found.is_some() { "person is deleted" } else { "person does not exist" }
                            .to_string(),
                    }),
                }
            }
        }

        Ok(Some(Pedigree {
            root,
            ancestors,
            children,
            warnings,
        }))
    }
}
