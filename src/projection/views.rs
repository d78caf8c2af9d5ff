//! Read-model views
//!
//! Denormalized rows derived from events. Every view is a pure fold of
//! its aggregate's events, so a rebuild reproduces it exactly.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::events::DomainEvent;
use crate::domain::{DateValue, FamilyEvent, PersonEvent, RelationshipType, Sex};

/// One row per person, tombstones included
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonView {
    pub id: Uuid,
    pub given_name: Option<String>,
    pub surname: Option<String>,
    pub sex: Sex,
    pub birth_date: Option<DateValue>,
    pub birth_place: Option<String>,
    pub death_date: Option<DateValue>,
    pub death_place: Option<String>,
    pub living: bool,
    pub deleted: bool,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl PersonView {
    /// Fold one event onto the current row (`None` before creation)
    pub fn project(current: Option<PersonView>, event: &PersonEvent) -> Option<PersonView> {
        match event {
            PersonEvent::PersonCreated {
                person_id,
                given_name,
                surname,
                sex,
                birth_date,
                birth_place,
                death_date,
                death_place,
                living,
                created_at,
            } => Some(PersonView {
                id: *person_id,
                given_name: given_name.clone(),
                surname: surname.clone(),
                sex: *sex,
                birth_date: birth_date.clone(),
                birth_place: birth_place.clone(),
                death_date: death_date.clone(),
                death_place: death_place.clone(),
                living: *living,
                deleted: false,
                version: 1,
                updated_at: *created_at,
            }),

            PersonEvent::PersonDetailsUpdated { changes, updated_at, .. } => current.map(|mut view| {
                if let Some(v) = &changes.given_name {
                    view.given_name = Some(v.clone());
                }
                if let Some(v) = &changes.surname {
                    view.surname = Some(v.clone());
                }
                if let Some(v) = changes.sex {
                    view.sex = v;
                }
                if let Some(v) = &changes.birth_date {
                    view.birth_date = Some(v.clone());
                }
                if let Some(v) = &changes.birth_place {
                    view.birth_place = Some(v.clone());
                }
                if let Some(v) = &changes.death_date {
                    view.death_date = Some(v.clone());
                }
                if let Some(v) = &changes.death_place {
                    view.death_place = Some(v.clone());
                }
                if let Some(v) = changes.living {
                    view.living = v;
                }
                view.version += 1;
                view.updated_at = *updated_at;
                view
            }),

            PersonEvent::PersonDeleted { deleted_at, .. } => current.map(|mut view| {
                view.deleted = true;
                view.version += 1;
                view.updated_at = *deleted_at;
                view
            }),
        }
    }

    /// "Given Surname", skipping absent parts
    pub fn display_name(&self) -> String {
        [self.given_name.as_deref(), self.surname.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One row per family, tombstones included
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyView {
    pub id: Uuid,
    pub relationship: RelationshipType,
    pub marriage_date: Option<DateValue>,
    pub marriage_place: Option<String>,
    pub partners: Vec<Uuid>,
    pub children: Vec<Uuid>,
    pub deleted: bool,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl FamilyView {
    /// Fold one event onto the current row and report the membership
    /// edges it adds or removes.
    pub fn project(
        current: Option<FamilyView>,
        event: &FamilyEvent,
    ) -> (Option<FamilyView>, Vec<MembershipChange>) {
        let before = current.as_ref().map(FamilyView::edges).unwrap_or_default();

        let next = match event {
            FamilyEvent::FamilyCreated {
                family_id,
                relationship,
                marriage_date,
                marriage_place,
                partners,
                children,
                created_at,
            } => Some(FamilyView {
                id: *family_id,
                relationship: *relationship,
                marriage_date: marriage_date.clone(),
                marriage_place: marriage_place.clone(),
                partners: partners.clone(),
                children: children.clone(),
                deleted: false,
                version: 1,
                updated_at: *created_at,
            }),

            FamilyEvent::FamilyDetailsUpdated { changes, updated_at, .. } => current.map(|mut view| {
                if let Some(v) = changes.relationship {
                    view.relationship = v;
                }
                if let Some(v) = &changes.marriage_date {
                    view.marriage_date = Some(v.clone());
                }
                if let Some(v) = &changes.marriage_place {
                    view.marriage_place = Some(v.clone());
                }
                if let Some(v) = &changes.partners {
                    view.partners = v.clone();
                }
                view.touch(*updated_at)
            }),

            FamilyEvent::ChildAdded { child_id, added_at, .. } => current.map(|mut view| {
                if !view.children.contains(child_id) {
                    view.children.push(*child_id);
                }
                view.touch(*added_at)
            }),

            FamilyEvent::ChildRemoved { child_id, removed_at, .. } => current.map(|mut view| {
                view.children.retain(|c| c != child_id);
                view.touch(*removed_at)
            }),

            FamilyEvent::FamilyDeleted { deleted_at, .. } => current.map(|mut view| {
                view.deleted = true;
                view.touch(*deleted_at)
            }),
        };

        let after = next.as_ref().map(FamilyView::edges).unwrap_or_default();
        let family_id = event.aggregate_id();

        let changes = before
            .difference(&after)
            .map(|(person_id, role)| MembershipChange {
                person_id: *person_id,
                family_id,
                role: *role,
                present: false,
            })
            .chain(after.difference(&before).map(|(person_id, role)| MembershipChange {
                person_id: *person_id,
                family_id,
                role: *role,
                present: true,
            }))
            .collect();

        (next, changes)
    }

    fn touch(mut self, at: DateTime<Utc>) -> Self {
        self.version += 1;
        self.updated_at = at;
        self
    }

    /// Membership edges this family contributes; tombstones contribute none
    fn edges(&self) -> BTreeSet<(Uuid, MembershipRole)> {
        if self.deleted {
            return BTreeSet::new();
        }
        self.partners
            .iter()
            .map(|p| (*p, MembershipRole::Partner))
            .chain(self.children.iter().map(|c| (*c, MembershipRole::Child)))
            .collect()
    }

    /// Partners followed by children
    pub fn members(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.partners.iter().chain(self.children.iter()).copied()
    }
}

/// Role a person plays in a family
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipRole {
    Partner,
    Child,
}

impl MembershipRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipRole::Partner => "partner",
            MembershipRole::Child => "child",
        }
    }
}

/// Edge delta produced by a family event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    pub person_id: Uuid,
    pub family_id: Uuid,
    pub role: MembershipRole,
    /// `true` adds the edge, `false` removes it
    pub present: bool,
}

/// Inverse index: the families a person belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub as_partner: BTreeSet<Uuid>,
    pub as_child: BTreeSet<Uuid>,
}

impl Membership {
    pub fn is_empty(&self) -> bool {
        self.as_partner.is_empty() && self.as_child.is_empty()
    }

    pub fn apply(&mut self, change: &MembershipChange) {
        let set = match change.role {
            MembershipRole::Partner => &mut self.as_partner,
            MembershipRole::Child => &mut self.as_child,
        };
        if change.present {
            set.insert(change.family_id);
        } else {
            set.remove(&change.family_id);
        }
    }
}

/// A family edge pointing at a person that is missing or tombstoned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferentialWarning {
    pub family_id: Uuid,
    pub person_id: Uuid,
    pub reason: String,
}

impl fmt::Display for ReferentialWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "family {} references person {}: {}", self.family_id, self.person_id, self.reason)
    }
}

/// Page of query results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}
