//! Family Aggregate
//!
//! A union of up to two partners with an ordered list of children.
//! The family owns every membership edge; persons are referenced by ID only.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{DateValue, DomainError, FamilyChanges, FamilyEvent, RelationshipType};
use crate::handlers::{
    AddChildToFamilyCommand, CreateFamilyCommand, DeleteFamilyCommand, RemoveChildCommand,
    UpdateFamilyCommand,
};

use super::{clean_text, Aggregate, RecordStatus};

const MAX_PARTNERS: usize = 2;

/// Commands handled by the Family aggregate
#[derive(Debug, Clone)]
pub enum FamilyCommand {
    Create(CreateFamilyCommand),
    Update(UpdateFamilyCommand),
    Delete(DeleteFamilyCommand),
    AddChild(AddChildToFamilyCommand),
    RemoveChild(RemoveChildCommand),
}

/// Family Aggregate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Family {
    id: Uuid,
    relationship: RelationshipType,
    marriage_date: Option<DateValue>,
    marriage_place: Option<String>,
    partners: Vec<Uuid>,
    children: Vec<Uuid>,
    status: RecordStatus,
    version: i64,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

/// Membership rules shared by create and update
fn validate_members(partners: &[Uuid], children: &[Uuid]) -> Result<(), DomainError> {
    if partners.len() > MAX_PARTNERS {
        return Err(DomainError::TooManyPartners(partners.len()));
    }

    let mut seen_partners = HashSet::new();
    for partner in partners {
        if !seen_partners.insert(*partner) {
            return Err(DomainError::DuplicatePartner(*partner));
        }
    }

    let mut seen_children = HashSet::new();
    for child in children {
        if !seen_children.insert(*child) {
            return Err(DomainError::DuplicateChild(*child));
        }
        if seen_partners.contains(child) {
            return Err(DomainError::PartnerIsChild(*child));
        }
    }

    Ok(())
}

fn parse_relationship(value: Option<&str>) -> Result<Option<RelationshipType>, DomainError> {
    value.map(str::parse::<RelationshipType>).transpose()
}

impl Family {
    fn decide_create(&self, command: &CreateFamilyCommand) -> Result<FamilyEvent, DomainError> {
        if self.exists() {
            return Err(DomainError::AlreadyExists {
                aggregate_type: "Family",
                id: self.id,
            });
        }

        validate_members(&command.partners, &command.children)?;

        let marriage_date = clean_text(command.marriage_date.as_deref()).map(|d| DateValue::parse(&d));
        let marriage_place = clean_text(command.marriage_place.as_deref());
        let relationship = match parse_relationship(command.relationship.as_deref())? {
            Some(relationship) => relationship,
            None if marriage_date.is_some() || marriage_place.is_some() => RelationshipType::Marriage,
            None => RelationshipType::Unknown,
        };

        Ok(FamilyEvent::FamilyCreated {
            family_id: command.family_id,
            relationship,
            marriage_date,
            marriage_place,
            partners: command.partners.clone(),
            children: command.children.clone(),
            created_at: Utc::now(),
        })
    }

    fn decide_update(&self, command: &UpdateFamilyCommand) -> Result<FamilyEvent, DomainError> {
        self.ensure_active(command.family_id)?;

        if let Some(partners) = &command.partners {
            validate_members(partners, &self.children)?;
        }

        let changes = FamilyChanges {
            relationship: parse_relationship(command.relationship.as_deref())?,
            marriage_date: clean_text(command.marriage_date.as_deref()).map(|d| DateValue::parse(&d)),
            marriage_place: clean_text(command.marriage_place.as_deref()),
            partners: command.partners.clone(),
        };

        if changes.is_empty() {
            return Err(DomainError::NoChanges);
        }

        Ok(FamilyEvent::FamilyDetailsUpdated {
            family_id: self.id,
            changes,
            updated_at: Utc::now(),
        })
    }

    fn decide_add_child(&self, command: &AddChildToFamilyCommand) -> Result<FamilyEvent, DomainError> {
        self.ensure_active(command.family_id)?;

        if self.children.contains(&command.child_id) {
            return Err(DomainError::DuplicateChild(command.child_id));
        }
        if self.partners.contains(&command.child_id) {
            return Err(DomainError::PartnerIsChild(command.child_id));
        }

        Ok(FamilyEvent::ChildAdded {
            family_id: self.id,
            child_id: command.child_id,
            added_at: Utc::now(),
        })
    }

    fn decide_remove_child(&self, command: &RemoveChildCommand) -> Result<FamilyEvent, DomainError> {
        self.ensure_active(command.family_id)?;

        if !self.children.contains(&command.child_id) {
            return Err(DomainError::NotAChild(command.child_id));
        }

        Ok(FamilyEvent::ChildRemoved {
            family_id: self.id,
            child_id: command.child_id,
            removed_at: Utc::now(),
        })
    }

    fn decide_delete(&self, command: &DeleteFamilyCommand) -> Result<FamilyEvent, DomainError> {
        self.ensure_active(command.family_id)?;

        Ok(FamilyEvent::FamilyDeleted {
            family_id: self.id,
            reason: clean_text(command.reason.as_deref()),
            deleted_at: Utc::now(),
        })
    }

    fn ensure_active(&self, family_id: Uuid) -> Result<(), DomainError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DomainError::family_not_found(family_id))
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn relationship(&self) -> RelationshipType {
        self.relationship
    }

    pub fn marriage_date(&self) -> Option<&DateValue> {
        self.marriage_date.as_ref()
    }

    pub fn marriage_place(&self) -> Option<&str> {
        self.marriage_place.as_deref()
    }

    pub fn partners(&self) -> &[Uuid] {
        &self.partners
    }

    pub fn children(&self) -> &[Uuid] {
        &self.children
    }

    /// Partners followed by children
    pub fn members(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.partners.iter().chain(self.children.iter()).copied()
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl Aggregate for Family {
    type Event = FamilyEvent;
    type Command = FamilyCommand;

    fn aggregate_type() -> &'static str {
        "Family"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn is_deleted(&self) -> bool {
        self.status == RecordStatus::Deleted
    }

    fn decide(&self, command: &FamilyCommand) -> Result<Vec<FamilyEvent>, DomainError> {
        let event = match command {
            FamilyCommand::Create(create) => self.decide_create(create)?,
            FamilyCommand::Update(update) => self.decide_update(update)?,
            FamilyCommand::Delete(delete) => self.decide_delete(delete)?,
            FamilyCommand::AddChild(add) => self.decide_add_child(add)?,
            FamilyCommand::RemoveChild(remove) => self.decide_remove_child(remove)?,
        };
        Ok(vec![event])
    }

    fn apply(mut self, event: FamilyEvent) -> Self {
        match event {
            FamilyEvent::FamilyCreated {
                family_id,
                relationship,
                marriage_date,
                marriage_place,
                partners,
                children,
                created_at,
            } => {
                self.id = family_id;
                self.relationship = relationship;
                self.marriage_date = marriage_date;
                self.marriage_place = marriage_place;
                self.partners = partners;
                self.children = children;
                self.status = RecordStatus::Active;
                self.created_at = Some(created_at);
                self.updated_at = Some(created_at);
            }

            FamilyEvent::FamilyDetailsUpdated { changes, updated_at, .. } => {
                if let Some(relationship) = changes.relationship {
                    self.relationship = relationship;
                }
                if changes.marriage_date.is_some() {
                    self.marriage_date = changes.marriage_date;
                }
                if changes.marriage_place.is_some() {
                    self.marriage_place = changes.marriage_place;
                }
                if let Some(partners) = changes.partners {
                    self.partners = partners;
                }
                self.updated_at = Some(updated_at);
            }

            FamilyEvent::ChildAdded { child_id, added_at, .. } => {
                self.children.push(child_id);
                self.updated_at = Some(added_at);
            }

            FamilyEvent::ChildRemoved { child_id, removed_at, .. } => {
                self.children.retain(|c| *c != child_id);
                self.updated_at = Some(removed_at);
            }

            FamilyEvent::FamilyDeleted { deleted_at, .. } => {
                self.status = RecordStatus::Deleted;
                self.updated_at = Some(deleted_at);
            }
        }

        self.version += 1;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(command: CreateFamilyCommand) -> Family {
        let events = Family::default()
            .decide(&FamilyCommand::Create(command))
            .unwrap();
        Family::default().replay(events)
    }

    #[test]
    fn test_family_create() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let family = created(
            CreateFamilyCommand::new()
                .with_partners(vec![a, b])
                .with_children(vec![c])
                .with_marriage(Some("12 JUN 1835".to_string()), Some("London".to_string())),
        );

        assert_eq!(family.partners(), &[a, b]);
        assert_eq!(family.children(), &[c]);
        assert_eq!(family.relationship(), RelationshipType::Marriage);
        assert_eq!(family.marriage_place(), Some("London"));
        assert_eq!(family.version(), 1);
        assert_eq!(family.members().count(), 3);
    }

    #[test]
    fn test_relationship_defaults_to_unknown() {
        let family = created(CreateFamilyCommand::new());
        assert_eq!(family.relationship(), RelationshipType::Unknown);
    }

    #[test]
    fn test_invalid_relationship_is_rejected() {
        let result = Family::default().decide(&FamilyCommand::Create(
            CreateFamilyCommand::new().with_relationship("alliance"),
        ));
        assert!(matches!(
            result,
            Err(DomainError::InvalidEnumeration { field: "relationship_type", .. })
        ));
    }

    #[test]
    fn test_partner_cannot_be_child() {
        let a = Uuid::new_v4();
        let result = Family::default().decide(&FamilyCommand::Create(
            CreateFamilyCommand::new()
                .with_partners(vec![a])
                .with_children(vec![a]),
        ));
        assert_eq!(result, Err(DomainError::PartnerIsChild(a)));
    }

    #[test]
    fn test_at_most_two_partners() {
        let result = Family::default().decide(&FamilyCommand::Create(
            CreateFamilyCommand::new().with_partners(vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()]),
        ));
        assert_eq!(result, Err(DomainError::TooManyPartners(3)));
    }

    #[test]
    fn test_duplicate_members_rejected() {
        let a = Uuid::new_v4();
        let partners = Family::default().decide(&FamilyCommand::Create(
            CreateFamilyCommand::new().with_partners(vec![a, a]),
        ));
        assert_eq!(partners, Err(DomainError::DuplicatePartner(a)));

        let children = Family::default().decide(&FamilyCommand::Create(
            CreateFamilyCommand::new().with_children(vec![a, a]),
        ));
        assert_eq!(children, Err(DomainError::DuplicateChild(a)));
    }

    #[test]
    fn test_add_and_remove_child_keeps_order() {
        let family = created(CreateFamilyCommand::new());
        let (c1, c2, c3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let mut family = family;
        for child in [c1, c2, c3] {
            let events = family
                .decide(&FamilyCommand::AddChild(AddChildToFamilyCommand::new(family.id(), child)))
                .unwrap();
            family = family.replay(events);
        }
        assert_eq!(family.children(), &[c1, c2, c3]);

        let events = family
            .decide(&FamilyCommand::RemoveChild(RemoveChildCommand::new(family.id(), c2)))
            .unwrap();
        let family = family.replay(events);
        assert_eq!(family.children(), &[c1, c3]);
        assert_eq!(family.version(), 5);

        let again = family.decide(&FamilyCommand::RemoveChild(RemoveChildCommand::new(family.id(), c2)));
        assert_eq!(again, Err(DomainError::NotAChild(c2)));
        let duplicate = family.decide(&FamilyCommand::AddChild(AddChildToFamilyCommand::new(family.id(), c1)));
        assert_eq!(duplicate, Err(DomainError::DuplicateChild(c1)));
    }

    #[test]
    fn test_update_partners_checked_against_children() {
        let child = Uuid::new_v4();
        let family = created(CreateFamilyCommand::new().with_children(vec![child]));

        let result = family.decide(&FamilyCommand::Update(
            UpdateFamilyCommand::new(family.id()).with_partners(vec![child]),
        ));
        assert_eq!(result, Err(DomainError::PartnerIsChild(child)));
    }

    #[test]
    fn test_update_relationship() {
        let family = created(CreateFamilyCommand::new());
        let events = family
            .decide(&FamilyCommand::Update(
                UpdateFamilyCommand::new(family.id()).with_relationship("Partnership"),
            ))
            .unwrap();
        let family = family.replay(events);
        assert_eq!(family.relationship(), RelationshipType::Partnership);
    }

    #[test]
    fn test_deleted_family_rejects_commands() {
        let family = created(CreateFamilyCommand::new());
        let events = family
            .decide(&FamilyCommand::Delete(DeleteFamilyCommand::new(family.id())))
            .unwrap();
        let family = family.replay(events);

        assert!(family.is_deleted());
        let result = family.decide(&FamilyCommand::AddChild(AddChildToFamilyCommand::new(
            family.id(),
            Uuid::new_v4(),
        )));
        assert!(matches!(result, Err(DomainError::NotFound { aggregate_type: "Family", .. })));
    }

    #[test]
    fn test_snapshot_at_every_prefix_matches_full_replay() {
        let (a, b, c1, c2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut state = Family::default();
        let mut log = Vec::new();
        let commands = |id: Uuid| {
            vec![
                FamilyCommand::AddChild(AddChildToFamilyCommand::new(id, c1)),
                FamilyCommand::Update(UpdateFamilyCommand::new(id).with_partners(vec![a, b])),
                FamilyCommand::AddChild(AddChildToFamilyCommand::new(id, c2)),
                FamilyCommand::RemoveChild(RemoveChildCommand::new(id, c1)),
                FamilyCommand::Delete(DeleteFamilyCommand::new(id)),
            ]
        };

        for event in state
            .decide(&FamilyCommand::Create(CreateFamilyCommand::new().with_partners(vec![a])))
            .unwrap()
        {
            state = state.apply(event.clone());
            log.push(event);
        }
        for command in commands(state.id()) {
            for event in state.decide(&command).unwrap() {
                state = state.apply(event.clone());
                log.push(event);
            }
        }

        let full = Family::default().replay(log.clone());
        for k in 0..=log.len() {
            let snapshot = Family::default().replay(log[..k].to_vec());
            assert_eq!(snapshot.clone().replay(log[k..].to_vec()), full, "prefix {}", k);
        }
        assert_eq!(full, state);
        assert_eq!(full.children(), &[c2]);
    }
}
