//! Domain Events
//!
//! Event definitions for Event Sourcing.
//! Events are immutable facts that have happened in the system.
//! Each aggregate has a closed set of events, matched exhaustively.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DateValue, RelationshipType, Sex};

/// Common behaviour of every aggregate event type
pub trait DomainEvent {
    /// Get the event type as a string (stored next to the payload)
    fn event_type(&self) -> &'static str;

    /// Get the ID of the aggregate this event belongs to
    fn aggregate_id(&self) -> Uuid;
}

/// Person-related events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PersonEvent {
    /// Person was created
    PersonCreated {
        person_id: Uuid,
        given_name: Option<String>,
        surname: Option<String>,
        sex: Sex,
        birth_date: Option<DateValue>,
        birth_place: Option<String>,
        death_date: Option<DateValue>,
        death_place: Option<String>,
        living: bool,
        created_at: DateTime<Utc>,
    },

    /// One or more person attributes changed
    PersonDetailsUpdated {
        person_id: Uuid,
        changes: PersonChanges,
        updated_at: DateTime<Utc>,
    },

    /// Person was tombstoned
    PersonDeleted {
        person_id: Uuid,
        reason: Option<String>,
        deleted_at: DateTime<Utc>,
    },
}

/// Changes made to a person; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonChanges {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub given_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub surname: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sex: Option<Sex>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub birth_date: Option<DateValue>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub birth_place: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub death_date: Option<DateValue>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub death_place: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub living: Option<bool>,
}

impl PersonChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl DomainEvent for PersonEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PersonEvent::PersonCreated { .. } => "PersonCreated",
            PersonEvent::PersonDetailsUpdated { .. } => "PersonDetailsUpdated",
            PersonEvent::PersonDeleted { .. } => "PersonDeleted",
        }
    }

    fn aggregate_id(&self) -> Uuid {
        match self {
            PersonEvent::PersonCreated { person_id, .. } => *person_id,
            PersonEvent::PersonDetailsUpdated { person_id, .. } => *person_id,
            PersonEvent::PersonDeleted { person_id, .. } => *person_id,
        }
    }
}

/// Family-related events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FamilyEvent {
    /// Family was created with its initial members
    FamilyCreated {
        family_id: Uuid,
        relationship: RelationshipType,
        marriage_date: Option<DateValue>,
        marriage_place: Option<String>,
        partners: Vec<Uuid>,
        children: Vec<Uuid>,
        created_at: DateTime<Utc>,
    },

    /// Relationship details or partner list changed
    FamilyDetailsUpdated {
        family_id: Uuid,
        changes: FamilyChanges,
        updated_at: DateTime<Utc>,
    },

    /// A child was appended to the family
    ChildAdded {
        family_id: Uuid,
        child_id: Uuid,
        added_at: DateTime<Utc>,
    },

    /// A child was removed from the family
    ChildRemoved {
        family_id: Uuid,
        child_id: Uuid,
        removed_at: DateTime<Utc>,
    },

    /// Family was tombstoned
    FamilyDeleted {
        family_id: Uuid,
        reason: Option<String>,
        deleted_at: DateTime<Utc>,
    },
}

/// Changes made to a family; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FamilyChanges {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub relationship: Option<RelationshipType>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub marriage_date: Option<DateValue>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub marriage_place: Option<String>,

    /// Replaces the whole partner list
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub partners: Option<Vec<Uuid>>,
}

impl FamilyChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl DomainEvent for FamilyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FamilyEvent::FamilyCreated { .. } => "FamilyCreated",
            FamilyEvent::FamilyDetailsUpdated { .. } => "FamilyDetailsUpdated",
            FamilyEvent::ChildAdded { .. } => "ChildAdded",
            FamilyEvent::ChildRemoved { .. } => "ChildRemoved",
            FamilyEvent::FamilyDeleted { .. } => "FamilyDeleted",
        }
    }

    fn aggregate_id(&self) -> Uuid {
        match self {
            FamilyEvent::FamilyCreated { family_id, .. } => *family_id,
            FamilyEvent::FamilyDetailsUpdated { family_id, .. } => *family_id,
            FamilyEvent::ChildAdded { family_id, .. } => *family_id,
            FamilyEvent::ChildRemoved { family_id, .. } => *family_id,
            FamilyEvent::FamilyDeleted { family_id, .. } => *family_id,
        }
    }
}
