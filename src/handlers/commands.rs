//! Command definitions
//!
//! Commands represent intentions to change the system state.
//! Enumerations and dates arrive as text and are validated by the aggregate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =========================================================================
// Person commands
// =========================================================================

/// Command to create a new person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePersonCommand {
    pub person_id: Uuid,
    pub given_name: Option<String>,
    pub surname: Option<String>,
    /// `male`, `female`, `unknown` (or `M`/`F`/`U`)
    pub sex: Option<String>,
    pub birth_date: Option<String>,
    pub birth_place: Option<String>,
    pub death_date: Option<String>,
    pub death_place: Option<String>,
    pub living: Option<bool>,
}

impl CreatePersonCommand {
    /// New command with a freshly minted person ID
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    /// New command for a caller-assigned person ID
    pub fn with_id(person_id: Uuid) -> Self {
        Self {
            person_id,
            given_name: None,
            surname: None,
            sex: None,
            birth_date: None,
            birth_place: None,
            death_date: None,
            death_place: None,
            living: None,
        }
    }

    pub fn with_name(mut self, given_name: impl Into<String>, surname: impl Into<String>) -> Self {
        self.given_name = Some(given_name.into());
        self.surname = Some(surname.into());
        self
    }

    pub fn with_sex(mut self, sex: impl Into<String>) -> Self {
        self.sex = Some(sex.into());
        self
    }

    pub fn with_birth(mut self, date: Option<String>, place: Option<String>) -> Self {
        self.birth_date = date;
        self.birth_place = place;
        self
    }

    pub fn with_death(mut self, date: Option<String>, place: Option<String>) -> Self {
        self.death_date = date;
        self.death_place = place;
        self
    }

    pub fn with_living(mut self, living: bool) -> Self {
        self.living = Some(living);
        self
    }
}

impl Default for CreatePersonCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Command to change some attributes of a person
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePersonCommand {
    pub person_id: Uuid,
    pub given_name: Option<String>,
    pub surname: Option<String>,
    pub sex: Option<String>,
    pub birth_date: Option<String>,
    pub birth_place: Option<String>,
    pub death_date: Option<String>,
    pub death_place: Option<String>,
    pub living: Option<bool>,
}

impl UpdatePersonCommand {
    pub fn new(person_id: Uuid) -> Self {
        Self {
            person_id,
            ..Default::default()
        }
    }

    pub fn with_death_date(mut self, date: impl Into<String>) -> Self {
        self.death_date = Some(date.into());
        self
    }

    pub fn with_given_name(mut self, given_name: impl Into<String>) -> Self {
        self.given_name = Some(given_name.into());
        self
    }

    pub fn with_sex(mut self, sex: impl Into<String>) -> Self {
        self.sex = Some(sex.into());
        self
    }
}

/// Command to tombstone a person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletePersonCommand {
    pub person_id: Uuid,
    pub reason: Option<String>,
}

impl DeletePersonCommand {
    pub fn new(person_id: Uuid) -> Self {
        Self {
            person_id,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

// =========================================================================
// Family commands
// =========================================================================

/// Command to create a family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFamilyCommand {
    pub family_id: Uuid,
    /// `marriage`, `partnership` or `unknown`
    pub relationship: Option<String>,
    pub marriage_date: Option<String>,
    pub marriage_place: Option<String>,
    pub partners: Vec<Uuid>,
    pub children: Vec<Uuid>,
}

impl CreateFamilyCommand {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(family_id: Uuid) -> Self {
        Self {
            family_id,
            relationship: None,
            marriage_date: None,
            marriage_place: None,
            partners: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }

    pub fn with_marriage(mut self, date: Option<String>, place: Option<String>) -> Self {
        self.marriage_date = date;
        self.marriage_place = place;
        self
    }

    pub fn with_partners(mut self, partners: Vec<Uuid>) -> Self {
        self.partners = partners;
        self
    }

    pub fn with_children(mut self, children: Vec<Uuid>) -> Self {
        self.children = children;
        self
    }

    /// Every person this command references
    pub fn members(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.partners.iter().chain(self.children.iter()).copied()
    }
}

impl Default for CreateFamilyCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Command to change a family's details or partner list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateFamilyCommand {
    pub family_id: Uuid,
    pub relationship: Option<String>,
    pub marriage_date: Option<String>,
    pub marriage_place: Option<String>,
    pub partners: Option<Vec<Uuid>>,
}

impl UpdateFamilyCommand {
    pub fn new(family_id: Uuid) -> Self {
        Self {
            family_id,
            ..Default::default()
        }
    }

    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }

    pub fn with_partners(mut self, partners: Vec<Uuid>) -> Self {
        self.partners = Some(partners);
        self
    }
}

/// Command to tombstone a family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteFamilyCommand {
    pub family_id: Uuid,
    pub reason: Option<String>,
}

impl DeleteFamilyCommand {
    pub fn new(family_id: Uuid) -> Self {
        Self {
            family_id,
            reason: None,
        }
    }
}

/// Command to append a child to a family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddChildToFamilyCommand {
    pub family_id: Uuid,
    pub child_id: Uuid,
}

impl AddChildToFamilyCommand {
    pub fn new(family_id: Uuid, child_id: Uuid) -> Self {
        Self { family_id, child_id }
    }
}

/// Command to remove a child from a family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveChildCommand {
    pub family_id: Uuid,
    pub child_id: Uuid,
}

impl RemoveChildCommand {
    pub fn new(family_id: Uuid, child_id: Uuid) -> Self {
        Self { family_id, child_id }
    }
}
