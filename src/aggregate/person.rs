//! Person Aggregate
//!
//! A person in the record graph. Family membership is not stored here:
//! families own the edges, and the projector builds the inverse index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{DateValue, DomainError, PersonChanges, PersonEvent, Sex};
use crate::handlers::{CreatePersonCommand, DeletePersonCommand, UpdatePersonCommand};

use super::{clean_text, Aggregate, RecordStatus};

/// Commands handled by the Person aggregate
#[derive(Debug, Clone)]
pub enum PersonCommand {
    Create(CreatePersonCommand),
    Update(UpdatePersonCommand),
    Delete(DeletePersonCommand),
}

/// Person Aggregate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    id: Uuid,
    given_name: Option<String>,
    surname: Option<String>,
    sex: Sex,
    birth_date: Option<DateValue>,
    birth_place: Option<String>,
    death_date: Option<DateValue>,
    death_place: Option<String>,
    living: bool,
    status: RecordStatus,
    version: i64,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

fn parse_date(value: Option<&str>) -> Option<DateValue> {
    clean_text(value).map(|text| DateValue::parse(&text))
}

fn parse_sex(value: Option<&str>) -> Result<Option<Sex>, DomainError> {
    value.map(str::parse::<Sex>).transpose()
}

impl Person {
    fn decide_create(&self, command: &CreatePersonCommand) -> Result<PersonEvent, DomainError> {
        if self.exists() {
            return Err(DomainError::AlreadyExists {
                aggregate_type: "Person",
                id: self.id,
            });
        }

        let sex = parse_sex(command.sex.as_deref())?.unwrap_or_default();
        let death_date = parse_date(command.death_date.as_deref());
        let death_place = clean_text(command.death_place.as_deref());
        let living = command
            .living
            .unwrap_or(death_date.is_none() && death_place.is_none());

        Ok(PersonEvent::PersonCreated {
            person_id: command.person_id,
            given_name: clean_text(command.given_name.as_deref()),
            surname: clean_text(command.surname.as_deref()),
            sex,
            birth_date: parse_date(command.birth_date.as_deref()),
            birth_place: clean_text(command.birth_place.as_deref()),
            death_date,
            death_place,
            living,
            created_at: Utc::now(),
        })
    }

    fn decide_update(&self, command: &UpdatePersonCommand) -> Result<PersonEvent, DomainError> {
        if !self.is_active() {
            return Err(DomainError::person_not_found(command.person_id));
        }

        let mut changes = PersonChanges {
            given_name: clean_text(command.given_name.as_deref()),
            surname: clean_text(command.surname.as_deref()),
            sex: parse_sex(command.sex.as_deref())?,
            birth_date: parse_date(command.birth_date.as_deref()),
            birth_place: clean_text(command.birth_place.as_deref()),
            death_date: parse_date(command.death_date.as_deref()),
            death_place: clean_text(command.death_place.as_deref()),
            living: command.living,
        };

        let learned_of_death = changes.death_date.is_some() || changes.death_place.is_some();
        if changes.living.is_none() && learned_of_death && self.living {
            changes.living = Some(false);
        }

        if changes.is_empty() {
            return Err(DomainError::NoChanges);
        }

        Ok(PersonEvent::PersonDetailsUpdated {
            person_id: self.id,
            changes,
            updated_at: Utc::now(),
        })
    }

    fn decide_delete(&self, command: &DeletePersonCommand) -> Result<PersonEvent, DomainError> {
        if !self.is_active() {
            return Err(DomainError::person_not_found(command.person_id));
        }

        Ok(PersonEvent::PersonDeleted {
            person_id: self.id,
            reason: clean_text(command.reason.as_deref()),
            deleted_at: Utc::now(),
        })
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn given_name(&self) -> Option<&str> {
        self.given_name.as_deref()
    }

    pub fn surname(&self) -> Option<&str> {
        self.surname.as_deref()
    }

    pub fn sex(&self) -> Sex {
        self.sex
    }

    pub fn birth_date(&self) -> Option<&DateValue> {
        self.birth_date.as_ref()
    }

    pub fn birth_place(&self) -> Option<&str> {
        self.birth_place.as_deref()
    }

    pub fn death_date(&self) -> Option<&DateValue> {
        self.death_date.as_ref()
    }

    pub fn death_place(&self) -> Option<&str> {
        self.death_place.as_deref()
    }

    pub fn is_living(&self) -> bool {
        self.living
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

impl Aggregate for Person {
    type Event = PersonEvent;
    type Command = PersonCommand;

    fn aggregate_type() -> &'static str {
        "Person"
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

    fn decide(&self, command: &PersonCommand) -> Result<Vec<PersonEvent>, DomainError> {
        let event = match command {
            PersonCommand::Create(create) => self.decide_create(create)?,
            PersonCommand::Update(update) => self.decide_update(update)?,
            PersonCommand::Delete(delete) => self.decide_delete(delete)?,
        };
        Ok(vec![event])
    }

    fn apply(mut self, event: PersonEvent) -> Self {
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
            } => {
                self.id = person_id;
                self.given_name = given_name;
                self.surname = surname;
                self.sex = sex;
                self.birth_date = birth_date;
                self.birth_place = birth_place;
                self.death_date = death_date;
                self.death_place = death_place;
                self.living = living;
                self.status = RecordStatus::Active;
                self.created_at = Some(created_at);
                self.updated_at = Some(created_at);
            }

            PersonEvent::PersonDetailsUpdated { changes, updated_at, .. } => {
                let PersonChanges {
                    given_name,
                    surname,
                    sex,
                    birth_date,
                    birth_place,
                    death_date,
                    death_place,
                    living,
                } = changes;
                if given_name.is_some() {
                    self.given_name = given_name;
                }
                if surname.is_some() {
                    self.surname = surname;
                }
                if let Some(sex) = sex {
                    self.sex = sex;
                }
                if birth_date.is_some() {
                    self.birth_date = birth_date;
                }
                if birth_place.is_some() {
                    self.birth_place = birth_place;
                }
                if death_date.is_some() {
                    self.death_date = death_date;
                }
                if death_place.is_some() {
                    self.death_place = death_place;
                }
                if let Some(living) = living {
                    self.living = living;
                }
                self.updated_at = Some(updated_at);
            }

            PersonEvent::PersonDeleted { deleted_at, .. } => {
                self.status = RecordStatus::Deleted;
                self.updated_at = Some(deleted_at);
            }
        }

        self.version += 1;
        self
    }
}
