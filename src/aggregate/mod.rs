//! Aggregate module
//!
//! Aggregate Root pattern implementation for Event Sourcing.
//! Aggregate state is never stored directly; it is a fold of the
//! aggregate's own event stream (optionally starting from a snapshot).

pub mod family;
pub mod person;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::events::DomainEvent;
use crate::domain::DomainError;

pub use family::{Family, FamilyCommand};
pub use person::{Person, PersonCommand};

/// Lifecycle of an aggregate. Deleted aggregates keep their history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordStatus {
    #[default]
    Active,
    Deleted,
}

/// Aggregate trait that all aggregates must implement
pub trait Aggregate: Sized + Default + Clone + Serialize + DeserializeOwned + Send + Sync {
    /// The type of events this aggregate handles
    type Event: DomainEvent + Serialize + DeserializeOwned + Clone + Send + Sync;

    /// The commands this aggregate decides on
    type Command: Send + Sync;

    /// Get the aggregate type name (for storage)
    fn aggregate_type() -> &'static str;

    /// Get the aggregate ID
    fn id(&self) -> Uuid;

    /// Get the current version (number of events applied)
    fn version(&self) -> i64;

    /// Whether the aggregate carries a tombstone
    fn is_deleted(&self) -> bool;

    /// Apply an event to update the aggregate state
    fn apply(self, event: Self::Event) -> Self;

    /// Validate a command against the current state and produce events
    fn decide(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError>;

    /// Whether a creation event has been applied
    fn exists(&self) -> bool {
        self.version() > 0
    }

    /// Whether the aggregate exists and is not tombstoned
    fn is_active(&self) -> bool {
        self.exists() && !self.is_deleted()
    }

    /// Fold a sequence of events on top of the current state
    fn replay<I>(self, events: I) -> Self
    where
        I: IntoIterator<Item = Self::Event>,
    {
        events.into_iter().fold(self, Self::apply)
    }
}

/// Trim a free-text field, mapping blank input to `None`
pub(crate) fn clean_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
