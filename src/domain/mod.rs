//! Domain module
//!
//! Core domain types: events, value types and pure domain errors.

pub mod context;
pub mod date;
pub mod error;
pub mod events;
pub mod kinds;

pub use context::OperationContext;
pub use date::{CalendarPoint, DateForm, DateKind, DateValue};
pub use error::DomainError;
pub use events::{FamilyChanges, FamilyEvent, PersonChanges, PersonEvent};
pub use kinds::{RelationshipType, Sex};
