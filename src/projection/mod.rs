//! Projection module
//!
//! Updates read models (projections) from events.
//! Projections are optimized for queries and can always be rebuilt
//! from the event log.

mod error;
mod postgres;
mod projector;
mod query;
mod store;
mod views;

pub use error::ProjectionError;
pub use postgres::PgReadModelStore;
pub use projector::{CatchUpReport, ProjectionOutcome, Projector, RebuildReport};
pub use query::{Pedigree, PedigreeEntry, QueryService};
pub use store::{InMemoryReadModelStore, ProjectionBatch, ReadModelState, ReadModelStore};
pub use views::{
    FamilyView, Membership, MembershipChange, MembershipRole, Page, PersonView, ReferentialWarning,
};
