//! Command Handlers module
//!
//! CQRS command handlers. Each handler loads the aggregate, lets it decide,
//! appends the resulting events and hands them to the projector.

mod commands;
mod family_handler;
mod person_handler;
mod repository;

#[cfg(test)]
mod tests;

pub use commands::*;
pub use family_handler::FamilyCommandHandler;
pub use person_handler::PersonCommandHandler;
pub use repository::{AggregateRepository, Committed};
