//! Genealogy Ledger Library
//!
//! Event-sourced genealogy records with GEDCOM 5.5 import and export.
//! Re-exports modules for integration testing and external use.

pub mod aggregate;
pub mod app;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod event_store;
pub mod gedcom;
pub mod handlers;
pub mod jobs;
pub mod projection;

pub use app::Genealogy;
pub use config::{Config, EngineSettings, StorageBackend};
pub use domain::{DateValue, DomainError, OperationContext, RelationshipType, Sex};
pub use domain::{FamilyEvent, PersonEvent};
pub use error::{AppError, AppResult, ErrorKind, ErrorResponse};
