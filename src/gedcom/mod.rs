//! GEDCOM 5.5 import and export
//!
//! Import runs through the command handlers, so imported data gets the same
//! validation and event trail as any other command. Export reads the
//! projected views.

mod error;
mod export;
mod import;
mod job;
mod lexer;

pub use error::GedcomError;
pub use export::GedcomExporter;
pub use import::{GedcomImporter, ImportResult, IMPORT_SOURCE};
pub use job::{fingerprint, ImportJob};
pub use lexer::{parse_document, GedcomDocument, GedcomNode, GedcomRecord, ImportWarning};
