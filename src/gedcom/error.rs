//! GEDCOM codec errors
//!
//! Per-record problems are warnings, not errors; these are the failures
//! that stop an import or export as a whole.

/// Errors that abort a GEDCOM import or export
#[derive(Debug, thiserror::Error)]
pub enum GedcomError {
    /// Resuming a job with a different source text
    #[error("Import job was started for source {expected}, got {actual}")]
    SourceMismatch { expected: String, actual: String },

    #[error("GEDCOM file error: {0}")]
    Io(#[from] std::io::Error),
}

impl GedcomError {
    pub fn error_code(&self) -> &'static str {
        match self {
            GedcomError::SourceMismatch { .. } => "source_mismatch",
            GedcomError::Io(_) => "gedcom_io_error",
        }
    }
}
