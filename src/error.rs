//! Error handling module
//!
//! Crate-wide error type, its classification and the serializable
//! response body callers hand to their transport.

use serde::Serialize;

use crate::config::ConfigError;
use crate::domain::DomainError;
use crate::event_store::EventStoreError;
use crate::gedcom::GedcomError;
use crate::projection::ProjectionError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Gedcom(#[from] GedcomError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad classes of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    ConcurrencyConflict,
    MalformedInput,
    StorageFailure,
    /// The event log violates an invariant of this build
    Fatal,
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Domain(e) if e.is_not_found() => ErrorKind::NotFound,
            AppError::Domain(_) => ErrorKind::Validation,
            AppError::EventStore(e) if e.is_concurrency_conflict() => ErrorKind::ConcurrencyConflict,
            AppError::EventStore(e) if e.is_fatal() => ErrorKind::Fatal,
            AppError::EventStore(_) => ErrorKind::StorageFailure,
            AppError::Projection(e) if e.is_fatal() => ErrorKind::Fatal,
            AppError::Projection(_) => ErrorKind::StorageFailure,
            AppError::Gedcom(GedcomError::Io(_)) => ErrorKind::StorageFailure,
            AppError::Gedcom(_) => ErrorKind::MalformedInput,
            AppError::Database(_) => ErrorKind::StorageFailure,
            AppError::Config(_) | AppError::Internal(_) => ErrorKind::Fatal,
        }
    }

    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Domain(e) => match e {
                DomainError::InvalidEnumeration { .. } => "invalid_enumeration",
                DomainError::NotFound { .. } => "not_found",
                DomainError::AlreadyExists { .. } => "already_exists",
                DomainError::NoChanges => "no_changes",
                DomainError::TooManyPartners(_) => "too_many_partners",
                DomainError::DuplicatePartner(_) => "duplicate_partner",
                DomainError::DuplicateChild(_) => "duplicate_child",
                DomainError::PartnerIsChild(_) => "partner_is_child",
                DomainError::NotAChild(_) => "not_a_child",
            },
            AppError::EventStore(e) => match e {
                EventStoreError::ConcurrencyConflict { .. } => "concurrency_conflict",
                EventStoreError::CorruptEvent { .. } => "corrupt_event",
                EventStoreError::UnknownAggregateType(_) => "unknown_aggregate_type",
                _ => "storage_failure",
            },
            AppError::Projection(e) if e.is_fatal() => "corrupt_event",
            AppError::Projection(_) => "projection_failure",
            AppError::Gedcom(e) => e.error_code(),
            AppError::Database(_) => "database_error",
            AppError::Config(_) => "config_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_concurrency_conflict(&self) -> bool {
        self.kind() == ErrorKind::ConcurrencyConflict
    }

    /// Build the response body, logging server-side failures
    pub fn to_response(&self) -> ErrorResponse {
        let details = match self.kind() {
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::MalformedInput => {
                Some(self.to_string())
            }
            ErrorKind::ConcurrencyConflict => Some("retry limit reached".to_string()),
            ErrorKind::StorageFailure => {
                tracing::error!("Storage failure: {:?}", self);
                None
            }
            ErrorKind::Fatal => {
                tracing::error!("Fatal error: {:?}", self);
                None
            }
        };

        ErrorResponse {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
            details,
        }
    }
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        err.to_response()
    }
}
