//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;
use uuid::Uuid;

/// Domain-specific errors
///
/// These errors represent command validation failures against an aggregate's
/// current state. They are independent of the storage layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value outside a closed enumeration
    #[error("Invalid {field}: {value:?}")]
    InvalidEnumeration { field: &'static str, value: String },

    /// Aggregate has never been created, or is tombstoned
    #[error("{aggregate_type} not found: {id}")]
    NotFound {
        aggregate_type: &'static str,
        id: Uuid,
    },

    /// Create command targeting an existing stream
    #[error("{aggregate_type} already exists: {id}")]
    AlreadyExists {
        aggregate_type: &'static str,
        id: Uuid,
    },

    /// Update command that changes nothing
    #[error("No changes provided")]
    NoChanges,

    /// A family has at most two partners
    #[error("A family can have at most 2 partners (got {0})")]
    TooManyPartners(usize),

    #[error("Person {0} is listed as partner more than once")]
    DuplicatePartner(Uuid),

    #[error("Person {0} is already a child of this family")]
    DuplicateChild(Uuid),

    /// Same person as both partner and child of one family
    #[error("Person {0} cannot be both partner and child of the same family")]
    PartnerIsChild(Uuid),

    #[error("Person {0} is not a child of this family")]
    NotAChild(Uuid),
}

impl DomainError {
    /// Create an invalid enumeration error
    pub fn invalid_enumeration(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidEnumeration {
            field,
            value: value.into(),
        }
    }

    pub fn person_not_found(id: Uuid) -> Self {
        Self::NotFound {
            aggregate_type: "Person",
            id,
        }
    }

    pub fn family_not_found(id: Uuid) -> Self {
        Self::NotFound {
            aggregate_type: "Family",
            id,
        }
    }

    /// Check if this error means the target aggregate does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation failure (caller's fault, never retried)
    pub fn is_validation_error(&self) -> bool {
        !self.is_not_found()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let id = Uuid::new_v4();
        let err = DomainError::person_not_found(id);

        assert!(err.is_not_found());
        assert!(!err.is_validation_error());
        assert!(err.to_string().contains(&id.to_string()));
        assert!(err.to_string().starts_with("Person"));
    }

    #[test]
    fn test_invalid_enumeration_error() {
        let err = DomainError::invalid_enumeration("sex", "X");

        assert!(err.is_validation_error());
        assert_eq!(err.to_string(), r#"Invalid sex: "X""#);
    }

    #[test]
    fn test_family_rule_errors_are_validation() {
        let id = Uuid::new_v4();
        for err in [
            DomainError::TooManyPartners(3),
            DomainError::DuplicatePartner(id),
            DomainError::DuplicateChild(id),
            DomainError::PartnerIsChild(id),
            DomainError::NotAChild(id),
            DomainError::NoChanges,
        ] {
            assert!(err.is_validation_error());
        }
    }
}
