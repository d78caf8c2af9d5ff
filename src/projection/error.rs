//! Projection errors

use uuid::Uuid;

use crate::event_store::EventStoreError;

/// Errors raised while maintaining or querying read models
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    /// Another projector advanced the aggregate first
    #[error("Projection position for {aggregate_id} moved: expected {expected}, found {actual}")]
    PositionMoved {
        aggregate_id: Uuid,
        expected: i64,
        actual: i64,
    },
}

impl ProjectionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProjectionError::EventStore(e) if e.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_error_display() {
        let err = ProjectionError::PositionMoved {
            aggregate_id: Uuid::nil(),
            expected: 1,
            actual: 2,
        };
        assert!(err.to_string().contains("expected 1, found 2"));

        let err = ProjectionError::from(EventStoreError::UnknownAggregateType("Ship".to_string()));
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Unknown aggregate type in event log: Ship");
    }
}
