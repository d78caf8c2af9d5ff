//! Operation Context
//!
//! Metadata about the command that caused an event, stored as the
//! event's `caused_by` for the audit trail.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context for an operation, used for auditing and tracing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    /// Who issued the command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Subsystem that produced the command (e.g. `gedcom-import`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Name of the command that produced the events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context with an actor
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Create context with a source subsystem
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Copy of this context tagged with the command name
    pub fn for_command(&self, command: &str) -> Self {
        let mut context = self.clone();
        context.command = Some(command.to_string());
        context
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let correlation_id = Uuid::new_v4();

        let context = OperationContext::new()
            .with_actor("archivist")
            .with_correlation_id(correlation_id)
            .with_source("gedcom-import");

        assert_eq!(context.actor.as_deref(), Some("archivist"));
        assert_eq!(context.correlation_id, Some(correlation_id));
        assert_eq!(context.source.as_deref(), Some("gedcom-import"));

        let tagged = context.for_command("CreatePerson");
        assert_eq!(tagged.command.as_deref(), Some("CreatePerson"));
        assert!(context.command.is_none());
    }

    #[test]
    fn test_ensure_correlation_id() {
        let mut context = OperationContext::new();
        assert!(context.correlation_id.is_none());

        let id = context.ensure_correlation_id();
        assert_eq!(context.correlation_id, Some(id));

        // Calling again should return the same ID
        assert_eq!(context.ensure_correlation_id(), id);
    }

    #[test]
    fn test_empty_context_serializes_to_empty_object() {
        let json = serde_json::to_value(OperationContext::new()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
