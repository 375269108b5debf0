//! Error types for relation persistence
//!
//! Validation and save failures are not errors in this crate: they are
//! collected into [`RelatedErrors`](crate::related_errors::RelatedErrors) and
//! reported as booleans. `RelationError` covers faults raised by the storage
//! collaborator and misconfiguration, which propagate to the caller.

use thiserror::Error;

/// Result type alias for relation operations
pub type RelationResult<T> = Result<T, RelationError>;

/// Error types for relation operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RelationError {
    /// The parent does not declare a relation with this name
    #[error("Relation '{relation}' is not defined on '{entity}'")]
    UnknownRelation { entity: String, relation: String },

    /// The storage collaborator has no schema for this entity type
    #[error("Unknown entity type '{0}'")]
    UnknownEntity(String),

    /// A relation descriptor or entity schema is inconsistent
    #[error("Invalid relation configuration: {0}")]
    Configuration(String),

    /// Submitted data does not have the shape the relation expects
    #[error("Invalid payload for relation '{relation}': {message}")]
    InvalidPayload { relation: String, message: String },

    /// The storage collaborator could not persist a record
    #[error("Failed to save '{entity}': {message}")]
    SaveFailed { entity: String, message: String },

    /// Any other storage collaborator fault
    #[error("Storage error: {0}")]
    Storage(String),

    /// Settings file could not be read or parsed
    #[error("Settings error: {0}")]
    Settings(String),
}

impl RelationError {
    pub fn unknown_relation(entity: &str, relation: &str) -> Self {
        Self::UnknownRelation {
            entity: entity.to_string(),
            relation: relation.to_string(),
        }
    }

    pub fn invalid_payload(relation: &str, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            relation: relation.to_string(),
            message: message.into(),
        }
    }

    pub fn save_failed(entity: &str, message: impl Into<String>) -> Self {
        Self::SaveFailed {
            entity: entity.to_string(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for RelationError {
    fn from(err: std::io::Error) -> Self {
        RelationError::Settings(err.to_string())
    }
}

impl From<serde_yaml::Error> for RelationError {
    fn from(err: serde_yaml::Error) -> Self {
        RelationError::Settings(err.to_string())
    }
}

impl From<serde_json::Error> for RelationError {
    fn from(err: serde_json::Error) -> Self {
        RelationError::Settings(err.to_string())
    }
}

// Collaborators written against anyhow surface as storage faults
impl From<anyhow::Error> for RelationError {
    fn from(err: anyhow::Error) -> Self {
        RelationError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelationError::unknown_relation("order", "lines");
        assert_eq!(err.to_string(), "Relation 'lines' is not defined on 'order'");

        let err = RelationError::save_failed("order_item", "duplicate key");
        assert_eq!(err.to_string(), "Failed to save 'order_item': duplicate key");
    }

    #[test]
    fn test_anyhow_conversion() {
        fn query() -> RelationResult<()> {
            let failure: anyhow::Result<()> = Err(anyhow::anyhow!("connection reset"));
            failure?;
            Ok(())
        }

        assert_eq!(
            query().unwrap_err(),
            RelationError::Storage("connection reset".to_string())
        );
    }
}
