//! Error types for docgen-state

use thiserror::Error;

/// Errors that can occur in the component store
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),

    /// Backend query or write error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Project not found
    #[error("Project not found: {project_id}")]
    ProjectNotFound { project_id: String },

    /// A record violated a store invariant (empty key fields, bad digest, ...)
    #[error("Invalid record: {reason}")]
    InvalidRecord { reason: String },
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_not_found_display() {
        let err = StorageError::ProjectNotFound {
            project_id: "p-123".to_string(),
        };
        assert!(err.to_string().contains("p-123"));
    }

    #[test]
    fn test_serde_error_converts() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: StorageError = bad.into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
