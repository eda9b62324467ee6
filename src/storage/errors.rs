//! storage layer error types

use thiserror::Error;

use crate::storage::types::RowId;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// a unique index already holds this key
    #[error("duplicate key {key} violates unique constraint on ({columns})")]
    DuplicateKey { columns: String, key: String },

    /// the requested row was not found
    #[error("row not found: {0}")]
    RowNotFound(RowId),

    /// the row has the wrong number of values for its table
    #[error("row has {actual} values, table has {expected} columns")]
    ArityMismatch { expected: usize, actual: usize },

    /// no data is stored for this table
    #[error("no storage for table: {0}")]
    TableNotFound(String),
}

impl StorageError {
    /// check if this error is a constraint conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::DuplicateKey { .. })
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let conflict = StorageError::DuplicateKey {
            columns: "id".into(),
            key: "(1)".into(),
        };
        assert!(conflict.is_conflict());
        assert!(!StorageError::RowNotFound(3).is_conflict());
        assert_eq!(
            conflict.to_string(),
            "duplicate key (1) violates unique constraint on (id)"
        );
    }
}
