//! Planning errors.

use thiserror::Error;

use crate::catalog::SchemaError;

/// Result type for planning operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Query planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("ambiguous column: {0}")]
    AmbiguousColumn(String),

    #[error("invalid join condition: {0}")]
    InvalidJoin(String),

    #[error("column {0} must appear in GROUP BY or be used in an aggregate")]
    NotGrouped(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}
