//! Query execution errors.

use thiserror::Error;

use crate::catalog::SchemaError;
use crate::planner::PlanError;
use crate::sql::ParseError;
use crate::storage::StorageError;
use crate::transaction::TransactionError;
use crate::transfer::TransferError;

/// Result type for query execution.
pub type ExecuteResult<T> = Result<T, ExecuteError>;

/// Query execution errors.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Plan(#[from] PlanError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("{0}")]
    Transfer(#[from] TransferError),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("NULL value in column {0} violates NOT NULL constraint")]
    NullValue(String),

    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in {0}")]
    NumericOverflow(String),
}

impl ExecuteError {
    /// Constraint violations raised while writing rows.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            ExecuteError::NullValue(_) | ExecuteError::ForeignKeyViolation(_)
        ) || matches!(self, ExecuteError::Storage(e) if e.is_conflict())
    }
}
