//! Transaction error types.

use thiserror::Error;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// BEGIN while a transaction is already open.
    #[error("transaction {tx_id} is already active")]
    AlreadyActive { tx_id: String },

    /// COMMIT or ROLLBACK with nothing open.
    #[error("no transaction is active")]
    NoActiveTransaction,

    /// The manager has no record of this transaction.
    #[error("transaction not found: {0}")]
    NotFound(String),
}
