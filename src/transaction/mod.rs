//! Transaction management for portdb.
//!
//! A transaction is a snapshot of the whole database state taken at BEGIN.
//! Statements keep modifying the live state; COMMIT drops the snapshot and
//! ROLLBACK puts it back.
//!
//! ```text
//!   BEGIN ──► Transaction<TxActive> ──┬── commit()   ──► Transaction<TxCommitted>
//!             (holds DatabaseState)   └── rollback() ──► Transaction<TxAborted> + DatabaseState
//! ```

mod context;
mod error;
mod manager;

pub use context::{Transaction, TransactionMetadata, TxAborted, TxActive, TxCommitted};
pub use error::{TransactionError, TransactionResult};
pub use manager::TransactionManager;
