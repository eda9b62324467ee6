//! Transaction context using typestate pattern.
//!
//! The typestate pattern ensures at compile time that transactions
//! are used correctly:
//! - Only active transactions hold a snapshot to roll back to
//! - Committed/aborted transactions cannot be reused

use std::marker::PhantomData;

use chrono::{DateTime, Utc};

use crate::storage::DatabaseState;

/// Marker type for active transactions.
#[derive(Debug)]
pub struct TxActive;

/// Marker type for committed transactions.
#[derive(Debug)]
pub struct TxCommitted;

/// Marker type for aborted transactions.
#[derive(Debug)]
pub struct TxAborted;

/// Transaction metadata stored in the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionMetadata {
    /// Unique transaction ID.
    pub tx_id: String,
    /// When the transaction started.
    pub started_at: DateTime<Utc>,
}

/// A database transaction with typestate for lifecycle safety.
///
/// The `State` parameter tracks whether the transaction is:
/// - `TxActive`: holds the database state as of BEGIN
/// - `TxCommitted`: changes kept, snapshot released
/// - `TxAborted`: snapshot handed back to the caller
#[derive(Debug)]
pub struct Transaction<State> {
    pub(crate) metadata: TransactionMetadata,
    /// State at BEGIN; only present while active.
    snapshot: Option<DatabaseState>,
    _state: PhantomData<State>,
}

impl<State> Transaction<State> {
    /// Get the transaction ID.
    pub fn id(&self) -> &str {
        &self.metadata.tx_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.metadata.started_at
    }

    fn into_state<Next>(self) -> Transaction<Next> {
        Transaction {
            metadata: self.metadata,
            snapshot: None,
            _state: PhantomData,
        }
    }
}

impl Transaction<TxActive> {
    /// Create a new active transaction over a copy of the current state.
    pub(crate) fn new(tx_id: String, snapshot: DatabaseState) -> Self {
        Self {
            metadata: TransactionMetadata {
                tx_id,
                started_at: Utc::now(),
            },
            snapshot: Some(snapshot),
            _state: PhantomData,
        }
    }

    /// The database as it was when the transaction began.
    pub fn snapshot(&self) -> Option<&DatabaseState> {
        self.snapshot.as_ref()
    }

    /// Commit the transaction. The live state already holds every change,
    /// so this only releases the snapshot.
    pub fn commit(self) -> Transaction<TxCommitted> {
        self.into_state()
    }

    /// Rollback the transaction, returning the state to restore.
    pub fn rollback(mut self) -> (Transaction<TxAborted>, DatabaseState) {
        let snapshot = self.snapshot.take().unwrap_or_default();
        (self.into_state(), snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, QualifiedName, SchemaBuilder};
    use crate::storage::TableData;

    fn state_with_table() -> DatabaseState {
        let mut state = DatabaseState::new();
        let schema = SchemaBuilder::new(QualifiedName::main("users"))
            .add_column("id", DataType::Integer)
            .build()
            .unwrap();
        state.catalog.create_table(schema).unwrap();
        state.add_table(QualifiedName::main("users"), TableData::new(1, Vec::new()));
        state
    }

    #[test]
    fn test_rollback_returns_snapshot() {
        let mut live = state_with_table();
        let tx = Transaction::<TxActive>::new("tx001".to_string(), live.clone());

        live.table_data_mut(&QualifiedName::main("users"))
            .unwrap()
            .insert(vec![crate::storage::Value::Integer(1)])
            .unwrap();
        assert_eq!(live.total_rows(), 1);

        let (aborted, restored) = tx.rollback();
        assert_eq!(aborted.id(), "tx001");
        assert_eq!(restored.total_rows(), 0);
        assert!(restored.catalog.table_exists(&QualifiedName::main("users")));
    }

    #[test]
    fn test_commit_releases_snapshot() {
        let tx = Transaction::<TxActive>::new("tx002".to_string(), state_with_table());
        assert!(tx.snapshot().is_some());
        let committed = tx.commit();
        assert_eq!(committed.id(), "tx002");
    }
}
