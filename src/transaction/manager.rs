//! Transaction manager - coordinates transaction lifecycles.
//!
//! The TransactionManager is the main entry point for transactions.
//! It handles:
//! - Transaction creation with ULID ids
//! - Tracking active transactions
//! - Handing the BEGIN snapshot back on rollback

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use ulid::Ulid;

use crate::storage::DatabaseState;
use crate::transaction::context::{Transaction, TransactionMetadata, TxActive};
use crate::transaction::error::{TransactionError, TransactionResult};

/// Transaction manager - coordinates all transaction operations.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
#[derive(Clone, Default)]
pub struct TransactionManager {
    inner: Arc<TransactionManagerInner>,
}

#[derive(Default)]
struct TransactionManagerInner {
    /// Active transactions tracked by ID.
    active: RwLock<HashMap<String, TransactionMetadata>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new transaction over a copy of `state`.
    pub fn begin(&self, state: &DatabaseState) -> Transaction<TxActive> {
        let tx_id = Ulid::new().to_string().to_lowercase();
        let tx = Transaction::new(tx_id.clone(), state.clone());
        self.inner.active.write().insert(tx_id.clone(), tx.metadata.clone());
        debug!(tx = %tx_id, "transaction started");
        tx
    }

    /// Get the number of active transactions.
    pub fn active_count(&self) -> usize {
        self.inner.active.read().len()
    }

    /// Check if a transaction is active.
    pub fn is_active(&self, tx_id: &str) -> bool {
        self.inner.active.read().contains_key(tx_id)
    }

    /// Get metadata for an active transaction.
    pub fn get_transaction_info(&self, tx_id: &str) -> Option<TransactionMetadata> {
        self.inner.active.read().get(tx_id).cloned()
    }

    fn mark_completed(&self, tx_id: &str) -> TransactionResult<()> {
        self.inner
            .active
            .write()
            .remove(tx_id)
            .map(|_| ())
            .ok_or_else(|| TransactionError::NotFound(tx_id.to_string()))
    }

    /// Commit a transaction; returns its id.
    pub fn commit_transaction(&self, tx: Transaction<TxActive>) -> TransactionResult<String> {
        self.mark_completed(tx.id())?;
        let committed = tx.commit();
        debug!(tx = %committed.id(), "transaction committed");
        Ok(committed.id().to_string())
    }

    /// Rollback a transaction, returning the state to restore.
    pub fn rollback_transaction(&self, tx: Transaction<TxActive>) -> TransactionResult<DatabaseState> {
        self.mark_completed(tx.id())?;
        let (aborted, state) = tx.rollback();
        debug!(tx = %aborted.id(), "transaction rolled back");
        Ok(state)
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active_count", &self.active_count())
            .finish()
    }
}
