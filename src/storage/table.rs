//! row storage for a single table.
//!
//! rows live in a `BTreeMap` keyed by a monotonically increasing `RowId`, so a
//! scan always yields rows in insertion order. unique indexes map key tuples
//! to row ids and are maintained on every mutation.

use std::collections::{BTreeMap, HashMap};

use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::types::{IndexKey, Row, RowId};

/// a unique index over a set of column positions
#[derive(Debug, Clone)]
pub struct UniqueIndex {
    columns: Vec<usize>,
    label: String,
    entries: HashMap<IndexKey, RowId>,
}

impl UniqueIndex {
    fn new(columns: Vec<usize>, label: String) -> Self {
        Self {
            columns,
            label,
            entries: HashMap::new(),
        }
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    fn key(&self, row: &Row) -> Option<IndexKey> {
        let key = IndexKey::from_row(row, &self.columns);
        (!key.has_null()).then_some(key)
    }
}

/// all rows of one table plus its unique indexes
#[derive(Debug, Clone)]
pub struct TableData {
    arity: usize,
    rows: BTreeMap<RowId, Row>,
    next_id: RowId,
    indexes: Vec<UniqueIndex>,
}

impl TableData {
    /// create empty storage; each entry of `unique` is (column positions, label)
    pub fn new(arity: usize, unique: Vec<(Vec<usize>, String)>) -> Self {
        Self {
            arity,
            rows: BTreeMap::new(),
            next_id: 0,
            indexes: unique
                .into_iter()
                .map(|(columns, label)| UniqueIndex::new(columns, label))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// rows in insertion order
    pub fn rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.rows.values()
    }

    /// rows with their ids, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (RowId, &Row)> + '_ {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    pub fn get(&self, id: RowId) -> Option<&Row> {
        self.rows.get(&id)
    }

    /// true if some unique index covers exactly these columns
    pub fn has_index(&self, columns: &[usize]) -> bool {
        self.indexes.iter().any(|idx| idx.columns == columns)
    }

    /// find a row by a unique key; `None` if no index covers `columns`
    pub fn lookup(&self, columns: &[usize], key: &IndexKey) -> Option<RowId> {
        self.indexes
            .iter()
            .find(|idx| idx.columns == columns)
            .and_then(|idx| idx.entries.get(key).copied())
    }

    fn check_arity(&self, row: &Row) -> StorageResult<()> {
        if row.len() != self.arity {
            return Err(StorageError::ArityMismatch {
                expected: self.arity,
                actual: row.len(),
            });
        }
        Ok(())
    }

    fn check_unique(&self, row: &Row) -> StorageResult<()> {
        for idx in &self.indexes {
            if let Some(key) = idx.key(row) {
                if idx.entries.contains_key(&key) {
                    return Err(StorageError::DuplicateKey {
                        columns: idx.label.clone(),
                        key: key.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn index_row(&mut self, id: RowId, row: &Row) {
        for idx in &mut self.indexes {
            if let Some(key) = idx.key(row) {
                idx.entries.insert(key, id);
            }
        }
    }

    fn unindex_row(&mut self, row: &Row) {
        for idx in &mut self.indexes {
            if let Some(key) = idx.key(row) {
                idx.entries.remove(&key);
            }
        }
    }

    /// append a row, enforcing unique indexes
    pub fn insert(&mut self, row: Row) -> StorageResult<RowId> {
        self.check_arity(&row)?;
        self.check_unique(&row)?;
        let id = self.next_id;
        self.next_id += 1;
        self.index_row(id, &row);
        self.rows.insert(id, row);
        Ok(id)
    }

    /// append a batch atomically: either every row goes in or none does
    pub fn insert_all(&mut self, rows: Vec<Row>) -> StorageResult<usize> {
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            match self.insert(row) {
                Ok(id) => inserted.push(id),
                Err(e) => {
                    for id in inserted {
                        self.remove(id);
                    }
                    return Err(e);
                }
            }
        }
        Ok(inserted.len())
    }

    /// replace several rows at once; keys may move between the updated rows
    pub fn update_many(&mut self, updates: Vec<(RowId, Row)>) -> StorageResult<()> {
        let mut old = Vec::with_capacity(updates.len());
        for (id, row) in &updates {
            self.check_arity(row)?;
            let existing = self.rows.get(id).ok_or(StorageError::RowNotFound(*id))?;
            old.push((*id, existing.clone()));
        }
        for (_, row) in &old {
            self.unindex_row(row);
        }

        let mut applied = Vec::with_capacity(updates.len());
        for (id, row) in updates {
            if let Err(e) = self.check_unique(&row) {
                for (_, new_row) in &applied {
                    self.unindex_row(new_row);
                }
                for (id, row) in &old {
                    self.index_row(*id, row);
                }
                return Err(e);
            }
            self.index_row(id, &row);
            applied.push((id, row));
        }
        for (id, row) in applied {
            self.rows.insert(id, row);
        }
        Ok(())
    }

    fn remove(&mut self, id: RowId) -> Option<Row> {
        let row = self.rows.remove(&id)?;
        self.unindex_row(&row);
        Some(row)
    }

    /// delete a row by id
    pub fn delete(&mut self, id: RowId) -> StorageResult<Row> {
        self.remove(id).ok_or(StorageError::RowNotFound(id))
    }

    /// drop every row, keeping the index definitions
    pub fn truncate(&mut self) {
        self.rows.clear();
        for idx in &mut self.indexes {
            idx.entries.clear();
        }
    }
}
