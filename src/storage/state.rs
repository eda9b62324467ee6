//! The complete database state: catalog plus table rows.
//!
//! The whole state is `Clone`, which is what transactions snapshot on BEGIN.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::catalog::{Catalog, CatalogSnapshot, QualifiedName};
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::table::TableData;
use crate::transfer::{ExportSource, RowScan};

/// Catalog and row data for every table.
#[derive(Debug, Clone, Default)]
pub struct DatabaseState {
    pub catalog: Catalog,
    tables: BTreeMap<QualifiedName, TableData>,
}

impl DatabaseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row storage of a table.
    pub fn table_data(&self, name: &QualifiedName) -> StorageResult<&TableData> {
        self.tables
            .get(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    pub fn table_data_mut(&mut self, name: &QualifiedName) -> StorageResult<&mut TableData> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    /// Register storage for a newly created table.
    pub fn add_table(&mut self, name: QualifiedName, data: TableData) {
        self.tables.insert(name, data);
    }

    pub fn remove_table(&mut self, name: &QualifiedName) -> Option<TableData> {
        self.tables.remove(name)
    }

    /// Number of rows across all tables.
    pub fn total_rows(&self) -> usize {
        self.tables.values().map(TableData::len).sum()
    }
}

impl ExportSource for DatabaseState {
    fn catalog_snapshot(&self) -> CatalogSnapshot {
        self.catalog.snapshot()
    }

    fn scan_table(&self, table: &QualifiedName) -> Option<RowScan<'_>> {
        self.tables
            .get(table)
            .map(|data| Box::new(data.rows().map(Cow::Borrowed)) as RowScan<'_>)
    }
}
