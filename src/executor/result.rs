//! Query result types.

use crate::storage::{Row, Value};

/// Result of a query execution.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Rows returned from SELECT, SHOW, DESCRIBE, EXPORT and IMPORT.
    Select(ResultSet),
    /// Number of rows affected by INSERT/UPDATE/DELETE.
    Modified { rows_affected: usize },
    /// DDL statement executed.
    Success { message: String },
    /// Transaction control result.
    Transaction { message: String },
}

impl QueryResult {
    /// Create a success result.
    pub fn success(message: impl Into<String>) -> Self {
        QueryResult::Success { message: message.into() }
    }

    /// Create a transaction result.
    pub fn transaction(message: impl Into<String>) -> Self {
        QueryResult::Transaction { message: message.into() }
    }

    /// Create a modified result.
    pub fn modified(rows: usize) -> Self {
        QueryResult::Modified { rows_affected: rows }
    }

    /// The result set, if the statement produced rows.
    pub fn rows(&self) -> Option<&ResultSet> {
        match self {
            QueryResult::Select(rs) => Some(rs),
            _ => None,
        }
    }

    /// Rows changed by DML; zero for everything else.
    pub fn rows_affected(&self) -> usize {
        match self {
            QueryResult::Modified { rows_affected } => *rows_affected,
            _ => 0,
        }
    }
}

/// A set of rows from a SELECT query.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    /// Column names in order.
    pub columns: Vec<String>,
    /// Rows, positionally matching `columns`.
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Create a new empty result set.
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    /// One-row result, used for statement summaries.
    pub fn single(columns: &[&str], row: Row) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: vec![row],
        }
    }

    /// Add a row.
    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get a row by index.
    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Position of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of `column` in row `row`.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Iterate over rows.
    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
