//! Table, sequence and view definitions and validation.

use std::collections::HashSet;

use parking_lot::Mutex;

use super::types::{quote_ident, ColumnDef, Constraint, DataType, ForeignKey, QualifiedName};
use crate::sql::Select;

/// Table schema definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    /// Qualified table name.
    pub name: QualifiedName,
    /// Column definitions, in storage order.
    pub columns: Vec<ColumnDef>,
    /// Table-level constraints, in declaration order.
    pub constraints: Vec<Constraint>,
}

impl TableSchema {
    /// Create a new table schema.
    pub fn new(name: QualifiedName, columns: Vec<ColumnDef>) -> Self {
        Self {
            name,
            columns,
            constraints: Vec::new(),
        }
    }

    /// Add a table constraint.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Get a column definition by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Column types, in order.
    pub fn column_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type).collect()
    }

    /// Positions of the named columns.
    pub fn positions(&self, names: &[String]) -> Result<Vec<usize>, SchemaError> {
        names
            .iter()
            .map(|n| {
                self.column_index(n)
                    .ok_or_else(|| SchemaError::ColumnNotFound(format!("{}.{}", self.name, n)))
            })
            .collect()
    }

    /// Primary key columns, if declared.
    pub fn primary_key(&self) -> Option<&[String]> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::PrimaryKey(cols) => Some(cols.as_slice()),
            _ => None,
        })
    }

    /// Every column set that must be unique, primary key first.
    pub fn unique_keys(&self) -> Vec<&[String]> {
        let mut keys: Vec<&[String]> = self.primary_key().into_iter().collect();
        keys.extend(self.constraints.iter().filter_map(|c| match c {
            Constraint::Unique(cols) => Some(cols.as_slice()),
            _ => None,
        }));
        keys
    }

    /// Foreign keys declared on this table.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> + '_ {
        self.constraints.iter().filter_map(|c| match c {
            Constraint::ForeignKey(fk) => Some(fk),
            _ => None,
        })
    }

    /// A column is nullable unless declared NOT NULL or part of the primary key.
    pub fn is_nullable(&self, index: usize) -> bool {
        let col = &self.columns[index];
        !col.not_null && !self.primary_key().is_some_and(|pk| pk.contains(&col.name))
    }

    /// Validate the schema itself (e.g., constraint columns exist).
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.columns.is_empty() {
            return Err(SchemaError::InvalidConstraint(format!(
                "table {} must have at least one column",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for col in &self.columns {
            if !seen.insert(&col.name) {
                return Err(SchemaError::DuplicateColumn(col.name.clone()));
            }
        }

        let primary_keys = self
            .constraints
            .iter()
            .filter(|c| matches!(c, Constraint::PrimaryKey(_)))
            .count();
        if primary_keys > 1 {
            return Err(SchemaError::InvalidConstraint(format!(
                "table {} has more than one primary key",
                self.name
            )));
        }

        for constraint in &self.constraints {
            if constraint.columns().is_empty() {
                return Err(SchemaError::InvalidConstraint(format!(
                    "{} has no columns",
                    constraint
                )));
            }
            self.positions(constraint.columns())?;
            if let Constraint::ForeignKey(fk) = constraint {
                if fk.columns.len() != fk.referenced_columns.len() {
                    return Err(SchemaError::InvalidConstraint(format!(
                        "{} references {} columns with {}",
                        constraint,
                        fk.referenced_columns.len(),
                        fk.columns.len()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Tables this table references through foreign keys, excluding itself.
    pub fn referenced_tables(&self) -> Vec<QualifiedName> {
        let mut out: Vec<QualifiedName> = self
            .foreign_keys()
            .map(|fk| fk.references.clone())
            .filter(|t| *t != self.name)
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Sequences used by column defaults.
    pub fn referenced_sequences(&self) -> Vec<QualifiedName> {
        let mut out: Vec<QualifiedName> = self
            .columns
            .iter()
            .filter_map(|c| c.default.as_ref())
            .flat_map(|d| d.sequences())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Render the `CREATE TABLE` statement that recreates this table.
    pub fn to_ddl(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(|c| c.to_string()).collect();
        parts.extend(self.constraints.iter().map(|c| c.sql_name()));
        format!("CREATE TABLE {}({});", self.name.to_sql(), parts.join(", "))
    }

    /// Check that another definition has the same column layout: names, types
    /// and nullability in the same order.
    pub fn check_compatible(&self, other: &TableSchema) -> Result<(), String> {
        if self.columns.len() != other.columns.len() {
            return Err(format!(
                "existing table has {} columns, export has {}",
                self.columns.len(),
                other.columns.len()
            ));
        }
        for (i, (a, b)) in self.columns.iter().zip(&other.columns).enumerate() {
            if a.name != b.name || a.data_type != b.data_type {
                return Err(format!(
                    "column {} is {} {} in the existing table but {} {} in the export",
                    i + 1,
                    quote_ident(&a.name),
                    a.data_type,
                    quote_ident(&b.name),
                    b.data_type
                ));
            }
            if self.is_nullable(i) != other.is_nullable(i) {
                return Err(format!("column {} differs in nullability", quote_ident(&a.name)));
            }
        }
        Ok(())
    }
}

/// A sequence generator.
///
/// The counter sits behind a mutex so `nextval` can run while the catalog is
/// only borrowed immutably (e.g. during expression evaluation). Values stay
/// within `min..=max`; stepping past a bound exhausts the sequence.
#[derive(Debug)]
pub struct Sequence {
    pub name: QualifiedName,
    pub increment: i64,
    pub min: i64,
    pub max: i64,
    /// Next value to hand out; `None` once the range is exhausted.
    next: Mutex<Option<i64>>,
}

impl Clone for Sequence {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            increment: self.increment,
            min: self.min,
            max: self.max,
            next: Mutex::new(*self.next.lock()),
        }
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.increment == other.increment
            && self.min == other.min
            && self.max == other.max
            && *self.next.lock() == *other.next.lock()
    }
}

impl Sequence {
    /// An unbounded sequence.
    pub fn new(name: QualifiedName, start: i64, increment: i64) -> Result<Self, SchemaError> {
        Self::bounded(name, start, increment, i64::MIN, i64::MAX)
    }

    /// A sequence limited to `min..=max`.
    ///
    /// A start already past the bound it moves towards (above `max` when
    /// ascending, below `min` when descending) gives an exhausted sequence;
    /// that is how an exhausted sequence is written out.
    pub fn bounded(name: QualifiedName, start: i64, increment: i64, min: i64, max: i64) -> Result<Self, SchemaError> {
        if increment == 0 {
            return Err(SchemaError::InvalidSequence(format!(
                "{}: INCREMENT must not be zero",
                name
            )));
        }
        if min > max {
            return Err(SchemaError::InvalidSequence(format!(
                "{}: MINVALUE {} is greater than MAXVALUE {}",
                name, min, max
            )));
        }
        let behind = if increment > 0 { start < min } else { start > max };
        if behind {
            return Err(SchemaError::InvalidSequence(format!(
                "{}: START WITH {} is outside {}..{}",
                name, start, min, max
            )));
        }
        let next = (min..=max).contains(&start).then_some(start);
        Ok(Self {
            name,
            increment,
            min,
            max,
            next: Mutex::new(next),
        })
    }

    /// Hand out the next value.
    pub fn next_value(&self) -> Result<i64, SchemaError> {
        let mut next = self.next.lock();
        let value = next.ok_or_else(|| SchemaError::SequenceExhausted(self.name.to_string()))?;
        *next = value
            .checked_add(self.increment)
            .filter(|n| (self.min..=self.max).contains(n));
        Ok(value)
    }

    /// The value the next call to `next_value` would return.
    pub fn peek(&self) -> Option<i64> {
        *self.next.lock()
    }

    /// Render the `CREATE SEQUENCE` statement; it starts where this one is now.
    ///
    /// Options follow the order `INCREMENT`, `MINVALUE`, `MAXVALUE`, `START`,
    /// the only order the parser accepts. An exhausted sequence is rendered
    /// with its start one step past the bound, pulling the bound in by one
    /// when it sits at the end of the integer range.
    pub fn to_ddl(&self) -> String {
        let (min, max, start) = match self.peek() {
            Some(start) => (self.min, self.max, start),
            None if self.increment > 0 => {
                let max = self.max.min(i64::MAX - 1);
                (self.min.min(max), max, max + 1)
            }
            None => {
                let min = self.min.max(i64::MIN + 1);
                (min, self.max.max(min), min - 1)
            }
        };
        let mut ddl = format!("CREATE SEQUENCE {} INCREMENT BY {}", self.name.to_sql(), self.increment);
        if min != i64::MIN {
            ddl.push_str(&format!(" MINVALUE {}", min));
        }
        if max != i64::MAX {
            ddl.push_str(&format!(" MAXVALUE {}", max));
        }
        ddl.push_str(&format!(" START WITH {};", start));
        ddl
    }
}

/// A stored view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewDef {
    pub name: QualifiedName,
    /// Query text as it will be re-parsed.
    pub sql: String,
    /// Parsed query, expanded at bind time.
    pub query: Select,
    /// Output column names.
    pub columns: Vec<String>,
    /// Tables and views the query reads.
    pub dependencies: Vec<QualifiedName>,
}

impl ViewDef {
    /// Render the `CREATE VIEW` statement.
    pub fn to_ddl(&self) -> String {
        format!("CREATE VIEW {} AS {};", self.name.to_sql(), self.sql)
    }
}

/// Catalog errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("schema {0} is not empty (use CASCADE)")]
    SchemaNotEmpty(String),

    #[error("the default schema cannot be dropped")]
    DefaultSchema,

    #[error("cannot drop {object}: {} depend(s) on it", .dependents.join(", "))]
    DependencyExists { object: String, dependents: Vec<String> },

    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("sequence {0} is exhausted")]
    SequenceExhausted(String),
}

impl SchemaError {
    pub(crate) fn not_found(kind: &'static str, name: impl ToString) -> Self {
        SchemaError::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn exists(kind: &'static str, name: impl ToString) -> Self {
        SchemaError::AlreadyExists {
            kind,
            name: name.to_string(),
        }
    }
}

/// Builder for creating table schemas.
pub struct SchemaBuilder {
    name: QualifiedName,
    columns: Vec<ColumnDef>,
    constraints: Vec<Constraint>,
}

impl SchemaBuilder {
    /// Start building a new schema.
    pub fn new(name: QualifiedName) -> Self {
        Self {
            name,
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Add a column.
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a simple column with just name and type.
    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(ColumnDef::new(name, data_type));
        self
    }

    /// Add a non-nullable column.
    pub fn add_required_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(ColumnDef::new(name, data_type).not_null());
        self
    }

    /// Set the primary key.
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.constraints.push(Constraint::PrimaryKey(
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        self
    }

    /// Add any table constraint.
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Build the schema.
    pub fn build(self) -> Result<TableSchema, SchemaError> {
        let schema = TableSchema {
            name: self.name,
            columns: self.columns,
            constraints: self.constraints,
        };
        schema.validate()?;
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> TableSchema {
        SchemaBuilder::new(QualifiedName::main("people"))
            .add_column("pid", DataType::Integer)
            .add_required_column("full_name", DataType::Text)
            .add_column("born", DataType::Date)
            .primary_key(&["pid"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_schema_validation() {
        let schema = sample_schema();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.primary_key(), Some(&["pid".to_string()][..]));
        assert!(!schema.is_nullable(0));
        assert!(!schema.is_nullable(1));
        assert!(schema.is_nullable(2));
    }

    #[test]
    fn test_schema_duplicate_column() {
        let result = SchemaBuilder::new(QualifiedName::main("bad"))
            .add_column("x", DataType::Text)
            .add_column("x", DataType::Integer)
            .build();

        assert!(matches!(result, Err(SchemaError::DuplicateColumn(_))));
    }

    #[test]
    fn test_schema_invalid_primary_key() {
        let result = SchemaBuilder::new(QualifiedName::main("bad"))
            .add_column("x", DataType::Text)
            .primary_key(&["missing"])
            .build();

        assert!(matches!(result, Err(SchemaError::ColumnNotFound(_))));
    }

    #[test]
    fn test_to_ddl() {
        let schema = sample_schema();
        assert_eq!(
            schema.to_ddl(),
            "CREATE TABLE people(pid INTEGER, full_name TEXT NOT NULL, born DATE, PRIMARY KEY (pid));"
        );
    }

    #[test]
    fn test_check_compatible() {
        let a = sample_schema();
        assert!(a.check_compatible(&a.clone()).is_ok());

        let b = SchemaBuilder::new(QualifiedName::main("people"))
            .add_column("pid", DataType::Integer)
            .add_column("full_name", DataType::Text)
            .add_column("born", DataType::Date)
            .primary_key(&["pid"])
            .build()
            .unwrap();
        assert!(a.check_compatible(&b).unwrap_err().contains("nullability"));
    }

    #[test]
    fn test_sequence_counts_and_renders() {
        let seq = Sequence::new(QualifiedName::main("ids"), 10, 5).unwrap();
        assert_eq!(seq.next_value().unwrap(), 10);
        assert_eq!(seq.next_value().unwrap(), 15);
        assert_eq!(seq.to_ddl(), "CREATE SEQUENCE ids INCREMENT BY 5 START WITH 20;");

        let cloned = seq.clone();
        assert_eq!(seq.next_value().unwrap(), 20);
        assert_eq!(cloned.peek(), Some(20));
    }

    #[test]
    fn test_sequence_exhaustion() {
        let seq = Sequence::new(QualifiedName::main("edge"), i64::MAX, 1).unwrap();
        assert_eq!(seq.next_value().unwrap(), i64::MAX);
        assert!(matches!(seq.next_value(), Err(SchemaError::SequenceExhausted(_))));
        assert_eq!(
            seq.to_ddl(),
            "CREATE SEQUENCE edge INCREMENT BY 1 MAXVALUE 9223372036854775806 START WITH 9223372036854775807;"
        );
        assert!(Sequence::new(QualifiedName::main("zero"), 1, 0).is_err());
    }

    #[test]
    fn test_bounded_sequence() {
        let seq = Sequence::bounded(QualifiedName::main("dice"), 5, 1, 1, 6).unwrap();
        assert_eq!(seq.next_value().unwrap(), 5);
        assert_eq!(seq.to_ddl(), "CREATE SEQUENCE dice INCREMENT BY 1 MINVALUE 1 MAXVALUE 6 START WITH 6;");
        assert_eq!(seq.next_value().unwrap(), 6);
        assert!(seq.next_value().is_err());
        assert_eq!(seq.to_ddl(), "CREATE SEQUENCE dice INCREMENT BY 1 MINVALUE 1 MAXVALUE 6 START WITH 7;");

        // the rendered start past the bound reads back as exhausted
        let reloaded = Sequence::bounded(QualifiedName::main("dice"), 7, 1, 1, 6).unwrap();
        assert_eq!(reloaded.peek(), None);
        assert_eq!(reloaded, seq);

        let down = Sequence::bounded(QualifiedName::main("down"), i64::MIN, -1, i64::MIN, i64::MAX).unwrap();
        assert_eq!(down.next_value().unwrap(), i64::MIN);
        assert_eq!(
            down.to_ddl(),
            "CREATE SEQUENCE down INCREMENT BY -1 MINVALUE -9223372036854775807 START WITH -9223372036854775808;"
        );

        assert!(Sequence::bounded(QualifiedName::main("bad"), 1, 1, 5, 2).is_err());
        assert!(Sequence::bounded(QualifiedName::main("behind"), 0, 1, 1, 6).is_err());
    }
}
