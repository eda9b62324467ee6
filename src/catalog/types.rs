//! Data types, names and constraints for schema definitions.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sql::Expr;
use crate::storage::Value;

/// Schema every database starts with and unqualified names resolve to.
pub const DEFAULT_SCHEMA: &str = "main";

/// SQL data types supported by portdb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// TRUE / FALSE.
    Boolean,
    /// 64-bit signed integers.
    Integer,
    /// 64-bit IEEE floating point (DOUBLE in SQL).
    Float,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Blob,
    /// Calendar date without time.
    Date,
    /// Date and time without zone.
    Timestamp,
    /// JSON documents.
    Json,
}

impl DataType {
    /// Check if a value can be stored in a column of this type.
    pub fn matches(&self, value: &Value) -> bool {
        value.is_null() || value.data_type() == Some(*self)
    }

    /// Get the SQL name for this type.
    pub fn sql_name(&self) -> &'static str {
        match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Integer => "INTEGER",
            DataType::Float => "DOUBLE",
            DataType::Text => "TEXT",
            DataType::Blob => "BLOB",
            DataType::Date => "DATE",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Json => "JSON",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// Quote an identifier if it would not survive an unquoted round trip.
///
/// Unquoted identifiers fold to lower case, so anything that is not already a
/// lower-case bare word, or that collides with a keyword, is double-quoted.
pub fn quote_ident(ident: &str) -> Cow<'_, str> {
    let bare = ident
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && ident
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    let upper = ident.to_ascii_uppercase();
    if bare && sqlparser::keywords::ALL_KEYWORDS.binary_search(&upper.as_str()).is_err() {
        Cow::Borrowed(ident)
    } else {
        Cow::Owned(format!("\"{}\"", ident.replace('"', "\"\"")))
    }
}

/// A schema-qualified object name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Name in the default schema.
    pub fn main(name: impl Into<String>) -> Self {
        Self::new(DEFAULT_SCHEMA, name)
    }

    /// Parse `schema.name` or `name` as written inside a string literal,
    /// e.g. the argument of `nextval('s.seq')`.
    pub fn parse_literal(text: &str) -> Self {
        let unquote = |part: &str| {
            let part = part.trim();
            if part.len() >= 2 && part.starts_with('"') && part.ends_with('"') {
                part[1..part.len() - 1].replace("\"\"", "\"")
            } else {
                part.to_lowercase()
            }
        };
        match text.split_once('.') {
            Some((schema, name)) => Self::new(unquote(schema), unquote(name)),
            None => Self::main(unquote(text)),
        }
    }

    /// SQL rendering with quoting applied where needed; the default schema
    /// is left implicit.
    pub fn to_sql(&self) -> String {
        if self.schema == DEFAULT_SCHEMA {
            quote_ident(&self.name).into_owned()
        } else {
            format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A column default: the original SQL text and its parsed form.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultExpr {
    pub sql: String,
    pub expr: Expr,
}

impl DefaultExpr {
    /// Sequences this default draws from via `nextval(...)`.
    pub fn sequences(&self) -> Vec<QualifiedName> {
        let mut out = Vec::new();
        self.expr.visit(&mut |e| {
            if let Some(seq) = e.nextval_target() {
                out.push(QualifiedName::parse_literal(seq));
            }
        });
        out
    }
}

/// Table-level constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Primary key over one or more columns (implies NOT NULL + UNIQUE).
    PrimaryKey(Vec<String>),
    /// Values must be unique across all rows.
    Unique(Vec<String>),
    /// Foreign key into another table's primary key or unique columns.
    ForeignKey(ForeignKey),
}

/// A foreign key reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub references: QualifiedName,
    pub referenced_columns: Vec<String>,
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c).into_owned())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Constraint {
    /// Get the SQL representation of this constraint.
    pub fn sql_name(&self) -> String {
        match self {
            Constraint::PrimaryKey(cols) => format!("PRIMARY KEY ({})", column_list(cols)),
            Constraint::Unique(cols) => format!("UNIQUE ({})", column_list(cols)),
            Constraint::ForeignKey(fk) => format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                column_list(&fk.columns),
                fk.references.to_sql(),
                column_list(&fk.referenced_columns)
            ),
        }
    }

    /// Columns this constraint covers on the owning table.
    pub fn columns(&self) -> &[String] {
        match self {
            Constraint::PrimaryKey(cols) | Constraint::Unique(cols) => cols,
            Constraint::ForeignKey(fk) => &fk.columns,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// Full column definition including name, type, and column-level options.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Data type.
    pub data_type: DataType,
    /// Declared NOT NULL.
    pub not_null: bool,
    /// Default expression, if any.
    pub default: Option<DefaultExpr>,
}

impl ColumnDef {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            not_null: false,
            default: None,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Set the default expression.
    pub fn with_default(mut self, default: DefaultExpr) -> Self {
        self.default = Some(default);
        self
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", quote_ident(&self.name), self.data_type)?;
        if self.not_null {
            write!(f, " NOT NULL")?;
        }
        if let Some(default) = &self.default {
            write!(f, " DEFAULT {}", default.sql)?;
        }
        Ok(())
    }
}
