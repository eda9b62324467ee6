//! Catalog module for schema management.
//!
//! The catalog holds schemas, tables, sequences and views in memory. Every
//! object can render the `CREATE` statement that recreates it, and
//! [`Catalog::snapshot`] hands export an owned, read-only copy of that
//! metadata together with the dependency edges between objects.

mod manager;
mod schema;
mod snapshot;
mod types;

pub use manager::Catalog;
pub use schema::{SchemaBuilder, SchemaError, Sequence, TableSchema, ViewDef};
pub use snapshot::{CatalogObject, CatalogSnapshot, ObjectId, ObjectKind};
pub use types::{
    quote_ident, ColumnDef, Constraint, DataType, DefaultExpr, ForeignKey, QualifiedName,
    DEFAULT_SCHEMA,
};
