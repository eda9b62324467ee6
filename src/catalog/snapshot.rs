//! Read-only, owned view of the catalog handed to export.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{ColumnDef, QualifiedName};

/// Kinds of catalog objects that can be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Schema,
    Sequence,
    Table,
    View,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Schema => "schema",
            ObjectKind::Sequence => "sequence",
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a catalog object.
///
/// Ordering is by schema, then name, then kind; a schema object carries its
/// own name in `schema` and an empty `name`, so it sorts ahead of its members.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
    pub schema: String,
    pub name: String,
    pub kind: ObjectKind,
}

impl ObjectId {
    pub fn new(kind: ObjectKind, name: &QualifiedName) -> Self {
        Self {
            schema: name.schema.clone(),
            name: name.name.clone(),
            kind,
        }
    }

    pub fn schema(name: impl Into<String>) -> Self {
        Self {
            schema: name.into(),
            name: String::new(),
            kind: ObjectKind::Schema,
        }
    }

    /// The object's qualified name (for a schema, `schema.""`).
    pub fn qualified(&self) -> QualifiedName {
        QualifiedName::new(self.schema.clone(), self.name.clone())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ObjectKind::Schema => write!(f, "schema {}", self.schema),
            kind => write!(f, "{} {}.{}", kind, self.schema, self.name),
        }
    }
}

/// One exportable object.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogObject {
    pub id: ObjectId,
    /// Statement that recreates the object, `;`-terminated.
    pub ddl: String,
    /// Objects that must exist before this one is created.
    pub dependencies: BTreeSet<ObjectId>,
    /// Column layout; empty for anything but tables.
    pub columns: Vec<ColumnDef>,
}

/// An owned copy of catalog metadata taken at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
    pub objects: Vec<CatalogObject>,
}

impl CatalogSnapshot {
    pub fn new(objects: Vec<CatalogObject>) -> Self {
        Self { objects }
    }

    pub fn get(&self, id: &ObjectId) -> Option<&CatalogObject> {
        self.objects.iter().find(|o| &o.id == id)
    }

    pub fn tables(&self) -> impl Iterator<Item = &CatalogObject> + '_ {
        self.objects.iter().filter(|o| o.id.kind == ObjectKind::Table)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
