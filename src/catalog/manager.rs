//! Catalog manager: the in-memory registry of schemas and their objects.

use std::collections::{BTreeMap, BTreeSet};

use super::schema::{SchemaError, Sequence, TableSchema, ViewDef};
use super::snapshot::{CatalogObject, CatalogSnapshot, ObjectId, ObjectKind};
use super::types::{quote_ident, QualifiedName, DEFAULT_SCHEMA};

/// The catalog holds every schema, table, sequence and view definition.
///
/// Tables, sequences and views share one namespace per schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    schemas: BTreeSet<String>,
    tables: BTreeMap<QualifiedName, TableSchema>,
    sequences: BTreeMap<QualifiedName, Sequence>,
    views: BTreeMap<QualifiedName, ViewDef>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            schemas: BTreeSet::from([DEFAULT_SCHEMA.to_string()]),
            tables: BTreeMap::new(),
            sequences: BTreeMap::new(),
            views: BTreeMap::new(),
        }
    }
}

impl Catalog {
    /// Create a catalog holding only the default schema.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema_exists(&self, name: &str) -> bool {
        self.schemas.contains(name)
    }

    pub fn schema_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.schemas.iter().map(String::as_str)
    }

    /// Kind of the object registered under `name`, if any.
    pub fn object_kind(&self, name: &QualifiedName) -> Option<ObjectKind> {
        if self.tables.contains_key(name) {
            Some(ObjectKind::Table)
        } else if self.views.contains_key(name) {
            Some(ObjectKind::View)
        } else if self.sequences.contains_key(name) {
            Some(ObjectKind::Sequence)
        } else {
            None
        }
    }

    fn check_new_object(&self, name: &QualifiedName) -> Result<(), SchemaError> {
        if !self.schema_exists(&name.schema) {
            return Err(SchemaError::not_found("schema", &name.schema));
        }
        if let Some(kind) = self.object_kind(name) {
            return Err(SchemaError::exists(kind.as_str(), name));
        }
        Ok(())
    }

    /// Create a schema. Returns false if it already existed and
    /// `if_not_exists` was set.
    pub fn create_schema(&mut self, name: &str, if_not_exists: bool) -> Result<bool, SchemaError> {
        if self.schema_exists(name) {
            return if if_not_exists {
                Ok(false)
            } else {
                Err(SchemaError::exists("schema", name))
            };
        }
        self.schemas.insert(name.to_string());
        Ok(true)
    }

    /// Drop a schema. With `cascade` every object in it goes too, and the
    /// dropped table names are returned so their storage can be released.
    pub fn drop_schema(&mut self, name: &str, cascade: bool) -> Result<Vec<QualifiedName>, SchemaError> {
        if name == DEFAULT_SCHEMA {
            return Err(SchemaError::DefaultSchema);
        }
        if !self.schema_exists(name) {
            return Err(SchemaError::not_found("schema", name));
        }

        let members: Vec<QualifiedName> = self
            .tables
            .keys()
            .chain(self.views.keys())
            .chain(self.sequences.keys())
            .filter(|n| n.schema == name)
            .cloned()
            .collect();
        if !members.is_empty() && !cascade {
            return Err(SchemaError::SchemaNotEmpty(name.to_string()));
        }

        for member in &members {
            let outside: Vec<String> = self
                .dependents_of(member)
                .into_iter()
                .filter(|d| d.schema != name)
                .map(|d| d.to_string())
                .collect();
            if !outside.is_empty() {
                return Err(SchemaError::DependencyExists {
                    object: member.to_string(),
                    dependents: outside,
                });
            }
        }

        let mut dropped = Vec::new();
        for member in members {
            if self.tables.remove(&member).is_some() {
                dropped.push(member);
            } else if self.views.remove(&member).is_none() {
                self.sequences.remove(&member);
            }
        }
        self.schemas.remove(name);
        Ok(dropped)
    }

    /// Register a table after validating its constraints against the catalog.
    pub fn create_table(&mut self, schema: TableSchema) -> Result<(), SchemaError> {
        schema.validate()?;
        self.check_new_object(&schema.name)?;

        for fk in schema.foreign_keys() {
            let target = if fk.references == schema.name {
                &schema
            } else {
                self.get_table(&fk.references)?
            };
            let positions = target.positions(&fk.referenced_columns)?;
            let keyed = target
                .unique_keys()
                .iter()
                .any(|key| key.len() == fk.referenced_columns.len() && key.iter().all(|c| fk.referenced_columns.contains(c)));
            if !keyed {
                return Err(SchemaError::InvalidConstraint(format!(
                    "referenced columns ({}) of {} are not a primary key or unique",
                    fk.referenced_columns.join(", "),
                    fk.references
                )));
            }
            for (col, pos) in fk.columns.iter().zip(positions) {
                let local = schema
                    .get_column(col)
                    .ok_or_else(|| SchemaError::ColumnNotFound(col.clone()))?;
                let remote = &target.columns[pos];
                if local.data_type != remote.data_type {
                    return Err(SchemaError::InvalidConstraint(format!(
                        "foreign key column {} is {} but {}.{} is {}",
                        col, local.data_type, fk.references, remote.name, remote.data_type
                    )));
                }
            }
        }

        for seq in schema.referenced_sequences() {
            self.get_sequence(&seq)?;
        }

        self.tables.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Get a table schema by name.
    pub fn get_table(&self, name: &QualifiedName) -> Result<&TableSchema, SchemaError> {
        self.tables
            .get(name)
            .ok_or_else(|| SchemaError::not_found("table", name))
    }

    pub fn table_exists(&self, name: &QualifiedName) -> bool {
        self.tables.contains_key(name)
    }

    /// Drop a table; fails while other objects depend on it.
    pub fn drop_table(&mut self, name: &QualifiedName) -> Result<TableSchema, SchemaError> {
        self.get_table(name)?;
        self.ensure_no_dependents(name)?;
        self.tables
            .remove(name)
            .ok_or_else(|| SchemaError::not_found("table", name))
    }

    /// All table names, sorted.
    pub fn list_tables(&self) -> Vec<&QualifiedName> {
        self.tables.keys().collect()
    }

    /// All tables, sorted by name.
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> + '_ {
        self.tables.values()
    }

    /// Tables whose foreign keys point at `name` (excluding `name` itself).
    pub fn referencing_tables(&self, name: &QualifiedName) -> Vec<&TableSchema> {
        self.tables
            .values()
            .filter(|t| t.name != *name && t.foreign_keys().any(|fk| fk.references == *name))
            .collect()
    }

    pub fn create_sequence(&mut self, sequence: Sequence) -> Result<(), SchemaError> {
        self.check_new_object(&sequence.name)?;
        self.sequences.insert(sequence.name.clone(), sequence);
        Ok(())
    }

    pub fn get_sequence(&self, name: &QualifiedName) -> Result<&Sequence, SchemaError> {
        self.sequences
            .get(name)
            .ok_or_else(|| SchemaError::not_found("sequence", name))
    }

    pub fn drop_sequence(&mut self, name: &QualifiedName) -> Result<(), SchemaError> {
        self.get_sequence(name)?;
        self.ensure_no_dependents(name)?;
        self.sequences.remove(name);
        Ok(())
    }

    /// Advance a sequence.
    pub fn next_value(&self, name: &QualifiedName) -> Result<i64, SchemaError> {
        self.get_sequence(name)?.next_value()
    }

    pub fn create_view(&mut self, view: ViewDef) -> Result<(), SchemaError> {
        self.check_new_object(&view.name)?;
        self.views.insert(view.name.clone(), view);
        Ok(())
    }

    pub fn get_view(&self, name: &QualifiedName) -> Option<&ViewDef> {
        self.views.get(name)
    }

    pub fn drop_view(&mut self, name: &QualifiedName) -> Result<(), SchemaError> {
        if !self.views.contains_key(name) {
            return Err(SchemaError::not_found("view", name));
        }
        self.ensure_no_dependents(name)?;
        self.views.remove(name);
        Ok(())
    }

    pub fn list_views(&self) -> Vec<&QualifiedName> {
        self.views.keys().collect()
    }

    /// Objects that reference `name` through a foreign key, a column default
    /// or a view query.
    pub fn dependents_of(&self, name: &QualifiedName) -> Vec<QualifiedName> {
        let mut out: Vec<QualifiedName> = self
            .tables
            .values()
            .filter(|t| {
                t.name != *name
                    && (t.referenced_tables().contains(name)
                        || t.referenced_sequences().contains(name))
            })
            .map(|t| t.name.clone())
            .collect();
        out.extend(
            self.views
                .values()
                .filter(|v| v.dependencies.contains(name))
                .map(|v| v.name.clone()),
        );
        out.sort();
        out
    }

    fn ensure_no_dependents(&self, name: &QualifiedName) -> Result<(), SchemaError> {
        let dependents = self.dependents_of(name);
        if dependents.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::DependencyExists {
                object: name.to_string(),
                dependents: dependents.iter().map(|d| d.to_string()).collect(),
            })
        }
    }

    /// Take an owned snapshot of every exportable object.
    ///
    /// The default schema always exists and is not part of the snapshot.
    /// Objects in any other schema depend on that schema.
    pub fn snapshot(&self) -> CatalogSnapshot {
        let in_schema = |name: &QualifiedName| -> BTreeSet<ObjectId> {
            if name.schema == DEFAULT_SCHEMA {
                BTreeSet::new()
            } else {
                BTreeSet::from([ObjectId::schema(name.schema.clone())])
            }
        };

        let mut objects = Vec::new();

        for schema in self.schemas.iter().filter(|s| *s != DEFAULT_SCHEMA) {
            objects.push(CatalogObject {
                id: ObjectId::schema(schema.clone()),
                ddl: format!("CREATE SCHEMA {};", quote_ident(schema)),
                dependencies: BTreeSet::new(),
                columns: Vec::new(),
            });
        }

        for seq in self.sequences.values() {
            objects.push(CatalogObject {
                id: ObjectId::new(ObjectKind::Sequence, &seq.name),
                ddl: seq.to_ddl(),
                dependencies: in_schema(&seq.name),
                columns: Vec::new(),
            });
        }

        for table in self.tables.values() {
            let mut dependencies = in_schema(&table.name);
            dependencies.extend(
                table
                    .referenced_tables()
                    .iter()
                    .map(|t| ObjectId::new(ObjectKind::Table, t)),
            );
            dependencies.extend(
                table
                    .referenced_sequences()
                    .iter()
                    .map(|s| ObjectId::new(ObjectKind::Sequence, s)),
            );
            objects.push(CatalogObject {
                id: ObjectId::new(ObjectKind::Table, &table.name),
                ddl: table.to_ddl(),
                dependencies,
                columns: table.columns.clone(),
            });
        }

        for view in self.views.values() {
            let mut dependencies = in_schema(&view.name);
            for dep in &view.dependencies {
                let kind = if self.views.contains_key(dep) {
                    ObjectKind::View
                } else {
                    ObjectKind::Table
                };
                dependencies.insert(ObjectId::new(kind, dep));
            }
            objects.push(CatalogObject {
                id: ObjectId::new(ObjectKind::View, &view.name),
                ddl: view.to_ddl(),
                dependencies,
                columns: Vec::new(),
            });
        }

        CatalogSnapshot::new(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Constraint, DataType, ForeignKey, SchemaBuilder};

    fn accounts() -> TableSchema {
        SchemaBuilder::new(QualifiedName::main("accounts"))
            .add_column("acct_no", DataType::Integer)
            .add_column("owner", DataType::Text)
            .primary_key(&["acct_no"])
            .build()
            .unwrap()
    }

    fn ledger() -> TableSchema {
        SchemaBuilder::new(QualifiedName::main("ledger"))
            .add_column("entry", DataType::Integer)
            .add_column("acct_no", DataType::Integer)
            .constraint(Constraint::ForeignKey(ForeignKey {
                columns: vec!["acct_no".into()],
                references: QualifiedName::main("accounts"),
                referenced_columns: vec!["acct_no".into()],
            }))
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_and_get_table() {
        let mut catalog = Catalog::new();
        catalog.create_table(accounts()).unwrap();

        let schema = catalog.get_table(&QualifiedName::main("accounts")).unwrap();
        assert_eq!(schema.columns.len(), 2);
        assert!(matches!(
            catalog.create_table(accounts()),
            Err(SchemaError::AlreadyExists { kind: "table", .. })
        ));
    }

    #[test]
    fn test_table_in_missing_schema() {
        let mut catalog = Catalog::new();
        let schema = SchemaBuilder::new(QualifiedName::new("nowhere", "t1"))
            .add_column("c1", DataType::Integer)
            .build()
            .unwrap();
        assert!(matches!(
            catalog.create_table(schema),
            Err(SchemaError::NotFound { kind: "schema", .. })
        ));
    }

    #[test]
    fn test_foreign_key_requires_target() {
        let mut catalog = Catalog::new();
        assert!(catalog.create_table(ledger()).is_err());
        catalog.create_table(accounts()).unwrap();
        catalog.create_table(ledger()).unwrap();
    }

    #[test]
    fn test_drop_blocked_by_dependents() {
        let mut catalog = Catalog::new();
        catalog.create_table(accounts()).unwrap();
        catalog.create_table(ledger()).unwrap();

        let err = catalog.drop_table(&QualifiedName::main("accounts")).unwrap_err();
        assert!(matches!(err, SchemaError::DependencyExists { .. }));

        catalog.drop_table(&QualifiedName::main("ledger")).unwrap();
        catalog.drop_table(&QualifiedName::main("accounts")).unwrap();
        assert!(catalog.list_tables().is_empty());
    }

    #[test]
    fn test_drop_schema_cascade() {
        let mut catalog = Catalog::new();
        catalog.create_schema("staging", false).unwrap();
        let schema = SchemaBuilder::new(QualifiedName::new("staging", "raw"))
            .add_column("c1", DataType::Text)
            .build()
            .unwrap();
        catalog.create_table(schema).unwrap();

        assert!(matches!(
            catalog.drop_schema("staging", false),
            Err(SchemaError::SchemaNotEmpty(_))
        ));
        let dropped = catalog.drop_schema("staging", true).unwrap();
        assert_eq!(dropped, vec![QualifiedName::new("staging", "raw")]);
        assert!(!catalog.schema_exists("staging"));
        assert!(matches!(catalog.drop_schema("main", true), Err(SchemaError::DefaultSchema)));
    }

    #[test]
    fn test_snapshot_dependencies() {
        let mut catalog = Catalog::new();
        catalog.create_schema("billing", false).unwrap();
        catalog
            .create_sequence(Sequence::new(QualifiedName::new("billing", "ids"), 1, 1).unwrap())
            .unwrap();
        catalog.create_table(accounts()).unwrap();
        catalog.create_table(ledger()).unwrap();

        let snapshot = catalog.snapshot();
        assert_eq!(snapshot.len(), 4);

        let ledger = snapshot
            .get(&ObjectId::new(ObjectKind::Table, &QualifiedName::main("ledger")))
            .unwrap();
        assert!(ledger
            .dependencies
            .contains(&ObjectId::new(ObjectKind::Table, &QualifiedName::main("accounts"))));

        let seq = snapshot
            .get(&ObjectId::new(ObjectKind::Sequence, &QualifiedName::new("billing", "ids")))
            .unwrap();
        assert!(seq.dependencies.contains(&ObjectId::schema("billing")));
        assert_eq!(seq.ddl, "CREATE SEQUENCE billing.ids INCREMENT BY 1 START WITH 1;");
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut catalog = Catalog::new();
        catalog.create_table(accounts()).unwrap();
        let snapshot = catalog.snapshot();
        catalog.drop_table(&QualifiedName::main("accounts")).unwrap();
        assert_eq!(snapshot.tables().count(), 1);
    }
}
