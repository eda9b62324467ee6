//! Dependency ordering of catalog objects.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::catalog::{CatalogObject, CatalogSnapshot, ObjectId};
use crate::transfer::error::{TransferError, TransferResult};

/// Which schemas an export covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SchemaFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl SchemaFilter {
    pub fn includes(&self, schema: &str) -> bool {
        match self {
            SchemaFilter::All => true,
            SchemaFilter::Only(names) => names.contains(schema),
        }
    }
}

/// Order the snapshot's objects so that every dependency comes first.
///
/// Kahn's algorithm; among objects that are ready at the same time the
/// smallest [`ObjectId`] goes first, so the output depends only on the
/// catalog contents. A dependency on an object the filter leaves out is an
/// `ExcludedDependency` error, since the export would not import into an
/// empty catalog; a self-reference (a table with a foreign key to itself)
/// is not an ordering constraint.
pub fn walk_catalog(snapshot: &CatalogSnapshot, filter: &SchemaFilter) -> TransferResult<Vec<CatalogObject>> {
    let selected: BTreeMap<&ObjectId, &CatalogObject> = snapshot
        .objects
        .iter()
        .filter(|o| filter.includes(&o.id.schema))
        .map(|o| (&o.id, o))
        .collect();

    let mut pending: BTreeMap<&ObjectId, usize> = selected.keys().map(|id| (*id, 0)).collect();
    let mut dependents: BTreeMap<&ObjectId, Vec<&ObjectId>> = BTreeMap::new();

    for (id, object) in &selected {
        for dep in &object.dependencies {
            if dep == *id {
                continue;
            }
            match selected.get_key_value(dep) {
                Some((dep, _)) => {
                    *pending.entry(*id).or_default() += 1;
                    dependents.entry(*dep).or_default().push(*id);
                }
                None if !filter.includes(&dep.schema) => {
                    return Err(TransferError::ExcludedDependency {
                        object: id.to_string(),
                        dependency: dep.to_string(),
                    })
                }
                None => warn!(object = %id, dependency = %dep, "dependency is missing from the catalog"),
            }
        }
    }

    let mut ready: BTreeSet<&ObjectId> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut ordered = Vec::with_capacity(selected.len());

    while let Some(id) = ready.pop_first() {
        ordered.push(selected[id].clone());
        pending.remove(id);
        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if !pending.is_empty() {
        return Err(TransferError::CyclicDependency {
            objects: cycle_members(&pending, &dependents),
        });
    }

    debug!(objects = ordered.len(), "catalog walk complete");
    Ok(ordered)
}

/// Narrow the unresolved objects down to those on a cycle by repeatedly
/// discarding objects nothing unresolved depends on.
fn cycle_members(
    pending: &BTreeMap<&ObjectId, usize>,
    dependents: &BTreeMap<&ObjectId, Vec<&ObjectId>>,
) -> Vec<String> {
    let mut remaining: BTreeSet<&ObjectId> = pending.keys().copied().collect();
    loop {
        let leaves: Vec<&ObjectId> = remaining
            .iter()
            .filter(|id| {
                !dependents
                    .get(**id)
                    .into_iter()
                    .flatten()
                    .any(|d| remaining.contains(d))
            })
            .copied()
            .collect();
        if leaves.is_empty() {
            break;
        }
        for leaf in leaves {
            remaining.remove(leaf);
        }
    }
    remaining.iter().map(|id| id.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ObjectKind, QualifiedName};

    fn object(kind: ObjectKind, schema: &str, name: &str, deps: &[ObjectId]) -> CatalogObject {
        let id = if kind == ObjectKind::Schema {
            ObjectId::schema(schema)
        } else {
            ObjectId::new(kind, &QualifiedName::new(schema, name))
        };
        CatalogObject {
            id,
            ddl: format!("CREATE {} {};", kind, name),
            dependencies: deps.iter().cloned().collect(),
            columns: Vec::new(),
        }
    }

    fn table(schema: &str, name: &str) -> ObjectId {
        ObjectId::new(ObjectKind::Table, &QualifiedName::new(schema, name))
    }

    fn names(objects: &[CatalogObject]) -> Vec<String> {
        objects.iter().map(|o| o.id.to_string()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let seq = ObjectId::new(ObjectKind::Sequence, &QualifiedName::main("zz_ids"));
        let snapshot = CatalogSnapshot::new(vec![
            object(ObjectKind::View, "main", "a_view", &[table("main", "b_child")]),
            object(ObjectKind::Table, "main", "b_child", &[table("main", "c_parent"), seq.clone()]),
            object(ObjectKind::Table, "main", "c_parent", &[]),
            object(ObjectKind::Sequence, "main", "zz_ids", &[]),
        ]);
        let ordered = walk_catalog(&snapshot, &SchemaFilter::All).unwrap();
        assert_eq!(
            names(&ordered),
            vec![
                "table main.c_parent",
                "sequence main.zz_ids",
                "table main.b_child",
                "view main.a_view"
            ]
        );
    }

    #[test]
    fn test_order_ignores_input_order() {
        let mut objects = vec![
            object(ObjectKind::Schema, "s", "", &[]),
            object(ObjectKind::Table, "s", "t", &[ObjectId::schema("s")]),
            object(ObjectKind::Table, "main", "b", &[]),
            object(ObjectKind::Table, "main", "a", &[]),
        ];
        let first = walk_catalog(&CatalogSnapshot::new(objects.clone()), &SchemaFilter::All).unwrap();
        objects.reverse();
        let second = walk_catalog(&CatalogSnapshot::new(objects), &SchemaFilter::All).unwrap();
        assert_eq!(first, second);
        assert_eq!(names(&first), vec!["table main.a", "table main.b", "schema s", "table s.t"]);
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        let snapshot = CatalogSnapshot::new(vec![object(
            ObjectKind::Table,
            "main",
            "tree",
            &[table("main", "tree")],
        )]);
        assert_eq!(walk_catalog(&snapshot, &SchemaFilter::All).unwrap().len(), 1);
    }

    #[test]
    fn test_cycle_is_reported() {
        let snapshot = CatalogSnapshot::new(vec![
            object(ObjectKind::Table, "main", "a", &[table("main", "b")]),
            object(ObjectKind::Table, "main", "b", &[table("main", "a")]),
            object(ObjectKind::Table, "main", "c", &[table("main", "a")]),
            object(ObjectKind::Table, "main", "d", &[]),
        ]);
        match walk_catalog(&snapshot, &SchemaFilter::All) {
            Err(TransferError::CyclicDependency { objects }) => {
                assert_eq!(objects, vec!["table main.a", "table main.b"]);
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_filter() {
        let snapshot = CatalogSnapshot::new(vec![
            object(ObjectKind::Schema, "s", "", &[]),
            object(ObjectKind::Table, "s", "t", &[ObjectId::schema("s"), table("main", "p")]),
            object(ObjectKind::Table, "main", "p", &[]),
        ]);
        let both = SchemaFilter::Only(BTreeSet::from(["s".to_string(), "main".to_string()]));
        let ordered = walk_catalog(&snapshot, &both).unwrap();
        assert_eq!(names(&ordered), vec!["table main.p", "schema s", "table s.t"]);

        let only_main = SchemaFilter::Only(BTreeSet::from(["main".to_string()]));
        assert_eq!(names(&walk_catalog(&snapshot, &only_main).unwrap()), vec!["table main.p"]);

        let only_s = SchemaFilter::Only(BTreeSet::from(["s".to_string()]));
        match walk_catalog(&snapshot, &only_s) {
            Err(TransferError::ExcludedDependency { object, dependency }) => {
                assert_eq!(object, "table s.t");
                assert_eq!(dependency, "table main.p");
            }
            other => panic!("expected an excluded dependency, got {:?}", other),
        }
    }
}
