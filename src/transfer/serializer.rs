//! Streams table rows into CSV data files.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::catalog::{CatalogObject, ObjectId, ObjectKind, DEFAULT_SCHEMA};
use crate::transfer::codec;
use crate::transfer::csv::CsvWriter;
use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::manifest::CsvSettings;
use crate::transfer::ExportSource;

/// A finished data file.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedTable {
    pub id: ObjectId,
    /// File name relative to the export directory.
    pub file: String,
    pub rows: u64,
}

/// Proof that every table of an export has been written, flushed and synced.
///
/// Only [`TableSerializer::serialize_all`] constructs this.
#[derive(Debug)]
pub struct SerializedTables {
    csv: CsvSettings,
    tables: Vec<SerializedTable>,
}

impl SerializedTables {
    pub fn csv(&self) -> &CsvSettings {
        &self.csv
    }

    pub fn get(&self, id: &ObjectId) -> Option<&SerializedTable> {
        self.tables.iter().find(|t| &t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SerializedTable> + '_ {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// File name for each table, in walk order.
///
/// `<name>.csv` in the default schema, `<schema>_<name>.csv` elsewhere,
/// folded to `[a-z0-9_]`; a clash gets `_1`, `_2`, ... appended.
pub fn data_file_names<'a>(objects: impl IntoIterator<Item = &'a ObjectId>) -> Vec<String> {
    let mut used = HashSet::new();
    let mut names = Vec::new();
    for id in objects {
        let raw = if id.schema == DEFAULT_SCHEMA {
            id.name.clone()
        } else {
            format!("{}_{}", id.schema, id.name)
        };
        let stem: String = raw
            .chars()
            .map(|c| {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        let mut candidate = stem.clone();
        let mut suffix = 1;
        while !used.insert(candidate.clone()) {
            candidate = format!("{}_{}", stem, suffix);
            suffix += 1;
        }
        names.push(format!("{}.csv", candidate));
    }
    names
}

/// Writes table data files into one directory.
pub struct TableSerializer<'a, S: ExportSource + ?Sized> {
    source: &'a S,
    dir: &'a Path,
    csv: CsvSettings,
}

impl<'a, S: ExportSource + ?Sized> TableSerializer<'a, S> {
    pub fn new(source: &'a S, dir: &'a Path, csv: CsvSettings) -> Self {
        Self { source, dir, csv }
    }

    /// Stream one table into `dir/file`, one row in memory at a time.
    /// Returns the number of rows written.
    pub fn write_table(&self, object: &CatalogObject, file: &str) -> TransferResult<u64> {
        let path = self.dir.join(file);
        let write_err = |source: io::Error| TransferError::IoWrite {
            path: path.clone(),
            source,
        };

        let handle = File::create(&path).map_err(write_err)?;
        let mut writer = CsvWriter::new(BufWriter::new(handle), self.csv.delimiter);
        if self.csv.header {
            writer
                .write_record(object.columns.iter().map(|c| Some(c.name.as_str())))
                .map_err(write_err)?;
        }

        let mut rows = 0u64;
        let mut fields: Vec<Option<String>> = Vec::with_capacity(object.columns.len());
        match self.source.scan_table(&object.id.qualified()) {
            Some(scan) => {
                for row in scan {
                    fields.clear();
                    fields.extend(row.iter().map(codec::encode));
                    writer
                        .write_record(fields.iter().map(|f| f.as_deref()))
                        .map_err(write_err)?;
                    rows += 1;
                }
            }
            None => warn!(table = %object.id, "no row storage for table, exporting it empty"),
        }

        let mut buffered = writer.into_inner();
        buffered.flush().map_err(write_err)?;
        let handle = buffered.into_inner().map_err(|e| write_err(e.into_error()))?;
        handle.sync_all().map_err(write_err)?;

        info!(table = %object.id.qualified(), rows, file, "table exported");
        Ok(rows)
    }

    /// Write every table in `objects`, on up to `threads` worker threads.
    ///
    /// Files are independent, so worker order does not matter; the result
    /// lists tables in `objects` order either way. The first failure in that
    /// order is returned.
    pub fn serialize_all(self, objects: &[CatalogObject], threads: usize) -> TransferResult<SerializedTables> {
        let tables: Vec<&CatalogObject> = objects.iter().filter(|o| o.id.kind == ObjectKind::Table).collect();
        let files = data_file_names(tables.iter().map(|o| &o.id));
        let jobs: Vec<(&CatalogObject, String)> = tables.into_iter().zip(files).collect();

        let pool = if threads > 1 && jobs.len() > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!(error = %e, "could not start export workers, writing tables sequentially");
                    None
                }
            }
        } else {
            None
        };

        let rows: Vec<u64> = match pool {
            Some(pool) => pool.install(|| {
                jobs.par_iter()
                    .map(|(object, file)| self.write_table(object, file))
                    .collect::<TransferResult<Vec<_>>>()
            })?,
            None => jobs
                .iter()
                .map(|(object, file)| self.write_table(object, file))
                .collect::<TransferResult<Vec<_>>>()?,
        };

        let tables = jobs
            .into_iter()
            .zip(rows)
            .map(|((object, file), rows)| SerializedTable {
                id: object.id.clone(),
                file,
                rows,
            })
            .collect();

        Ok(SerializedTables { csv: self.csv, tables })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogSnapshot, ColumnDef, DataType, QualifiedName};
    use crate::storage::{Row, Value};
    use crate::transfer::RowScan;
    use std::borrow::Cow;
    use std::collections::BTreeMap;
    use std::io::BufRead;
    use tempfile::TempDir;

    struct Fixture {
        objects: Vec<CatalogObject>,
        rows: BTreeMap<QualifiedName, Vec<Row>>,
    }

    impl ExportSource for Fixture {
        fn catalog_snapshot(&self) -> CatalogSnapshot {
            CatalogSnapshot::new(self.objects.clone())
        }

        fn scan_table(&self, table: &QualifiedName) -> Option<RowScan<'_>> {
            self.rows
                .get(table)
                .map(|rows| Box::new(rows.iter().map(Cow::Borrowed)) as RowScan<'_>)
        }
    }

    /// Produces its rows on demand; nothing is stored.
    struct Generated {
        object: CatalogObject,
        count: i64,
    }

    impl ExportSource for Generated {
        fn catalog_snapshot(&self) -> CatalogSnapshot {
            CatalogSnapshot::new(vec![self.object.clone()])
        }

        fn scan_table(&self, table: &QualifiedName) -> Option<RowScan<'_>> {
            (*table == self.object.id.qualified()).then(|| {
                Box::new((0..self.count).map(|i| Cow::Owned(vec![Value::Integer(i), Value::Text(format!("row {}", i))])))
                    as RowScan<'_>
            })
        }
    }

    fn table(schema: &str, name: &str, columns: Vec<ColumnDef>) -> CatalogObject {
        CatalogObject {
            id: ObjectId::new(ObjectKind::Table, &QualifiedName::new(schema, name)),
            ddl: String::new(),
            dependencies: Default::default(),
            columns,
        }
    }

    fn fixture() -> Fixture {
        let mut rows = BTreeMap::new();
        rows.insert(
            QualifiedName::main("things"),
            vec![
                vec![Value::Integer(1), Value::Text("a,b".into())],
                vec![Value::Null, Value::Text(String::new())],
                vec![Value::Integer(-7), Value::Null],
            ],
        );
        rows.insert(QualifiedName::new("s", "things"), vec![vec![Value::Float(0.5)]]);
        Fixture {
            objects: vec![
                table(
                    "main",
                    "things",
                    vec![ColumnDef::new("id", DataType::Integer), ColumnDef::new("label", DataType::Text)],
                ),
                table("s", "things", vec![ColumnDef::new("x", DataType::Float)]),
            ],
            rows,
        }
    }

    #[test]
    fn test_file_names() {
        let ids = [
            ObjectId::new(ObjectKind::Table, &QualifiedName::main("Orders")),
            ObjectId::new(ObjectKind::Table, &QualifiedName::new("s", "t")),
            ObjectId::new(ObjectKind::Table, &QualifiedName::main("s_t")),
            ObjectId::new(ObjectKind::Table, &QualifiedName::main("odd name!")),
        ];
        assert_eq!(
            data_file_names(ids.iter()),
            vec!["orders.csv", "s_t.csv", "s_t_1.csv", "odd_name_.csv"]
        );
    }

    #[test]
    fn test_write_table() {
        let dir = TempDir::new().unwrap();
        let source = fixture();
        let serializer = TableSerializer::new(&source, dir.path(), CsvSettings::default());
        let rows = serializer.write_table(&source.objects[0], "things.csv").unwrap();
        assert_eq!(rows, 3);
        let text = std::fs::read_to_string(dir.path().join("things.csv")).unwrap();
        assert_eq!(text, "id,label\n1,\"a,b\"\n,\"\"\n-7,\n");
    }

    #[test]
    fn test_streams_generated_rows() {
        let dir = TempDir::new().unwrap();
        let source = Generated {
            object: table(
                "main",
                "big",
                vec![ColumnDef::new("n", DataType::Integer), ColumnDef::new("label", DataType::Text)],
            ),
            count: 250_000,
        };
        let serializer = TableSerializer::new(&source, dir.path(), CsvSettings::default());
        assert_eq!(serializer.write_table(&source.object, "big.csv").unwrap(), 250_000);

        let file = std::io::BufReader::new(File::open(dir.path().join("big.csv")).unwrap());
        let mut count = 0;
        let mut last = String::new();
        for (i, line) in file.lines().enumerate() {
            let line = line.unwrap();
            match i {
                0 => assert_eq!(line, "n,label"),
                1 => assert_eq!(line, "0,row 0"),
                _ => {}
            }
            count += 1;
            last = line;
        }
        assert_eq!(count, 250_001);
        assert_eq!(last, "249999,row 249999");
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let source = fixture();
        let sequential = TempDir::new().unwrap();
        let parallel = TempDir::new().unwrap();

        let a = TableSerializer::new(&source, sequential.path(), CsvSettings::default())
            .serialize_all(&source.objects, 1)
            .unwrap();
        let b = TableSerializer::new(&source, parallel.path(), CsvSettings::default())
            .serialize_all(&source.objects, 4)
            .unwrap();

        assert_eq!(a.iter().collect::<Vec<_>>(), b.iter().collect::<Vec<_>>());
        assert_eq!(a.total_rows(), 4);
        for table in a.iter() {
            let left = std::fs::read(sequential.path().join(&table.file)).unwrap();
            let right = std::fs::read(parallel.path().join(&table.file)).unwrap();
            assert_eq!(left, right);
        }
        assert_eq!(b.get(&source.objects[1].id).unwrap().file, "s_things.csv");
    }

    #[test]
    fn test_write_failure_is_io_write() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let source = fixture();
        let serializer = TableSerializer::new(&source, &missing, CsvSettings::default());
        match serializer.write_table(&source.objects[0], "things.csv") {
            Err(TransferError::IoWrite { path, .. }) => assert_eq!(path, missing.join("things.csv")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
