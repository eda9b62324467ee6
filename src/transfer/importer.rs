//! Replays an export directory into a database.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::catalog::{ColumnDef, ObjectKind, QualifiedName};
use crate::executor::ExecuteError;
use crate::sql::{CreateTable, Parser, Statement};
use crate::storage::{Row, Value};
use crate::transfer::codec;
use crate::transfer::csv::{CsvError, CsvReader, CsvRecord};
use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::manifest::{CsvSettings, ManifestEntry, ManifestReader, MANIFEST_FILE};

/// What the importer needs from the database it loads into.
pub trait ImportTarget {
    /// Kind of the object currently using `name`, if any.
    fn object_kind(&self, name: &QualifiedName) -> Option<ObjectKind>;

    fn schema_exists(&self, name: &str) -> bool;

    /// Columns of an existing table, in order.
    fn table_columns(&self, name: &QualifiedName) -> Option<Vec<ColumnDef>>;

    /// Whether an existing table has the same layout as `create` would give
    /// it; the error explains the first difference.
    fn check_compatible(&self, create: &CreateTable) -> Result<(), String>;

    /// Run a replayed `CREATE` statement.
    fn execute_ddl(&mut self, statement: Statement) -> Result<(), ExecuteError>;

    /// Append already-typed rows, enforcing the table's constraints except
    /// foreign keys from the table to itself; a child row may arrive before
    /// its parent, so those wait for [`ImportTarget::check_self_references`].
    fn append_rows(&mut self, table: &QualifiedName, rows: Vec<Row>) -> Result<(), ExecuteError>;

    /// Check the foreign keys from `table` to itself over all of its rows.
    fn check_self_references(&self, table: &QualifiedName) -> Result<(), ExecuteError>;

    /// Remove the `count` most recently appended rows of `table`.
    fn discard_rows(&mut self, table: &QualifiedName, count: usize) -> Result<(), ExecuteError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Rows handed to the engine per append.
    pub batch_size: usize,
    /// Load into an existing table with the same layout instead of failing.
    pub allow_existing_compatible_tables: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: 1024,
            allow_existing_compatible_tables: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Objects created.
    pub objects: usize,
    /// Tables that received data.
    pub tables: usize,
    pub rows: u64,
    /// Entries whose DDL was skipped because the object already existed.
    pub reused: usize,
}

/// Import `dir` into `target`, entry by entry.
///
/// Stops at the first failing entry; everything created before it stays. A
/// data file loads completely or not at all.
pub fn import_database<T: ImportTarget + ?Sized>(
    target: &mut T,
    dir: &Path,
    options: &ImportOptions,
) -> TransferResult<ImportSummary> {
    let manifest = ManifestReader::read(dir)?;
    info!(dir = %dir.display(), entries = manifest.entries.len(), "import started");

    let mut summary = ImportSummary::default();
    for (index, entry) in manifest.entries.iter().enumerate() {
        let (created, name) = replay_entry(target, dir, index, entry, options)?;
        if created {
            summary.objects += 1;
        } else {
            summary.reused += 1;
        }
        if let Some(data) = &entry.data {
            let rows = load_data_file(target, dir, &manifest.csv, index, entry, data, &name, options)?;
            summary.tables += 1;
            summary.rows += rows;
        }
    }

    info!(
        objects = summary.objects,
        tables = summary.tables,
        rows = summary.rows,
        "import finished"
    );
    Ok(summary)
}

fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

/// Kind and name of the object a CREATE statement makes.
fn created_object(statement: &Statement) -> Option<(ObjectKind, QualifiedName)> {
    match statement {
        Statement::CreateSchema { name, .. } => Some((ObjectKind::Schema, QualifiedName::new(name.clone(), ""))),
        Statement::CreateTable(create) => Some((ObjectKind::Table, create.name.qualified())),
        Statement::CreateSequence(create) => Some((ObjectKind::Sequence, create.name.qualified())),
        Statement::CreateView(create) => Some((ObjectKind::View, create.name.qualified())),
        _ => None,
    }
}

fn parse_entry(dir: &Path, index: usize, entry: &ManifestEntry) -> TransferResult<(Statement, ObjectKind, QualifiedName)> {
    let statement = Parser::parse(&entry.ddl).map_err(|e| {
        TransferError::manifest(manifest_path(dir), Some(index), format!("ddl does not parse: {}", e))
    })?;
    let (kind, name) = created_object(&statement).ok_or_else(|| {
        TransferError::manifest(
            manifest_path(dir),
            Some(index),
            format!("expected a CREATE statement, found {}", statement.kind()),
        )
    })?;

    let mismatch = |field: &str, listed: &str, actual: &str| {
        TransferError::manifest(
            manifest_path(dir),
            Some(index),
            format!("entry {} is {:?} but the ddl creates {:?}", field, listed, actual),
        )
    };
    if let Some(listed) = entry.kind {
        if listed != kind {
            return Err(mismatch("kind", listed.as_str(), kind.as_str()));
        }
    }
    if let Some(listed) = &entry.schema {
        if *listed != name.schema {
            return Err(mismatch("schema", listed, &name.schema));
        }
    }
    if let Some(listed) = &entry.name {
        let actual = if kind == ObjectKind::Schema { &name.schema } else { &name.name };
        if listed != actual {
            return Err(mismatch("name", listed, actual));
        }
    }
    if entry.data.is_some() && kind != ObjectKind::Table {
        return Err(TransferError::manifest(
            manifest_path(dir),
            Some(index),
            format!("a {} cannot have a data file", kind),
        ));
    }
    Ok((statement, kind, name))
}

/// Run one entry's DDL. The flag is false when an existing object was reused.
fn replay_entry<T: ImportTarget + ?Sized>(
    target: &mut T,
    dir: &Path,
    index: usize,
    entry: &ManifestEntry,
    options: &ImportOptions,
) -> TransferResult<(bool, QualifiedName)> {
    let (statement, kind, name) = parse_entry(dir, index, entry)?;
    let label = if kind == ObjectKind::Schema {
        format!("schema {}", name.schema)
    } else {
        format!("{} {}", kind, name)
    };

    if kind == ObjectKind::Schema {
        if target.schema_exists(&name.schema) {
            debug!(schema = %name.schema, "schema already exists");
            return Ok((false, name));
        }
    } else if let Some(existing) = target.object_kind(&name) {
        let conflict = |reason: String| TransferError::CatalogConflict {
            entry: index,
            object: label.clone(),
            reason,
        };
        return match (&statement, existing) {
            (Statement::CreateTable(create), ObjectKind::Table) if options.allow_existing_compatible_tables => {
                target
                    .check_compatible(create)
                    .map_err(|diff| conflict(format!("existing table differs: {}", diff)))?;
                debug!(table = %name, "loading into existing compatible table");
                Ok((false, name.clone()))
            }
            _ => Err(conflict(format!("a {} with this name already exists", existing))),
        };
    }

    debug!(entry = index, object = %label, "replaying ddl");
    target
        .execute_ddl(statement)
        .map_err(|source| TransferError::Engine {
            entry: index,
            context: entry.ddl.clone(),
            source: Box::new(source),
        })?;
    Ok((true, name))
}

#[allow(clippy::too_many_arguments)]
fn load_data_file<T: ImportTarget + ?Sized>(
    target: &mut T,
    dir: &Path,
    csv: &CsvSettings,
    index: usize,
    entry: &ManifestEntry,
    data: &str,
    table: &QualifiedName,
    options: &ImportOptions,
) -> TransferResult<u64> {
    let path = dir.join(data);
    let columns = target.table_columns(table).ok_or_else(|| TransferError::CatalogConflict {
        entry: index,
        object: format!("table {}", table),
        reason: "table does not exist after replaying its ddl".into(),
    })?;

    let file = File::open(&path).map_err(|source| TransferError::IoRead {
        path: path.clone(),
        source,
    })?;
    let mut reader = CsvReader::new(BufReader::new(file), csv.delimiter);
    let next = |reader: &mut CsvReader<BufReader<File>>| -> TransferResult<Option<CsvRecord>> {
        reader.next_record().map_err(|e| match e {
            CsvError::Io(source) => TransferError::IoRead {
                path: path.clone(),
                source,
            },
            CsvError::Malformed { line, reason } => TransferError::MalformedDataFile {
                path: path.clone(),
                line,
                reason,
            },
        })
    };
    let check_width = |record: &CsvRecord| {
        if record.fields.len() == columns.len() {
            Ok(())
        } else {
            Err(TransferError::MalformedDataFile {
                path: path.clone(),
                line: record.line,
                reason: format!(
                    "expected {} fields for {}, found {}",
                    columns.len(),
                    table,
                    record.fields.len()
                ),
            })
        }
    };

    if csv.header {
        match next(&mut reader)? {
            Some(header) => {
                check_width(&header)?;
                let names: Vec<&str> = header.fields.iter().map(|f| f.text.as_str()).collect();
                let expected: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
                if names != expected {
                    warn!(
                        file = %path.display(),
                        header = ?names,
                        columns = ?expected,
                        "data file header does not match the table columns; loading by position"
                    );
                }
            }
            None => {
                warn!(file = %path.display(), "data file is empty, expected a header");
            }
        }
    }

    let batch_size = options.batch_size.max(1);
    let engine = |source: ExecuteError| TransferError::Engine {
        entry: index,
        context: format!("loading {}", data),
        source: Box::new(source),
    };
    let flush = |target: &mut T, batch: &mut Vec<Row>| target.append_rows(table, std::mem::take(batch)).map_err(engine);

    // rows appended so far; removed again if the file does not load completely
    let mut appended = 0usize;
    let outcome = (|| -> TransferResult<u64> {
        let mut batch: Vec<Row> = Vec::with_capacity(batch_size);
        let mut loaded = 0u64;
        let mut last_line = 0;
        while let Some(record) = next(&mut reader)? {
            check_width(&record)?;
            last_line = record.line;
            let row_number = loaded + 1;
            let row = record
                .fields
                .into_iter()
                .zip(&columns)
                .map(|(field, column)| {
                    if field.text.is_empty() && !field.quoted {
                        return Ok(Value::Null);
                    }
                    codec::decode(column.data_type, &field.text).map_err(|reason| TransferError::TypeCoercion {
                        path: path.clone(),
                        row: row_number,
                        line: record.line,
                        column: column.name.clone(),
                        value: field.text.clone(),
                        reason,
                    })
                })
                .collect::<TransferResult<Row>>()?;
            batch.push(row);
            loaded += 1;
            if batch.len() >= batch_size {
                let size = batch.len();
                flush(target, &mut batch)?;
                appended += size;
            }
        }
        if !batch.is_empty() {
            let size = batch.len();
            flush(target, &mut batch)?;
            appended += size;
        }

        if let Some(expected) = entry.rows {
            if expected != loaded {
                return Err(TransferError::MalformedDataFile {
                    path: path.clone(),
                    line: last_line,
                    reason: format!("manifest lists {} rows, file holds {}", expected, loaded),
                });
            }
        }
        target.check_self_references(table).map_err(engine)?;
        Ok(loaded)
    })();

    let loaded = match outcome {
        Ok(loaded) => loaded,
        Err(e) => {
            if appended > 0 {
                match target.discard_rows(table, appended) {
                    Ok(()) => debug!(table = %table, rows = appended, "removed rows of the failed load"),
                    Err(cleanup) => warn!(table = %table, error = %cleanup, "could not remove rows of the failed load"),
                }
            }
            return Err(e);
        }
    };

    info!(table = %table, rows = loaded, file = data, "table imported");
    Ok(loaded)
}
