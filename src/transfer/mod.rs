//! EXPORT DATABASE / IMPORT DATABASE.
//!
//! Export runs in two phases over an owned [`CatalogSnapshot`]:
//!
//! ```text
//!  catalog snapshot ──► walk_catalog ──► TableSerializer ──► ManifestWriter
//!                      (dependency      (one CSV file       (manifest.json,
//!                       order)           per table)          written last)
//! ```
//!
//! Phase 1 writes, flushes and syncs every data file and yields
//! [`SerializedTables`]; phase 2 ([`ManifestWriter`]) can only be built from
//! that value. Import reads the manifest back and replays it through an
//! [`ImportTarget`]: each `CREATE` in order, each table's data right after
//! its `CREATE`.

pub mod codec;
mod csv;
mod error;
mod importer;
mod manifest;
mod serializer;
mod walker;

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::catalog::{CatalogSnapshot, ObjectId, QualifiedName, DEFAULT_SCHEMA};
use crate::storage::Row;

pub use self::csv::{format_record, CsvReader, CsvWriter};
pub use error::{TransferError, TransferResult};
pub use importer::{import_database, ImportOptions, ImportSummary, ImportTarget};
pub use manifest::{CsvSettings, Manifest, ManifestEntry, ManifestReader, ManifestWriter, MANIFEST_FILE};
pub use serializer::{data_file_names, SerializedTable, SerializedTables, TableSerializer};
pub use walker::{walk_catalog, SchemaFilter};

/// What export reads from a database.
///
/// `Sync` so tables can be serialized from several threads at once.
pub trait ExportSource: Sync {
    /// Owned copy of the catalog at the start of the export.
    fn catalog_snapshot(&self) -> CatalogSnapshot;

    /// Rows of a table in storage order; `None` if the table has no storage.
    fn scan_table(&self, table: &QualifiedName) -> Option<RowScan<'_>>;
}

/// A table scan. Rows are borrowed from storage or produced one at a time.
pub type RowScan<'a> = Box<dyn Iterator<Item = Cow<'a, Row>> + 'a>;

/// Options of one export, from `EXPORT DATABASE '<dir>' (...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub delimiter: char,
    pub header: bool,
    pub schemas: SchemaFilter,
    pub threads: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            header: true,
            schemas: SchemaFilter::All,
            threads: 1,
        }
    }
}

impl ExportOptions {
    /// Apply `KEY value` pairs on top of `self`. Keys are upper case.
    pub fn with_pairs(mut self, pairs: &[(String, String)]) -> TransferResult<Self> {
        for (key, value) in pairs {
            match key.as_str() {
                "FORMAT" => {
                    if !value.eq_ignore_ascii_case("csv") {
                        return Err(TransferError::option(key.clone(), format!("unsupported format {:?}", value)));
                    }
                }
                "DELIMITER" => self.delimiter = parse_delimiter(value)?,
                "HEADER" => {
                    self.header = match value.to_ascii_lowercase().as_str() {
                        "true" | "on" | "1" => true,
                        "false" | "off" | "0" => false,
                        _ => return Err(TransferError::option(key.clone(), format!("expected a boolean, found {:?}", value))),
                    }
                }
                "SCHEMA" => {
                    let mut names = match std::mem::take(&mut self.schemas) {
                        SchemaFilter::All => BTreeSet::new(),
                        SchemaFilter::Only(names) => names,
                    };
                    names.insert(value.clone());
                    self.schemas = SchemaFilter::Only(names);
                }
                "THREADS" => {
                    self.threads = value
                        .parse::<usize>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| TransferError::option(key.clone(), format!("expected a positive integer, found {:?}", value)))?;
                }
                _ => return Err(TransferError::option(key.clone(), "unknown option")),
            }
        }
        Ok(self)
    }

    fn csv(&self) -> CsvSettings {
        CsvSettings {
            delimiter: self.delimiter,
            header: self.header,
            ..CsvSettings::default()
        }
    }
}

fn parse_delimiter(value: &str) -> TransferResult<char> {
    let delimiter = match value {
        "\\t" => '\t',
        _ => {
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => return Err(TransferError::option("DELIMITER", format!("expected one character, found {:?}", value))),
            }
        }
    };
    if matches!(delimiter, '"' | '\r' | '\n') {
        return Err(TransferError::option("DELIMITER", format!("{:?} cannot be a delimiter", delimiter)));
    }
    Ok(delimiter)
}

/// Result of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub objects: usize,
    pub tables: usize,
    pub rows: u64,
    pub manifest: PathBuf,
}

/// Export every selected object of `source` into `dir`.
///
/// The directory is created if needed. On failure, files written so far are
/// left in place, but a manifest is only present if the export completed.
pub fn export_database<S: ExportSource + ?Sized>(
    source: &S,
    dir: &Path,
    options: &ExportOptions,
) -> TransferResult<ExportSummary> {
    let snapshot = source.catalog_snapshot();
    if let SchemaFilter::Only(names) = &options.schemas {
        for name in names {
            if name != DEFAULT_SCHEMA && snapshot.get(&ObjectId::schema(name.clone())).is_none() {
                return Err(TransferError::option("SCHEMA", format!("schema {} does not exist", name)));
            }
        }
    }
    let objects = walk_catalog(&snapshot, &options.schemas)?;
    info!(dir = %dir.display(), objects = objects.len(), threads = options.threads, "export started");

    fs::create_dir_all(dir).map_err(|source| TransferError::IoWrite {
        path: dir.to_path_buf(),
        source,
    })?;
    let stale = dir.join(MANIFEST_FILE);
    match fs::remove_file(&stale) {
        Ok(()) => debug!(path = %stale.display(), "removed manifest of an earlier export"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => return Err(TransferError::IoWrite { path: stale, source }),
    }

    let tables = TableSerializer::new(source, dir, options.csv()).serialize_all(&objects, options.threads)?;
    let (table_count, rows) = (tables.len(), tables.total_rows());
    let manifest = ManifestWriter::new(&objects, tables).write(dir)?;

    info!(objects = objects.len(), tables = table_count, rows, "export finished");
    Ok(ExportSummary {
        objects: objects.len(),
        tables: table_count,
        rows,
        manifest,
    })
}
