//! The export manifest: `manifest.json` in the export directory.
//!
//! ```json
//! {
//!   "format": "portdb-export",
//!   "version": 1,
//!   "csv": { "delimiter": ",", "quote": "\"", "header": true },
//!   "entries": [
//!     { "kind": "table", "schema": "main", "name": "t",
//!       "ddl": "CREATE TABLE t(i INTEGER);", "data": "t.csv", "rows": 3 }
//!   ]
//! }
//! ```
//!
//! Only `entries[].ddl` is required on read, so hand-written manifests that
//! point at externally produced CSV files import as well.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{CatalogObject, ObjectKind};
use crate::transfer::csv::QUOTE;
use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::serializer::SerializedTables;

/// Fixed file name of the manifest inside an export directory.
pub const MANIFEST_FILE: &str = "manifest.json";
pub const FORMAT_NAME: &str = "portdb-export";
pub const FORMAT_VERSION: u32 = 1;

/// CSV dialect shared by every data file of one export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvSettings {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_quote")]
    pub quote: char,
    #[serde(default = "default_true")]
    pub header: bool,
}

fn default_delimiter() -> char {
    ','
}

fn default_quote() -> char {
    QUOTE
}

fn default_true() -> bool {
    true
}

fn default_format() -> String {
    FORMAT_NAME.to_string()
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

impl Default for CsvSettings {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            quote: default_quote(),
            header: true,
        }
    }
}

/// Parsed manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub csv: CsvSettings,
    pub entries: Vec<ManifestEntry>,
}

/// One DDL statement and, for tables, its data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ObjectKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub ddl: String,
    /// Path of the data file, relative to the export directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
}

/// Builds the manifest once every data file is complete.
///
/// The only way to obtain [`SerializedTables`] is to run the table
/// serializer to completion, so a manifest can never reference a data file
/// that is still being written.
pub struct ManifestWriter {
    manifest: Manifest,
}

impl ManifestWriter {
    /// Entries follow `objects` order; tables pick up their file and row count.
    pub fn new(objects: &[CatalogObject], tables: SerializedTables) -> Self {
        let entries = objects
            .iter()
            .map(|object| {
                let file = tables.get(&object.id);
                let (schema, name) = match object.id.kind {
                    ObjectKind::Schema => (object.id.schema.clone(), None),
                    _ => (object.id.schema.clone(), Some(object.id.name.clone())),
                };
                ManifestEntry {
                    kind: Some(object.id.kind),
                    schema: Some(schema),
                    name,
                    ddl: object.ddl.clone(),
                    data: file.map(|f| f.file.clone()),
                    rows: file.map(|f| f.rows),
                }
            })
            .collect();

        Self {
            manifest: Manifest {
                format: FORMAT_NAME.to_string(),
                version: FORMAT_VERSION,
                csv: tables.csv().clone(),
                entries,
            },
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Write `manifest.json` into `dir` through a temporary file and a rename.
    pub fn write(&self, dir: &Path) -> TransferResult<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        let tmp = dir.join(format!("{}.tmp", MANIFEST_FILE));
        let write_err = |source: io::Error| TransferError::IoWrite {
            path: tmp.clone(),
            source,
        };

        let file = File::create(&tmp).map_err(write_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.manifest)
            .map_err(io::Error::from)
            .map_err(write_err)?;
        writer.write_all(b"\n").map_err(write_err)?;
        let file = writer.into_inner().map_err(|e| write_err(e.into_error()))?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|source| TransferError::IoWrite {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), entries = self.manifest.entries.len(), "manifest written");
        Ok(path)
    }
}

/// Reads and validates a manifest.
pub struct ManifestReader;

impl ManifestReader {
    /// Read `<dir>/manifest.json`.
    pub fn read(dir: &Path) -> TransferResult<Manifest> {
        let path = dir.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path).map_err(|source| TransferError::IoRead {
            path: path.clone(),
            source,
        })?;
        Self::parse(&text, &path)
    }

    /// Parse manifest text; `path` is only used in errors.
    pub fn parse(text: &str, path: &Path) -> TransferResult<Manifest> {
        let manifest: Manifest = serde_json::from_str(text).map_err(|e| TransferError::ManifestParse {
            path: path.to_path_buf(),
            line: Some(e.line()),
            column: Some(e.column()),
            entry: None,
            reason: e.to_string(),
        })?;

        if manifest.format != FORMAT_NAME {
            return Err(TransferError::manifest(
                path,
                None,
                format!("unknown format {:?}, expected {:?}", manifest.format, FORMAT_NAME),
            ));
        }
        if manifest.version != FORMAT_VERSION {
            return Err(TransferError::manifest(
                path,
                None,
                format!("unsupported version {}, expected {}", manifest.version, FORMAT_VERSION),
            ));
        }
        let csv = &manifest.csv;
        if csv.quote != QUOTE {
            return Err(TransferError::manifest(path, None, "csv.quote must be '\"'"));
        }
        if matches!(csv.delimiter, '\r' | '\n') || csv.delimiter == QUOTE {
            return Err(TransferError::manifest(
                path,
                None,
                format!("invalid csv.delimiter {:?}", csv.delimiter),
            ));
        }

        for (index, entry) in manifest.entries.iter().enumerate() {
            if entry.ddl.trim().is_empty() {
                return Err(TransferError::manifest(path, Some(index), "empty ddl"));
            }
            if let Some(data) = &entry.data {
                if let Err(reason) = check_relative(data) {
                    return Err(TransferError::manifest(path, Some(index), reason));
                }
                if entry.kind.is_some_and(|k| k != ObjectKind::Table) {
                    return Err(TransferError::manifest(
                        path,
                        Some(index),
                        "only table entries may reference a data file",
                    ));
                }
            }
        }

        Ok(manifest)
    }
}

/// Data paths must stay inside the export directory.
fn check_relative(data: &str) -> Result<(), String> {
    let path = Path::new(data);
    if data.is_empty() {
        return Err("empty data path".into());
    }
    if path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        Ok(())
    } else {
        Err(format!("data path {:?} must be relative to the export directory", data))
    }
}
