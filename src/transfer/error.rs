//! Export / import error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::executor::ExecuteError;

/// Result type for export and import.
pub type TransferResult<T> = Result<T, TransferError>;

/// Everything that can abort an export or an import.
///
/// Every variant carries enough context (object, file, row, entry) to find
/// the offending input without re-running the operation.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The selected objects cannot be put in dependency order.
    #[error("cyclic dependency between {}", objects.join(", "))]
    CyclicDependency { objects: Vec<String> },

    /// A selected object needs one the SCHEMA filter leaves out; the
    /// manifest could not be replayed into an empty catalog.
    #[error("{object} depends on {dependency}, which is outside the exported schemas")]
    ExcludedDependency { object: String, dependency: String },

    #[error("failed to write {}: {source}", path.display())]
    IoWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    IoRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The manifest is not valid JSON, has the wrong shape, or an entry is
    /// unusable. `entry` is the zero-based index in `entries`.
    #[error("invalid manifest {}{}: {reason}", path.display(), manifest_position(*line, *column, *entry))]
    ManifestParse {
        path: PathBuf,
        line: Option<usize>,
        column: Option<usize>,
        entry: Option<usize>,
        reason: String,
    },

    /// A data file field does not parse as its column's declared type.
    /// `row` counts data records from 1, `line` is the physical line.
    #[error(
        "{}: row {row} (line {line}), column {column}: cannot read {value:?}: {reason}",
        path.display()
    )]
    TypeCoercion {
        path: PathBuf,
        row: u64,
        line: u64,
        column: String,
        value: String,
        reason: String,
    },

    /// The import target already holds an object the manifest would create.
    #[error("manifest entry {entry}: {object} conflicts with the existing catalog: {reason}")]
    CatalogConflict {
        entry: usize,
        object: String,
        reason: String,
    },

    /// A data file is not well-formed CSV for its table.
    #[error("{}: line {line}: {reason}", path.display())]
    MalformedDataFile {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    /// The engine rejected a replayed statement or a loaded batch.
    #[error("manifest entry {entry} ({context}): {source}")]
    Engine {
        entry: usize,
        context: String,
        #[source]
        source: Box<ExecuteError>,
    },

    #[error("invalid export option {option}: {reason}")]
    InvalidOption { option: String, reason: String },
}

fn manifest_position(line: Option<usize>, column: Option<usize>, entry: Option<usize>) -> String {
    match (line, column, entry) {
        (Some(l), Some(c), _) => format!(" at line {}, column {}", l, c),
        (Some(l), None, _) => format!(" at line {}", l),
        (None, _, Some(e)) => format!(", entry {}", e),
        _ => String::new(),
    }
}

impl TransferError {
    pub(crate) fn manifest(path: impl Into<PathBuf>, entry: Option<usize>, reason: impl Into<String>) -> Self {
        TransferError::ManifestParse {
            path: path.into(),
            line: None,
            column: None,
            entry,
            reason: reason.into(),
        }
    }

    pub(crate) fn option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        TransferError::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_error_position() {
        let err = TransferError::ManifestParse {
            path: "/x/manifest.json".into(),
            line: Some(3),
            column: Some(7),
            entry: None,
            reason: "EOF while parsing".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid manifest /x/manifest.json at line 3, column 7: EOF while parsing"
        );

        let err = TransferError::manifest("/x/manifest.json", Some(2), "missing ddl");
        assert_eq!(err.to_string(), "invalid manifest /x/manifest.json, entry 2: missing ddl");
    }

    #[test]
    fn test_cycle_message() {
        let err = TransferError::CyclicDependency {
            objects: vec!["table main.a".into(), "table main.b".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency between table main.a, table main.b");
    }
}
