//! Database API - high-level interface for portdb.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::{QualifiedName, TableSchema, DEFAULT_SCHEMA};
use crate::executor::{ExecuteError, QueryExecutor, QueryResult};
use crate::planner::{PlanError, QueryPlanner};
use crate::sql::{split_statements, ParseError, Parser, Statement};
use crate::transfer::{
    export_database, import_database, ExportOptions, ExportSummary, ImportOptions, ImportSummary, SchemaFilter,
    TransferError,
};

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Execute(#[from] ExecuteError),

    #[error("planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("{0}")]
    Transfer(#[from] TransferError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DatabaseError {
    /// The export/import error behind this one, however it was reached.
    pub fn transfer_error(&self) -> Option<&TransferError> {
        match self {
            DatabaseError::Transfer(e) | DatabaseError::Execute(ExecuteError::Transfer(e)) => Some(e),
            _ => None,
        }
    }
}

/// Database configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Log every statement at info level.
    pub verbose: bool,
    /// Rows handed to the engine per append during IMPORT.
    pub import_batch_size: usize,
    /// Tables serialized in parallel by EXPORT unless THREADS is given.
    pub export_threads: usize,
    /// CSV delimiter used by EXPORT unless DELIMITER is given.
    pub delimiter: char,
    /// Whether EXPORT writes a header row unless HEADER is given.
    pub header: bool,
    /// Let IMPORT load into existing tables with the same layout.
    pub allow_existing_tables: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let export = ExportOptions::default();
        let import = ImportOptions::default();
        Self {
            verbose: false,
            import_batch_size: import.batch_size,
            export_threads: export.threads,
            delimiter: export.delimiter,
            header: export.header,
            allow_existing_tables: import.allow_existing_compatible_tables,
        }
    }
}

impl DatabaseConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbose flag.
    pub fn verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Set the import batch size.
    pub fn import_batch_size(mut self, value: usize) -> Self {
        self.import_batch_size = value;
        self
    }

    /// Set the default export parallelism.
    pub fn export_threads(mut self, value: usize) -> Self {
        self.export_threads = value;
        self
    }

    /// Set the default CSV delimiter.
    pub fn delimiter(mut self, value: char) -> Self {
        self.delimiter = value;
        self
    }

    /// Set the default header flag.
    pub fn header(mut self, value: bool) -> Self {
        self.header = value;
        self
    }

    /// Set allow_existing_tables flag.
    pub fn allow_existing_tables(mut self, value: bool) -> Self {
        self.allow_existing_tables = value;
        self
    }

    /// Check the settings; the same rules EXPORT applies to its options.
    pub fn validate(&self) -> DatabaseResult<()> {
        if self.import_batch_size == 0 {
            return Err(DatabaseError::InvalidConfig("import batch size must be at least 1".into()));
        }
        if self.export_threads == 0 {
            return Err(DatabaseError::InvalidConfig("export threads must be at least 1".into()));
        }
        self.export_options()
            .with_pairs(&[("DELIMITER".to_string(), self.delimiter.to_string())])
            .map_err(|e| DatabaseError::InvalidConfig(e.to_string()))?;
        Ok(())
    }

    /// Export defaults derived from this configuration.
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            delimiter: self.delimiter,
            header: self.header,
            schemas: SchemaFilter::All,
            threads: self.export_threads,
        }
    }

    /// Import options derived from this configuration.
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            batch_size: self.import_batch_size,
            allow_existing_compatible_tables: self.allow_existing_tables,
        }
    }
}

/// The main database handle.
pub struct Database {
    config: DatabaseConfig,
    executor: QueryExecutor,
}

impl Database {
    /// Create an empty in-memory database with default settings.
    pub fn new() -> Self {
        Self {
            config: DatabaseConfig::default(),
            executor: QueryExecutor::new(),
        }
    }

    /// Create an empty database with custom configuration.
    pub fn with_config(config: DatabaseConfig) -> DatabaseResult<Self> {
        config.validate()?;
        let executor = QueryExecutor::with_options(config.export_options(), config.import_options());
        Ok(Self { config, executor })
    }

    /// Execute a SQL query string.
    pub fn execute(&mut self, sql: &str) -> DatabaseResult<QueryResult> {
        let stmt = Parser::parse(sql)?;
        self.execute_statement(stmt, sql)
    }

    fn execute_statement(&mut self, stmt: Statement, sql: &str) -> DatabaseResult<QueryResult> {
        if self.config.verbose {
            info!(sql = sql.trim(), "executing");
        }
        let result = self.executor.execute_statement(stmt)?;
        debug!(result = ?result, "statement finished");
        Ok(result)
    }

    /// Execute multiple SQL statements separated by semicolons, stopping at
    /// the first failure.
    pub fn execute_batch(&mut self, sql: &str) -> DatabaseResult<Vec<QueryResult>> {
        let mut results = Vec::new();
        for text in split_statements(sql) {
            let stmt = match Parser::parse(&text) {
                Ok(stmt) => stmt,
                Err(ParseError::EmptyQuery) => continue,
                Err(e) => return Err(e.into()),
            };
            results.push(self.execute_statement(stmt, &text)?);
        }
        Ok(results)
    }

    /// Parse a SQL statement without executing.
    pub fn parse(&self, sql: &str) -> DatabaseResult<Statement> {
        Ok(Parser::parse(sql)?)
    }

    /// Explain a query (show the logical plan).
    pub fn explain(&self, sql: &str) -> DatabaseResult<String> {
        match Parser::parse(sql)? {
            Statement::Select(select) => {
                let plan = QueryPlanner::new(self.executor.catalog()).plan_select(&select)?;
                Ok(plan.plan.to_string())
            }
            other => Ok(format!("{} (no plan)", other.kind())),
        }
    }

    /// Export every object into `dir` using the configured defaults.
    pub fn export_to(&self, dir: impl AsRef<Path>) -> DatabaseResult<ExportSummary> {
        Ok(export_database(
            self.executor.state(),
            dir.as_ref(),
            &self.config.export_options(),
        )?)
    }

    /// Import an export directory into this database.
    pub fn import_from(&mut self, dir: impl AsRef<Path>) -> DatabaseResult<ImportSummary> {
        let options = self.config.import_options();
        Ok(import_database(&mut self.executor, dir.as_ref(), &options)?)
    }

    /// Get database statistics.
    pub fn stats(&self) -> DatabaseStats {
        let catalog = self.executor.catalog();
        DatabaseStats {
            tables: catalog.list_tables().len(),
            views: catalog.list_views().len(),
            total_rows: self.executor.state().total_rows(),
            in_transaction: self.executor.in_transaction(),
        }
    }

    /// List all tables; tables outside the default schema are qualified.
    pub fn tables(&self) -> Vec<String> {
        self.executor
            .catalog()
            .list_tables()
            .into_iter()
            .map(|name| {
                if name.schema == DEFAULT_SCHEMA {
                    name.name.clone()
                } else {
                    name.to_string()
                }
            })
            .collect()
    }

    /// Check if a table exists; `name` may be `schema.table`.
    pub fn table_exists(&self, name: &str) -> bool {
        self.executor
            .catalog()
            .table_exists(&QualifiedName::parse_literal(name))
    }

    /// Get the schema for a table.
    pub fn table_schema(&self, name: &str) -> Option<TableSchema> {
        self.executor
            .catalog()
            .get_table(&QualifiedName::parse_literal(name))
            .ok()
            .cloned()
    }

    /// Execute within a transaction.
    pub fn transaction<F, T>(&mut self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&mut Self) -> DatabaseResult<T>,
    {
        self.execute("BEGIN")?;
        match f(self) {
            Ok(result) => {
                self.execute("COMMIT")?;
                Ok(result)
            }
            Err(e) => {
                self.execute("ROLLBACK")?;
                Err(e)
            }
        }
    }

    /// Check if a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.executor.in_transaction()
    }

    /// Get the configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Number of tables.
    pub tables: usize,
    /// Number of views.
    pub views: usize,
    /// Total number of rows across all tables.
    pub total_rows: usize,
    /// Whether a transaction is open.
    pub in_transaction: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ObjectKind;
    use crate::storage::Value;
    use crate::transfer::{ManifestReader, MANIFEST_FILE};
    use std::fs;
    use tempfile::TempDir;

    fn rows(db: &mut Database, sql: &str) -> Vec<Vec<Value>> {
        match db.execute(sql).unwrap() {
            QueryResult::Select(rs) => rs.rows,
            other => panic!("Expected Select result, got {:?}", other),
        }
    }

    fn quoted(dir: &TempDir) -> String {
        format!("'{}'", dir.path().display())
    }

    fn reference_db() -> Database {
        let mut db = Database::new();
        db.execute_batch(
            "CREATE TABLE integers (i INTEGER);
             INSERT INTO integers SELECT * FROM range(0, 100);
             CREATE TABLE integers2 (i INTEGER);
             INSERT INTO integers2 VALUES (1), (3), (99);",
        )
        .unwrap();
        db
    }

    #[test]
    fn test_create_table() {
        let mut db = Database::new();
        assert!(db.tables().is_empty());

        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
        assert!(db.table_exists("users"));
        assert!(db.table_exists("main.users"));
        assert_eq!(db.tables(), vec!["users"]);
        assert_eq!(db.table_schema("users").unwrap().columns.len(), 2);
    }

    #[test]
    fn test_execute_batch() {
        let mut db = Database::new();
        let results = db
            .execute_batch(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
                 INSERT INTO users (id, name) VALUES (1, 'Alice; the first');
                 -- a comment; with a semicolon
                 INSERT INTO users (id, name) VALUES (2, 'Bob');
                 SELECT * FROM users",
            )
            .unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[3].rows().unwrap().len(), 2);

        let stats = db.stats();
        assert_eq!(stats.tables, 1);
        assert_eq!(stats.total_rows, 2);
    }

    #[test]
    fn test_explain() {
        let mut db = Database::new();
        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
        let plan = db.explain("SELECT name FROM users WHERE id = 1").unwrap();
        assert!(plan.contains("Scan"));
        assert!(plan.contains("Filter"));
    }

    #[test]
    fn test_transaction_closure() {
        let mut db = Database::new();
        db.execute("CREATE TABLE t (i INTEGER)").unwrap();
        let failed: DatabaseResult<()> = db.transaction(|db| {
            db.execute("INSERT INTO t VALUES (1)")?;
            db.execute("INSERT INTO missing VALUES (1)")?;
            Ok(())
        });
        assert!(failed.is_err());
        assert!(!db.in_transaction());
        assert!(rows(&mut db, "SELECT * FROM t").is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(Database::with_config(DatabaseConfig::new().import_batch_size(0)).is_err());
        assert!(Database::with_config(DatabaseConfig::new().delimiter('"')).is_err());
        assert!(Database::with_config(DatabaseConfig::new().delimiter('|').export_threads(2)).is_ok());
    }

    #[test]
    fn test_reference_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut db = reference_db();

        let summary = rows(&mut db, &format!("EXPORT DATABASE {}", quoted(&dir)));
        assert_eq!(
            summary,
            vec![vec![Value::Integer(2), Value::Integer(2), Value::Integer(103)]]
        );
        db.execute_batch("DROP TABLE integers; DROP TABLE integers2;").unwrap();
        assert!(db.tables().is_empty());

        db.execute(&format!("IMPORT DATABASE {}", quoted(&dir))).unwrap();
        let result = rows(
            &mut db,
            "SELECT SUM(i) * MAX(i) FROM integers JOIN integers2 USING (i)",
        );
        assert_eq!(result, vec![vec![Value::Integer(10197)]]);
    }

    #[test]
    fn test_type_fidelity() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::new();
        db.execute_batch(
            "CREATE TABLE all_types (b BOOLEAN, i INTEGER, d DOUBLE, t TEXT, x BLOB, dt DATE, ts TIMESTAMP, j JSON);
             INSERT INTO all_types VALUES (NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL);
             INSERT INTO all_types VALUES (false, 0, 0.0, '', X'', DATE '1970-01-01', TIMESTAMP '1970-01-01 00:00:00', '{}');
             INSERT INTO all_types VALUES (true, -1, -0.5, 'a,b\"c', X'00ff', DATE '0001-01-01', TIMESTAMP '2024-02-29 23:59:59.123456', '[1,\"two\",null]');
             INSERT INTO all_types VALUES (true, 9223372036854775807, 1.7976931348623157e308, 'line
break', X'deadbeef', DATE '9999-12-31', TIMESTAMP '9999-12-31 23:59:59.999999', '{\"k\":{\"n\":-1.5}}');
             INSERT INTO all_types VALUES (false, -9223372036854775808, -2.2250738585072014e-308, ' padded ', X'7f', DATE '2000-02-29', TIMESTAMP '2000-01-01T12:00:00', '\"str\"');",
        )
        .unwrap();
        let before = rows(&mut db, "SELECT * FROM all_types");

        db.execute(&format!("EXPORT DATABASE {} (DELIMITER '|', HEADER false)", quoted(&dir)))
            .unwrap();
        let mut copy = Database::new();
        copy.execute(&format!("IMPORT DATABASE {}", quoted(&dir))).unwrap();
        let after = rows(&mut copy, "SELECT * FROM all_types");

        assert_eq!(before.len(), 5);
        assert_eq!(before, after);
        assert_eq!(after[2][3], Value::Text("a,b\"c".into()));
        assert_eq!(after[1][3], Value::Text(String::new()));
        assert!(after[0].iter().all(Value::is_null));
    }

    #[test]
    fn test_dependency_order_and_sequences() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::new();
        db.execute_batch(
            "CREATE SCHEMA shop;
             CREATE TABLE shop.customer (id INTEGER PRIMARY KEY, name TEXT);
             CREATE SEQUENCE shop.ids START WITH 100;
             CREATE TABLE shop.orders (id INTEGER PRIMARY KEY DEFAULT nextval('shop.ids'),
                                       customer INTEGER REFERENCES shop.customer (id),
                                       total DOUBLE);
             CREATE VIEW shop.big_orders AS SELECT id, total FROM shop.orders WHERE total > 10;
             INSERT INTO shop.customer VALUES (1, 'ann'), (2, 'bo');
             INSERT INTO shop.orders (customer, total) VALUES (1, 5.0), (2, 50.0), (2, 12.5);",
        )
        .unwrap();
        db.export_to(dir.path()).unwrap();

        let manifest = ManifestReader::read(dir.path()).unwrap();
        let position = |kind: ObjectKind, name: &str| {
            manifest
                .entries
                .iter()
                .position(|e| e.kind == Some(kind) && e.name.as_deref() == Some(name))
                .unwrap()
        };
        let schema = manifest
            .entries
            .iter()
            .position(|e| e.kind == Some(ObjectKind::Schema) && e.schema.as_deref() == Some("shop"))
            .unwrap();
        assert!(manifest.entries[schema].name.is_none());
        let sequence = position(ObjectKind::Sequence, "ids");
        let customer = position(ObjectKind::Table, "customer");
        let orders = position(ObjectKind::Table, "orders");
        let view = position(ObjectKind::View, "big_orders");
        assert!(schema < sequence && schema < customer);
        assert!(sequence < orders && customer < orders);
        assert!(orders < view);
        assert!(manifest.entries[view].data.is_none());
        assert_eq!(manifest.entries[orders].rows, Some(3));

        let mut copy = Database::new();
        let summary = copy.import_from(dir.path()).unwrap();
        assert_eq!(summary.objects, 5);
        assert_eq!(summary.rows, 5);
        assert_eq!(
            rows(&mut copy, "SELECT count(*) FROM shop.big_orders"),
            vec![vec![Value::Integer(2)]]
        );
        copy.execute("INSERT INTO shop.orders (customer, total) VALUES (1, 1.0)").unwrap();
        assert_eq!(
            rows(&mut copy, "SELECT max(id) FROM shop.orders"),
            vec![vec![Value::Integer(103)]]
        );
        assert!(copy
            .execute("INSERT INTO shop.orders (customer, total) VALUES (7, 1.0)")
            .is_err());
    }

    #[test]
    fn test_sequence_state_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::new();
        db.execute_batch(
            "CREATE SEQUENCE up INCREMENT BY 1 MAXVALUE 2;
             CREATE SEQUENCE down INCREMENT BY -1;
             CREATE SEQUENCE last START WITH 9223372036854775807;",
        )
        .unwrap();
        assert_eq!(
            rows(&mut db, "SELECT nextval('up'), nextval('up'), nextval('down'), nextval('last')"),
            vec![vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(-1),
                Value::Integer(i64::MAX)
            ]]
        );
        assert!(db.execute("SELECT nextval('up')").is_err());
        assert!(db.execute("SELECT nextval('last')").is_err());
        db.export_to(dir.path()).unwrap();

        let mut copy = Database::new();
        copy.import_from(dir.path()).unwrap();
        let exhausted = copy.execute("SELECT nextval('up')").unwrap_err();
        assert!(exhausted.to_string().contains("exhausted"), "{}", exhausted);
        assert!(copy.execute("SELECT nextval('last')").is_err());
        assert_eq!(
            rows(&mut copy, "SELECT nextval('down')"),
            vec![vec![Value::Integer(-2)]]
        );
    }

    #[test]
    fn test_export_is_deterministic() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let parallel = TempDir::new().unwrap();
        let mut db = reference_db();
        db.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)").unwrap();
        db.execute("INSERT INTO notes VALUES (1, 'x'), (2, NULL)").unwrap();

        db.execute(&format!("EXPORT DATABASE {}", quoted(&first))).unwrap();
        db.execute(&format!("EXPORT DATABASE {}", quoted(&second))).unwrap();
        db.execute(&format!("EXPORT DATABASE {} (THREADS 4)", quoted(&parallel)))
            .unwrap();

        for file in [MANIFEST_FILE, "integers.csv", "integers2.csv", "notes.csv"] {
            let expected = fs::read(first.path().join(file)).unwrap();
            assert_eq!(expected, fs::read(second.path().join(file)).unwrap(), "{}", file);
            assert_eq!(expected, fs::read(parallel.path().join(file)).unwrap(), "{}", file);
        }
    }

    #[test]
    fn test_import_conflict() {
        let dir = TempDir::new().unwrap();
        reference_db().export_to(dir.path()).unwrap();

        let mut target = Database::new();
        target.execute("CREATE TABLE integers (i INTEGER)").unwrap();
        let err = target.import_from(dir.path()).unwrap_err();
        assert!(matches!(
            err.transfer_error(),
            Some(TransferError::CatalogConflict { entry: 0, .. })
        ));

        let mut merging = Database::with_config(DatabaseConfig::new().allow_existing_tables(true)).unwrap();
        merging.execute("CREATE TABLE integers (i INTEGER)").unwrap();
        merging.execute("INSERT INTO integers VALUES (-1)").unwrap();
        let summary = merging.import_from(dir.path()).unwrap();
        assert_eq!(summary.reused, 1);
        assert_eq!(
            rows(&mut merging, "SELECT count(*) FROM integers"),
            vec![vec![Value::Integer(101)]]
        );

        let mut incompatible = Database::with_config(DatabaseConfig::new().allow_existing_tables(true)).unwrap();
        incompatible.execute("CREATE TABLE integers (i TEXT)").unwrap();
        let err = incompatible.import_from(dir.path()).unwrap_err();
        assert!(matches!(
            err.transfer_error(),
            Some(TransferError::CatalogConflict { .. })
        ));
    }

    #[test]
    fn test_import_inside_rolled_back_transaction() {
        let dir = TempDir::new().unwrap();
        reference_db().export_to(dir.path()).unwrap();

        let mut db = Database::new();
        db.execute("BEGIN").unwrap();
        db.execute(&format!("IMPORT DATABASE {}", quoted(&dir))).unwrap();
        assert_eq!(db.tables().len(), 2);
        db.execute("ROLLBACK").unwrap();
        assert!(db.tables().is_empty());
    }

    #[test]
    fn test_partial_import_keeps_earlier_objects() {
        let dir = TempDir::new().unwrap();
        reference_db().export_to(dir.path()).unwrap();
        fs::write(dir.path().join("integers2.csv"), "i\n1\nabc\n99\n").unwrap();

        let mut db = Database::new();
        let err = db.import_from(dir.path()).unwrap_err();
        match err.transfer_error() {
            Some(TransferError::TypeCoercion { row, column, value, .. }) => {
                assert_eq!(*row, 2);
                assert_eq!(column, "i");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(
            rows(&mut db, "SELECT count(*) FROM integers"),
            vec![vec![Value::Integer(100)]]
        );
    }

    #[test]
    fn test_hand_written_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"entries": [
                {"ddl": "CREATE TABLE t (i INTEGER PRIMARY KEY, s TEXT);", "data": "t.csv"},
                {"ddl": "CREATE VIEW odd AS SELECT i FROM t WHERE i % 2 = 1"}
            ]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("t.csv"), "i,s\n1,a\n2,\"b,c\"\n3,\n").unwrap();

        let mut db = Database::new();
        let summary = db.import_from(dir.path()).unwrap();
        assert_eq!(summary.objects, 2);
        assert_eq!(summary.rows, 3);
        assert_eq!(
            rows(&mut db, "SELECT * FROM t ORDER BY i"),
            vec![
                vec![Value::Integer(1), Value::Text("a".into())],
                vec![Value::Integer(2), Value::Text("b,c".into())],
                vec![Value::Integer(3), Value::Null],
            ]
        );
        assert_eq!(rows(&mut db, "SELECT count(*) FROM odd"), vec![vec![Value::Integer(2)]]);
    }

    #[test]
    fn test_import_enforces_constraints() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"entries": [{"ddl": "CREATE TABLE t (i INTEGER PRIMARY KEY);", "data": "t.csv"}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("t.csv"), "i\n1\n1\n").unwrap();

        let mut db = Database::new();
        let err = db.import_from(dir.path()).unwrap_err();
        match err.transfer_error() {
            Some(TransferError::Engine { source, .. }) => assert!(source.is_constraint_violation()),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_schema_filter_keeps_dependencies() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out");
        let mut db = Database::new();
        db.execute_batch(
            "CREATE SCHEMA s;
             CREATE TABLE p (id INTEGER PRIMARY KEY);
             CREATE TABLE s.c (id INTEGER, p INTEGER REFERENCES main.p (id));
             INSERT INTO p VALUES (1);
             INSERT INTO s.c VALUES (10, 1);",
        )
        .unwrap();

        let err = db
            .execute(&format!("EXPORT DATABASE '{}' (SCHEMA 's')", target.display()))
            .unwrap_err();
        match err.transfer_error() {
            Some(TransferError::ExcludedDependency { object, dependency }) => {
                assert_eq!(object, "table s.c");
                assert_eq!(dependency, "table main.p");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!target.exists());

        db.execute(&format!("EXPORT DATABASE '{}' (SCHEMA 's', SCHEMA 'main')", target.display()))
            .unwrap();
        let mut copy = Database::new();
        assert_eq!(copy.import_from(&target).unwrap().rows, 2);
    }

    #[test]
    fn test_self_reference_spans_batches() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::new();
        db.execute_batch(
            "CREATE TABLE tree (id INTEGER PRIMARY KEY, parent INTEGER REFERENCES tree (id));
             INSERT INTO tree (id) SELECT range FROM range(1100);
             INSERT INTO tree VALUES (5000, NULL);
             UPDATE tree SET parent = 5000 WHERE id = 0;
             UPDATE tree SET parent = id + 1 WHERE id > 0 AND id < 1099;",
        )
        .unwrap();
        db.export_to(dir.path()).unwrap();

        // the row for 5000 is stored last, after the rows that point at it
        for batch_size in [1024, 100] {
            let mut copy = Database::with_config(DatabaseConfig::new().import_batch_size(batch_size)).unwrap();
            let summary = copy.import_from(dir.path()).unwrap();
            assert_eq!(summary.rows, 1101);
            assert_eq!(
                rows(&mut copy, "SELECT count(parent) FROM tree"),
                vec![vec![Value::Integer(1099)]]
            );
            assert_eq!(
                rows(&mut copy, "SELECT parent FROM tree WHERE id = 0"),
                vec![vec![Value::Integer(5000)]]
            );
        }
    }

    #[test]
    fn test_failed_load_removes_its_rows() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"entries": [
                {"ddl": "CREATE TABLE node (id INTEGER PRIMARY KEY, parent INTEGER REFERENCES node (id));", "data": "node.csv"}
            ]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("node.csv"), "id,parent\n1,2\n2,\n3,9\n4,1\n").unwrap();

        let mut db = Database::with_config(DatabaseConfig::new().import_batch_size(1)).unwrap();
        let err = db.import_from(dir.path()).unwrap_err();
        match err.transfer_error() {
            Some(TransferError::Engine { entry, source, .. }) => {
                assert_eq!(*entry, 0);
                assert!(source.is_constraint_violation());
                assert!(source.to_string().contains("(9)"), "{}", source);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(db.table_exists("node"));
        assert_eq!(rows(&mut db, "SELECT count(*) FROM node"), vec![vec![Value::Integer(0)]]);

        // the batch that fails on its own leaves earlier batches to be removed too
        fs::write(dir.path().join("node.csv"), "id,parent\n1,\n1,\n").unwrap();
        let mut db = Database::with_config(DatabaseConfig::new().import_batch_size(1)).unwrap();
        assert!(db.import_from(dir.path()).is_err());
        assert_eq!(rows(&mut db, "SELECT count(*) FROM node"), vec![vec![Value::Integer(0)]]);
    }
}
