//! Main query executor.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, trace};

use super::error::{ExecuteError, ExecuteResult};
use super::eval::{evaluate, is_true, EvalContext};
use super::operators::build_operator;
use super::result::{QueryResult, ResultSet};
use crate::catalog::{
    Catalog, ColumnDef, Constraint, ForeignKey, ObjectKind, QualifiedName, SchemaBuilder, SchemaError,
    Sequence, TableSchema, ViewDef, DEFAULT_SCHEMA,
};
use crate::planner::QueryPlanner;
use crate::sql::{
    ColumnConstraint, CreateSequence, CreateTable, CreateView, Delete, DropObject, ExportDatabase, Insert,
    InsertSource, ObjectName, Parser, Select, Statement, TableConstraint, Update,
};
use crate::storage::{DatabaseState, IndexKey, Row, RowId, TableData, Value};
use crate::transaction::{Transaction, TransactionError, TransactionManager, TxActive};
use crate::transfer::{export_database, import_database, ExportOptions, ImportOptions, ImportTarget};

/// The query executor.
///
/// Owns the whole database state; a BEGIN keeps a copy of it in the open
/// transaction so ROLLBACK can put it back.
pub struct QueryExecutor {
    state: DatabaseState,
    tx_manager: TransactionManager,
    current_tx: Option<Transaction<TxActive>>,
    export_options: ExportOptions,
    import_options: ImportOptions,
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryExecutor {
    /// Create an executor over an empty database.
    pub fn new() -> Self {
        Self::with_options(ExportOptions::default(), ImportOptions::default())
    }

    /// Create an executor whose EXPORT / IMPORT start from these defaults.
    pub fn with_options(export_options: ExportOptions, import_options: ImportOptions) -> Self {
        Self {
            state: DatabaseState::new(),
            tx_manager: TransactionManager::new(),
            current_tx: None,
            export_options,
            import_options,
        }
    }

    /// Execute a SQL string.
    pub fn execute(&mut self, sql: &str) -> ExecuteResult<QueryResult> {
        let stmt = Parser::parse(sql)?;
        self.execute_statement(stmt)
    }

    /// Execute a parsed statement.
    pub fn execute_statement(&mut self, stmt: Statement) -> ExecuteResult<QueryResult> {
        debug!(statement = stmt.kind(), "executing statement");
        match stmt {
            Statement::CreateSchema { name, if_not_exists } => self.execute_create_schema(&name, if_not_exists),
            Statement::CreateTable(ct) => self.execute_create_table(&ct),
            Statement::CreateSequence(cs) => self.execute_create_sequence(cs),
            Statement::CreateView(cv) => self.execute_create_view(cv),
            Statement::Drop(d) => self.execute_drop(d),
            Statement::Select(s) => Ok(QueryResult::Select(self.run_select(&s)?)),
            Statement::Insert(i) => self.execute_insert(i),
            Statement::Update(u) => self.execute_update(u),
            Statement::Delete(d) => self.execute_delete(d),
            Statement::Begin => self.execute_begin(),
            Statement::Commit => self.execute_commit(),
            Statement::Rollback => self.execute_rollback(),
            Statement::ShowTables => Ok(self.execute_show_tables()),
            Statement::Describe(table) => self.execute_describe(&table),
            Statement::ExportDatabase(e) => self.execute_export(e),
            Statement::ImportDatabase { path } => self.execute_import(&path),
        }
    }

    /// Get the catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.state.catalog
    }

    /// The current database state.
    pub fn state(&self) -> &DatabaseState {
        &self.state
    }

    /// Check if in transaction.
    pub fn in_transaction(&self) -> bool {
        self.current_tx.is_some()
    }

    /// Id of the open transaction.
    pub fn transaction_id(&self) -> Option<&str> {
        self.current_tx.as_ref().map(|tx| tx.id())
    }

    fn execute_create_schema(&mut self, name: &str, if_not_exists: bool) -> ExecuteResult<QueryResult> {
        if self.state.catalog.create_schema(name, if_not_exists)? {
            Ok(QueryResult::success(format!("Created schema '{}'", name)))
        } else {
            Ok(QueryResult::success(format!("Schema '{}' already exists", name)))
        }
    }

    fn execute_create_table(&mut self, ct: &CreateTable) -> ExecuteResult<QueryResult> {
        let name = ct.name.qualified();
        if ct.if_not_exists && self.state.catalog.object_kind(&name).is_some() {
            return Ok(QueryResult::success(format!("Table '{}' already exists", name)));
        }

        let schema = self.table_schema(ct)?;
        let unique = schema
            .unique_keys()
            .into_iter()
            .map(|cols| Ok((schema.positions(cols)?, cols.join(", "))))
            .collect::<Result<Vec<_>, SchemaError>>()?;
        let data = TableData::new(schema.columns.len(), unique);
        self.state.catalog.create_table(schema)?;
        self.state.add_table(name.clone(), data);

        Ok(QueryResult::success(format!("Created table '{}'", name)))
    }

    /// Catalog definition for a CREATE TABLE statement. Column constraints
    /// become table constraints in declaration order.
    fn table_schema(&self, ct: &CreateTable) -> ExecuteResult<TableSchema> {
        let name = ct.name.qualified();
        let mut builder = SchemaBuilder::new(name.clone());
        let mut constraints = Vec::new();

        for col in &ct.columns {
            let mut def = ColumnDef::new(&col.name, col.data_type);
            for constraint in &col.constraints {
                match constraint {
                    ColumnConstraint::NotNull => def.not_null = true,
                    ColumnConstraint::Unique => constraints.push(Constraint::Unique(vec![col.name.clone()])),
                    ColumnConstraint::PrimaryKey => {
                        constraints.push(Constraint::PrimaryKey(vec![col.name.clone()]))
                    }
                    ColumnConstraint::Default(default) => def.default = Some(default.clone()),
                    ColumnConstraint::References { table, columns } => {
                        constraints.push(Constraint::ForeignKey(ForeignKey {
                            columns: vec![col.name.clone()],
                            references: table.qualified(),
                            referenced_columns: columns.clone(),
                        }))
                    }
                }
            }
            builder = builder.column(def);
        }

        for constraint in &ct.constraints {
            constraints.push(match constraint {
                TableConstraint::PrimaryKey(cols) => Constraint::PrimaryKey(cols.clone()),
                TableConstraint::Unique(cols) => Constraint::Unique(cols.clone()),
                TableConstraint::ForeignKey {
                    columns,
                    table,
                    referenced_columns,
                } => Constraint::ForeignKey(ForeignKey {
                    columns: columns.clone(),
                    references: table.qualified(),
                    referenced_columns: referenced_columns.clone(),
                }),
            });
        }

        // `REFERENCES t` without a column list points at t's primary key.
        let local_key: Option<Vec<String>> = constraints.iter().find_map(|c| match c {
            Constraint::PrimaryKey(cols) => Some(cols.clone()),
            _ => None,
        });
        for constraint in &mut constraints {
            if let Constraint::ForeignKey(fk) = constraint {
                if fk.referenced_columns.is_empty() {
                    let key = if fk.references == name {
                        local_key.clone()
                    } else {
                        self.state
                            .catalog
                            .get_table(&fk.references)?
                            .primary_key()
                            .map(<[String]>::to_vec)
                    };
                    fk.referenced_columns = key.ok_or_else(|| {
                        SchemaError::InvalidConstraint(format!("{} has no primary key to reference", fk.references))
                    })?;
                }
            }
        }

        let schema = constraints
            .into_iter()
            .fold(builder, SchemaBuilder::constraint)
            .build()?;
        Ok(schema)
    }

    fn execute_create_sequence(&mut self, cs: CreateSequence) -> ExecuteResult<QueryResult> {
        let name = cs.name.qualified();
        if cs.if_not_exists && self.state.catalog.object_kind(&name).is_some() {
            return Ok(QueryResult::success(format!("Sequence '{}' already exists", name)));
        }
        let min = cs.min_value.unwrap_or(i64::MIN);
        let max = cs.max_value.unwrap_or(i64::MAX);
        let start = cs.start.unwrap_or(if cs.increment > 0 {
            cs.min_value.unwrap_or(1)
        } else {
            cs.max_value.unwrap_or(-1)
        });
        self.state
            .catalog
            .create_sequence(Sequence::bounded(name.clone(), start, cs.increment, min, max)?)?;
        Ok(QueryResult::success(format!("Created sequence '{}'", name)))
    }

    fn execute_create_view(&mut self, cv: CreateView) -> ExecuteResult<QueryResult> {
        let name = cv.name.qualified();
        let plan = QueryPlanner::new(&self.state.catalog).plan_select(&cv.query)?;
        if plan.relations.contains(&name) {
            return Err(ExecuteError::InvalidExpression(format!("view {} cannot read itself", name)));
        }
        self.state.catalog.create_view(ViewDef {
            name: name.clone(),
            sql: cv.sql,
            query: *cv.query,
            columns: plan.columns,
            dependencies: plan.relations.into_iter().collect(),
        })?;
        Ok(QueryResult::success(format!("Created view '{}'", name)))
    }

    fn execute_drop(&mut self, drop: DropObject) -> ExecuteResult<QueryResult> {
        let mut dropped = Vec::new();
        for object in &drop.names {
            if drop.kind == ObjectKind::Schema {
                if drop.if_exists && !self.state.catalog.schema_exists(&object.name) {
                    continue;
                }
                for table in self.state.catalog.drop_schema(&object.name, drop.cascade)? {
                    self.state.remove_table(&table);
                }
                dropped.push(object.name.clone());
                continue;
            }

            let name = object.qualified();
            if drop.if_exists && self.state.catalog.object_kind(&name) != Some(drop.kind) {
                continue;
            }
            match drop.kind {
                ObjectKind::Table => {
                    self.state.catalog.drop_table(&name)?;
                    self.state.remove_table(&name);
                }
                ObjectKind::View => self.state.catalog.drop_view(&name)?,
                ObjectKind::Sequence => self.state.catalog.drop_sequence(&name)?,
                ObjectKind::Schema => {}
            }
            dropped.push(name.to_string());
        }

        if dropped.is_empty() {
            return Ok(QueryResult::success(format!("No {} dropped", drop.kind)));
        }
        Ok(QueryResult::success(format!("Dropped {} '{}'", drop.kind, dropped.join("', '"))))
    }

    fn run_select(&self, select: &Select) -> ExecuteResult<ResultSet> {
        let plan = QueryPlanner::new(&self.state.catalog).plan_select(select)?;
        trace!(plan = %plan.plan, "planned query");

        let mut op = build_operator(&plan.plan, &self.state)?;
        let mut rows = Vec::new();
        while let Some(row) = op.next_row()? {
            rows.push(row);
        }
        Ok(ResultSet {
            columns: plan.columns,
            rows,
        })
    }

    fn execute_insert(&mut self, insert: Insert) -> ExecuteResult<QueryResult> {
        let name = insert.table.qualified();
        let schema = self.state.catalog.get_table(&name)?.clone();
        let targets = match &insert.columns {
            Some(columns) => {
                let positions = schema.positions(columns)?;
                if let Some(dup) = columns.iter().enumerate().find(|(i, c)| columns[..*i].contains(c)) {
                    return Err(ExecuteError::InvalidExpression(format!(
                        "column {} is listed more than once",
                        dup.1
                    )));
                }
                positions
            }
            None => (0..schema.columns.len()).collect(),
        };

        let source = match insert.source {
            InsertSource::Values(rows) => {
                let planner = QueryPlanner::new(&self.state.catalog);
                let ctx = EvalContext {
                    catalog: &self.state.catalog,
                };
                rows.iter()
                    .map(|exprs| {
                        exprs
                            .iter()
                            .map(|expr| evaluate(&planner.bind_constant(expr)?, &[], ctx))
                            .collect::<ExecuteResult<Row>>()
                    })
                    .collect::<ExecuteResult<Vec<Row>>>()?
            }
            InsertSource::Query(select) => self.run_select(&select)?.rows,
        };

        let rows = source
            .into_iter()
            .map(|values| self.build_row(&schema, &targets, values))
            .collect::<ExecuteResult<Vec<Row>>>()?;
        let count = self.append_checked(&schema, rows)?;
        Ok(QueryResult::modified(count))
    }

    /// Place `values` at `targets`, fill the other columns from their
    /// defaults, and cast everything to the column types.
    fn build_row(&self, schema: &TableSchema, targets: &[usize], values: Row) -> ExecuteResult<Row> {
        if values.len() != targets.len() {
            return Err(ExecuteError::InvalidExpression(format!(
                "INSERT into {} has {} target columns but {} values",
                schema.name,
                targets.len(),
                values.len()
            )));
        }

        let mut row: Vec<Option<Value>> = vec![None; schema.columns.len()];
        for (&position, value) in targets.iter().zip(values) {
            row[position] = Some(value);
        }

        let planner = QueryPlanner::new(&self.state.catalog);
        let ctx = EvalContext {
            catalog: &self.state.catalog,
        };
        schema
            .columns
            .iter()
            .zip(row)
            .map(|(column, value)| {
                let value = match (value, &column.default) {
                    (Some(value), _) => value,
                    (None, Some(default)) => evaluate(&planner.bind_constant(&default.expr)?, &[], ctx)?,
                    (None, None) => Value::Null,
                };
                coerce(&schema.name, column, value)
            })
            .collect()
    }

    /// Check NOT NULL and foreign keys for new rows, then insert them all or
    /// none.
    fn append_checked(&mut self, schema: &TableSchema, rows: Vec<Row>) -> ExecuteResult<usize> {
        self.check_not_null(schema, &rows)?;
        self.check_foreign_keys(schema, &rows, &HashSet::new(), true)?;
        let count = self.state.table_data_mut(&schema.name)?.insert_all(rows)?;
        Ok(count)
    }

    fn check_not_null(&self, schema: &TableSchema, rows: &[Row]) -> ExecuteResult<()> {
        for row in rows {
            for (i, value) in row.iter().enumerate() {
                if value.is_null() && !schema.is_nullable(i) {
                    return Err(ExecuteError::NullValue(format!(
                        "{}.{}",
                        schema.name, schema.columns[i].name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every non-NULL foreign key of `rows` must match a parent row. For
    /// self references the parent may be one of `rows`; stored rows listed in
    /// `replaced` are being rewritten and do not count. With `self_refs` off
    /// the table's references to itself are left to `check_self_references`.
    fn check_foreign_keys(
        &self,
        schema: &TableSchema,
        rows: &[Row],
        replaced: &HashSet<RowId>,
        self_refs: bool,
    ) -> ExecuteResult<()> {
        for fk in schema.foreign_keys().filter(|fk| self_refs || fk.references != schema.name) {
            let local = schema.positions(&fk.columns)?;
            let self_ref = fk.references == schema.name;
            let parent = if self_ref {
                schema
            } else {
                self.state.catalog.get_table(&fk.references)?
            };
            let referenced = parent.positions(&fk.referenced_columns)?;
            let data = self.state.table_data(&fk.references)?;
            let pending: HashSet<IndexKey> = if self_ref {
                rows.iter().map(|r| IndexKey::from_row(r, &referenced)).collect()
            } else {
                HashSet::new()
            };
            let visible = |id: RowId| !self_ref || !replaced.contains(&id);

            for row in rows {
                let key = IndexKey::from_row(row, &local);
                if key.has_null() || pending.contains(&key) {
                    continue;
                }
                let found = if data.has_index(&referenced) {
                    data.lookup(&referenced, &key).is_some_and(visible)
                } else {
                    data.iter()
                        .any(|(id, parent_row)| visible(id) && IndexKey::from_row(parent_row, &referenced) == key)
                };
                if !found {
                    return Err(ExecuteError::ForeignKeyViolation(format!(
                        "{} {} has no match in {}",
                        schema.name, key, fk.references
                    )));
                }
            }
        }
        Ok(())
    }

    /// Parent-side check: keys present in `old_rows` but gone from
    /// `new_rows` must not be referenced by any remaining row.
    fn check_removed_keys(
        &self,
        table: &QualifiedName,
        old_rows: &[Row],
        new_rows: &[Row],
        changed: &HashSet<RowId>,
    ) -> ExecuteResult<()> {
        let parent = self.state.catalog.get_table(table)?;
        let mut children = self.state.catalog.referencing_tables(table);
        children.push(parent);

        for child in children {
            for fk in child.foreign_keys().filter(|fk| fk.references == *table) {
                let referenced = parent.positions(&fk.referenced_columns)?;
                let remaining: HashSet<IndexKey> = new_rows
                    .iter()
                    .map(|r| IndexKey::from_row(r, &referenced))
                    .collect();
                let removed: HashSet<IndexKey> = old_rows
                    .iter()
                    .map(|r| IndexKey::from_row(r, &referenced))
                    .filter(|k| !k.has_null() && !remaining.contains(k))
                    .collect();
                if removed.is_empty() {
                    continue;
                }

                let local = child.positions(&fk.columns)?;
                let self_ref = child.name == *table;
                let stored = self
                    .state
                    .table_data(&child.name)?
                    .iter()
                    .filter(|(id, _)| !(self_ref && changed.contains(id)))
                    .map(|(_, row)| row);
                let added: &[Row] = if self_ref { new_rows } else { &[] };
                for row in stored.chain(added) {
                    let key = IndexKey::from_row(row, &local);
                    if removed.contains(&key) {
                        return Err(ExecuteError::ForeignKeyViolation(format!(
                            "{} {} is still referenced from {}",
                            table, key, child.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn execute_update(&mut self, update: Update) -> ExecuteResult<QueryResult> {
        let name = update.table.qualified();
        let schema = self.state.catalog.get_table(&name)?.clone();
        let planner = QueryPlanner::new(&self.state.catalog);
        let qualifier = update.table.name.as_str();

        let predicate = update
            .where_clause
            .as_ref()
            .map(|expr| planner.bind_row(&schema, qualifier, expr))
            .transpose()?;
        let assignments = update
            .assignments
            .iter()
            .map(|a| {
                let index = schema
                    .column_index(&a.column)
                    .ok_or_else(|| ExecuteError::ColumnNotFound(format!("{}.{}", name, a.column)))?;
                Ok((index, planner.bind_row(&schema, qualifier, &a.value)?))
            })
            .collect::<ExecuteResult<Vec<_>>>()?;

        let ctx = EvalContext {
            catalog: &self.state.catalog,
        };
        let mut old_rows = Vec::new();
        let mut updates: Vec<(RowId, Row)> = Vec::new();
        for (id, row) in self.state.table_data(&name)?.iter() {
            if let Some(predicate) = &predicate {
                if !is_true(predicate, row, ctx)? {
                    continue;
                }
            }
            let mut new_row = row.clone();
            for (index, expr) in &assignments {
                let value = evaluate(expr, row, ctx)?;
                new_row[*index] = coerce(&name, &schema.columns[*index], value)?;
            }
            old_rows.push(row.clone());
            updates.push((id, new_row));
        }

        let changed: HashSet<RowId> = updates.iter().map(|(id, _)| *id).collect();
        let new_rows: Vec<Row> = updates.iter().map(|(_, row)| row.clone()).collect();
        self.check_not_null(&schema, &new_rows)?;
        self.check_foreign_keys(&schema, &new_rows, &changed, true)?;
        self.check_removed_keys(&name, &old_rows, &new_rows, &changed)?;

        let count = updates.len();
        self.state.table_data_mut(&name)?.update_many(updates)?;
        Ok(QueryResult::modified(count))
    }

    fn execute_delete(&mut self, delete: Delete) -> ExecuteResult<QueryResult> {
        let name = delete.table.qualified();
        let schema = self.state.catalog.get_table(&name)?;
        let predicate = delete
            .where_clause
            .as_ref()
            .map(|expr| QueryPlanner::new(&self.state.catalog).bind_row(schema, &delete.table.name, expr))
            .transpose()?;

        let ctx = EvalContext {
            catalog: &self.state.catalog,
        };
        let mut ids = Vec::new();
        let mut old_rows = Vec::new();
        for (id, row) in self.state.table_data(&name)?.iter() {
            let matched = match &predicate {
                Some(predicate) => is_true(predicate, row, ctx)?,
                None => true,
            };
            if matched {
                ids.push(id);
                old_rows.push(row.clone());
            }
        }

        let changed: HashSet<RowId> = ids.iter().copied().collect();
        self.check_removed_keys(&name, &old_rows, &[], &changed)?;

        let data = self.state.table_data_mut(&name)?;
        for id in &ids {
            data.delete(*id)?;
        }
        Ok(QueryResult::modified(ids.len()))
    }

    fn execute_begin(&mut self) -> ExecuteResult<QueryResult> {
        if let Some(tx) = &self.current_tx {
            return Err(TransactionError::AlreadyActive {
                tx_id: tx.id().to_string(),
            }
            .into());
        }
        let tx = self.tx_manager.begin(&self.state);
        debug!(tx_id = tx.id(), "transaction started");
        self.current_tx = Some(tx);
        Ok(QueryResult::transaction("BEGIN"))
    }

    fn execute_commit(&mut self) -> ExecuteResult<QueryResult> {
        let tx = self.current_tx.take().ok_or(TransactionError::NoActiveTransaction)?;
        let tx_id = self.tx_manager.commit_transaction(tx)?;
        debug!(tx_id = %tx_id, "transaction committed");
        Ok(QueryResult::transaction("COMMIT"))
    }

    fn execute_rollback(&mut self) -> ExecuteResult<QueryResult> {
        let tx = self.current_tx.take().ok_or(TransactionError::NoActiveTransaction)?;
        self.state = self.tx_manager.rollback_transaction(tx)?;
        debug!("transaction rolled back");
        Ok(QueryResult::transaction("ROLLBACK"))
    }

    fn execute_show_tables(&self) -> QueryResult {
        let mut rs = ResultSet::new(vec!["table_name".into()]);
        for name in self.state.catalog.list_tables() {
            rs.push(vec![Value::Text(display_name(name))]);
        }
        QueryResult::Select(rs)
    }

    fn execute_describe(&self, table: &ObjectName) -> ExecuteResult<QueryResult> {
        let schema = self.state.catalog.get_table(&table.qualified())?;
        let primary_key = schema.primary_key().unwrap_or_default();
        let mut rs = ResultSet::new(vec![
            "column".into(),
            "type".into(),
            "nullable".into(),
            "default".into(),
            "primary_key".into(),
        ]);
        for (i, col) in schema.columns.iter().enumerate() {
            rs.push(vec![
                Value::Text(col.name.clone()),
                Value::Text(col.data_type.sql_name().to_string()),
                Value::Boolean(schema.is_nullable(i)),
                col.default
                    .as_ref()
                    .map_or(Value::Null, |d| Value::Text(d.sql.clone())),
                Value::Boolean(primary_key.contains(&col.name)),
            ]);
        }
        Ok(QueryResult::Select(rs))
    }

    fn execute_export(&self, export: ExportDatabase) -> ExecuteResult<QueryResult> {
        let options = self.export_options.clone().with_pairs(&export.options)?;
        let summary = export_database(&self.state, Path::new(&export.path), &options)?;
        info!(path = %export.path, rows = summary.rows, "database exported");
        Ok(QueryResult::Select(ResultSet::single(
            &["objects", "tables", "rows"],
            vec![
                Value::Integer(summary.objects as i64),
                Value::Integer(summary.tables as i64),
                Value::Integer(summary.rows as i64),
            ],
        )))
    }

    fn execute_import(&mut self, path: &str) -> ExecuteResult<QueryResult> {
        let options = self.import_options.clone();
        let summary = import_database(self, Path::new(path), &options)?;
        info!(path = %path, rows = summary.rows, "database imported");
        Ok(QueryResult::Select(ResultSet::single(
            &["objects", "tables", "rows"],
            vec![
                Value::Integer(summary.objects as i64),
                Value::Integer(summary.tables as i64),
                Value::Integer(summary.rows as i64),
            ],
        )))
    }
}

impl ImportTarget for QueryExecutor {
    fn object_kind(&self, name: &QualifiedName) -> Option<ObjectKind> {
        self.state.catalog.object_kind(name)
    }

    fn schema_exists(&self, name: &str) -> bool {
        self.state.catalog.schema_exists(name)
    }

    fn table_columns(&self, name: &QualifiedName) -> Option<Vec<ColumnDef>> {
        self.state.catalog.get_table(name).ok().map(|t| t.columns.clone())
    }

    fn check_compatible(&self, create: &CreateTable) -> Result<(), String> {
        let incoming = self.table_schema(create).map_err(|e| e.to_string())?;
        let existing = self
            .state
            .catalog
            .get_table(&incoming.name)
            .map_err(|e| e.to_string())?;
        existing.check_compatible(&incoming)
    }

    fn execute_ddl(&mut self, statement: Statement) -> Result<(), ExecuteError> {
        self.execute_statement(statement).map(|_| ())
    }

    fn append_rows(&mut self, table: &QualifiedName, rows: Vec<Row>) -> Result<(), ExecuteError> {
        let schema = self.state.catalog.get_table(table)?.clone();
        self.check_not_null(&schema, &rows)?;
        self.check_foreign_keys(&schema, &rows, &HashSet::new(), false)?;
        self.state.table_data_mut(table)?.insert_all(rows)?;
        Ok(())
    }

    fn check_self_references(&self, table: &QualifiedName) -> Result<(), ExecuteError> {
        let schema = self.state.catalog.get_table(table)?;
        let data = self.state.table_data(table)?;
        for fk in schema.foreign_keys().filter(|fk| fk.references == *table) {
            let local = schema.positions(&fk.columns)?;
            let referenced = schema.positions(&fk.referenced_columns)?;
            let keys: HashSet<IndexKey> = if data.has_index(&referenced) {
                HashSet::new()
            } else {
                data.rows().map(|r| IndexKey::from_row(r, &referenced)).collect()
            };
            for row in data.rows() {
                let key = IndexKey::from_row(row, &local);
                if key.has_null() {
                    continue;
                }
                let found = if data.has_index(&referenced) {
                    data.lookup(&referenced, &key).is_some()
                } else {
                    keys.contains(&key)
                };
                if !found {
                    return Err(ExecuteError::ForeignKeyViolation(format!(
                        "{} {} has no match in {}",
                        schema.name, key, fk.references
                    )));
                }
            }
        }
        Ok(())
    }

    fn discard_rows(&mut self, table: &QualifiedName, count: usize) -> Result<(), ExecuteError> {
        let data = self.state.table_data_mut(table)?;
        let ids: Vec<RowId> = data.iter().map(|(id, _)| id).collect();
        for id in &ids[ids.len().saturating_sub(count)..] {
            data.delete(*id)?;
        }
        Ok(())
    }
}

fn coerce(table: &QualifiedName, column: &ColumnDef, value: Value) -> ExecuteResult<Value> {
    value
        .cast(column.data_type)
        .map_err(|e| ExecuteError::TypeMismatch(format!("{}.{}: {}", table, column.name, e)))
}

/// Table name as SHOW TABLES prints it; the default schema is implied.
fn display_name(name: &QualifiedName) -> String {
    if name.schema == DEFAULT_SCHEMA {
        name.name.clone()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> QueryExecutor {
        QueryExecutor::new()
    }

    fn select(exec: &mut QueryExecutor, sql: &str) -> ResultSet {
        match exec.execute(sql).unwrap() {
            QueryResult::Select(rs) => rs,
            other => panic!("Expected Select result, got {:?}", other),
        }
    }

    fn ints(rs: &ResultSet) -> Vec<Vec<i64>> {
        rs.iter()
            .map(|row| {
                row.iter()
                    .map(|v| match v {
                        Value::Integer(i) => *i,
                        other => panic!("expected integer, got {:?}", other),
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_create_table() {
        let mut exec = setup();

        let result = exec
            .execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .unwrap();
        assert!(matches!(result, QueryResult::Success { .. }));
        assert!(exec.catalog().table_exists(&QualifiedName::main("users")));

        assert!(exec.execute("CREATE TABLE users (id INTEGER)").is_err());
        assert!(exec.execute("CREATE TABLE IF NOT EXISTS users (id INTEGER)").is_ok());
    }

    #[test]
    fn test_insert_and_select() {
        let mut exec = setup();

        exec.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)")
            .unwrap();
        exec.execute("INSERT INTO users (id, name, age) VALUES (1, 'Alice', 30), (2, 'Bob', 25)")
            .unwrap();
        exec.execute("INSERT INTO users VALUES (3, 'Charlie', 35)").unwrap();

        let rs = select(&mut exec, "SELECT * FROM users WHERE age > 28 ORDER BY id");
        assert_eq!(rs.columns, vec!["id", "name", "age"]);
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.value(1, "name"), Some(&Value::Text("Charlie".into())));
    }

    #[test]
    fn test_insert_casts_and_defaults() {
        let mut exec = setup();
        exec.execute("CREATE SEQUENCE ids START WITH 10").unwrap();
        exec.execute("CREATE TABLE t (id INTEGER DEFAULT nextval('ids'), score DOUBLE, label TEXT DEFAULT 'none')")
            .unwrap();
        exec.execute("INSERT INTO t (score) VALUES (1), ('2.5')").unwrap();

        let rs = select(&mut exec, "SELECT id, score, label FROM t");
        assert_eq!(
            rs.rows,
            vec![
                vec![Value::Integer(10), Value::Float(1.0), Value::Text("none".into())],
                vec![Value::Integer(11), Value::Float(2.5), Value::Text("none".into())],
            ]
        );

        let err = exec.execute("INSERT INTO t (score) VALUES ('abc')").unwrap_err();
        assert!(matches!(err, ExecuteError::TypeMismatch(_)));
    }

    #[test]
    fn test_constraints_enforced() {
        let mut exec = setup();
        exec.execute("CREATE TABLE parent (id INTEGER PRIMARY KEY)").unwrap();
        exec.execute("CREATE TABLE child (id INTEGER NOT NULL, pid INTEGER REFERENCES parent)")
            .unwrap();
        exec.execute("INSERT INTO parent VALUES (1), (2)").unwrap();

        let dup = exec.execute("INSERT INTO parent VALUES (1)").unwrap_err();
        assert!(dup.is_constraint_violation());
        let null = exec.execute("INSERT INTO child VALUES (NULL, 1)").unwrap_err();
        assert!(matches!(null, ExecuteError::NullValue(_)));
        let orphan = exec.execute("INSERT INTO child VALUES (1, 3)").unwrap_err();
        assert!(matches!(orphan, ExecuteError::ForeignKeyViolation(_)));

        exec.execute("INSERT INTO child VALUES (1, 1), (2, NULL)").unwrap();
        let referenced = exec.execute("DELETE FROM parent WHERE id = 1").unwrap_err();
        assert!(matches!(referenced, ExecuteError::ForeignKeyViolation(_)));
        let moved = exec.execute("UPDATE parent SET id = 5 WHERE id = 1").unwrap_err();
        assert!(matches!(moved, ExecuteError::ForeignKeyViolation(_)));

        assert_eq!(exec.execute("DELETE FROM parent WHERE id = 2").unwrap().rows_affected(), 1);
        assert!(exec.execute("DROP TABLE parent").is_err());
        exec.execute("DROP TABLE child").unwrap();
        exec.execute("DROP TABLE parent").unwrap();
    }

    #[test]
    fn test_self_reference_in_one_batch() {
        let mut exec = setup();
        exec.execute("CREATE TABLE node (id INTEGER PRIMARY KEY, parent INTEGER REFERENCES node (id))")
            .unwrap();
        exec.execute("INSERT INTO node VALUES (2, 1), (1, NULL)").unwrap();
        assert!(exec.execute("INSERT INTO node VALUES (3, 9)").is_err());
    }

    #[test]
    fn test_update_and_delete() {
        let mut exec = setup();
        exec.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
        exec.execute("INSERT INTO users VALUES (1, 'Alice'), (2, 'Bob')").unwrap();

        let result = exec.execute("UPDATE users SET name = 'Alicia' WHERE id = 1").unwrap();
        assert!(matches!(result, QueryResult::Modified { rows_affected: 1 }));
        let rs = select(&mut exec, "SELECT name FROM users WHERE id = 1");
        assert_eq!(rs.rows[0][0], Value::Text("Alicia".into()));

        // keys may swap within one statement
        exec.execute("UPDATE users SET id = 3 - id").unwrap();
        let rs = select(&mut exec, "SELECT id FROM users WHERE name = 'Bob'");
        assert_eq!(ints(&rs), vec![vec![1]]);

        let result = exec.execute("DELETE FROM users WHERE id = 1").unwrap();
        assert!(matches!(result, QueryResult::Modified { rows_affected: 1 }));
        assert_eq!(select(&mut exec, "SELECT * FROM users").len(), 1);
    }

    #[test]
    fn test_join_using_aggregate() {
        let mut exec = setup();
        exec.execute("CREATE TABLE integers (i INTEGER)").unwrap();
        exec.execute("INSERT INTO integers SELECT * FROM range(100)").unwrap();
        exec.execute("CREATE TABLE integers2 (i INTEGER)").unwrap();
        exec.execute("INSERT INTO integers2 VALUES (1), (3), (99)").unwrap();

        let rs = select(
            &mut exec,
            "SELECT SUM(i) * MAX(i) FROM integers JOIN integers2 USING (i)",
        );
        assert_eq!(ints(&rs), vec![vec![10197]]);
    }

    #[test]
    fn test_views_and_drop_dependencies() {
        let mut exec = setup();
        exec.execute("CREATE TABLE integers (i INTEGER)").unwrap();
        exec.execute("INSERT INTO integers VALUES (5), (50), (500)").unwrap();
        exec.execute("CREATE VIEW big AS SELECT i FROM integers WHERE i > 10").unwrap();

        let rs = select(&mut exec, "SELECT count(*) FROM big");
        assert_eq!(ints(&rs), vec![vec![2]]);

        assert!(exec.execute("DROP TABLE integers").is_err());
        exec.execute("DROP VIEW big").unwrap();
        exec.execute("DROP TABLE integers").unwrap();
        assert!(exec.execute("DROP TABLE integers").is_err());
        exec.execute("DROP TABLE IF EXISTS integers").unwrap();
    }

    #[test]
    fn test_schemas() {
        let mut exec = setup();
        exec.execute("CREATE SCHEMA sales").unwrap();
        exec.execute("CREATE TABLE sales.orders (id INTEGER)").unwrap();
        exec.execute("INSERT INTO sales.orders VALUES (7)").unwrap();
        assert_eq!(ints(&select(&mut exec, "SELECT id FROM sales.orders")), vec![vec![7]]);

        let rs = select(&mut exec, "SHOW TABLES");
        assert_eq!(rs.rows, vec![vec![Value::Text("sales.orders".into())]]);

        assert!(exec.execute("DROP SCHEMA sales").is_err());
        exec.execute("DROP SCHEMA sales CASCADE").unwrap();
        assert!(exec.state().table_data(&QualifiedName::new("sales", "orders")).is_err());
    }

    #[test]
    fn test_transaction_rollback() {
        let mut exec = setup();
        exec.execute("CREATE SEQUENCE s").unwrap();
        exec.execute("CREATE TABLE t (i INTEGER)").unwrap();
        exec.execute("INSERT INTO t VALUES (1)").unwrap();

        exec.execute("BEGIN").unwrap();
        assert!(exec.in_transaction());
        assert!(exec.execute("BEGIN").is_err());
        exec.execute("INSERT INTO t VALUES (nextval('s'))").unwrap();
        exec.execute("CREATE TABLE u (i INTEGER)").unwrap();
        exec.execute("ROLLBACK").unwrap();

        assert!(!exec.in_transaction());
        assert_eq!(ints(&select(&mut exec, "SELECT i FROM t")), vec![vec![1]]);
        assert!(!exec.catalog().table_exists(&QualifiedName::main("u")));
        assert_eq!(ints(&select(&mut exec, "SELECT nextval('s')")), vec![vec![1]]);

        assert!(exec.execute("COMMIT").is_err());
        exec.execute("BEGIN").unwrap();
        exec.execute("INSERT INTO t VALUES (2)").unwrap();
        exec.execute("COMMIT").unwrap();
        assert_eq!(select(&mut exec, "SELECT i FROM t").len(), 2);
    }

    #[test]
    fn test_describe() {
        let mut exec = setup();
        exec.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT DEFAULT 'x')")
            .unwrap();
        let rs = select(&mut exec, "DESCRIBE users");
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.value(0, "nullable"), Some(&Value::Boolean(false)));
        assert_eq!(rs.value(0, "primary_key"), Some(&Value::Boolean(true)));
        assert_eq!(rs.value(1, "default"), Some(&Value::Text("'x'".into())));
    }
}
