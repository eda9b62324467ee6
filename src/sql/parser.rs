//! SQL parser implementation.
//!
//! Converts SQL strings to our internal AST using sqlparser. EXPORT / IMPORT
//! DATABASE are not part of any sqlparser dialect, so those two are read
//! straight from the token stream.

use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;
use sqlparser::tokenizer::{Token, Tokenizer};

use super::ast::*;
use super::error::{ParseError, ParseResult};
use super::split::split_statements;
use crate::catalog::{DataType, DefaultExpr, ObjectKind};

/// SQL parser for portdb.
pub struct Parser;

/// Fold an unquoted identifier to lower case; quoted ones keep their case.
fn ident(id: &sp::Ident) -> String {
    if id.quote_style.is_some() {
        id.value.clone()
    } else {
        id.value.to_lowercase()
    }
}

/// Same as [`ident`] for identifiers only available in rendered form.
fn ident_text(text: &str) -> String {
    let text = text.trim();
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text[1..text.len() - 1].replace("\"\"", "\"")
    } else {
        text.to_lowercase()
    }
}

fn ident_list<T: ToString>(items: &[T]) -> Vec<String> {
    items.iter().map(|c| ident_text(&c.to_string())).collect()
}

/// Strip the quotes from a rendered single-quoted literal.
fn unquote_literal(text: String) -> String {
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        text[1..text.len() - 1].replace("''", "'")
    } else {
        text
    }
}

impl Parser {
    /// Parse a SQL string into a statement.
    pub fn parse(sql: &str) -> ParseResult<Statement> {
        let sql = sql.trim().trim_end_matches(';').trim();
        if sql.is_empty() {
            return Err(ParseError::EmptyQuery);
        }

        // Handle special commands not supported by sqlparser
        let words: Vec<String> = sql.split_whitespace().map(|w| w.to_uppercase()).collect();
        let head = words.join(" ");
        match head.as_str() {
            "BEGIN" | "BEGIN TRANSACTION" | "START TRANSACTION" => return Ok(Statement::Begin),
            "COMMIT" | "COMMIT TRANSACTION" | "END" => return Ok(Statement::Commit),
            "ROLLBACK" | "ROLLBACK TRANSACTION" | "ABORT" => return Ok(Statement::Rollback),
            "SHOW TABLES" => return Ok(Statement::ShowTables),
            _ => {}
        }
        if words[0] == "DESCRIBE" || words[0] == "DESC" {
            let target = sql
                .split_whitespace()
                .nth(1)
                .ok_or_else(|| ParseError::MissingClause("table name".into()))?;
            return Ok(Statement::Describe(Self::name_from_text(target)?));
        }
        if words.len() >= 2 && words[1] == "DATABASE" && (words[0] == "EXPORT" || words[0] == "IMPORT") {
            return Self::parse_transfer(sql);
        }

        let dialect = GenericDialect {};
        let statements = SqlParser::parse_sql(&dialect, sql)?;

        if statements.is_empty() {
            return Err(ParseError::EmptyQuery);
        }
        if statements.len() > 1 {
            return Err(ParseError::MultipleStatements);
        }

        Self::convert_statement(&statements[0])
    }

    /// Parse multiple `;`-separated SQL statements.
    pub fn parse_multi(sql: &str) -> ParseResult<Vec<Statement>> {
        split_statements(sql).iter().map(|s| Self::parse(s)).collect()
    }

    fn name_from_text(text: &str) -> ParseResult<ObjectName> {
        let parts: Vec<&str> = text.split('.').collect();
        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(ObjectName::bare(ident_text(name))),
            [schema, name] if !schema.is_empty() && !name.is_empty() => Ok(ObjectName {
                schema: Some(ident_text(schema)),
                name: ident_text(name),
            }),
            _ => Err(ParseError::InvalidIdentifier(text.to_string())),
        }
    }

    /// `EXPORT DATABASE '<dir>' [( KEY [=] value, ... )]` and
    /// `IMPORT DATABASE '<dir>'`.
    fn parse_transfer(sql: &str) -> ParseResult<Statement> {
        let dialect = GenericDialect {};
        let tokens: Vec<Token> = Tokenizer::new(&dialect, sql)
            .tokenize()
            .map_err(|e| ParseError::Syntax(e.to_string()))?
            .into_iter()
            .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF | Token::SemiColon))
            .collect();

        let export = matches!(&tokens[0], Token::Word(w) if w.value.eq_ignore_ascii_case("export"));
        let path = match tokens.get(2) {
            Some(Token::SingleQuotedString(path)) => path.clone(),
            _ => {
                return Err(ParseError::Syntax(
                    "expected a quoted directory path after DATABASE".into(),
                ))
            }
        };

        let rest = &tokens[3..];
        if !export {
            if let Some(extra) = rest.first() {
                return Err(ParseError::Syntax(format!(
                    "unexpected {} after IMPORT DATABASE path",
                    extra
                )));
            }
            return Ok(Statement::ImportDatabase { path });
        }

        let options = match rest {
            [] => Vec::new(),
            [Token::LParen, inner @ .., Token::RParen] => Self::parse_options(inner)?,
            _ => {
                return Err(ParseError::Syntax(
                    "expected a parenthesized option list after the export path".into(),
                ))
            }
        };
        Ok(Statement::ExportDatabase(ExportDatabase { path, options }))
    }

    fn parse_options(tokens: &[Token]) -> ParseResult<Vec<(String, String)>> {
        let mut options = Vec::new();
        let mut iter = tokens.iter().peekable();
        while let Some(token) = iter.next() {
            let key = match token {
                Token::Word(w) => w.value.to_uppercase(),
                other => return Err(ParseError::Syntax(format!("expected option name, found {}", other))),
            };
            if matches!(iter.peek(), Some(Token::Eq)) {
                iter.next();
            }
            let value = match iter.next() {
                Some(Token::SingleQuotedString(s)) => s.clone(),
                Some(Token::Number(n, _)) => n.clone(),
                Some(Token::Word(w)) if w.quote_style.is_some() => w.value.clone(),
                Some(Token::Word(w)) => w.value.to_lowercase(),
                Some(other) => {
                    return Err(ParseError::Syntax(format!(
                        "invalid value {} for option {}",
                        other, key
                    )))
                }
                None => return Err(ParseError::Syntax(format!("option {} has no value", key))),
            };
            options.push((key, value));
            match iter.next() {
                None | Some(Token::Comma) => {}
                Some(other) => {
                    return Err(ParseError::Syntax(format!(
                        "expected ',' between options, found {}",
                        other
                    )))
                }
            }
        }
        Ok(options)
    }

    fn convert_statement(stmt: &sp::Statement) -> ParseResult<Statement> {
        match stmt {
            sp::Statement::CreateTable(create) => Self::convert_create_table(create),
            sp::Statement::CreateSchema {
                schema_name,
                if_not_exists,
                ..
            } => match schema_name {
                sp::SchemaName::Simple(name) => {
                    let name = Self::object_name(name)?;
                    if name.schema.is_some() {
                        return Err(ParseError::InvalidIdentifier(name.to_string()));
                    }
                    Ok(Statement::CreateSchema {
                        name: name.name,
                        if_not_exists: *if_not_exists,
                    })
                }
                other => Err(ParseError::UnsupportedStatement(format!(
                    "CREATE SCHEMA {}",
                    other
                ))),
            },
            sp::Statement::CreateSequence {
                if_not_exists,
                name,
                sequence_options,
                ..
            } => Self::convert_create_sequence(name, *if_not_exists, sequence_options),
            sp::Statement::CreateView {
                name,
                query,
                or_replace,
                materialized,
                columns,
                ..
            } => {
                if *or_replace || *materialized || !columns.is_empty() {
                    return Err(ParseError::UnsupportedStatement(
                        "only plain CREATE VIEW name AS query is supported".into(),
                    ));
                }
                Ok(Statement::CreateView(CreateView {
                    name: Self::object_name(name)?,
                    sql: query.to_string(),
                    query: Box::new(Self::convert_query(query)?),
                }))
            }
            sp::Statement::Drop {
                object_type,
                names,
                if_exists,
                cascade,
                ..
            } => Self::convert_drop(object_type, names, *if_exists, *cascade),
            sp::Statement::Query(query) => Ok(Statement::Select(Box::new(Self::convert_query(query)?))),
            sp::Statement::Insert(insert) => Self::convert_insert(insert),
            sp::Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => Self::convert_update(table, assignments, selection),
            sp::Statement::Delete(delete) => Self::convert_delete(delete),
            sp::Statement::StartTransaction { .. } => Ok(Statement::Begin),
            sp::Statement::Commit { .. } => Ok(Statement::Commit),
            sp::Statement::Rollback { .. } => Ok(Statement::Rollback),
            other => Err(ParseError::UnsupportedStatement(other.to_string())),
        }
    }

    fn convert_create_table(create: &sp::CreateTable) -> ParseResult<Statement> {
        if create.query.is_some() {
            return Err(ParseError::UnsupportedStatement("CREATE TABLE ... AS".into()));
        }
        let name = Self::object_name(&create.name)?;
        let columns = create
            .columns
            .iter()
            .map(Self::convert_column_def)
            .collect::<ParseResult<Vec<_>>>()?;
        let constraints = create
            .constraints
            .iter()
            .map(Self::convert_table_constraint)
            .collect::<ParseResult<Vec<_>>>()?;

        Ok(Statement::CreateTable(CreateTable {
            name,
            columns,
            constraints,
            if_not_exists: create.if_not_exists,
        }))
    }

    fn convert_column_def(col: &sp::ColumnDef) -> ParseResult<ColumnDef> {
        let data_type = Self::convert_data_type(&col.data_type)?;
        let constraints = col
            .options
            .iter()
            .filter_map(|opt| Self::convert_column_option(&opt.option).transpose())
            .collect::<ParseResult<Vec<_>>>()?;

        Ok(ColumnDef {
            name: ident(&col.name),
            data_type,
            constraints,
        })
    }

    pub(crate) fn convert_data_type(dt: &sp::DataType) -> ParseResult<DataType> {
        match dt {
            sp::DataType::Text
            | sp::DataType::Varchar(_)
            | sp::DataType::CharVarying(_)
            | sp::DataType::Character(_)
            | sp::DataType::Char(_)
            | sp::DataType::String(_)
            | sp::DataType::Uuid => Ok(DataType::Text),

            sp::DataType::Int(_)
            | sp::DataType::Integer(_)
            | sp::DataType::BigInt(_)
            | sp::DataType::SmallInt(_)
            | sp::DataType::TinyInt(_)
            | sp::DataType::Int8(_)
            | sp::DataType::Int4(_)
            | sp::DataType::Int64 => Ok(DataType::Integer),

            sp::DataType::Float(_)
            | sp::DataType::Real
            | sp::DataType::Double(_)
            | sp::DataType::DoublePrecision
            | sp::DataType::Float64
            | sp::DataType::Float8
            | sp::DataType::Decimal(_)
            | sp::DataType::Numeric(_) => Ok(DataType::Float),

            sp::DataType::Boolean | sp::DataType::Bool => Ok(DataType::Boolean),

            sp::DataType::JSON | sp::DataType::JSONB => Ok(DataType::Json),

            sp::DataType::Timestamp(_, _) | sp::DataType::Datetime(_) => Ok(DataType::Timestamp),

            sp::DataType::Date => Ok(DataType::Date),

            sp::DataType::Blob(_) | sp::DataType::Bytea => Ok(DataType::Blob),

            other => Err(ParseError::UnsupportedDataType(other.to_string())),
        }
    }

    fn convert_column_option(opt: &sp::ColumnOption) -> ParseResult<Option<ColumnConstraint>> {
        match opt {
            sp::ColumnOption::Null => Ok(None), // Nullable by default
            sp::ColumnOption::NotNull => Ok(Some(ColumnConstraint::NotNull)),
            sp::ColumnOption::Unique { is_primary, .. } => {
                if *is_primary {
                    Ok(Some(ColumnConstraint::PrimaryKey))
                } else {
                    Ok(Some(ColumnConstraint::Unique))
                }
            }
            sp::ColumnOption::Default(expr) => Ok(Some(ColumnConstraint::Default(DefaultExpr {
                sql: expr.to_string(),
                expr: Self::convert_expr(expr)?,
            }))),
            sp::ColumnOption::ForeignKey {
                foreign_table,
                referred_columns,
                ..
            } => Ok(Some(ColumnConstraint::References {
                table: Self::object_name(foreign_table)?,
                columns: ident_list(referred_columns),
            })),
            other => Err(ParseError::UnsupportedStatement(format!(
                "column option {}",
                other
            ))),
        }
    }

    fn convert_table_constraint(c: &sp::TableConstraint) -> ParseResult<TableConstraint> {
        match c {
            sp::TableConstraint::PrimaryKey { columns, .. } => {
                Ok(TableConstraint::PrimaryKey(ident_list(columns)))
            }
            sp::TableConstraint::Unique { columns, .. } => Ok(TableConstraint::Unique(ident_list(columns))),
            sp::TableConstraint::ForeignKey {
                columns,
                foreign_table,
                referred_columns,
                ..
            } => Ok(TableConstraint::ForeignKey {
                columns: ident_list(columns),
                table: Self::object_name(foreign_table)?,
                referenced_columns: ident_list(referred_columns),
            }),
            other => Err(ParseError::UnsupportedStatement(format!(
                "table constraint {}",
                other
            ))),
        }
    }

    fn convert_create_sequence(
        name: &sp::ObjectName,
        if_not_exists: bool,
        options: &[sp::SequenceOptions],
    ) -> ParseResult<Statement> {
        let mut start = None;
        let mut increment = 1;
        let mut min_value = None;
        let mut max_value = None;
        for option in options {
            match option {
                sp::SequenceOptions::StartWith(expr, _) => start = Some(Self::expr_to_i64(expr)?),
                sp::SequenceOptions::IncrementBy(expr, _) => increment = Self::expr_to_i64(expr)?,
                sp::SequenceOptions::MinValue(expr) => min_value = expr.as_ref().map(Self::expr_to_i64).transpose()?,
                sp::SequenceOptions::MaxValue(expr) => max_value = expr.as_ref().map(Self::expr_to_i64).transpose()?,
                other => {
                    return Err(ParseError::UnsupportedStatement(format!(
                        "sequence option{}",
                        other
                    )))
                }
            }
        }
        Ok(Statement::CreateSequence(CreateSequence {
            name: Self::object_name(name)?,
            if_not_exists,
            start,
            increment,
            min_value,
            max_value,
        }))
    }

    fn convert_drop(
        object_type: &sp::ObjectType,
        names: &[sp::ObjectName],
        if_exists: bool,
        cascade: bool,
    ) -> ParseResult<Statement> {
        let kind = match object_type {
            sp::ObjectType::Table => ObjectKind::Table,
            sp::ObjectType::View => ObjectKind::View,
            sp::ObjectType::Sequence => ObjectKind::Sequence,
            sp::ObjectType::Schema => ObjectKind::Schema,
            other => {
                return Err(ParseError::UnsupportedStatement(format!(
                    "DROP {} not supported",
                    other
                )))
            }
        };
        let names = names
            .iter()
            .map(Self::object_name)
            .collect::<ParseResult<Vec<_>>>()?;
        Ok(Statement::Drop(DropObject {
            kind,
            names,
            if_exists,
            cascade,
        }))
    }

    fn convert_query(query: &sp::Query) -> ParseResult<Select> {
        if query.with.is_some() {
            return Err(ParseError::UnsupportedStatement("WITH clause".into()));
        }
        let select = match query.body.as_ref() {
            sp::SetExpr::Select(s) => s,
            other => {
                return Err(ParseError::UnsupportedStatement(format!(
                    "Unsupported query type: {}",
                    other
                )))
            }
        };

        let distinct = match &select.distinct {
            None => false,
            Some(sp::Distinct::Distinct) => true,
            Some(_) => return Err(ParseError::UnsupportedExpression("DISTINCT ON".into())),
        };

        // FROM clause; comma-separated items become cross joins
        let mut from: Option<FromClause> = None;
        for item in &select.from {
            let converted = Self::convert_table_with_joins(item)?;
            match from.as_mut() {
                None => from = Some(converted),
                Some(existing) => {
                    existing.joins.push(Join {
                        kind: JoinKind::Cross,
                        relation: converted.base,
                        constraint: JoinConstraint::None,
                    });
                    existing.joins.extend(converted.joins);
                }
            }
        }

        let projection = Self::convert_projection(&select.projection)?;

        let where_clause = select
            .selection
            .as_ref()
            .map(Self::convert_expr)
            .transpose()?;

        let group_by = match &select.group_by {
            sp::GroupByExpr::Expressions(exprs, _) => exprs
                .iter()
                .map(Self::convert_expr)
                .collect::<ParseResult<Vec<_>>>()?,
            sp::GroupByExpr::All(_) => {
                return Err(ParseError::UnsupportedExpression("GROUP BY ALL".into()))
            }
        };

        let having = select.having.as_ref().map(Self::convert_expr).transpose()?;

        let order_by = query
            .order_by
            .as_ref()
            .map(Self::extract_order_by_exprs)
            .transpose()?
            .unwrap_or_default();

        let limit = query.limit.as_ref().map(Self::expr_to_u64).transpose()?;
        let offset = query
            .offset
            .as_ref()
            .map(|o| Self::expr_to_u64(&o.value))
            .transpose()?;

        Ok(Select {
            distinct,
            projection,
            from,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
        })
    }

    fn convert_table_with_joins(twj: &sp::TableWithJoins) -> ParseResult<FromClause> {
        let base = Self::convert_table_factor(&twj.relation)?;
        let joins = twj
            .joins
            .iter()
            .map(Self::convert_join)
            .collect::<ParseResult<Vec<_>>>()?;
        Ok(FromClause { base, joins })
    }

    fn convert_table_factor(factor: &sp::TableFactor) -> ParseResult<TableRef> {
        match factor {
            sp::TableFactor::Table {
                name, alias, args, ..
            } => {
                let alias = match alias {
                    Some(a) if !a.columns.is_empty() => {
                        return Err(ParseError::UnsupportedExpression(format!(
                            "column aliases in FROM: {}",
                            a
                        )))
                    }
                    Some(a) => Some(ident(&a.name)),
                    None => None,
                };
                let name = Self::object_name(name)?;
                match args {
                    Some(table_args) => {
                        if name.schema.is_some() {
                            return Err(ParseError::InvalidIdentifier(name.to_string()));
                        }
                        let args = table_args
                            .args
                            .iter()
                            .map(Self::convert_function_arg)
                            .collect::<ParseResult<Vec<_>>>()?;
                        Ok(TableRef::Function {
                            name: name.name,
                            args,
                            alias,
                        })
                    }
                    None => Ok(TableRef::Table { name, alias }),
                }
            }
            other => Err(ParseError::UnsupportedStatement(format!(
                "Unsupported FROM clause: {}",
                other
            ))),
        }
    }

    fn convert_join(join: &sp::Join) -> ParseResult<Join> {
        let relation = Self::convert_table_factor(&join.relation)?;
        let (kind, constraint) = match &join.join_operator {
            sp::JoinOperator::Join(c) | sp::JoinOperator::Inner(c) => (JoinKind::Inner, c),
            sp::JoinOperator::Left(c) | sp::JoinOperator::LeftOuter(c) => (JoinKind::Left, c),
            sp::JoinOperator::CrossJoin => {
                return Ok(Join {
                    kind: JoinKind::Cross,
                    relation,
                    constraint: JoinConstraint::None,
                })
            }
            other => {
                return Err(ParseError::UnsupportedStatement(format!(
                    "join type {:?}",
                    other
                )))
            }
        };
        let constraint = match constraint {
            sp::JoinConstraint::On(expr) => JoinConstraint::On(Self::convert_expr(expr)?),
            sp::JoinConstraint::Using(columns) => JoinConstraint::Using(ident_list(columns)),
            sp::JoinConstraint::None => JoinConstraint::None,
            sp::JoinConstraint::Natural => {
                return Err(ParseError::UnsupportedStatement("NATURAL JOIN".into()))
            }
        };
        Ok(Join {
            kind,
            relation,
            constraint,
        })
    }

    fn convert_projection(items: &[sp::SelectItem]) -> ParseResult<Vec<SelectItem>> {
        items
            .iter()
            .map(|item| match item {
                sp::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
                sp::SelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expr {
                    expr: Self::convert_expr(expr)?,
                    alias: None,
                }),
                sp::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
                    expr: Self::convert_expr(expr)?,
                    alias: Some(ident(alias)),
                }),
                sp::SelectItem::QualifiedWildcard(..) => {
                    let text = item.to_string();
                    let prefix = text.split(".*").next().unwrap_or_default();
                    let qualifier = prefix.rsplit('.').next().unwrap_or_default();
                    Ok(SelectItem::QualifiedWildcard(ident_text(qualifier)))
                }
            })
            .collect()
    }

    fn extract_order_by_exprs(ob: &sp::OrderBy) -> ParseResult<Vec<OrderBy>> {
        match &ob.kind {
            sp::OrderByKind::All(_) => Err(ParseError::UnsupportedExpression("ORDER BY ALL".into())),
            sp::OrderByKind::Expressions(exprs) => exprs
                .iter()
                .map(|e| {
                    Ok(OrderBy {
                        expr: Self::convert_expr(&e.expr)?,
                        ascending: e.options.asc.unwrap_or(true),
                    })
                })
                .collect(),
        }
    }

    fn convert_insert(insert: &sp::Insert) -> ParseResult<Statement> {
        let table = Self::extract_table_from_object(&insert.table)?;

        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(insert.columns.iter().map(ident).collect())
        };

        let query = insert
            .source
            .as_ref()
            .ok_or_else(|| ParseError::MissingClause("VALUES or SELECT".into()))?;
        let source = match query.body.as_ref() {
            sp::SetExpr::Values(sp::Values { rows, .. }) => InsertSource::Values(
                rows.iter()
                    .map(|row| {
                        row.iter()
                            .map(Self::convert_expr)
                            .collect::<ParseResult<Vec<_>>>()
                    })
                    .collect::<ParseResult<Vec<_>>>()?,
            ),
            _ => InsertSource::Query(Box::new(Self::convert_query(query)?)),
        };

        Ok(Statement::Insert(Insert {
            table,
            columns,
            source,
        }))
    }

    fn convert_update(
        table: &sp::TableWithJoins,
        assignments: &[sp::Assignment],
        selection: &Option<sp::Expr>,
    ) -> ParseResult<Statement> {
        let table = match Self::convert_table_factor(&table.relation)? {
            TableRef::Table { name, .. } => name,
            TableRef::Function { name, .. } => {
                return Err(ParseError::UnsupportedStatement(format!("UPDATE {}(...)", name)))
            }
        };

        let assigns = assignments
            .iter()
            .map(|a| {
                let column = Self::extract_assignment_target(&a.target)?;
                let value = Self::convert_expr(&a.value)?;
                Ok(Assignment { column, value })
            })
            .collect::<ParseResult<Vec<_>>>()?;

        let where_clause = selection.as_ref().map(Self::convert_expr).transpose()?;

        Ok(Statement::Update(Update {
            table,
            assignments: assigns,
            where_clause,
        }))
    }

    fn extract_assignment_target(target: &sp::AssignmentTarget) -> ParseResult<String> {
        match target {
            sp::AssignmentTarget::ColumnName(name) => Ok(Self::object_name(name)?.name),
            sp::AssignmentTarget::Tuple(_) => Err(ParseError::UnsupportedExpression(
                "tuple assignment".into(),
            )),
        }
    }

    fn convert_delete(delete: &sp::Delete) -> ParseResult<Statement> {
        let tables = match &delete.from {
            sp::FromTable::WithFromKeyword(tables) => tables,
            sp::FromTable::WithoutKeyword(tables) => tables,
        };

        if tables.len() != 1 {
            return Err(ParseError::UnsupportedStatement(
                "DELETE from multiple tables not supported".into(),
            ));
        }

        let table = match Self::convert_table_factor(&tables[0].relation)? {
            TableRef::Table { name, .. } => name,
            TableRef::Function { name, .. } => {
                return Err(ParseError::UnsupportedStatement(format!("DELETE FROM {}(...)", name)))
            }
        };
        let where_clause = delete.selection.as_ref().map(Self::convert_expr).transpose()?;

        Ok(Statement::Delete(Delete { table, where_clause }))
    }

    pub(crate) fn convert_expr(expr: &sp::Expr) -> ParseResult<Expr> {
        match expr {
            sp::Expr::Identifier(id) => Ok(Expr::column(ident(id))),

            sp::Expr::CompoundIdentifier(parts) => match parts.as_slice() {
                [table, column] | [_, table, column] => Ok(Expr::Column {
                    table: Some(ident(table)),
                    name: ident(column),
                }),
                _ => Err(ParseError::InvalidIdentifier(expr.to_string())),
            },

            sp::Expr::Value(v) => Ok(Expr::Literal(Self::convert_value(&v.value)?)),

            sp::Expr::TypedString { data_type, value, .. } => Ok(Expr::Cast {
                expr: Box::new(Expr::Literal(LiteralValue::String(unquote_literal(
                    value.to_string(),
                )))),
                data_type: Self::convert_data_type(data_type)?,
            }),

            sp::Expr::BinaryOp { left, op, right } => Ok(Expr::BinaryOp {
                left: Box::new(Self::convert_expr(left)?),
                op: Self::convert_binary_op(op)?,
                right: Box::new(Self::convert_expr(right)?),
            }),

            sp::Expr::UnaryOp { op, expr } => {
                // fold the sign into numeric literals so i64::MIN is representable
                if matches!(op, sp::UnaryOperator::Minus) {
                    if let sp::Expr::Value(v) = expr.as_ref() {
                        if let sp::Value::Number(s, _) = &v.value {
                            if let Ok(i) = format!("-{}", s).parse::<i64>() {
                                return Ok(Expr::Literal(LiteralValue::Integer(i)));
                            }
                        }
                    }
                }
                Ok(Expr::UnaryOp {
                    op: Self::convert_unary_op(op)?,
                    expr: Box::new(Self::convert_expr(expr)?),
                })
            }

            sp::Expr::IsNull(e) => Ok(Expr::IsNull {
                expr: Box::new(Self::convert_expr(e)?),
                negated: false,
            }),

            sp::Expr::IsNotNull(e) => Ok(Expr::IsNull {
                expr: Box::new(Self::convert_expr(e)?),
                negated: true,
            }),

            sp::Expr::InList { expr, list, negated } => Ok(Expr::InList {
                expr: Box::new(Self::convert_expr(expr)?),
                list: list
                    .iter()
                    .map(Self::convert_expr)
                    .collect::<ParseResult<Vec<_>>>()?,
                negated: *negated,
            }),

            sp::Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Ok(Expr::Between {
                expr: Box::new(Self::convert_expr(expr)?),
                low: Box::new(Self::convert_expr(low)?),
                high: Box::new(Self::convert_expr(high)?),
                negated: *negated,
            }),

            sp::Expr::Like {
                expr,
                pattern,
                negated,
                ..
            } => Ok(Expr::Like {
                expr: Box::new(Self::convert_expr(expr)?),
                pattern: Self::extract_string_from_expr(pattern)?,
                negated: *negated,
                case_insensitive: false,
            }),

            sp::Expr::ILike {
                expr,
                pattern,
                negated,
                ..
            } => Ok(Expr::Like {
                expr: Box::new(Self::convert_expr(expr)?),
                pattern: Self::extract_string_from_expr(pattern)?,
                negated: *negated,
                case_insensitive: true,
            }),

            sp::Expr::Function(f) => Self::convert_function(f),

            sp::Expr::Cast {
                expr, data_type, ..
            } => Ok(Expr::Cast {
                expr: Box::new(Self::convert_expr(expr)?),
                data_type: Self::convert_data_type(data_type)?,
            }),

            sp::Expr::Nested(inner) => Ok(Expr::Nested(Box::new(Self::convert_expr(inner)?))),

            other => Err(ParseError::UnsupportedExpression(other.to_string())),
        }
    }

    fn convert_function(f: &sp::Function) -> ParseResult<Expr> {
        if f.over.is_some() || f.filter.is_some() {
            return Err(ParseError::UnsupportedExpression(f.to_string()));
        }
        let name = f.name.to_string().to_lowercase();
        let mut args = Vec::new();
        let mut distinct = false;
        let mut wildcard = false;
        match &f.args {
            sp::FunctionArguments::None => {}
            sp::FunctionArguments::List(list) => {
                distinct = matches!(list.duplicate_treatment, Some(sp::DuplicateTreatment::Distinct));
                for arg in &list.args {
                    match arg {
                        sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Wildcard) => wildcard = true,
                        other => args.push(Self::convert_function_arg(other)?),
                    }
                }
            }
            sp::FunctionArguments::Subquery(_) => {
                return Err(ParseError::UnsupportedExpression(f.to_string()))
            }
        }
        Ok(Expr::Function {
            name,
            args,
            distinct,
            wildcard,
        })
    }

    fn convert_function_arg(arg: &sp::FunctionArg) -> ParseResult<Expr> {
        match arg {
            sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Expr(e)) => Self::convert_expr(e),
            other => Err(ParseError::UnsupportedExpression(format!(
                "function argument {}",
                other
            ))),
        }
    }

    fn convert_value(v: &sp::Value) -> ParseResult<LiteralValue> {
        match v {
            sp::Value::Null => Ok(LiteralValue::Null),
            sp::Value::Boolean(b) => Ok(LiteralValue::Boolean(*b)),
            sp::Value::Number(s, _) => {
                if let Ok(i) = s.parse::<i64>() {
                    Ok(LiteralValue::Integer(i))
                } else if let Ok(f) = s.parse::<f64>() {
                    Ok(LiteralValue::Float(f))
                } else {
                    Err(ParseError::UnsupportedExpression(format!("Invalid number: {}", s)))
                }
            }
            sp::Value::SingleQuotedString(s) => Ok(LiteralValue::String(s.clone())),
            sp::Value::HexStringLiteral(h) => hex::decode(h)
                .map(LiteralValue::Blob)
                .map_err(|e| ParseError::UnsupportedExpression(format!("invalid hex literal: {}", e))),
            other => Err(ParseError::UnsupportedExpression(format!("Unsupported value: {}", other))),
        }
    }

    fn extract_string_from_expr(expr: &sp::Expr) -> ParseResult<String> {
        match expr {
            sp::Expr::Value(v) => match &v.value {
                sp::Value::SingleQuotedString(s) => Ok(s.clone()),
                _ => Err(ParseError::UnsupportedExpression("expected string".into())),
            },
            _ => Err(ParseError::UnsupportedExpression("expected string literal".into())),
        }
    }

    fn convert_binary_op(op: &sp::BinaryOperator) -> ParseResult<BinaryOperator> {
        match op {
            sp::BinaryOperator::Eq => Ok(BinaryOperator::Eq),
            sp::BinaryOperator::NotEq => Ok(BinaryOperator::NotEq),
            sp::BinaryOperator::Lt => Ok(BinaryOperator::Lt),
            sp::BinaryOperator::LtEq => Ok(BinaryOperator::LtEq),
            sp::BinaryOperator::Gt => Ok(BinaryOperator::Gt),
            sp::BinaryOperator::GtEq => Ok(BinaryOperator::GtEq),
            sp::BinaryOperator::And => Ok(BinaryOperator::And),
            sp::BinaryOperator::Or => Ok(BinaryOperator::Or),
            sp::BinaryOperator::Plus => Ok(BinaryOperator::Plus),
            sp::BinaryOperator::Minus => Ok(BinaryOperator::Minus),
            sp::BinaryOperator::Multiply => Ok(BinaryOperator::Multiply),
            sp::BinaryOperator::Divide => Ok(BinaryOperator::Divide),
            sp::BinaryOperator::Modulo => Ok(BinaryOperator::Modulo),
            sp::BinaryOperator::StringConcat => Ok(BinaryOperator::Concat),
            other => Err(ParseError::UnsupportedExpression(format!(
                "Unsupported operator: {}",
                other
            ))),
        }
    }

    fn convert_unary_op(op: &sp::UnaryOperator) -> ParseResult<UnaryOperator> {
        match op {
            sp::UnaryOperator::Not => Ok(UnaryOperator::Not),
            sp::UnaryOperator::Minus => Ok(UnaryOperator::Minus),
            sp::UnaryOperator::Plus => Ok(UnaryOperator::Plus),
            other => Err(ParseError::UnsupportedExpression(format!(
                "Unsupported unary operator: {}",
                other
            ))),
        }
    }

    fn object_name(name: &sp::ObjectName) -> ParseResult<ObjectName> {
        let parts = name
            .0
            .iter()
            .map(|p| {
                p.as_ident()
                    .map(ident)
                    .ok_or_else(|| ParseError::InvalidIdentifier(name.to_string()))
            })
            .collect::<ParseResult<Vec<_>>>()?;
        match parts.as_slice() {
            [table] => Ok(ObjectName::bare(table.clone())),
            [schema, table] => Ok(ObjectName {
                schema: Some(schema.clone()),
                name: table.clone(),
            }),
            _ => Err(ParseError::InvalidIdentifier(name.to_string())),
        }
    }

    fn extract_table_from_object(table: &sp::TableObject) -> ParseResult<ObjectName> {
        match table {
            sp::TableObject::TableName(name) => Self::object_name(name),
            sp::TableObject::TableFunction(_) => {
                Err(ParseError::UnsupportedStatement("table function not supported".into()))
            }
        }
    }

    fn expr_to_i64(expr: &sp::Expr) -> ParseResult<i64> {
        match Self::convert_expr(expr)? {
            Expr::Literal(LiteralValue::Integer(i)) => Ok(i),
            Expr::UnaryOp {
                op: UnaryOperator::Plus,
                expr,
            } => match *expr {
                Expr::Literal(LiteralValue::Integer(i)) => Ok(i),
                other => Err(ParseError::UnsupportedExpression(format!(
                    "expected integer, found {}",
                    other
                ))),
            },
            other => Err(ParseError::UnsupportedExpression(format!(
                "expected integer, found {}",
                other
            ))),
        }
    }

    fn expr_to_u64(expr: &sp::Expr) -> ParseResult<u64> {
        let value = Self::expr_to_i64(expr)?;
        u64::try_from(value)
            .map_err(|_| ParseError::UnsupportedExpression(format!("expected non-negative integer, found {}", value)))
    }
}
