//! Query planner - binds SQL AST against the catalog and produces logical plans.
//!
//! Binding resolves every column reference to a position in the row flowing
//! out of the FROM clause. Views are expanded in place, so the executor only
//! ever sees table scans.

use std::collections::BTreeSet;

use super::error::{PlanError, PlanResult};
use super::logical::{
    AggregateExpr, AggregateFunction, BoundExpr, JoinType, LogicalPlan, ScalarFunction, SortSpec,
};
use crate::catalog::{Catalog, QualifiedName, TableSchema};
use crate::sql::{
    BinaryOperator, Expr, FromClause, JoinConstraint, JoinKind, LiteralValue, Select, SelectItem,
    TableRef,
};

/// Views referencing views are expanded recursively up to this depth.
const MAX_VIEW_DEPTH: usize = 32;

/// A planned SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub plan: LogicalPlan,
    /// Output column names.
    pub columns: Vec<String>,
    /// Tables and views named in FROM clauses, without expanding views.
    pub relations: BTreeSet<QualifiedName>,
}

/// A column visible to expressions.
#[derive(Debug, Clone)]
struct ScopeColumn {
    qualifier: String,
    name: String,
    /// Right-hand column of a `USING` join; only reachable when qualified.
    hidden: bool,
}

#[derive(Debug, Clone, Default)]
struct Scope {
    columns: Vec<ScopeColumn>,
}

impl Scope {
    fn new(qualifier: &str, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            columns: names
                .into_iter()
                .map(|name| ScopeColumn {
                    qualifier: qualifier.to_string(),
                    name: name.into(),
                    hidden: false,
                })
                .collect(),
        }
    }

    fn len(&self) -> usize {
        self.columns.len()
    }

    fn concat(mut self, other: Scope) -> Scope {
        self.columns.extend(other.columns);
        self
    }

    fn resolve(&self, table: Option<&str>, name: &str) -> PlanResult<usize> {
        let mut matches = self.columns.iter().enumerate().filter(|(_, c)| {
            c.name == name
                && match table {
                    Some(t) => c.qualifier == t,
                    None => !c.hidden,
                }
        });
        let display = match table {
            Some(t) => format!("{}.{}", t, name),
            None => name.to_string(),
        };
        match (matches.next(), matches.next()) {
            (Some((index, _)), None) => Ok(index),
            (Some(_), Some(_)) => Err(PlanError::AmbiguousColumn(display)),
            (None, _) => Err(PlanError::ColumnNotFound(display)),
        }
    }
}

/// State for binding expressions above an aggregate.
struct Grouping<'s> {
    input: &'s Scope,
    groups: &'s [BoundExpr],
    /// Aggregate calls in output order, as written.
    calls: &'s [Expr],
}

enum BindContext<'s> {
    Row(&'s Scope),
    Grouped(Grouping<'s>),
}

/// One projected column before binding.
enum OutputItem {
    /// Column of the FROM row, from a wildcard.
    Input(usize),
    Expr(Expr),
}

fn is_aggregate_call(expr: &Expr) -> bool {
    matches!(expr, Expr::Function { name, wildcard, .. }
        if *wildcard || AggregateFunction::from_name(name).is_some())
}

fn contains_aggregate(expr: &Expr) -> bool {
    let mut found = false;
    expr.visit(&mut |e| found |= is_aggregate_call(e));
    found
}

/// The query planner.
pub struct QueryPlanner<'a> {
    catalog: &'a Catalog,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Create a logical plan for a SELECT statement.
    pub fn plan_select(&self, select: &Select) -> PlanResult<QueryPlan> {
        let mut relations = BTreeSet::new();
        let (plan, columns) = self.plan_query(select, 0, &mut relations)?;
        Ok(QueryPlan {
            plan,
            columns,
            relations,
        })
    }

    /// Bind an expression over the columns of one table, as in UPDATE and
    /// DELETE.
    pub fn bind_row(&self, table: &TableSchema, qualifier: &str, expr: &Expr) -> PlanResult<BoundExpr> {
        let scope = Scope::new(qualifier, table.column_names());
        self.bind(expr, &BindContext::Row(&scope))
    }

    /// Bind an expression that may not reference any column.
    pub fn bind_constant(&self, expr: &Expr) -> PlanResult<BoundExpr> {
        self.bind(expr, &BindContext::Row(&Scope::default()))
    }

    fn plan_query(
        &self,
        select: &Select,
        depth: usize,
        relations: &mut BTreeSet<QualifiedName>,
    ) -> PlanResult<(LogicalPlan, Vec<String>)> {
        let (mut plan, scope) = match &select.from {
            Some(from) => self.plan_from(from, depth, relations)?,
            None => (LogicalPlan::Single, Scope::default()),
        };

        if let Some(predicate) = &select.where_clause {
            plan = LogicalPlan::Filter {
                input: Box::new(plan),
                predicate: self.bind(predicate, &BindContext::Row(&scope))?,
            };
        }

        // Expand the projection.
        let mut items: Vec<(OutputItem, String, bool)> = Vec::new();
        for item in &select.projection {
            match item {
                SelectItem::Wildcard => {
                    for (index, column) in scope.columns.iter().enumerate() {
                        if !column.hidden {
                            items.push((OutputItem::Input(index), column.name.clone(), false));
                        }
                    }
                }
                SelectItem::QualifiedWildcard(qualifier) => {
                    let before = items.len();
                    for (index, column) in scope.columns.iter().enumerate() {
                        if column.qualifier == *qualifier {
                            items.push((OutputItem::Input(index), column.name.clone(), false));
                        }
                    }
                    if items.len() == before {
                        return Err(PlanError::TableNotFound(qualifier.clone()));
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    let name = match (alias, expr) {
                        (Some(alias), _) => alias.clone(),
                        (None, Expr::Column { name, .. }) => name.clone(),
                        (None, expr) => expr.to_string(),
                    };
                    items.push((OutputItem::Expr(expr.clone()), name, alias.is_some()));
                }
            }
        }
        if items.is_empty() {
            return Err(PlanError::Unsupported("SELECT list is empty".into()));
        }

        // ORDER BY may name an output alias or position.
        let mut order: Vec<(OutputItem, bool)> = Vec::with_capacity(select.order_by.len());
        for spec in &select.order_by {
            let item = match &spec.expr {
                Expr::Literal(LiteralValue::Integer(n)) => {
                    let position = usize::try_from(*n)
                        .ok()
                        .filter(|p| (1..=items.len()).contains(p))
                        .ok_or_else(|| {
                            PlanError::Unsupported(format!("ORDER BY position {} is not in the select list", n))
                        })?;
                    match &items[position - 1].0 {
                        OutputItem::Input(index) => OutputItem::Input(*index),
                        OutputItem::Expr(expr) => OutputItem::Expr(expr.clone()),
                    }
                }
                Expr::Column { table: None, name } => {
                    match items.iter().find(|(_, alias, aliased)| *aliased && alias == name) {
                        Some((OutputItem::Expr(expr), _, _)) => OutputItem::Expr(expr.clone()),
                        _ => OutputItem::Expr(spec.expr.clone()),
                    }
                }
                expr => OutputItem::Expr(expr.clone()),
            };
            order.push((item, spec.ascending));
        }

        let aggregated = !select.group_by.is_empty()
            || select.having.is_some()
            || items
                .iter()
                .map(|(item, _, _)| item)
                .chain(order.iter().map(|(item, _)| item))
                .any(|item| matches!(item, OutputItem::Expr(e) if contains_aggregate(e)));

        let names: Vec<String> = items.iter().map(|(_, name, _)| name.clone()).collect();
        let (exprs, sort) = if aggregated {
            let row = BindContext::Row(&scope);
            let groups = select
                .group_by
                .iter()
                .map(|expr| {
                    if contains_aggregate(expr) {
                        Err(PlanError::Unsupported("aggregate functions are not allowed in GROUP BY".into()))
                    } else {
                        self.bind(expr, &row)
                    }
                })
                .collect::<PlanResult<Vec<_>>>()?;

            let mut calls: Vec<Expr> = Vec::new();
            let mut collect = |expr: &Expr| {
                expr.visit(&mut |e| {
                    if is_aggregate_call(e) && !calls.contains(e) {
                        calls.push(e.clone());
                    }
                })
            };
            for (item, _, _) in &items {
                if let OutputItem::Expr(expr) = item {
                    collect(expr);
                }
            }
            if let Some(having) = &select.having {
                collect(having);
            }
            for (item, _) in &order {
                if let OutputItem::Expr(expr) = item {
                    collect(expr);
                }
            }
            let aggregates = calls
                .iter()
                .map(|call| self.bind_aggregate(call, &scope))
                .collect::<PlanResult<Vec<_>>>()?;

            plan = LogicalPlan::Aggregate {
                input: Box::new(plan),
                group_by: groups.clone(),
                aggregates,
            };

            let grouped = BindContext::Grouped(Grouping {
                input: &scope,
                groups: &groups,
                calls: &calls,
            });
            if let Some(having) = &select.having {
                plan = LogicalPlan::Filter {
                    input: Box::new(plan),
                    predicate: self.bind(having, &grouped)?,
                };
            }
            let bind_item = |item: &OutputItem| match item {
                OutputItem::Input(index) => groups
                    .iter()
                    .position(|g| *g == BoundExpr::Column(*index))
                    .map(BoundExpr::Column)
                    .ok_or_else(|| PlanError::NotGrouped(scope.columns[*index].name.clone())),
                OutputItem::Expr(expr) => self.bind(expr, &grouped),
            };
            let exprs = items.iter().map(|(item, _, _)| bind_item(item)).collect::<PlanResult<Vec<_>>>()?;
            let sort = order
                .iter()
                .map(|(item, ascending)| {
                    Ok(SortSpec {
                        expr: bind_item(item)?,
                        ascending: *ascending,
                    })
                })
                .collect::<PlanResult<Vec<_>>>()?;
            (exprs, sort)
        } else {
            let row = BindContext::Row(&scope);
            let bind_item = |item: &OutputItem| match item {
                OutputItem::Input(index) => Ok(BoundExpr::Column(*index)),
                OutputItem::Expr(expr) => self.bind(expr, &row),
            };
            let exprs = items.iter().map(|(item, _, _)| bind_item(item)).collect::<PlanResult<Vec<_>>>()?;
            let sort = order
                .iter()
                .map(|(item, ascending)| {
                    Ok(SortSpec {
                        expr: bind_item(item)?,
                        ascending: *ascending,
                    })
                })
                .collect::<PlanResult<Vec<_>>>()?;
            (exprs, sort)
        };

        if !sort.is_empty() {
            plan = LogicalPlan::Sort {
                input: Box::new(plan),
                order: sort,
            };
        }
        plan = LogicalPlan::Project {
            input: Box::new(plan),
            exprs,
            names: names.clone(),
        };
        if select.distinct {
            plan = LogicalPlan::Distinct { input: Box::new(plan) };
        }
        if select.limit.is_some() || select.offset.is_some() {
            plan = LogicalPlan::Limit {
                input: Box::new(plan),
                limit: select.limit,
                offset: select.offset.unwrap_or(0),
            };
        }

        Ok((plan, names))
    }

    fn plan_from(
        &self,
        from: &FromClause,
        depth: usize,
        relations: &mut BTreeSet<QualifiedName>,
    ) -> PlanResult<(LogicalPlan, Scope)> {
        let (mut plan, mut scope) = self.plan_relation(&from.base, depth, relations)?;

        for join in &from.joins {
            let (right, mut right_scope) = self.plan_relation(&join.relation, depth, relations)?;
            let left_width = scope.len();

            let on = match &join.constraint {
                JoinConstraint::On(expr) => {
                    scope = scope.concat(right_scope);
                    Some(self.bind(expr, &BindContext::Row(&scope))?)
                }
                JoinConstraint::Using(columns) => {
                    let mut condition: Option<BoundExpr> = None;
                    for column in columns {
                        let left = scope
                            .resolve(None, column)
                            .map_err(|e| PlanError::InvalidJoin(format!("USING ({}): {}", column, e)))?;
                        let right_index = right_scope
                            .resolve(None, column)
                            .map_err(|e| PlanError::InvalidJoin(format!("USING ({}): {}", column, e)))?;
                        right_scope.columns[right_index].hidden = true;
                        let eq = BoundExpr::Binary {
                            left: Box::new(BoundExpr::Column(left)),
                            op: BinaryOperator::Eq,
                            right: Box::new(BoundExpr::Column(left_width + right_index)),
                        };
                        condition = Some(match condition {
                            Some(prev) => BoundExpr::Binary {
                                left: Box::new(prev),
                                op: BinaryOperator::And,
                                right: Box::new(eq),
                            },
                            None => eq,
                        });
                    }
                    scope = scope.concat(right_scope);
                    condition
                }
                JoinConstraint::None => {
                    scope = scope.concat(right_scope);
                    None
                }
            };

            let join_type = match (join.kind, &on) {
                (JoinKind::Left, None) => {
                    return Err(PlanError::InvalidJoin("LEFT JOIN requires ON or USING".into()))
                }
                (JoinKind::Left, Some(_)) => JoinType::Left,
                (JoinKind::Inner, Some(_)) => JoinType::Inner,
                (JoinKind::Inner, None) | (JoinKind::Cross, None) => JoinType::Cross,
                (JoinKind::Cross, Some(_)) => {
                    return Err(PlanError::InvalidJoin("CROSS JOIN cannot have a join condition".into()))
                }
            };

            plan = LogicalPlan::Join {
                left: Box::new(plan),
                right: Box::new(right),
                join_type,
                on,
            };
        }

        Ok((plan, scope))
    }

    fn plan_relation(
        &self,
        relation: &TableRef,
        depth: usize,
        relations: &mut BTreeSet<QualifiedName>,
    ) -> PlanResult<(LogicalPlan, Scope)> {
        let qualifier = relation.qualifier();
        match relation {
            TableRef::Table { name, .. } => {
                let qualified = name.qualified();
                if let Some(view) = self.catalog.get_view(&qualified) {
                    if depth >= MAX_VIEW_DEPTH {
                        return Err(PlanError::Unsupported(format!("view {} is nested too deeply", qualified)));
                    }
                    relations.insert(qualified);
                    let (plan, columns) = self.plan_query(&view.query, depth + 1, &mut BTreeSet::new())?;
                    return Ok((plan, Scope::new(qualifier, columns)));
                }
                let table = self
                    .catalog
                    .get_table(&qualified)
                    .map_err(|_| PlanError::TableNotFound(name.to_string()))?;
                relations.insert(qualified.clone());
                let columns: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
                let scope = Scope::new(qualifier, columns.iter().cloned());
                Ok((
                    LogicalPlan::Scan {
                        table: qualified,
                        columns,
                    },
                    scope,
                ))
            }
            TableRef::Function { name, args, .. } => {
                if name != "range" {
                    return Err(PlanError::UnknownFunction(name.clone()));
                }
                if args.is_empty() || args.len() > 3 {
                    return Err(PlanError::Unsupported("range expects 1 to 3 arguments".into()));
                }
                let args = args
                    .iter()
                    .map(|arg| self.bind_constant(arg))
                    .collect::<PlanResult<Vec<_>>>()?;
                Ok((LogicalPlan::Range { args }, Scope::new(qualifier, ["range"])))
            }
        }
    }

    fn bind_aggregate(&self, call: &Expr, input: &Scope) -> PlanResult<AggregateExpr> {
        let Expr::Function {
            name,
            args,
            distinct,
            wildcard,
        } = call
        else {
            return Err(PlanError::Unsupported(format!("{} is not an aggregate", call)));
        };

        if *wildcard {
            if name != "count" {
                return Err(PlanError::Unsupported(format!("{}(*) is not supported", name)));
            }
            return Ok(AggregateExpr {
                function: AggregateFunction::CountStar,
                arg: None,
                distinct: false,
            });
        }

        let function = AggregateFunction::from_name(name).ok_or_else(|| PlanError::UnknownFunction(name.clone()))?;
        let [arg] = args.as_slice() else {
            return Err(PlanError::Unsupported(format!("{} expects one argument", name)));
        };
        if contains_aggregate(arg) {
            return Err(PlanError::Unsupported(format!("nested aggregate in {}", call)));
        }
        Ok(AggregateExpr {
            function,
            arg: Some(self.bind(arg, &BindContext::Row(input))?),
            distinct: *distinct,
        })
    }

    /// Above an aggregate: an aggregate call or a GROUP BY expression
    /// becomes a reference into the aggregate's output row.
    fn lookup_grouped(&self, expr: &Expr, grouping: &Grouping<'_>) -> Option<BoundExpr> {
        if is_aggregate_call(expr) {
            let index = grouping.calls.iter().position(|c| c == expr)?;
            return Some(BoundExpr::Column(grouping.groups.len() + index));
        }
        if contains_aggregate(expr) {
            return None;
        }
        let bound = self.bind(expr, &BindContext::Row(grouping.input)).ok()?;
        grouping
            .groups
            .iter()
            .position(|g| *g == bound)
            .map(BoundExpr::Column)
    }

    fn bind(&self, expr: &Expr, ctx: &BindContext<'_>) -> PlanResult<BoundExpr> {
        if let BindContext::Grouped(grouping) = ctx {
            if let Some(bound) = self.lookup_grouped(expr, grouping) {
                return Ok(bound);
            }
            if let Expr::Column { .. } = expr {
                return Err(PlanError::NotGrouped(expr.to_string()));
            }
        }

        let bind = |e: &Expr| self.bind(e, ctx).map(Box::new);
        Ok(match expr {
            Expr::Column { table, name } => match ctx {
                BindContext::Row(scope) => BoundExpr::Column(scope.resolve(table.as_deref(), name)?),
                BindContext::Grouped(_) => return Err(PlanError::NotGrouped(expr.to_string())),
            },
            Expr::Literal(literal) => BoundExpr::Literal(literal.to_value()),
            Expr::BinaryOp { left, op, right } => BoundExpr::Binary {
                left: bind(left)?,
                op: *op,
                right: bind(right)?,
            },
            Expr::UnaryOp { op, expr } => BoundExpr::Unary {
                op: *op,
                expr: bind(expr)?,
            },
            Expr::IsNull { expr, negated } => BoundExpr::IsNull {
                expr: bind(expr)?,
                negated: *negated,
            },
            Expr::InList { expr, list, negated } => BoundExpr::InList {
                expr: bind(expr)?,
                list: list
                    .iter()
                    .map(|item| self.bind(item, ctx))
                    .collect::<PlanResult<Vec<_>>>()?,
                negated: *negated,
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => BoundExpr::Between {
                expr: bind(expr)?,
                low: bind(low)?,
                high: bind(high)?,
                negated: *negated,
            },
            Expr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
            } => BoundExpr::Like {
                expr: bind(expr)?,
                pattern: pattern.clone(),
                negated: *negated,
                case_insensitive: *case_insensitive,
            },
            Expr::Cast { expr, data_type } => BoundExpr::Cast {
                expr: bind(expr)?,
                data_type: *data_type,
            },
            Expr::Nested(inner) => self.bind(inner, ctx)?,
            Expr::Function { name, args, distinct, .. } => {
                if is_aggregate_call(expr) {
                    return Err(PlanError::Unsupported(format!(
                        "aggregate function {} is not allowed here",
                        name
                    )));
                }
                if name == "nextval" {
                    let target = expr.nextval_target().ok_or_else(|| {
                        PlanError::Unsupported("nextval expects a sequence name as a string literal".into())
                    })?;
                    let sequence = QualifiedName::parse_literal(target);
                    self.catalog.get_sequence(&sequence)?;
                    return Ok(BoundExpr::NextVal(sequence));
                }
                let function = ScalarFunction::from_name(name).ok_or_else(|| PlanError::UnknownFunction(name.clone()))?;
                let (min, max) = function.arity();
                if *distinct || args.len() < min || args.len() > max {
                    return Err(PlanError::Unsupported(format!("invalid arguments to {}", expr)));
                }
                BoundExpr::Function {
                    function,
                    args: args
                        .iter()
                        .map(|arg| self.bind(arg, ctx))
                        .collect::<PlanResult<Vec<_>>>()?,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, SchemaBuilder, Sequence, ViewDef};
    use crate::sql::{Parser, Statement};
    use crate::storage::Value;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .create_table(
                SchemaBuilder::new(QualifiedName::main("integers"))
                    .add_column("i", DataType::Integer)
                    .add_column("j", DataType::Integer)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
            .create_table(
                SchemaBuilder::new(QualifiedName::main("names"))
                    .add_column("i", DataType::Integer)
                    .add_column("name", DataType::Text)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
            .create_sequence(Sequence::new(QualifiedName::main("seq"), 1, 1).unwrap())
            .unwrap();
        catalog
    }

    fn select(sql: &str) -> Select {
        match Parser::parse(sql).unwrap() {
            Statement::Select(select) => *select,
            other => panic!("not a select: {:?}", other),
        }
    }

    fn plan(catalog: &Catalog, sql: &str) -> PlanResult<QueryPlan> {
        QueryPlanner::new(catalog).plan_select(&select(sql))
    }

    #[test]
    fn test_simple_projection() {
        let catalog = catalog();
        let planned = plan(&catalog, "SELECT j, i + 1 AS k FROM integers WHERE i > 10").unwrap();
        assert_eq!(planned.columns, vec!["j", "k"]);
        assert_eq!(planned.relations, BTreeSet::from([QualifiedName::main("integers")]));
        match &planned.plan {
            LogicalPlan::Project { input, exprs, .. } => {
                assert_eq!(exprs[0], BoundExpr::Column(1));
                assert!(matches!(**input, LogicalPlan::Filter { .. }));
            }
            other => panic!("unexpected plan {}", other),
        }
    }

    #[test]
    fn test_unknown_names() {
        let catalog = catalog();
        assert!(matches!(
            plan(&catalog, "SELECT * FROM missing"),
            Err(PlanError::TableNotFound(_))
        ));
        assert!(matches!(
            plan(&catalog, "SELECT k FROM integers"),
            Err(PlanError::ColumnNotFound(_))
        ));
        assert!(matches!(
            plan(&catalog, "SELECT i FROM integers, names"),
            Err(PlanError::AmbiguousColumn(_))
        ));
    }

    #[test]
    fn test_using_join_hides_right_column() {
        let catalog = catalog();
        let planned = plan(&catalog, "SELECT * FROM integers JOIN names USING (i)").unwrap();
        assert_eq!(planned.columns, vec!["i", "j", "name"]);
        let planned = plan(&catalog, "SELECT names.i, i FROM integers JOIN names USING (i)").unwrap();
        match &planned.plan {
            LogicalPlan::Project { exprs, .. } => {
                assert_eq!(exprs, &vec![BoundExpr::Column(2), BoundExpr::Column(0)]);
            }
            other => panic!("unexpected plan {}", other),
        }
    }

    #[test]
    fn test_aggregate_layout() {
        let catalog = catalog();
        let planned = plan(
            &catalog,
            "SELECT i, sum(j) * max(j) FROM integers GROUP BY i HAVING count(*) > 1 ORDER BY 2",
        )
        .unwrap();
        assert_eq!(planned.columns, vec!["i", "sum(j) * max(j)"]);
        let LogicalPlan::Project { input, exprs, .. } = &planned.plan else {
            panic!("expected a projection");
        };
        assert_eq!(exprs[0], BoundExpr::Column(0));
        assert_eq!(
            exprs[1],
            BoundExpr::Binary {
                left: Box::new(BoundExpr::Column(1)),
                op: BinaryOperator::Multiply,
                right: Box::new(BoundExpr::Column(2)),
            }
        );
        let LogicalPlan::Sort { input, .. } = &**input else {
            panic!("expected a sort");
        };
        let LogicalPlan::Filter { input, .. } = &**input else {
            panic!("expected a having filter");
        };
        match &**input {
            LogicalPlan::Aggregate { group_by, aggregates, .. } => {
                assert_eq!(group_by, &vec![BoundExpr::Column(0)]);
                let functions: Vec<_> = aggregates.iter().map(|a| a.function).collect();
                assert_eq!(
                    functions,
                    vec![AggregateFunction::Sum, AggregateFunction::Max, AggregateFunction::CountStar]
                );
            }
            other => panic!("unexpected plan {}", other),
        }
    }

    #[test]
    fn test_ungrouped_column_is_rejected() {
        let catalog = catalog();
        assert!(matches!(
            plan(&catalog, "SELECT j, count(*) FROM integers GROUP BY i"),
            Err(PlanError::NotGrouped(_))
        ));
        assert!(plan(&catalog, "SELECT i FROM integers WHERE sum(i) > 1").is_err());
    }

    #[test]
    fn test_order_by_alias() {
        let catalog = catalog();
        let planned = plan(&catalog, "SELECT i * 2 AS doubled FROM integers ORDER BY doubled DESC").unwrap();
        let LogicalPlan::Project { input, .. } = &planned.plan else {
            panic!("expected a projection");
        };
        match &**input {
            LogicalPlan::Sort { order, .. } => {
                assert!(!order[0].ascending);
                assert!(matches!(order[0].expr, BoundExpr::Binary { .. }));
            }
            other => panic!("unexpected plan {}", other),
        }
    }

    #[test]
    fn test_view_is_expanded() {
        let mut catalog = catalog();
        let query = select("SELECT i FROM integers WHERE i > 10");
        catalog
            .create_view(ViewDef {
                name: QualifiedName::main("big"),
                sql: "SELECT i FROM integers WHERE i > 10".into(),
                query,
                columns: vec!["i".into()],
                dependencies: vec![QualifiedName::main("integers")],
            })
            .unwrap();
        let planned = plan(&catalog, "SELECT big.i FROM big").unwrap();
        assert_eq!(planned.relations, BTreeSet::from([QualifiedName::main("big")]));
        assert_eq!(
            planned.plan.referenced_tables(),
            BTreeSet::from([QualifiedName::main("integers")])
        );
    }

    #[test]
    fn test_range_and_constants() {
        let catalog = catalog();
        let planned = plan(&catalog, "SELECT range FROM range(3)").unwrap();
        assert_eq!(planned.columns, vec!["range"]);

        let planner = QueryPlanner::new(&catalog);
        let bound = planner
            .bind_constant(&Expr::Literal(LiteralValue::Integer(4)))
            .unwrap();
        assert_eq!(bound, BoundExpr::Literal(Value::Integer(4)));
        assert!(planner.bind_constant(&Expr::column("i")).is_err());
    }

    #[test]
    fn test_nextval_requires_sequence() {
        let catalog = catalog();
        let planner = QueryPlanner::new(&catalog);
        let call = |name: &str| Expr::Function {
            name: "nextval".into(),
            args: vec![Expr::Literal(LiteralValue::String(name.into()))],
            distinct: false,
            wildcard: false,
        };
        assert_eq!(
            planner.bind_constant(&call("seq")).unwrap(),
            BoundExpr::NextVal(QualifiedName::main("seq"))
        );
        assert!(matches!(
            planner.bind_constant(&call("nope")),
            Err(PlanError::Schema(_))
        ));
    }
}
