//! Logical query plan representation.
//!
//! Logical plans represent *what* the query does, not *how* it will be
//! executed. Column references are already resolved to positions in the
//! input row, so the executor never looks at names.

use std::collections::BTreeSet;
use std::fmt;

use crate::catalog::{DataType, QualifiedName};
use crate::sql::{BinaryOperator, UnaryOperator};
use crate::storage::Value;

/// Join types supported by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Cross,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::Left => write!(f, "LEFT"),
            JoinType::Cross => write!(f, "CROSS"),
        }
    }
}

/// Aggregate function types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// `count(*)`
    CountStar,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "avg" => Some(AggregateFunction::Avg),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            _ => None,
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::CountStar | AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Avg => write!(f, "AVG"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
        }
    }
}

/// Scalar functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunction {
    Lower,
    Upper,
    Length,
    Abs,
    Coalesce,
}

impl ScalarFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "lower" => Some(ScalarFunction::Lower),
            "upper" => Some(ScalarFunction::Upper),
            "length" => Some(ScalarFunction::Length),
            "abs" => Some(ScalarFunction::Abs),
            "coalesce" => Some(ScalarFunction::Coalesce),
            _ => None,
        }
    }

    /// Accepted argument counts as (min, max).
    pub fn arity(&self) -> (usize, usize) {
        match self {
            ScalarFunction::Coalesce => (1, usize::MAX),
            _ => (1, 1),
        }
    }
}

/// An expression with every column resolved to an input position.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    Column(usize),
    Literal(Value),
    Binary {
        left: Box<BoundExpr>,
        op: BinaryOperator,
        right: Box<BoundExpr>,
    },
    Unary {
        op: UnaryOperator,
        expr: Box<BoundExpr>,
    },
    IsNull {
        expr: Box<BoundExpr>,
        negated: bool,
    },
    InList {
        expr: Box<BoundExpr>,
        list: Vec<BoundExpr>,
        negated: bool,
    },
    Between {
        expr: Box<BoundExpr>,
        low: Box<BoundExpr>,
        high: Box<BoundExpr>,
        negated: bool,
    },
    Like {
        expr: Box<BoundExpr>,
        pattern: String,
        negated: bool,
        case_insensitive: bool,
    },
    Function {
        function: ScalarFunction,
        args: Vec<BoundExpr>,
    },
    Cast {
        expr: Box<BoundExpr>,
        data_type: DataType,
    },
    /// `nextval('<sequence>')`
    NextVal(QualifiedName),
}

/// An aggregate computed by [`LogicalPlan::Aggregate`].
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub function: AggregateFunction,
    /// `None` only for `count(*)`.
    pub arg: Option<BoundExpr>,
    pub distinct: bool,
}

/// Sort specification.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub expr: BoundExpr,
    pub ascending: bool,
}

/// Logical query plan.
///
/// This is a tree structure representing the logical operations of a query.
/// Each node transforms its input(s) in some way.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    /// Scan a table, returning all rows.
    Scan {
        table: QualifiedName,
        columns: Vec<String>,
    },

    /// `range(...)` table function; arguments are constant expressions.
    Range { args: Vec<BoundExpr> },

    /// A single row with no columns (SELECT without FROM).
    Single,

    /// Filter rows based on a predicate.
    Filter {
        input: Box<LogicalPlan>,
        predicate: BoundExpr,
    },

    /// Compute output columns.
    Project {
        input: Box<LogicalPlan>,
        exprs: Vec<BoundExpr>,
        names: Vec<String>,
    },

    /// Join two inputs; output is the left row followed by the right row.
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        join_type: JoinType,
        on: Option<BoundExpr>,
    },

    /// Group by with aggregates; output is the group values followed by the
    /// aggregate values.
    Aggregate {
        input: Box<LogicalPlan>,
        group_by: Vec<BoundExpr>,
        aggregates: Vec<AggregateExpr>,
    },

    /// Sort by expressions over the input row.
    Sort {
        input: Box<LogicalPlan>,
        order: Vec<SortSpec>,
    },

    /// Remove duplicate rows, keeping the first occurrence.
    Distinct { input: Box<LogicalPlan> },

    /// Limit number of rows.
    Limit {
        input: Box<LogicalPlan>,
        limit: Option<u64>,
        offset: u64,
    },
}

impl LogicalPlan {
    /// Number of values in each output row.
    pub fn width(&self) -> usize {
        match self {
            LogicalPlan::Scan { columns, .. } => columns.len(),
            LogicalPlan::Range { .. } => 1,
            LogicalPlan::Single => 0,
            LogicalPlan::Project { exprs, .. } => exprs.len(),
            LogicalPlan::Join { left, right, .. } => left.width() + right.width(),
            LogicalPlan::Aggregate {
                group_by, aggregates, ..
            } => group_by.len() + aggregates.len(),
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Distinct { input }
            | LogicalPlan::Limit { input, .. } => input.width(),
        }
    }

    /// Get the tables scanned by this plan.
    pub fn referenced_tables(&self) -> BTreeSet<QualifiedName> {
        let mut tables = BTreeSet::new();
        self.collect_tables(&mut tables);
        tables
    }

    fn collect_tables(&self, tables: &mut BTreeSet<QualifiedName>) {
        match self {
            LogicalPlan::Scan { table, .. } => {
                tables.insert(table.clone());
            }
            LogicalPlan::Range { .. } | LogicalPlan::Single => {}
            LogicalPlan::Join { left, right, .. } => {
                left.collect_tables(tables);
                right.collect_tables(tables);
            }
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Distinct { input }
            | LogicalPlan::Limit { input, .. } => input.collect_tables(tables),
        }
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format_indent(f, 0)
    }
}

impl LogicalPlan {
    fn format_indent(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self {
            LogicalPlan::Scan { table, columns } => {
                writeln!(f, "{}Scan: {} [{}]", pad, table, columns.join(", "))
            }
            LogicalPlan::Range { args } => writeln!(f, "{}Range: {:?}", pad, args),
            LogicalPlan::Single => writeln!(f, "{}Single", pad),
            LogicalPlan::Filter { input, predicate } => {
                writeln!(f, "{}Filter: {:?}", pad, predicate)?;
                input.format_indent(f, indent + 1)
            }
            LogicalPlan::Project { input, names, .. } => {
                writeln!(f, "{}Project: [{}]", pad, names.join(", "))?;
                input.format_indent(f, indent + 1)
            }
            LogicalPlan::Join {
                left,
                right,
                join_type,
                on,
            } => {
                write!(f, "{}Join: {}", pad, join_type)?;
                if let Some(cond) = on {
                    write!(f, " ON {:?}", cond)?;
                }
                writeln!(f)?;
                left.format_indent(f, indent + 1)?;
                right.format_indent(f, indent + 1)
            }
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
            } => {
                let aggs: Vec<String> = aggregates
                    .iter()
                    .map(|a| format!("{}({:?})", a.function, a.arg))
                    .collect();
                writeln!(
                    f,
                    "{}Aggregate: groups={}, aggs=[{}]",
                    pad,
                    group_by.len(),
                    aggs.join(", ")
                )?;
                input.format_indent(f, indent + 1)
            }
            LogicalPlan::Sort { input, order } => {
                writeln!(f, "{}Sort: {} keys", pad, order.len())?;
                input.format_indent(f, indent + 1)
            }
            LogicalPlan::Distinct { input } => {
                writeln!(f, "{}Distinct", pad)?;
                input.format_indent(f, indent + 1)
            }
            LogicalPlan::Limit {
                input,
                limit,
                offset,
            } => {
                writeln!(f, "{}Limit: {:?} OFFSET {}", pad, limit, offset)?;
                input.format_indent(f, indent + 1)
            }
        }
    }
}
