//! Volcano-style operators for query execution.
//!
//! Each operator implements the iterator model where rows are pulled
//! one at a time through the tree.

use std::collections::{HashMap, HashSet};

use super::error::{ExecuteError, ExecuteResult};
use super::eval::{evaluate, is_true, Accumulator, EvalContext};
use crate::planner::{AggregateExpr, BoundExpr, JoinType, LogicalPlan, SortSpec};
use crate::storage::{DatabaseState, IndexKey, Row, TableData, Value};

/// Trait for all query operators.
pub trait Operator: Send {
    /// Get the next row, or None if exhausted.
    fn next_row(&mut self) -> ExecuteResult<Option<Row>>;

    /// Reset the operator to start over.
    fn reset(&mut self) -> ExecuteResult<()>;
}

/// Build the operator tree for a plan over `state`.
pub fn build_operator<'a>(plan: &LogicalPlan, state: &'a DatabaseState) -> ExecuteResult<Box<dyn Operator + 'a>> {
    let ctx = EvalContext {
        catalog: &state.catalog,
    };
    Ok(match plan {
        LogicalPlan::Scan { table, .. } => Box::new(ScanOperator::new(state.table_data(table)?)),
        LogicalPlan::Range { args } => {
            let values = args
                .iter()
                .map(|arg| match evaluate(arg, &[], ctx)? {
                    Value::Integer(i) => Ok(i),
                    other => Err(ExecuteError::TypeMismatch(format!(
                        "range expects INTEGER arguments, found {}",
                        other.type_name()
                    ))),
                })
                .collect::<ExecuteResult<Vec<i64>>>()?;
            let (start, end, step) = match values.as_slice() {
                [end] => (0, *end, 1),
                [start, end] => (*start, *end, 1),
                [start, end, step] => (*start, *end, *step),
                _ => return Err(ExecuteError::InvalidExpression("range expects 1 to 3 arguments".into())),
            };
            Box::new(RangeOperator::new(start, end, step)?)
        }
        LogicalPlan::Single => Box::new(SingleOperator { done: false }),
        LogicalPlan::Filter { input, predicate } => Box::new(FilterOperator {
            source: build_operator(input, state)?,
            predicate: predicate.clone(),
            ctx,
        }),
        LogicalPlan::Project { input, exprs, .. } => Box::new(ProjectOperator {
            source: build_operator(input, state)?,
            exprs: exprs.clone(),
            ctx,
        }),
        LogicalPlan::Join {
            left,
            right,
            join_type,
            on,
        } => Box::new(NestedLoopJoinOperator::new(
            build_operator(left, state)?,
            build_operator(right, state)?,
            right.width(),
            *join_type,
            on.clone(),
            ctx,
        )),
        LogicalPlan::Aggregate {
            input,
            group_by,
            aggregates,
        } => Box::new(AggregateOperator::new(
            build_operator(input, state)?,
            group_by.clone(),
            aggregates.clone(),
            ctx,
        )),
        LogicalPlan::Sort { input, order } => {
            Box::new(SortOperator::new(build_operator(input, state)?, order.clone(), ctx))
        }
        LogicalPlan::Distinct { input } => Box::new(DistinctOperator {
            source: build_operator(input, state)?,
            seen: HashSet::new(),
        }),
        LogicalPlan::Limit {
            input,
            limit,
            offset,
        } => Box::new(LimitOperator::new(build_operator(input, state)?, *limit, *offset)),
    })
}

/// Scan operator - streams the rows of a table.
pub struct ScanOperator<'a> {
    table: &'a TableData,
    rows: Box<dyn Iterator<Item = &'a Row> + Send + 'a>,
}

impl<'a> ScanOperator<'a> {
    pub fn new(table: &'a TableData) -> Self {
        Self {
            table,
            rows: Box::new(table.rows()),
        }
    }
}

impl Operator for ScanOperator<'_> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        Ok(self.rows.next().cloned())
    }

    fn reset(&mut self) -> ExecuteResult<()> {
        self.rows = Box::new(self.table.rows());
        Ok(())
    }
}

/// `range(start, end, step)`: integers from start up to (excluding) end.
pub struct RangeOperator {
    start: i64,
    end: i64,
    step: i64,
    next: Option<i64>,
}

impl RangeOperator {
    pub fn new(start: i64, end: i64, step: i64) -> ExecuteResult<Self> {
        if step == 0 {
            return Err(ExecuteError::InvalidExpression("range step must not be zero".into()));
        }
        Ok(Self {
            start,
            end,
            step,
            next: Some(start),
        })
    }
}

impl Operator for RangeOperator {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        let Some(current) = self.next else {
            return Ok(None);
        };
        let inside = if self.step > 0 {
            current < self.end
        } else {
            current > self.end
        };
        if !inside {
            self.next = None;
            return Ok(None);
        }
        self.next = current.checked_add(self.step);
        Ok(Some(vec![Value::Integer(current)]))
    }

    fn reset(&mut self) -> ExecuteResult<()> {
        self.next = Some(self.start);
        Ok(())
    }
}

/// One empty row, for SELECT without FROM.
pub struct SingleOperator {
    done: bool,
}

impl Operator for SingleOperator {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        Ok(Some(Vec::new()))
    }

    fn reset(&mut self) -> ExecuteResult<()> {
        self.done = false;
        Ok(())
    }
}

/// Filter operator - applies WHERE and HAVING.
pub struct FilterOperator<'a> {
    source: Box<dyn Operator + 'a>,
    predicate: BoundExpr,
    ctx: EvalContext<'a>,
}

impl Operator for FilterOperator<'_> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        while let Some(row) = self.source.next_row()? {
            if is_true(&self.predicate, &row, self.ctx)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) -> ExecuteResult<()> {
        self.source.reset()
    }
}

/// Project operator - computes output columns.
pub struct ProjectOperator<'a> {
    source: Box<dyn Operator + 'a>,
    exprs: Vec<BoundExpr>,
    ctx: EvalContext<'a>,
}

impl Operator for ProjectOperator<'_> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        match self.source.next_row()? {
            Some(row) => self
                .exprs
                .iter()
                .map(|expr| evaluate(expr, &row, self.ctx))
                .collect::<ExecuteResult<Row>>()
                .map(Some),
            None => Ok(None),
        }
    }

    fn reset(&mut self) -> ExecuteResult<()> {
        self.source.reset()
    }
}

/// Nested loop join; the right side is materialized once.
pub struct NestedLoopJoinOperator<'a> {
    left: Box<dyn Operator + 'a>,
    right: Box<dyn Operator + 'a>,
    right_width: usize,
    join_type: JoinType,
    on: Option<BoundExpr>,
    ctx: EvalContext<'a>,
    right_rows: Option<Vec<Row>>,
    current: Option<Row>,
    position: usize,
    matched: bool,
}

impl<'a> NestedLoopJoinOperator<'a> {
    pub fn new(
        left: Box<dyn Operator + 'a>,
        right: Box<dyn Operator + 'a>,
        right_width: usize,
        join_type: JoinType,
        on: Option<BoundExpr>,
        ctx: EvalContext<'a>,
    ) -> Self {
        Self {
            left,
            right,
            right_width,
            join_type,
            on,
            ctx,
            right_rows: None,
            current: None,
            position: 0,
            matched: false,
        }
    }

    fn materialize(&mut self) -> ExecuteResult<()> {
        if self.right_rows.is_some() {
            return Ok(());
        }
        let mut rows = Vec::new();
        while let Some(row) = self.right.next_row()? {
            rows.push(row);
        }
        self.right_rows = Some(rows);
        Ok(())
    }
}

impl Operator for NestedLoopJoinOperator<'_> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        self.materialize()?;
        let right_rows = self.right_rows.as_deref().unwrap_or_default();

        loop {
            let Some(left) = &self.current else {
                match self.left.next_row()? {
                    Some(row) => {
                        self.current = Some(row);
                        self.position = 0;
                        self.matched = false;
                        continue;
                    }
                    None => return Ok(None),
                }
            };

            while self.position < right_rows.len() {
                let right = &right_rows[self.position];
                self.position += 1;
                let mut combined = Vec::with_capacity(left.len() + right.len());
                combined.extend_from_slice(left);
                combined.extend_from_slice(right);
                let keep = match &self.on {
                    Some(on) => is_true(on, &combined, self.ctx)?,
                    None => true,
                };
                if keep {
                    self.matched = true;
                    return Ok(Some(combined));
                }
            }

            let unmatched = self.join_type == JoinType::Left && !self.matched;
            let left = self.current.take();
            if let (true, Some(mut row)) = (unmatched, left) {
                row.extend(std::iter::repeat(Value::Null).take(self.right_width));
                return Ok(Some(row));
            }
        }
    }

    fn reset(&mut self) -> ExecuteResult<()> {
        self.left.reset()?;
        self.current = None;
        self.position = 0;
        Ok(())
    }
}

/// Hash aggregate; groups come out in first-seen order.
pub struct AggregateOperator<'a> {
    source: Box<dyn Operator + 'a>,
    group_by: Vec<BoundExpr>,
    aggregates: Vec<AggregateExpr>,
    ctx: EvalContext<'a>,
    results: Option<std::vec::IntoIter<Row>>,
}

impl<'a> AggregateOperator<'a> {
    pub fn new(
        source: Box<dyn Operator + 'a>,
        group_by: Vec<BoundExpr>,
        aggregates: Vec<AggregateExpr>,
        ctx: EvalContext<'a>,
    ) -> Self {
        Self {
            source,
            group_by,
            aggregates,
            ctx,
            results: None,
        }
    }

    fn materialize(&mut self) -> ExecuteResult<()> {
        if self.results.is_some() {
            return Ok(());
        }

        let mut index: HashMap<IndexKey, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Vec<Accumulator>)> = Vec::new();
        while let Some(row) = self.source.next_row()? {
            let key = self
                .group_by
                .iter()
                .map(|expr| evaluate(expr, &row, self.ctx))
                .collect::<ExecuteResult<Vec<_>>>()?;
            let slot = match index.get(&IndexKey(key.clone())) {
                Some(slot) => *slot,
                None => {
                    let accumulators = self.aggregates.iter().map(Accumulator::new).collect();
                    groups.push((key.clone(), accumulators));
                    index.insert(IndexKey(key), groups.len() - 1);
                    groups.len() - 1
                }
            };
            for (aggregate, accumulator) in self.aggregates.iter().zip(&mut groups[slot].1) {
                let value = match &aggregate.arg {
                    Some(arg) => Some(evaluate(arg, &row, self.ctx)?),
                    None => None,
                };
                accumulator.update(value)?;
            }
        }

        // Without GROUP BY an empty input still yields one row.
        if groups.is_empty() && self.group_by.is_empty() {
            groups.push((Vec::new(), self.aggregates.iter().map(Accumulator::new).collect()));
        }

        let rows: Vec<Row> = groups
            .into_iter()
            .map(|(mut key, accumulators)| {
                key.extend(accumulators.iter().map(Accumulator::finish));
                key
            })
            .collect();
        self.results = Some(rows.into_iter());
        Ok(())
    }
}

impl Operator for AggregateOperator<'_> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        self.materialize()?;
        Ok(self.results.as_mut().and_then(Iterator::next))
    }

    fn reset(&mut self) -> ExecuteResult<()> {
        self.source.reset()?;
        self.results = None;
        Ok(())
    }
}

/// Sort operator - orders rows; NULLs sort last in either direction.
pub struct SortOperator<'a> {
    source: Box<dyn Operator + 'a>,
    order: Vec<SortSpec>,
    ctx: EvalContext<'a>,
    sorted: Option<std::vec::IntoIter<Row>>,
}

impl<'a> SortOperator<'a> {
    pub fn new(source: Box<dyn Operator + 'a>, order: Vec<SortSpec>, ctx: EvalContext<'a>) -> Self {
        Self {
            source,
            order,
            ctx,
            sorted: None,
        }
    }

    fn materialize(&mut self) -> ExecuteResult<()> {
        if self.sorted.is_some() {
            return Ok(());
        }

        let mut keyed: Vec<(Vec<Value>, Row)> = Vec::new();
        while let Some(row) = self.source.next_row()? {
            let keys = self
                .order
                .iter()
                .map(|spec| evaluate(&spec.expr, &row, self.ctx))
                .collect::<ExecuteResult<Vec<_>>>()?;
            keyed.push((keys, row));
        }

        let order = &self.order;
        keyed.sort_by(|(a, _), (b, _)| {
            for (spec, (va, vb)) in order.iter().zip(a.iter().zip(b)) {
                let cmp = match (va.is_null(), vb.is_null()) {
                    (false, false) if !spec.ascending => vb.sort_cmp(va),
                    _ => va.sort_cmp(vb),
                };
                if cmp != std::cmp::Ordering::Equal {
                    return cmp;
                }
            }
            std::cmp::Ordering::Equal
        });

        let rows: Vec<Row> = keyed.into_iter().map(|(_, row)| row).collect();
        self.sorted = Some(rows.into_iter());
        Ok(())
    }
}

impl Operator for SortOperator<'_> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        self.materialize()?;
        Ok(self.sorted.as_mut().and_then(Iterator::next))
    }

    fn reset(&mut self) -> ExecuteResult<()> {
        self.source.reset()?;
        self.sorted = None;
        Ok(())
    }
}

/// Distinct operator - drops rows already returned.
pub struct DistinctOperator<'a> {
    source: Box<dyn Operator + 'a>,
    seen: HashSet<IndexKey>,
}

impl Operator for DistinctOperator<'_> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        while let Some(row) = self.source.next_row()? {
            if self.seen.insert(IndexKey(row.clone())) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) -> ExecuteResult<()> {
        self.seen.clear();
        self.source.reset()
    }
}

/// Limit operator - restricts number of rows.
pub struct LimitOperator<'a> {
    source: Box<dyn Operator + 'a>,
    limit: Option<u64>,
    offset: u64,
    current: u64,
    skipped: u64,
}

impl<'a> LimitOperator<'a> {
    pub fn new(source: Box<dyn Operator + 'a>, limit: Option<u64>, offset: u64) -> Self {
        Self {
            source,
            limit,
            offset,
            current: 0,
            skipped: 0,
        }
    }
}

impl Operator for LimitOperator<'_> {
    fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
        while self.skipped < self.offset {
            if self.source.next_row()?.is_none() {
                return Ok(None);
            }
            self.skipped += 1;
        }

        if self.limit.is_some_and(|limit| self.current >= limit) {
            return Ok(None);
        }
        let row = self.source.next_row()?;
        if row.is_some() {
            self.current += 1;
        }
        Ok(row)
    }

    fn reset(&mut self) -> ExecuteResult<()> {
        self.source.reset()?;
        self.current = 0;
        self.skipped = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::sql::BinaryOperator;

    struct Rows {
        rows: Vec<Row>,
        position: usize,
    }

    impl Rows {
        fn boxed(rows: Vec<Vec<i64>>) -> Box<dyn Operator> {
            Box::new(Rows {
                rows: rows
                    .into_iter()
                    .map(|r| r.into_iter().map(Value::Integer).collect())
                    .collect(),
                position: 0,
            })
        }
    }

    impl Operator for Rows {
        fn next_row(&mut self) -> ExecuteResult<Option<Row>> {
            let row = self.rows.get(self.position).cloned();
            self.position += 1;
            Ok(row)
        }

        fn reset(&mut self) -> ExecuteResult<()> {
            self.position = 0;
            Ok(())
        }
    }

    fn drain(op: &mut dyn Operator) -> Vec<Row> {
        let mut out = Vec::new();
        while let Some(row) = op.next_row().unwrap() {
            out.push(row);
        }
        out
    }

    fn ints(rows: Vec<Vec<i64>>) -> Vec<Row> {
        rows.into_iter()
            .map(|r| r.into_iter().map(Value::Integer).collect())
            .collect()
    }

    #[test]
    fn test_range() {
        let mut op = RangeOperator::new(0, 3, 1).unwrap();
        assert_eq!(drain(&mut op), ints(vec![vec![0], vec![1], vec![2]]));
        let mut op = RangeOperator::new(5, 0, -2).unwrap();
        assert_eq!(drain(&mut op), ints(vec![vec![5], vec![3], vec![1]]));
        op.reset().unwrap();
        assert_eq!(drain(&mut op).len(), 3);
        assert!(RangeOperator::new(0, 1, 0).is_err());
    }

    #[test]
    fn test_left_join_pads_nulls() {
        let catalog = Catalog::new();
        let ctx = EvalContext { catalog: &catalog };
        let on = BoundExpr::Binary {
            left: Box::new(BoundExpr::Column(0)),
            op: BinaryOperator::Eq,
            right: Box::new(BoundExpr::Column(1)),
        };
        let mut join = NestedLoopJoinOperator::new(
            Rows::boxed(vec![vec![1], vec![2], vec![3]]),
            Rows::boxed(vec![vec![3], vec![1], vec![1]]),
            1,
            JoinType::Left,
            Some(on),
            ctx,
        );
        let rows = drain(&mut join);
        assert_eq!(
            rows,
            vec![
                vec![Value::Integer(1), Value::Integer(1)],
                vec![Value::Integer(1), Value::Integer(1)],
                vec![Value::Integer(2), Value::Null],
                vec![Value::Integer(3), Value::Integer(3)],
            ]
        );
    }

    #[test]
    fn test_aggregate_groups_in_first_seen_order() {
        let catalog = Catalog::new();
        let ctx = EvalContext { catalog: &catalog };
        let mut agg = AggregateOperator::new(
            Rows::boxed(vec![vec![2, 10], vec![1, 5], vec![2, 1]]),
            vec![BoundExpr::Column(0)],
            vec![AggregateExpr {
                function: crate::planner::AggregateFunction::Sum,
                arg: Some(BoundExpr::Column(1)),
                distinct: false,
            }],
            ctx,
        );
        assert_eq!(drain(&mut agg), ints(vec![vec![2, 11], vec![1, 5]]));

        let mut empty = AggregateOperator::new(
            Rows::boxed(vec![]),
            vec![],
            vec![AggregateExpr {
                function: crate::planner::AggregateFunction::CountStar,
                arg: None,
                distinct: false,
            }],
            ctx,
        );
        assert_eq!(drain(&mut empty), ints(vec![vec![0]]));
    }

    #[test]
    fn test_sort_distinct_limit() {
        let catalog = Catalog::new();
        let ctx = EvalContext { catalog: &catalog };
        let sort = SortOperator::new(
            Rows::boxed(vec![vec![3], vec![1], vec![3], vec![2]]),
            vec![SortSpec {
                expr: BoundExpr::Column(0),
                ascending: false,
            }],
            ctx,
        );
        let distinct = DistinctOperator {
            source: Box::new(sort),
            seen: HashSet::new(),
        };
        let mut limit = LimitOperator::new(Box::new(distinct), Some(2), 1);
        assert_eq!(drain(&mut limit), ints(vec![vec![2], vec![1]]));
    }
}
