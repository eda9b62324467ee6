//! Expression evaluation over positional rows.

use std::cmp::Ordering;
use std::collections::HashSet;

use super::error::{ExecuteError, ExecuteResult};
use crate::catalog::Catalog;
use crate::planner::{AggregateExpr, AggregateFunction, BoundExpr, ScalarFunction};
use crate::sql::{BinaryOperator, UnaryOperator};
use crate::storage::{IndexKey, Value};

/// What expressions may read besides the row itself.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    /// Sequences for `nextval`.
    pub catalog: &'a Catalog,
}

/// Evaluate an expression against a row.
pub fn evaluate(expr: &BoundExpr, row: &[Value], ctx: EvalContext<'_>) -> ExecuteResult<Value> {
    match expr {
        BoundExpr::Column(index) => row
            .get(*index)
            .cloned()
            .ok_or_else(|| ExecuteError::ColumnNotFound(format!("#{}", index))),

        BoundExpr::Literal(value) => Ok(value.clone()),

        BoundExpr::Binary { left, op, right } => match op {
            BinaryOperator::And => {
                let l = truth(&evaluate(left, row, ctx)?)?;
                if l == Some(false) {
                    return Ok(Value::Boolean(false));
                }
                let r = truth(&evaluate(right, row, ctx)?)?;
                Ok(match (l, r) {
                    (_, Some(false)) => Value::Boolean(false),
                    (Some(true), Some(true)) => Value::Boolean(true),
                    _ => Value::Null,
                })
            }
            BinaryOperator::Or => {
                let l = truth(&evaluate(left, row, ctx)?)?;
                if l == Some(true) {
                    return Ok(Value::Boolean(true));
                }
                let r = truth(&evaluate(right, row, ctx)?)?;
                Ok(match (l, r) {
                    (_, Some(true)) => Value::Boolean(true),
                    (Some(false), Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                })
            }
            op => {
                let l = evaluate(left, row, ctx)?;
                let r = evaluate(right, row, ctx)?;
                eval_binary_op(&l, *op, &r)
            }
        },

        BoundExpr::Unary { op, expr } => {
            let v = evaluate(expr, row, ctx)?;
            eval_unary_op(*op, &v)
        }

        BoundExpr::IsNull { expr, negated } => {
            let is_null = evaluate(expr, row, ctx)?.is_null();
            Ok(Value::Boolean(is_null != *negated))
        }

        BoundExpr::InList { expr, list, negated } => {
            let v = evaluate(expr, row, ctx)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for item in list {
                let item = evaluate(item, row, ctx)?;
                match compare(&v, &item)? {
                    Some(Ordering::Equal) => return Ok(Value::Boolean(!*negated)),
                    None => saw_null = true,
                    Some(_) => {}
                }
            }
            Ok(if saw_null {
                Value::Null
            } else {
                Value::Boolean(*negated)
            })
        }

        BoundExpr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let v = evaluate(expr, row, ctx)?;
            let above = compare(&v, &evaluate(low, row, ctx)?)?.map(|o| o != Ordering::Less);
            let below = compare(&v, &evaluate(high, row, ctx)?)?.map(|o| o != Ordering::Greater);
            let inside = match (above, below) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            };
            Ok(inside.map_or(Value::Null, |b| Value::Boolean(b != *negated)))
        }

        BoundExpr::Like {
            expr,
            pattern,
            negated,
            case_insensitive,
        } => {
            let v = evaluate(expr, row, ctx)?;
            let text = match v {
                Value::Null => return Ok(Value::Null),
                Value::Text(s) => s,
                other => other.to_string(),
            };
            let matched = if *case_insensitive {
                like_match(&text.to_lowercase(), &pattern.to_lowercase())
            } else {
                like_match(&text, pattern)
            };
            Ok(Value::Boolean(matched != *negated))
        }

        BoundExpr::Function { function, args } => {
            let evaluated = args
                .iter()
                .map(|a| evaluate(a, row, ctx))
                .collect::<ExecuteResult<Vec<_>>>()?;
            eval_function(*function, evaluated)
        }

        BoundExpr::Cast { expr, data_type } => evaluate(expr, row, ctx)?
            .cast(*data_type)
            .map_err(ExecuteError::TypeMismatch),

        BoundExpr::NextVal(sequence) => Ok(Value::Integer(ctx.catalog.next_value(sequence)?)),
    }
}

/// Evaluate a WHERE/HAVING/ON predicate; NULL counts as false.
pub fn is_true(expr: &BoundExpr, row: &[Value], ctx: EvalContext<'_>) -> ExecuteResult<bool> {
    Ok(truth(&evaluate(expr, row, ctx)?)? == Some(true))
}

/// Three-valued truth of a value.
fn truth(value: &Value) -> ExecuteResult<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        other => other.as_bool().map(Some).ok_or_else(|| {
            ExecuteError::TypeMismatch(format!("expected BOOLEAN, found {}", other.type_name()))
        }),
    }
}

/// SQL comparison with implicit conversion of text literals to the other
/// side's type. `None` means unknown (a NULL was involved).
pub fn compare(left: &Value, right: &Value) -> ExecuteResult<Option<Ordering>> {
    if left.is_null() || right.is_null() {
        return Ok(None);
    }
    if let Some(ordering) = left.compare(right) {
        return Ok(Some(ordering));
    }
    let coerced = match (left, right) {
        (Value::Text(_), other) => other
            .data_type()
            .and_then(|t| left.cast(t).ok())
            .and_then(|l| l.compare(right)),
        (other, Value::Text(_)) => other
            .data_type()
            .and_then(|t| right.cast(t).ok())
            .and_then(|r| left.compare(&r)),
        _ => None,
    };
    coerced.map(Some).ok_or_else(|| {
        ExecuteError::TypeMismatch(format!(
            "cannot compare {} with {}",
            left.type_name(),
            right.type_name()
        ))
    })
}

fn overflow(l: &Value, op: BinaryOperator, r: &Value) -> ExecuteError {
    ExecuteError::NumericOverflow(format!("{} {} {}", l, op.symbol(), r))
}

fn eval_binary_op(left: &Value, op: BinaryOperator, right: &Value) -> ExecuteResult<Value> {
    if op.is_comparison() {
        let ordering = compare(left, right)?;
        return Ok(ordering.map_or(Value::Null, |o| {
            Value::Boolean(match op {
                BinaryOperator::Eq => o == Ordering::Equal,
                BinaryOperator::NotEq => o != Ordering::Equal,
                BinaryOperator::Lt => o == Ordering::Less,
                BinaryOperator::LtEq => o != Ordering::Greater,
                BinaryOperator::Gt => o == Ordering::Greater,
                _ => o != Ordering::Less,
            })
        }));
    }
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    match (left, right) {
        (_, _) if op == BinaryOperator::Concat => Ok(Value::Text(format!("{}{}", left, right))),
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match op {
                BinaryOperator::Plus => a.checked_add(*b),
                BinaryOperator::Minus => a.checked_sub(*b),
                BinaryOperator::Multiply => a.checked_mul(*b),
                BinaryOperator::Divide | BinaryOperator::Modulo if *b == 0 => {
                    return Err(ExecuteError::DivisionByZero)
                }
                BinaryOperator::Divide => a.checked_div(*b),
                BinaryOperator::Modulo => a.checked_rem(*b),
                _ => return Err(unsupported(left, op, right)),
            };
            result.map(Value::Integer).ok_or_else(|| overflow(left, op, right))
        }
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            let a = as_f64(left);
            let b = as_f64(right);
            let result = match op {
                BinaryOperator::Plus => a + b,
                BinaryOperator::Minus => a - b,
                BinaryOperator::Multiply => a * b,
                BinaryOperator::Divide | BinaryOperator::Modulo if b == 0.0 => {
                    return Err(ExecuteError::DivisionByZero)
                }
                BinaryOperator::Divide => a / b,
                BinaryOperator::Modulo => a % b,
                _ => return Err(unsupported(left, op, right)),
            };
            Ok(Value::Float(result))
        }
        _ => Err(unsupported(left, op, right)),
    }
}

fn unsupported(left: &Value, op: BinaryOperator, right: &Value) -> ExecuteError {
    ExecuteError::TypeMismatch(format!(
        "operator {} is not defined for {} and {}",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn eval_unary_op(op: UnaryOperator, value: &Value) -> ExecuteResult<Value> {
    match (op, value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOperator::Not, v) => Ok(Value::Boolean(!truth(v)?.unwrap_or(false))),
        (UnaryOperator::Minus, Value::Integer(i)) => i
            .checked_neg()
            .map(Value::Integer)
            .ok_or_else(|| ExecuteError::NumericOverflow(format!("-({})", i))),
        (UnaryOperator::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOperator::Plus, v @ (Value::Integer(_) | Value::Float(_))) => Ok(v.clone()),
        (_, v) => Err(ExecuteError::TypeMismatch(format!(
            "unary operator is not defined for {}",
            v.type_name()
        ))),
    }
}

fn eval_function(function: ScalarFunction, args: Vec<Value>) -> ExecuteResult<Value> {
    if function == ScalarFunction::Coalesce {
        return Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null));
    }
    let Some(arg) = args.into_iter().next() else {
        return Err(ExecuteError::InvalidExpression(format!("{:?} expects an argument", function)));
    };
    match (function, arg) {
        (_, Value::Null) => Ok(Value::Null),
        (ScalarFunction::Lower, v) => Ok(Value::Text(text_of(v).to_lowercase())),
        (ScalarFunction::Upper, v) => Ok(Value::Text(text_of(v).to_uppercase())),
        (ScalarFunction::Length, Value::Blob(b)) => Ok(Value::Integer(b.len() as i64)),
        (ScalarFunction::Length, v) => Ok(Value::Integer(text_of(v).chars().count() as i64)),
        (ScalarFunction::Abs, Value::Integer(i)) => i
            .checked_abs()
            .map(Value::Integer)
            .ok_or_else(|| ExecuteError::NumericOverflow(format!("abs({})", i))),
        (ScalarFunction::Abs, Value::Float(f)) => Ok(Value::Float(f.abs())),
        (function, v) => Err(ExecuteError::TypeMismatch(format!(
            "{:?} is not defined for {}",
            function,
            v.type_name()
        ))),
    }
}

fn text_of(value: Value) -> String {
    match value {
        Value::Text(s) => s,
        other => other.to_string(),
    }
}

/// LIKE pattern matching: `%` is any run of characters, `_` exactly one.
pub fn like_match(s: &str, pattern: &str) -> bool {
    let s: Vec<char> = s.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut si, mut pi) = (0, 0);
    // Position of the last `%` and the input index it is currently matched up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while si < s.len() {
        match p.get(pi) {
            Some('%') => {
                backtrack = Some((pi, si));
                pi += 1;
            }
            Some('_') => {
                si += 1;
                pi += 1;
            }
            Some(c) if *c == s[si] => {
                si += 1;
                pi += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    pi = star + 1;
                    si = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    p[pi..].iter().all(|c| *c == '%')
}

/// Running state of one aggregate within one group.
#[derive(Debug, Clone)]
pub struct Accumulator {
    function: AggregateFunction,
    count: i64,
    value: Option<Value>,
    /// Float running sum for AVG.
    total: f64,
    seen: Option<HashSet<IndexKey>>,
}

impl Accumulator {
    pub fn new(aggregate: &AggregateExpr) -> Self {
        Self {
            function: aggregate.function,
            count: 0,
            value: None,
            total: 0.0,
            seen: aggregate.distinct.then(HashSet::new),
        }
    }

    /// Feed one input value; `None` for `count(*)`.
    pub fn update(&mut self, value: Option<Value>) -> ExecuteResult<()> {
        let Some(value) = value else {
            self.count += 1;
            return Ok(());
        };
        if value.is_null() {
            return Ok(());
        }
        if let Some(seen) = &mut self.seen {
            if !seen.insert(IndexKey(vec![value.clone()])) {
                return Ok(());
            }
        }
        self.count += 1;

        match self.function {
            AggregateFunction::CountStar | AggregateFunction::Count => {}
            AggregateFunction::Sum => {
                self.value = Some(match self.value.take() {
                    None => match value {
                        Value::Integer(_) | Value::Float(_) => value,
                        other => {
                            return Err(ExecuteError::TypeMismatch(format!(
                                "SUM is not defined for {}",
                                other.type_name()
                            )))
                        }
                    },
                    Some(acc) => eval_binary_op(&acc, BinaryOperator::Plus, &value)?,
                });
            }
            AggregateFunction::Avg => match value {
                Value::Integer(i) => self.total += i as f64,
                Value::Float(f) => self.total += f,
                other => {
                    return Err(ExecuteError::TypeMismatch(format!(
                        "AVG is not defined for {}",
                        other.type_name()
                    )))
                }
            },
            AggregateFunction::Min | AggregateFunction::Max => {
                let replace = match &self.value {
                    None => true,
                    Some(current) => {
                        let ordering = compare(&value, current)?.unwrap_or(Ordering::Equal);
                        if self.function == AggregateFunction::Min {
                            ordering == Ordering::Less
                        } else {
                            ordering == Ordering::Greater
                        }
                    }
                };
                if replace {
                    self.value = Some(value);
                }
            }
        }
        Ok(())
    }

    pub fn finish(&self) -> Value {
        match self.function {
            AggregateFunction::CountStar | AggregateFunction::Count => Value::Integer(self.count),
            AggregateFunction::Avg if self.count == 0 => Value::Null,
            AggregateFunction::Avg => Value::Float(self.total / self.count as f64),
            _ => self.value.clone().unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataType, QualifiedName, Sequence};

    fn row() -> Vec<Value> {
        vec![
            Value::Integer(1),
            Value::Text("Alice".into()),
            Value::Integer(30),
            Value::Boolean(true),
            Value::Null,
        ]
    }

    fn col(i: usize) -> Box<BoundExpr> {
        Box::new(BoundExpr::Column(i))
    }

    fn lit(v: Value) -> Box<BoundExpr> {
        Box::new(BoundExpr::Literal(v))
    }

    fn eval(expr: &BoundExpr) -> ExecuteResult<Value> {
        let catalog = Catalog::new();
        evaluate(expr, &row(), EvalContext { catalog: &catalog })
    }

    fn binary(left: Box<BoundExpr>, op: BinaryOperator, right: Box<BoundExpr>) -> BoundExpr {
        BoundExpr::Binary { left, op, right }
    }

    #[test]
    fn test_comparison() {
        let expr = binary(col(2), BinaryOperator::Gt, lit(Value::Integer(25)));
        assert_eq!(eval(&expr).unwrap(), Value::Boolean(true));
        let expr = binary(col(4), BinaryOperator::Eq, lit(Value::Integer(25)));
        assert_eq!(eval(&expr).unwrap(), Value::Null);
        let expr = binary(col(1), BinaryOperator::Lt, lit(Value::Integer(1)));
        assert!(matches!(eval(&expr), Err(ExecuteError::TypeMismatch(_))));
    }

    #[test]
    fn test_three_valued_logic() {
        let null_cmp = binary(col(4), BinaryOperator::Eq, lit(Value::Integer(1)));
        let and = binary(Box::new(null_cmp.clone()), BinaryOperator::And, lit(Value::Boolean(false)));
        assert_eq!(eval(&and).unwrap(), Value::Boolean(false));
        let or = binary(Box::new(null_cmp.clone()), BinaryOperator::Or, lit(Value::Boolean(false)));
        assert_eq!(eval(&or).unwrap(), Value::Null);
        let or = binary(Box::new(null_cmp), BinaryOperator::Or, col(3));
        assert_eq!(eval(&or).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_arithmetic() {
        let expr = binary(col(2), BinaryOperator::Plus, lit(Value::Integer(10)));
        assert_eq!(eval(&expr).unwrap(), Value::Integer(40));
        let expr = binary(col(2), BinaryOperator::Divide, lit(Value::Integer(4)));
        assert_eq!(eval(&expr).unwrap(), Value::Integer(7));
        let expr = binary(col(2), BinaryOperator::Divide, lit(Value::Float(4.0)));
        assert_eq!(eval(&expr).unwrap(), Value::Float(7.5));
        let expr = binary(col(2), BinaryOperator::Modulo, lit(Value::Integer(0)));
        assert!(matches!(eval(&expr), Err(ExecuteError::DivisionByZero)));
        let expr = binary(lit(Value::Integer(i64::MAX)), BinaryOperator::Plus, lit(Value::Integer(1)));
        assert!(matches!(eval(&expr), Err(ExecuteError::NumericOverflow(_))));
    }

    #[test]
    fn test_in_list_and_between() {
        let expr = BoundExpr::InList {
            expr: col(1),
            list: vec![BoundExpr::Literal("Alice".into()), BoundExpr::Literal("Bob".into())],
            negated: false,
        };
        assert_eq!(eval(&expr).unwrap(), Value::Boolean(true));
        let expr = BoundExpr::InList {
            expr: col(0),
            list: vec![BoundExpr::Literal(Value::Integer(2)), BoundExpr::Literal(Value::Null)],
            negated: true,
        };
        assert_eq!(eval(&expr).unwrap(), Value::Null);
        let expr = BoundExpr::Between {
            expr: col(2),
            low: lit(Value::Integer(30)),
            high: lit(Value::Integer(40)),
            negated: false,
        };
        assert_eq!(eval(&expr).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_text_coerces_to_date() {
        let date = Value::Text("2024-01-15".into()).cast(DataType::Date).unwrap();
        let ordering = compare(&date, &Value::Text("2024-01-01".into())).unwrap();
        assert_eq!(ordering, Some(Ordering::Greater));
    }

    #[test]
    fn test_like_pattern() {
        assert!(like_match("Alice", "A%"));
        assert!(like_match("Alice", "%ice"));
        assert!(like_match("Alice", "%lic%"));
        assert!(like_match("Alice", "A____"));
        assert!(like_match("", "%"));
        assert!(like_match("abcbc", "%bc"));
        assert!(!like_match("Alice", "B%"));
        assert!(!like_match("Alice", "alice"));
    }

    #[test]
    fn test_functions() {
        let lower = BoundExpr::Function {
            function: ScalarFunction::Upper,
            args: vec![BoundExpr::Column(1)],
        };
        assert_eq!(eval(&lower).unwrap(), Value::Text("ALICE".into()));
        let coalesce = BoundExpr::Function {
            function: ScalarFunction::Coalesce,
            args: vec![BoundExpr::Column(4), BoundExpr::Column(2)],
        };
        assert_eq!(eval(&coalesce).unwrap(), Value::Integer(30));
        let cast = BoundExpr::Cast {
            expr: col(2),
            data_type: DataType::Text,
        };
        assert_eq!(eval(&cast).unwrap(), Value::Text("30".into()));
    }

    #[test]
    fn test_nextval() {
        let mut catalog = Catalog::new();
        catalog
            .create_sequence(Sequence::new(QualifiedName::main("ids"), 10, 5).unwrap())
            .unwrap();
        let ctx = EvalContext { catalog: &catalog };
        let expr = BoundExpr::NextVal(QualifiedName::main("ids"));
        assert_eq!(evaluate(&expr, &[], ctx).unwrap(), Value::Integer(10));
        assert_eq!(evaluate(&expr, &[], ctx).unwrap(), Value::Integer(15));
    }

    #[test]
    fn test_accumulators() {
        let sum = AggregateExpr {
            function: AggregateFunction::Sum,
            arg: Some(BoundExpr::Column(0)),
            distinct: true,
        };
        let mut acc = Accumulator::new(&sum);
        for v in [1, 3, 3, 99] {
            acc.update(Some(Value::Integer(v))).unwrap();
        }
        acc.update(Some(Value::Null)).unwrap();
        assert_eq!(acc.finish(), Value::Integer(103));

        let avg = AggregateExpr {
            function: AggregateFunction::Avg,
            arg: Some(BoundExpr::Column(0)),
            distinct: false,
        };
        let acc = Accumulator::new(&avg);
        assert_eq!(acc.finish(), Value::Null);

        let max = AggregateExpr {
            function: AggregateFunction::Max,
            arg: Some(BoundExpr::Column(0)),
            distinct: false,
        };
        let mut acc = Accumulator::new(&max);
        for v in [5, 99, -2] {
            acc.update(Some(Value::Integer(v))).unwrap();
        }
        assert_eq!(acc.finish(), Value::Integer(99));
    }
}
