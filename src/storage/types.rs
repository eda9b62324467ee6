//! typed values and rows for the in-memory store.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{NaiveDate, NaiveDateTime};

use crate::catalog::DataType;
use crate::transfer::codec;

/// A row is positional: `row[i]` belongs to the table's i-th column.
pub type Row = Vec<Value>;

/// Stable identifier of a row inside one table, assigned in insertion order.
pub type RowId = u64;

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// the type of this value, `None` for NULL
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Integer(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Float),
            Value::Text(_) => Some(DataType::Text),
            Value::Blob(_) => Some(DataType::Blob),
            Value::Date(_) => Some(DataType::Date),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Json(_) => Some(DataType::Json),
        }
    }

    /// type name for error messages
    pub fn type_name(&self) -> &'static str {
        self.data_type().map(|t| t.sql_name()).unwrap_or("NULL")
    }

    /// truth value under three-valued logic; NULL is unknown
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// SQL comparison. `None` when either side is NULL or the types don't compare.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).or(Some(a.total_cmp(b))),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Timestamp(b)) => a.and_hms_opt(0, 0, 0).map(|a| a.cmp(b)),
            (Value::Timestamp(a), Value::Date(b)) => b.and_hms_opt(0, 0, 0).map(|b| a.cmp(&b)),
            (Value::Json(a), Value::Json(b)) => Some(a.to_string().cmp(&b.to_string())),
            _ => None,
        }
    }

    /// total order used by ORDER BY: NULLs sort after everything else
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            _ => self
                .compare(other)
                .unwrap_or_else(|| self.type_name().cmp(other.type_name())),
        }
    }

    /// cast to `to`, following the canonical text forms for text conversions
    pub fn cast(&self, to: DataType) -> Result<Value, String> {
        if self.data_type() == Some(to) || self.is_null() {
            return Ok(self.clone());
        }
        let fail = || format!("cannot cast {} to {}", self.type_name(), to.sql_name());
        match (self, to) {
            (Value::Text(s), _) => (codec::codec_for(to).decode)(s),
            (_, DataType::Text) => Ok(Value::Text(codec::encode(self).unwrap_or_default())),
            (Value::Integer(i), DataType::Float) => Ok(Value::Float(*i as f64)),
            (Value::Integer(i), DataType::Boolean) => Ok(Value::Boolean(*i != 0)),
            (Value::Boolean(b), DataType::Integer) => Ok(Value::Integer(i64::from(*b))),
            (Value::Float(f), DataType::Integer) => {
                let rounded = f.round();
                if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64 {
                    Ok(Value::Integer(rounded as i64))
                } else {
                    Err(format!("value {} is out of range for INTEGER", f))
                }
            }
            (Value::Date(d), DataType::Timestamp) => {
                d.and_hms_opt(0, 0, 0).map(Value::Timestamp).ok_or_else(fail)
            }
            (Value::Timestamp(ts), DataType::Date) => Ok(Value::Date(ts.date())),
            _ => Err(fail()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            other => write!(f, "{}", codec::encode(other).unwrap_or_default()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

/// Hashable tuple of values, used for unique indexes, grouping and DISTINCT.
///
/// Floats compare by bit pattern after folding `-0.0` into `0.0` and all NaNs
/// into one, so equal keys always hash equally.
#[derive(Debug, Clone)]
pub struct IndexKey(pub Vec<Value>);

impl IndexKey {
    pub fn from_row(row: &[Value], columns: &[usize]) -> Self {
        Self(columns.iter().map(|&i| row[i].clone()).collect())
    }

    /// SQL unique semantics: a key with any NULL never conflicts
    pub fn has_null(&self) -> bool {
        self.0.iter().any(Value::is_null)
    }
}

fn float_bits(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else if f == 0.0 {
        0
    } else {
        f.to_bits()
    }
}

fn key_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => float_bits(*x) == float_bits(*y),
        _ => a == b,
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| key_eq(a, b))
    }
}

impl Eq for IndexKey {}

impl Hash for IndexKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in &self.0 {
            std::mem::discriminant(value).hash(state);
            match value {
                Value::Null => {}
                Value::Boolean(b) => b.hash(state),
                Value::Integer(i) => i.hash(state),
                Value::Float(f) => float_bits(*f).hash(state),
                Value::Text(s) => s.hash(state),
                Value::Blob(b) => b.hash(state),
                Value::Date(d) => d.hash(state),
                Value::Timestamp(ts) => ts.hash(state),
                Value::Json(j) => j.to_string().hash(state),
            }
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(Value::Integer(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::Float(3.0).compare(&Value::Integer(3)), Some(Ordering::Equal));
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert_eq!(Value::Text("a".into()).compare(&Value::Integer(1)), None);
    }

    #[test]
    fn test_sort_cmp_nulls_last() {
        let mut values = vec![Value::Null, Value::Integer(3), Value::Integer(-1)];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(values, vec![Value::Integer(-1), Value::Integer(3), Value::Null]);
    }

    #[test]
    fn test_cast() {
        assert_eq!(Value::Integer(7).cast(DataType::Float).unwrap(), Value::Float(7.0));
        assert_eq!(Value::Float(2.6).cast(DataType::Integer).unwrap(), Value::Integer(3));
        assert_eq!(
            Value::Text("2024-02-29".into()).cast(DataType::Date).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(Value::Integer(42).cast(DataType::Text).unwrap(), Value::Text("42".into()));
        assert!(Value::Text("abc".into()).cast(DataType::Integer).is_err());
        assert!(Value::Float(f64::INFINITY).cast(DataType::Integer).is_err());
        assert_eq!(Value::Null.cast(DataType::Date).unwrap(), Value::Null);
    }

    #[test]
    fn test_index_key_float_normalization() {
        let mut set = HashSet::new();
        set.insert(IndexKey(vec![Value::Float(0.0)]));
        assert!(set.contains(&IndexKey(vec![Value::Float(-0.0)])));
        set.insert(IndexKey(vec![Value::Float(f64::NAN)]));
        assert!(set.contains(&IndexKey(vec![Value::Float(-f64::NAN)])));
        assert!(!set.contains(&IndexKey(vec![Value::Integer(0)])));
    }
}
