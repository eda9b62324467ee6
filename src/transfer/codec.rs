//! Canonical text forms of every column type.
//!
//! One [`FieldCodec`] per [`DataType`]: `encode` renders a value of that type,
//! `decode` parses the same text back. Data files, text casts and result
//! display all go through this table, so a value printed by the shell reads
//! back as the same value.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::catalog::DataType;
use crate::storage::Value;

/// Encode/decode pair for one column type.
pub struct FieldCodec {
    pub data_type: DataType,
    /// `None` for NULL or for a value of another type.
    pub encode: fn(&Value) -> Option<String>,
    pub decode: fn(&str) -> Result<Value, String>,
}

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

static CODECS: [FieldCodec; 8] = [
    FieldCodec {
        data_type: DataType::Boolean,
        encode: |v| match v {
            Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        },
        decode: decode_boolean,
    },
    FieldCodec {
        data_type: DataType::Integer,
        encode: |v| match v {
            Value::Integer(i) => Some(i.to_string()),
            _ => None,
        },
        decode: |s| {
            s.trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| format!("not an INTEGER: {}", e))
        },
    },
    FieldCodec {
        data_type: DataType::Float,
        // Debug formatting is the shortest text that parses back to the same bits
        encode: |v| match v {
            Value::Float(f) => Some(format!("{:?}", f)),
            _ => None,
        },
        decode: |s| {
            s.trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| format!("not a DOUBLE: {}", e))
        },
    },
    FieldCodec {
        data_type: DataType::Text,
        encode: |v| match v {
            Value::Text(s) => Some(s.clone()),
            _ => None,
        },
        decode: |s| Ok(Value::Text(s.to_string())),
    },
    FieldCodec {
        data_type: DataType::Blob,
        encode: |v| match v {
            Value::Blob(b) => Some(hex::encode(b)),
            _ => None,
        },
        decode: |s| {
            let digits = s.trim();
            let digits = digits
                .strip_prefix("\\x")
                .or_else(|| digits.strip_prefix("0x"))
                .unwrap_or(digits);
            hex::decode(digits)
                .map(Value::Blob)
                .map_err(|e| format!("not a hex BLOB: {}", e))
        },
    },
    FieldCodec {
        data_type: DataType::Date,
        encode: |v| match v {
            Value::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
            _ => None,
        },
        decode: |s| {
            NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map(Value::Date)
                .map_err(|e| format!("not a DATE (YYYY-MM-DD): {}", e))
        },
    },
    FieldCodec {
        data_type: DataType::Timestamp,
        encode: |v| match v {
            Value::Timestamp(ts) => Some(ts.format(TIMESTAMP_FORMAT).to_string()),
            _ => None,
        },
        decode: decode_timestamp,
    },
    FieldCodec {
        data_type: DataType::Json,
        encode: |v| match v {
            Value::Json(j) => Some(j.to_string()),
            _ => None,
        },
        decode: |s| {
            serde_json::from_str(s)
                .map(Value::Json)
                .map_err(|e| format!("not valid JSON: {}", e))
        },
    },
];

fn decode_boolean(s: &str) -> Result<Value, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Ok(Value::Boolean(true)),
        "false" | "f" | "0" => Ok(Value::Boolean(false)),
        other => Err(format!("not a BOOLEAN: {:?}", other)),
    }
}

fn decode_timestamp(s: &str) -> Result<Value, String> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDate::parse_from_str(s, DATE_FORMAT).map(|d| d.and_time(NaiveTime::default())))
        .map(Value::Timestamp)
        .map_err(|e| format!("not a TIMESTAMP (YYYY-MM-DD HH:MM:SS[.f]): {}", e))
}

/// The codec for a column type.
pub fn codec_for(data_type: DataType) -> &'static FieldCodec {
    match data_type {
        DataType::Boolean => &CODECS[0],
        DataType::Integer => &CODECS[1],
        DataType::Float => &CODECS[2],
        DataType::Text => &CODECS[3],
        DataType::Blob => &CODECS[4],
        DataType::Date => &CODECS[5],
        DataType::Timestamp => &CODECS[6],
        DataType::Json => &CODECS[7],
    }
}

/// Canonical text of a value; `None` for NULL.
pub fn encode(value: &Value) -> Option<String> {
    value.data_type().and_then(|t| (codec_for(t).encode)(value))
}

/// Parse a field as `data_type`.
pub fn decode(data_type: DataType, text: &str) -> Result<Value, String> {
    (codec_for(data_type).decode)(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) {
        let data_type = value.data_type().unwrap();
        let text = encode(&value).unwrap();
        let back = decode(data_type, &text).unwrap();
        match (&value, &back) {
            (Value::Float(a), Value::Float(b)) if a.is_nan() => assert!(b.is_nan()),
            (Value::Float(a), Value::Float(b)) => assert_eq!(a.to_bits(), b.to_bits(), "{}", text),
            _ => assert_eq!(value, back, "{}", text),
        }
    }

    #[test]
    fn test_table_is_indexed_by_type() {
        for codec in &CODECS {
            assert_eq!(codec_for(codec.data_type).data_type, codec.data_type);
        }
    }

    #[test]
    fn test_boundary_values() {
        for i in [0, -1, i64::MIN, i64::MAX] {
            roundtrip(Value::Integer(i));
        }
        for f in [0.0, -0.0, 0.1, -2.5e-300, f64::MAX, f64::MIN_POSITIVE, f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            roundtrip(Value::Float(f));
        }
        for s in ["", "a,b", "say \"hi\"", "line\nbreak\r\n", "ünïcødé"] {
            roundtrip(Value::Text(s.into()));
        }
        roundtrip(Value::Boolean(true));
        roundtrip(Value::Boolean(false));
        roundtrip(Value::Blob(vec![]));
        roundtrip(Value::Blob(vec![0, 0xff, 0x2c, 0x22]));
        roundtrip(Value::Date(NaiveDate::from_ymd_opt(1, 1, 1).unwrap()));
        roundtrip(Value::Date(NaiveDate::from_ymd_opt(9999, 12, 31).unwrap()));
        roundtrip(Value::Json(serde_json::json!({"k": [1, "two", null]})));
    }

    #[test]
    fn test_timestamp_forms() {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_micro_opt(23, 59, 59, 123_456)
            .unwrap();
        assert_eq!(encode(&Value::Timestamp(ts)).unwrap(), "2024-02-29 23:59:59.123456");
        roundtrip(Value::Timestamp(ts));

        let whole = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(encode(&Value::Timestamp(whole)).unwrap(), "2000-01-01 00:00:00");
        assert_eq!(decode(DataType::Timestamp, "2000-01-01T00:00:00").unwrap(), Value::Timestamp(whole));
        assert_eq!(decode(DataType::Timestamp, "2000-01-01").unwrap(), Value::Timestamp(whole));
    }

    #[test]
    fn test_canonical_text() {
        assert_eq!(encode(&Value::Float(1.0)).unwrap(), "1.0");
        assert_eq!(encode(&Value::Blob(vec![0xab, 0x01])).unwrap(), "ab01");
        assert_eq!(encode(&Value::Json(serde_json::json!({"a": 1}))).unwrap(), "{\"a\":1}");
        assert_eq!(encode(&Value::Null), None);
    }

    #[test]
    fn test_decode_errors() {
        assert!(decode(DataType::Integer, "9223372036854775808").is_err());
        assert!(decode(DataType::Integer, "1.5").is_err());
        assert!(decode(DataType::Date, "2023-02-29").is_err());
        assert!(decode(DataType::Boolean, "yes").is_err());
        assert!(decode(DataType::Blob, "abc").is_err());
        assert!(decode(DataType::Json, "{").is_err());
    }
}
