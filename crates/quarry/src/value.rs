//! Dialect-neutral values carried by expressions, bindings and result rows.

use crate::error::{QuarryError, QuarryResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

/// A single SQL value.
///
/// Builders accept anything that converts into a `Value`; compiled queries
/// carry them as ordered bindings, and drivers return them inside [`Row`]s.
///
/// [`Row`]: crate::row::Row
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Unquoted textual form used by literal (`to_sql`) rendering.
    ///
    /// Booleans are handled by the grammar because their rendering is dialect
    /// specific; here they fall back to `1`/`0`.
    pub fn literal_text(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "1".to_string(),
            Value::Bool(false) => "0".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Uuid(u) => u.to_string(),
            Value::Json(j) => j.to_string(),
        }
    }

    /// Convert to a JSON value (used by [`Row::to_json`](crate::row::Row::to_json)).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Value::Timestamp(ts) => {
                serde_json::Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            Value::Uuid(u) => serde_json::Value::String(u.to_string()),
            Value::Json(j) => j.clone(),
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "json",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
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

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Timestamp(v.and_hms_opt(0, 0, 0).unwrap_or_default())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v.naive_utc())
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Conversion out of a [`Value`], used by typed row accessors.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> QuarryResult<Self>;
}

fn mismatch(expected: &str, got: &Value) -> QuarryError {
    QuarryError::decode(
        "<value>",
        format!("expected {expected}, got {}", got.type_name()),
    )
}

impl FromValue for Value {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Text(s) => s.trim().parse().map_err(|_| mismatch("int", value)),
            _ => Err(mismatch("int", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| mismatch("i32", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            Value::Text(s) => s.trim().parse().map_err(|_| mismatch("float", value)),
            _ => Err(mismatch("float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Null => Err(mismatch("text", value)),
            Value::Text(s) => Ok(s.clone()),
            other => Ok(other.literal_text()),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            Value::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map_err(|_| mismatch("timestamp", value)),
            _ => Err(mismatch("timestamp", value)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Uuid(u) => Ok(*u),
            Value::Text(s) => Uuid::parse_str(s).map_err(|_| mismatch("uuid", value)),
            _ => Err(mismatch("uuid", value)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        Ok(value.to_json())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
