use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::SqlBridgeError;

/// Scalar values accepted as parameters and produced by fetches.
///
/// ```rust
/// use sql_bridge::prelude::*;
///
/// let params = vec![Value::from(1), Value::from("alice"), Value::Null];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Binary data
    Blob(Vec<u8>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(value) => Some(*value),
            Value::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Value::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Timestamp(ts) => serializer.collect_str(&ts.format("%F %T%.f")),
            Value::Date(d) => serializer.collect_str(&d.format("%F")),
            Value::Time(t) => serializer.collect_str(&t.format("%T%.f")),
            Value::Blob(bytes) => bytes.serialize(serializer),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Value::Time(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl TryFrom<JsonValue> for Value {
    type Error = SqlBridgeError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(b) => Ok(Value::Bool(b)),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => n.as_f64().map(Value::Float).ok_or_else(|| {
                    SqlBridgeError::BindError(format!("number {n} is not representable"))
                }),
            },
            JsonValue::String(s) => Ok(Value::Text(s)),
            JsonValue::Array(_) | JsonValue::Object(_) => Err(SqlBridgeError::BindError(
                "parameters must be scalar values, not arrays or objects".into(),
            )),
        }
    }
}

/// Shape applied to fetched rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FetchMode {
    /// Positional sequence of column values.
    #[serde(rename = "ARRAY", alias = "array")]
    Array,
    /// Column name to value mapping.
    #[default]
    #[serde(rename = "OBJECT", alias = "object")]
    Object,
}

/// ODBC SQL data type codes reported in column and parameter descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum SqlType {
    Unknown = 0,
    Char = 1,
    Numeric = 2,
    Decimal = 3,
    Integer = 4,
    SmallInt = 5,
    Float = 6,
    Real = 7,
    Double = 8,
    VarChar = 12,
    LongVarChar = -1,
    Binary = -2,
    VarBinary = -3,
    LongVarBinary = -4,
    BigInt = -5,
    TinyInt = -6,
    Bit = -7,
    WChar = -8,
    WVarChar = -9,
    WLongVarChar = -10,
    TypeDate = 91,
    TypeTime = 92,
    TypeTimestamp = 93,
}

impl SqlType {
    #[must_use]
    pub fn code(self) -> i16 {
        self as i16
    }

    /// Types whose numeric precision is counted in bits rather than decimal digits.
    #[must_use]
    pub fn is_approximate(self) -> bool {
        matches!(self, SqlType::Float | SqlType::Real | SqlType::Double)
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            SqlType::Numeric
                | SqlType::Decimal
                | SqlType::Integer
                | SqlType::SmallInt
                | SqlType::Float
                | SqlType::Real
                | SqlType::Double
                | SqlType::BigInt
                | SqlType::TinyInt
                | SqlType::Bit
        )
    }
}

impl Serialize for SqlType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_scalars_coerce() -> Result<(), SqlBridgeError> {
        assert_eq!(Value::try_from(json!(3))?, Value::Int(3));
        assert_eq!(Value::try_from(json!(1.5))?, Value::Float(1.5));
        assert_eq!(Value::try_from(json!("a"))?, Value::Text("a".into()));
        assert_eq!(Value::try_from(json!(null))?, Value::Null);
        assert_eq!(Value::try_from(json!(true))?, Value::Bool(true));
        Ok(())
    }

    #[test]
    fn json_containers_are_bind_errors() {
        let err = Value::try_from(json!([1, 2])).unwrap_err();
        assert!(err.is_bind_error());
        let err = Value::try_from(json!({"a": 1})).unwrap_err();
        assert!(err.is_bind_error());
    }

    #[test]
    fn fetch_mode_names() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&FetchMode::Array)?, "\"ARRAY\"");
        let mode: FetchMode = serde_json::from_str("\"object\"")?;
        assert_eq!(mode, FetchMode::Object);
        assert_eq!(FetchMode::default(), FetchMode::Object);
        Ok(())
    }

    #[test]
    fn values_serialize_as_plain_json() -> Result<(), serde_json::Error> {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|d| d.and_hms_opt(3, 4, 5))
            .unwrap();
        let out = serde_json::to_value(vec![
            Value::Int(1),
            Value::Text("x".into()),
            Value::Null,
            Value::Timestamp(ts),
        ])?;
        assert_eq!(out, json!([1, "x", null, "2024-01-02 03:04:05"]));
        Ok(())
    }
}
