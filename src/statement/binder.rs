use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value as NativeValue};
use serde_json::Value as JsonValue;

use crate::error::SqlBridgeError;
use crate::types::{SqlType, Value};

/// One slot of the native parameter buffer, with the descriptor it was bound under.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub(crate) value: NativeValue,
    pub sql_type: SqlType,
    pub column_size: u32,
    pub decimal_digits: i16,
}

impl BoundParameter {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.value, NativeValue::Null)
    }
}

impl ToSql for BoundParameter {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.value.to_sql()
    }
}

/// Translates host values into the parameter buffer a prepared statement expects.
#[derive(Debug, Clone, Copy)]
pub struct ParameterBinder {
    expected: usize,
}

impl ParameterBinder {
    /// Binder for a statement with `expected` parameter markers.
    #[must_use]
    pub fn new(expected: usize) -> Self {
        Self { expected }
    }

    /// Build a fresh parameter buffer.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::BindError`] when the arity differs from the marker count or a
    /// value cannot be represented natively.
    pub fn bind(&self, values: &[Value]) -> Result<Vec<BoundParameter>, SqlBridgeError> {
        self.check_arity(values.len())?;
        values
            .iter()
            .enumerate()
            .map(|(idx, value)| bind_one(idx + 1, value))
            .collect()
    }

    /// Same as [`ParameterBinder::bind`] for host JSON scalars.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::BindError`] for arrays, objects, or an arity mismatch.
    pub fn bind_json(&self, values: &[JsonValue]) -> Result<Vec<BoundParameter>, SqlBridgeError> {
        self.check_arity(values.len())?;
        let converted = values
            .iter()
            .cloned()
            .map(Value::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        self.bind(&converted)
    }

    fn check_arity(&self, got: usize) -> Result<(), SqlBridgeError> {
        if got == self.expected {
            Ok(())
        } else {
            Err(SqlBridgeError::BindError(format!(
                "statement expects {} parameters but {got} were supplied",
                self.expected
            )))
        }
    }
}

fn bind_one(position: usize, value: &Value) -> Result<BoundParameter, SqlBridgeError> {
    let (native, sql_type, column_size, decimal_digits) = match value {
        Value::Null => (NativeValue::Null, SqlType::VarChar, 0, 0),
        Value::Int(i) => (NativeValue::Integer(*i), SqlType::BigInt, 19, 0),
        Value::Float(f) => {
            if !f.is_finite() {
                return Err(SqlBridgeError::BindError(format!(
                    "parameter {position} is not a finite number"
                )));
            }
            (NativeValue::Real(*f), SqlType::Double, 15, 7)
        }
        Value::Text(s) => {
            let size = u32::try_from(s.chars().count()).unwrap_or(u32::MAX);
            (NativeValue::Text(s.clone()), SqlType::VarChar, size, 0)
        }
        Value::Bool(b) => (NativeValue::Integer(i64::from(*b)), SqlType::Bit, 1, 0),
        Value::Timestamp(ts) => (
            NativeValue::Text(ts.format("%F %T%.f").to_string()),
            SqlType::TypeTimestamp,
            27,
            7,
        ),
        Value::Date(d) => (
            NativeValue::Text(d.format("%F").to_string()),
            SqlType::TypeDate,
            10,
            0,
        ),
        Value::Time(t) => (
            NativeValue::Text(t.format("%T%.f").to_string()),
            SqlType::TypeTime,
            16,
            7,
        ),
        Value::Blob(bytes) => {
            let size = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
            (NativeValue::Blob(bytes.clone()), SqlType::VarBinary, size, 0)
        }
    };
    Ok(BoundParameter {
        value: native,
        sql_type,
        column_size,
        decimal_digits,
    })
}
