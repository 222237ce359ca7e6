use serde::Serialize;

use crate::native::RawColumn;
use crate::types::{SqlType, Value};

/// Whether a column admits NULL. The driver cannot tell for expression columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nullability {
    NoNulls = 0,
    Nullable = 1,
    Unknown = 2,
}

impl Serialize for Nullability {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Column descriptor captured once, right after execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ColumnDescriptor {
    /// 1-based position in the result.
    pub index: usize,
    #[serde(rename = "COLUMN_NAME")]
    pub name: String,
    pub type_name: String,
    pub data_type: SqlType,
    pub column_size: u32,
    pub buffer_length: u32,
    pub decimal_digits: i16,
    pub num_prec_radix: u8,
    pub nullable: Nullability,
}

impl ColumnDescriptor {
    /// Describe a column from its declared type, or from a sample value when the column is an
    /// expression without a declaration.
    pub(crate) fn describe(index: usize, column: &RawColumn, sample: Option<&Value>) -> Self {
        let (data_type, type_name, declared_size) = match column.decl_type.as_deref() {
            Some(decl) => {
                let (ty, size) = infer_from_declaration(decl);
                (ty, base_name(decl), size)
            }
            None => {
                let ty = infer_from_sample(sample);
                (ty, default_type_name(ty).to_owned(), None)
            }
        };
        let (default_size, buffer_length) = default_size(data_type);
        let (column_size, decimal_digits) = match declared_size {
            Some((size, digits)) => (size, digits.unwrap_or(0)),
            None => (default_size, default_digits(data_type)),
        };
        Self {
            index,
            name: column.name.clone(),
            type_name,
            data_type,
            column_size,
            buffer_length: if matches!(data_type, SqlType::VarChar | SqlType::Char) {
                column_size
            } else {
                buffer_length
            },
            decimal_digits,
            num_prec_radix: if data_type.is_approximate() {
                2
            } else if data_type.is_numeric() {
                10
            } else {
                0
            },
            nullable: Nullability::Unknown,
        }
    }
}

/// Build descriptors for a whole result.
pub(crate) fn describe_columns(columns: &[RawColumn], first_row: Option<&[Value]>) -> Vec<ColumnDescriptor> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let sample = first_row.and_then(|row| row.get(idx));
            ColumnDescriptor::describe(idx + 1, column, sample)
        })
        .collect()
}

fn base_name(decl: &str) -> String {
    decl.split('(').next().unwrap_or(decl).trim().to_ascii_uppercase()
}

// Affinity rules, with date/time names checked before the generic ones they contain.
fn infer_from_declaration(decl: &str) -> (SqlType, Option<(u32, Option<i16>)>) {
    let upper = decl.to_ascii_uppercase();
    let name = base_name(decl);
    let ty = if name.contains("DATETIME") || name.contains("TIMESTAMP") {
        SqlType::TypeTimestamp
    } else if name == "DATE" {
        SqlType::TypeDate
    } else if name == "TIME" {
        SqlType::TypeTime
    } else if name == "BOOLEAN" || name == "BOOL" || name == "BIT" {
        SqlType::Bit
    } else if name == "BIGINT" || name == "INT8" {
        SqlType::BigInt
    } else if name == "SMALLINT" || name == "INT2" {
        SqlType::SmallInt
    } else if name == "TINYINT" {
        SqlType::TinyInt
    } else if name.contains("INT") {
        SqlType::Integer
    } else if name.contains("NCHAR") && !name.contains("VAR") {
        SqlType::WChar
    } else if name.contains("NVARCHAR") {
        SqlType::WVarChar
    } else if name == "CHAR" || name == "CHARACTER" {
        SqlType::Char
    } else if name.contains("CHAR") || name.contains("CLOB") {
        SqlType::VarChar
    } else if name.contains("TEXT") {
        SqlType::LongVarChar
    } else if name.contains("BLOB") || name.contains("BINARY") || name.is_empty() {
        SqlType::VarBinary
    } else if name.contains("REAL") {
        SqlType::Real
    } else if name.contains("FLOA") {
        SqlType::Float
    } else if name.contains("DOUB") {
        SqlType::Double
    } else if name.contains("DEC") {
        SqlType::Decimal
    } else {
        SqlType::Numeric
    };
    (ty, parse_size(&upper))
}

fn parse_size(decl: &str) -> Option<(u32, Option<i16>)> {
    let open = decl.find('(')?;
    let close = decl[open..].find(')')? + open;
    let mut parts = decl[open + 1..close].split(',').map(str::trim);
    let size = parts.next()?.parse().ok()?;
    let digits = parts.next().and_then(|d| d.parse().ok());
    Some((size, digits))
}

fn infer_from_sample(sample: Option<&Value>) -> SqlType {
    match sample {
        Some(Value::Int(_)) => SqlType::Integer,
        Some(Value::Float(_)) => SqlType::Double,
        Some(Value::Bool(_)) => SqlType::Bit,
        Some(Value::Blob(_)) => SqlType::VarBinary,
        Some(Value::Timestamp(_)) => SqlType::TypeTimestamp,
        Some(Value::Date(_)) => SqlType::TypeDate,
        Some(Value::Time(_)) => SqlType::TypeTime,
        Some(Value::Text(_) | Value::Null) | None => SqlType::VarChar,
    }
}

fn default_type_name(ty: SqlType) -> &'static str {
    match ty {
        SqlType::Integer => "INTEGER",
        SqlType::BigInt => "BIGINT",
        SqlType::Double => "DOUBLE",
        SqlType::Bit => "BIT",
        SqlType::VarBinary => "VARBINARY",
        SqlType::TypeTimestamp => "TIMESTAMP",
        SqlType::TypeDate => "DATE",
        SqlType::TypeTime => "TIME",
        _ => "VARCHAR",
    }
}

/// Column size and buffer length in bytes when nothing was declared.
fn default_size(ty: SqlType) -> (u32, u32) {
    match ty {
        SqlType::Bit => (1, 1),
        SqlType::TinyInt => (3, 1),
        SqlType::SmallInt => (5, 2),
        SqlType::Integer => (10, 4),
        SqlType::BigInt => (19, 8),
        SqlType::Real => (7, 4),
        SqlType::Float | SqlType::Double => (15, 8),
        SqlType::Numeric | SqlType::Decimal => (38, 40),
        SqlType::TypeDate => (10, 6),
        SqlType::TypeTime => (8, 6),
        SqlType::TypeTimestamp => (27, 16),
        SqlType::LongVarChar | SqlType::WLongVarChar | SqlType::LongVarBinary => {
            (2_147_483_647, 2_147_483_647)
        }
        _ => (255, 255),
    }
}

fn default_digits(ty: SqlType) -> i16 {
    match ty {
        SqlType::TypeTimestamp => 7,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, decl: Option<&str>) -> RawColumn {
        RawColumn {
            name: name.into(),
            decl_type: decl.map(str::to_owned),
        }
    }

    #[test]
    fn declared_types_drive_descriptors() {
        let desc = ColumnDescriptor::describe(1, &raw("COLINT", Some("INTEGER")), None);
        assert_eq!(desc.data_type, SqlType::Integer);
        assert_eq!(desc.type_name, "INTEGER");
        assert_eq!(desc.column_size, 10);
        assert_eq!(desc.num_prec_radix, 10);

        let desc = ColumnDescriptor::describe(2, &raw("COLDATETIME", Some("DATETIME")), None);
        assert_eq!(desc.data_type, SqlType::TypeTimestamp);
        assert_eq!(desc.column_size, 27);
        assert_eq!(desc.decimal_digits, 7);

        let desc = ColumnDescriptor::describe(3, &raw("name", Some("varchar(40)")), None);
        assert_eq!(desc.data_type, SqlType::VarChar);
        assert_eq!(desc.type_name, "VARCHAR");
        assert_eq!(desc.column_size, 40);
        assert_eq!(desc.buffer_length, 40);
    }

    #[test]
    fn decimal_precision_and_scale_are_parsed() {
        let desc = ColumnDescriptor::describe(1, &raw("amount", Some("DECIMAL(10, 2)")), None);
        assert_eq!(desc.data_type, SqlType::Decimal);
        assert_eq!(desc.column_size, 10);
        assert_eq!(desc.decimal_digits, 2);
    }

    #[test]
    fn expression_columns_fall_back_to_sample() {
        let cols = [raw("COLINT", None), raw("COLTEXT", None), raw("COLREAL", None)];
        let row = [Value::Int(1), Value::Text("x".into()), Value::Float(1.5)];
        let descs = describe_columns(&cols, Some(&row));
        assert_eq!(descs[0].index, 1);
        assert_eq!(descs[0].data_type, SqlType::Integer);
        assert_eq!(descs[1].data_type, SqlType::VarChar);
        assert_eq!(descs[2].data_type, SqlType::Double);
        assert_eq!(descs[2].num_prec_radix, 2);
    }

    #[test]
    fn descriptor_serializes_with_driver_keys() -> Result<(), serde_json::Error> {
        let desc = ColumnDescriptor::describe(1, &raw("COLINT", Some("INTEGER")), None);
        let json = serde_json::to_value(&desc)?;
        assert_eq!(json["COLUMN_NAME"], "COLINT");
        assert_eq!(json["DATA_TYPE"], 4);
        assert_eq!(json["INDEX"], 1);
        assert_eq!(json["NULLABLE"], 2);
        assert!(json.get("BUFFER_LENGTH").is_some());
        Ok(())
    }
}
