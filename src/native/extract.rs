use rusqlite::types::ValueRef;

use crate::types::Value;

/// Column as the driver describes it right after compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawColumn {
    pub name: String,
    pub decl_type: Option<String>,
}

impl RawColumn {
    pub(crate) fn capture(stmt: &rusqlite::Statement<'_>) -> Vec<RawColumn> {
        stmt.columns()
            .iter()
            .map(|col| RawColumn {
                name: col.name().to_owned(),
                decl_type: col.decl_type().map(str::to_owned),
            })
            .collect()
    }

    fn is_boolean(&self) -> bool {
        self.decl_type.as_deref().is_some_and(|decl| {
            let upper = decl.trim().to_ascii_uppercase();
            upper == "BOOLEAN" || upper == "BOOL" || upper == "BIT"
        })
    }
}

/// Read every column of the current row. Text and binary values longer than `max_value_size`
/// bytes are cut to that length.
pub(crate) fn row_values(
    row: &rusqlite::Row<'_>,
    columns: &[RawColumn],
    max_value_size: Option<usize>,
) -> Vec<Value> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| match row.get_ref(idx) {
            Ok(value) => convert(value, column, max_value_size),
            Err(_) => Value::Null,
        })
        .collect()
}

fn clip(bytes: &[u8], limit: Option<usize>) -> &[u8] {
    match limit {
        Some(limit) if bytes.len() > limit => &bytes[..limit],
        _ => bytes,
    }
}

fn text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        // A cut through a multi-byte character drops the partial character.
        Err(err) if err.error_len().is_none() => {
            String::from_utf8_lossy(&bytes[..err.valid_up_to()]).into_owned()
        }
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn convert(value: ValueRef<'_>, column: &RawColumn, limit: Option<usize>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) if column.is_boolean() => Value::Bool(i != 0),
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(text(clip(bytes, limit))),
        ValueRef::Blob(bytes) => Value::Blob(clip(bytes, limit).to_vec()),
    }
}

/// Apply a value size limit to a row that was read without one.
pub(crate) fn clamp_values(values: Vec<Value>, max_value_size: Option<usize>) -> Vec<Value> {
    let Some(limit) = max_value_size else {
        return values;
    };
    values
        .into_iter()
        .map(|value| match value {
            Value::Text(mut s) if s.len() > limit => {
                let mut end = limit;
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                s.truncate(end);
                Value::Text(s)
            }
            Value::Blob(mut bytes) => {
                bytes.truncate(limit);
                Value::Blob(bytes)
            }
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(decl: Option<&str>) -> RawColumn {
        RawColumn {
            name: "c".into(),
            decl_type: decl.map(str::to_owned),
        }
    }

    #[test]
    fn boolean_declarations_read_as_bool() {
        assert_eq!(convert(ValueRef::Integer(1), &column(Some("BOOLEAN")), None), Value::Bool(true));
        assert_eq!(convert(ValueRef::Integer(0), &column(Some("bit")), None), Value::Bool(false));
        assert_eq!(convert(ValueRef::Integer(1), &column(Some("INTEGER")), None), Value::Int(1));
        assert_eq!(convert(ValueRef::Integer(1), &column(None), None), Value::Int(1));
    }

    #[test]
    fn storage_classes_map_directly() {
        let col = column(None);
        assert_eq!(convert(ValueRef::Null, &col, None), Value::Null);
        assert_eq!(convert(ValueRef::Real(1.5), &col, None), Value::Float(1.5));
        assert_eq!(convert(ValueRef::Text(b"x"), &col, None), Value::Text("x".into()));
        assert_eq!(convert(ValueRef::Blob(&[1, 2]), &col, None), Value::Blob(vec![1, 2]));
    }

    #[test]
    fn long_values_are_cut_to_the_limit() {
        let col = column(None);
        assert_eq!(convert(ValueRef::Text(b"abcdef"), &col, Some(3)), Value::Text("abc".into()));
        assert_eq!(convert(ValueRef::Blob(&[1, 2, 3, 4]), &col, Some(2)), Value::Blob(vec![1, 2]));
        assert_eq!(convert(ValueRef::Integer(123_456), &col, Some(1)), Value::Int(123_456));
        // "é" is two bytes; a cut inside it keeps only the whole characters.
        assert_eq!(convert(ValueRef::Text("aé".as_bytes()), &col, Some(2)), Value::Text("a".into()));
    }

    #[test]
    fn clamping_matches_the_native_cut() {
        let row = vec![Value::Text("aéb".into()), Value::Blob(vec![9; 8]), Value::Int(7)];
        assert_eq!(
            clamp_values(row.clone(), Some(2)),
            vec![Value::Text("a".into()), Value::Blob(vec![9; 2]), Value::Int(7)]
        );
        assert_eq!(clamp_values(row.clone(), None), row);
    }
}
