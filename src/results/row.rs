use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::metadata::ColumnDescriptor;
use crate::types::{FetchMode, Value};

/// A row keyed by column name.
///
/// Field order follows the first occurrence of each name. When a query produces the same column
/// name twice, the later column's value replaces the earlier one in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamedRow {
    fields: Vec<(String, Value)>,
}

impl NamedRow {
    pub(crate) fn from_values(names: &[String], values: Vec<Value>) -> Self {
        let mut fields: Vec<(String, Value)> = Vec::with_capacity(names.len());
        for (name, value) in names.iter().zip(values) {
            if let Some(slot) = fields.iter_mut().find(|(existing, _)| existing == name) {
                slot.1 = value;
            } else {
                fields.push((name.clone(), value));
            }
        }
        Self { fields }
    }

    /// Get a value by column name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl Serialize for NamedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// One fetched row, shaped by the fetch mode in effect.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Row {
    Array(Vec<Value>),
    Object(NamedRow),
}

impl Row {
    pub(crate) fn shape(mode: FetchMode, names: &[String], values: Vec<Value>) -> Self {
        match mode {
            FetchMode::Array => Row::Array(values),
            FetchMode::Object => Row::Object(NamedRow::from_values(names, values)),
        }
    }

    /// Column value by position, for ARRAY rows.
    #[must_use]
    pub fn at(&self, idx: usize) -> Option<&Value> {
        match self {
            Row::Array(values) => values.get(idx),
            Row::Object(_) => None,
        }
    }

    /// Column value by name, for OBJECT rows.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Row::Object(named) => named.get(name),
            Row::Array(_) => None,
        }
    }
}

/// A fully drained row collection in one shape.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Rows {
    Array(Vec<Vec<Value>>),
    Object(Vec<NamedRow>),
}

impl Rows {
    pub(crate) fn shape(
        mode: FetchMode,
        names: &[String],
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Self {
        match mode {
            FetchMode::Array => Rows::Array(rows.into_iter().collect()),
            FetchMode::Object => Rows::Object(
                rows.into_iter()
                    .map(|values| NamedRow::from_values(names, values))
                    .collect(),
            ),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Rows::Array(rows) => rows.len(),
            Rows::Object(rows) => rows.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Vec<Value>]> {
        match self {
            Rows::Array(rows) => Some(rows),
            Rows::Object(_) => None,
        }
    }

    #[must_use]
    pub fn as_objects(&self) -> Option<&[NamedRow]> {
        match self {
            Rows::Object(rows) => Some(rows),
            Rows::Array(_) => None,
        }
    }
}

/// Rows plus the column descriptors captured at execution.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ResultEnvelope {
    pub metadata: Arc<[ColumnDescriptor]>,
    pub rows: Rows,
}

/// What a drained query returns: bare rows, or rows with metadata when it was requested.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Rows(Rows),
    WithMetadata(ResultEnvelope),
}

impl QueryOutput {
    #[must_use]
    pub fn rows(&self) -> &Rows {
        match self {
            QueryOutput::Rows(rows) => rows,
            QueryOutput::WithMetadata(envelope) => &envelope.rows,
        }
    }

    #[must_use]
    pub fn metadata(&self) -> Option<&[ColumnDescriptor]> {
        match self {
            QueryOutput::Rows(_) => None,
            QueryOutput::WithMetadata(envelope) => Some(&envelope.metadata),
        }
    }

    #[must_use]
    pub fn into_rows(self) -> Rows {
        match self {
            QueryOutput::Rows(rows) => rows,
            QueryOutput::WithMetadata(envelope) => envelope.rows,
        }
    }
}

/// Shape options a fetch or drain applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchOptions {
    pub fetch_mode: FetchMode,
    pub include_metadata: bool,
    /// Text and binary values longer than this many bytes are cut to it. `None` is unlimited.
    pub max_value_size: Option<usize>,
}

impl FetchOptions {
    #[must_use]
    pub fn new(fetch_mode: FetchMode) -> Self {
        Self {
            fetch_mode,
            include_metadata: false,
            max_value_size: None,
        }
    }

    #[must_use]
    pub fn with_max_value_size(mut self, max_value_size: usize) -> Self {
        self.max_value_size = Some(max_value_size);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, include_metadata: bool) -> Self {
        self.include_metadata = include_metadata;
        self
    }
}
