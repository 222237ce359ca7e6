use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::SqlBridgeError;
use crate::results::row::FetchOptions;
use crate::types::{FetchMode, Value};

/// A query: SQL text, positional parameters, and optional shape overrides.
///
/// ```rust
/// use sql_bridge::prelude::*;
///
/// let request = QueryRequest::new("select ? as col1, ? as col2")
///     .with_params(vec![Value::from("a"), Value::from("b")])
///     .fetch_mode(FetchMode::Array)
///     .include_metadata(true);
/// assert_eq!(request.params.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Vec<Value>,
    /// Overrides the connection default when set.
    pub fetch_mode: Option<FetchMode>,
    pub include_metadata: bool,
    /// Cut text and binary values to this many bytes. `None` is unlimited.
    pub max_value_size: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WireRequest {
    sql: String,
    #[serde(default)]
    params: Vec<JsonValue>,
    #[serde(default)]
    fetch_mode: Option<FetchMode>,
    #[serde(default)]
    include_metadata: bool,
    /// Negative means unlimited.
    #[serde(default)]
    max_value_size: Option<i64>,
}

impl QueryRequest {
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            fetch_mode: None,
            include_metadata: false,
            max_value_size: None,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn fetch_mode(mut self, mode: FetchMode) -> Self {
        self.fetch_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn include_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    #[must_use]
    pub fn max_value_size(mut self, max_value_size: usize) -> Self {
        self.max_value_size = Some(max_value_size);
        self
    }

    /// Parse the host-facing request shape: a bare SQL string, or
    /// `{ "sql", "params"?, "fetchMode"?, "includeMetadata"?, "maxValueSize"? }`.
    ///
    /// # Errors
    /// [`SqlBridgeError::ConfigError`] for an unrecognized shape, [`SqlBridgeError::BindError`]
    /// for non-scalar parameters.
    pub fn from_json(value: JsonValue) -> Result<Self, SqlBridgeError> {
        match value {
            JsonValue::String(sql) => Ok(Self::new(sql)),
            JsonValue::Object(_) => {
                let wire: WireRequest = serde_json::from_value(value).map_err(|err| {
                    SqlBridgeError::ConfigError(format!("invalid query request: {err}"))
                })?;
                let params = wire
                    .params
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self {
                    sql: wire.sql,
                    params,
                    fetch_mode: wire.fetch_mode,
                    include_metadata: wire.include_metadata,
                    max_value_size: wire
                        .max_value_size
                        .and_then(|limit| usize::try_from(limit).ok()),
                })
            }
            other => Err(SqlBridgeError::ConfigError(format!(
                "query request must be a SQL string or an object, got {other}"
            ))),
        }
    }

    /// Shape options with `default_mode` filling an absent override.
    #[must_use]
    pub fn fetch_options(&self, default_mode: FetchMode) -> FetchOptions {
        let options = FetchOptions::new(self.fetch_mode.unwrap_or(default_mode))
            .with_metadata(self.include_metadata);
        match self.max_value_size {
            Some(limit) => options.with_max_value_size(limit),
            None => options,
        }
    }
}

impl From<&str> for QueryRequest {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for QueryRequest {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}
