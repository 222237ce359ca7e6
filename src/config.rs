use serde::Deserialize;

use crate::connection::core::{DEFAULT_LOGIN_TIMEOUT, DEFAULT_STATEMENT_CACHE};
use crate::error::SqlBridgeError;
use crate::types::FetchMode;

/// Options for a [`crate::Database`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DatabaseOptions {
    /// Row shape for queries that do not override it.
    pub fetch_mode: FetchMode,
    /// Login timeout in seconds; the connection default of 5 applies when unset.
    pub connect_timeout: Option<u32>,
    /// Dedicated worker pool size. Unset shares the environment's pool.
    pub worker_threads: Option<usize>,
    pub statement_cache_capacity: usize,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            fetch_mode: FetchMode::Object,
            connect_timeout: None,
            worker_threads: None,
            statement_cache_capacity: DEFAULT_STATEMENT_CACHE,
        }
    }
}

impl DatabaseOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fetch_mode(mut self, fetch_mode: FetchMode) -> Self {
        self.fetch_mode = fetch_mode;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, seconds: u32) -> Self {
        self.connect_timeout = Some(seconds);
        self
    }

    /// Login timeout the connection will use.
    #[must_use]
    pub fn effective_connect_timeout(&self) -> u32 {
        self.connect_timeout.unwrap_or(DEFAULT_LOGIN_TIMEOUT)
    }

    /// Parse host-facing options such as `{"fetchMode": "ARRAY", "connectTimeout": 10}`.
    ///
    /// # Errors
    /// [`SqlBridgeError::ConfigError`] for unknown keys, wrong types, or invalid values.
    pub fn from_json(value: serde_json::Value) -> Result<Self, SqlBridgeError> {
        let options: Self = serde_json::from_value(value)
            .map_err(|err| SqlBridgeError::ConfigError(format!("invalid database options: {err}")))?;
        options.validate()?;
        Ok(options)
    }

    /// # Errors
    /// [`SqlBridgeError::ConfigError`] when `worker_threads` is zero.
    pub fn validate(&self) -> Result<(), SqlBridgeError> {
        if self.worker_threads == Some(0) {
            return Err(SqlBridgeError::ConfigError(
                "workerThreads must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`DatabaseOptions`].
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptionsBuilder {
    opts: DatabaseOptions,
}

impl DatabaseOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fetch_mode(mut self, fetch_mode: FetchMode) -> Self {
        self.opts.fetch_mode = fetch_mode;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, seconds: u32) -> Self {
        self.opts.connect_timeout = Some(seconds);
        self
    }

    #[must_use]
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.opts.worker_threads = Some(threads);
        self
    }

    #[must_use]
    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.opts.statement_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn finish(self) -> DatabaseOptions {
        self.opts
    }

    /// Build a [`crate::Database`] on the process-wide environment.
    ///
    /// # Errors
    /// [`SqlBridgeError::ConfigError`] for invalid options, or any allocation error.
    pub fn build(self) -> Result<crate::Database, SqlBridgeError> {
        crate::Database::new(self.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_connection_defaults() {
        let opts = DatabaseOptions::default();
        assert_eq!(opts.fetch_mode, FetchMode::Object);
        assert_eq!(opts.effective_connect_timeout(), 5);
        assert_eq!(opts.statement_cache_capacity, 16);
    }

    #[test]
    fn json_options_use_camel_case() -> Result<(), SqlBridgeError> {
        let opts = DatabaseOptions::from_json(json!({
            "fetchMode": "ARRAY",
            "connectTimeout": 10
        }))?;
        assert_eq!(opts.fetch_mode, FetchMode::Array);
        assert_eq!(opts.connect_timeout, Some(10));
        assert_eq!(opts.worker_threads, None);
        Ok(())
    }

    #[test]
    fn invalid_options_are_config_errors() {
        assert!(matches!(
            DatabaseOptions::from_json(json!({"workerThreads": 0})),
            Err(SqlBridgeError::ConfigError(_))
        ));
        assert!(matches!(
            DatabaseOptions::from_json(json!({"fetchMode": "TABLE"})),
            Err(SqlBridgeError::ConfigError(_))
        ));
        assert!(matches!(
            DatabaseOptions::from_json(json!({"bogus": true})),
            Err(SqlBridgeError::ConfigError(_))
        ));
    }

    #[test]
    fn builder_finishes_options() {
        let opts = DatabaseOptionsBuilder::new()
            .fetch_mode(FetchMode::Array)
            .connect_timeout(3)
            .worker_threads(2)
            .statement_cache_capacity(4)
            .finish();
        assert_eq!(opts.fetch_mode, FetchMode::Array);
        assert_eq!(opts.connect_timeout, Some(3));
        assert_eq!(opts.worker_threads, Some(2));
        assert_eq!(opts.statement_cache_capacity, 4);
    }
}
