use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// One diagnostic record reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticRecord {
    /// Five-character SQLSTATE.
    pub state: String,
    /// Driver-specific error code.
    pub native_code: i32,
    /// Message text, verbatim from the driver.
    pub message: String,
}

/// Structured form of a native failure.
///
/// The top-level fields mirror the first (primary) record; `records` keeps every record the
/// driver produced for the failing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub state: String,
    pub native_code: i32,
    pub message: String,
    pub records: Vec<DiagnosticRecord>,
}

impl Diagnostic {
    /// Build a diagnostic from the records of one failing call.
    ///
    /// With no records a generic `HY000` record is synthesized so callers always have a state.
    #[must_use]
    pub fn from_records(mut records: Vec<DiagnosticRecord>) -> Self {
        if records.is_empty() {
            records.push(DiagnosticRecord {
                state: "HY000".into(),
                native_code: 0,
                message: "An error occurred but no diagnostic information was available.".into(),
            });
        }
        let primary = records[0].clone();
        Self {
            state: primary.state,
            native_code: primary.native_code,
            message: primary.message,
            records,
        }
    }

    #[must_use]
    pub fn single(state: &str, native_code: i32, message: impl Into<String>) -> Self {
        Self::from_records(vec![DiagnosticRecord {
            state: state.into(),
            native_code,
            message: message.into(),
        }])
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} (native code {})", self.state, self.message, self.native_code)
    }
}

#[derive(Debug, Error)]
pub enum SqlBridgeError {
    #[error("Connection error: {0}")]
    ConnectionError(Diagnostic),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Bind error: {0}")]
    BindError(String),

    #[error("Syntax error: {0}")]
    SyntaxError(Diagnostic),

    #[error("SQL execution error: {0}")]
    ExecutionError(Diagnostic),

    #[error("Driver error: {0}")]
    DriverError(Diagnostic),

    #[error("Error in {operation}: {source}")]
    QueryError {
        operation: &'static str,
        #[source]
        source: Box<SqlBridgeError>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Executor error: {0}")]
    ExecutorError(String),
}

impl SqlBridgeError {
    pub(crate) fn state(message: impl Into<String>) -> Self {
        SqlBridgeError::StateError(message.into())
    }

    pub(crate) fn query(operation: &'static str, source: SqlBridgeError) -> Self {
        SqlBridgeError::QueryError {
            operation,
            source: Box::new(source),
        }
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        SqlBridgeError::StateError(format!("{what} mutex poisoned"))
    }

    /// Innermost error, looking through `QueryError` wrappers.
    #[must_use]
    pub fn root(&self) -> &SqlBridgeError {
        match self {
            SqlBridgeError::QueryError { source, .. } => source.root(),
            other => other,
        }
    }

    /// Native diagnostic carried by this error, if the failure came from the driver.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self.root() {
            SqlBridgeError::ConnectionError(diag)
            | SqlBridgeError::SyntaxError(diag)
            | SqlBridgeError::ExecutionError(diag)
            | SqlBridgeError::DriverError(diag) => Some(diag),
            _ => None,
        }
    }

    #[must_use]
    pub fn sqlstate(&self) -> Option<&str> {
        self.diagnostic().map(|diag| diag.state.as_str())
    }

    #[must_use]
    pub fn is_state_error(&self) -> bool {
        matches!(self.root(), SqlBridgeError::StateError(_))
    }

    #[must_use]
    pub fn is_bind_error(&self) -> bool {
        matches!(self.root(), SqlBridgeError::BindError(_))
    }
}
