//! Translation of native driver failures into [`Diagnostic`] records and typed errors.

use rusqlite::ErrorCode;

use crate::error::{Diagnostic, DiagnosticRecord, SqlBridgeError};

/// Converts `rusqlite` failures into structured errors.
///
/// Each native failure becomes exactly one [`SqlBridgeError`] carrying a [`Diagnostic`]; the
/// phase the failure happened in picks the variant.
pub struct ErrorTranslator;

impl ErrorTranslator {
    /// Diagnostic records for one native failure, primary record first.
    #[must_use]
    pub fn records(err: &rusqlite::Error) -> Vec<DiagnosticRecord> {
        let message = err.to_string();
        let (state, native_code) = match err.sqlite_error() {
            Some(native) => (
                state_for_code(native.code, &message),
                native.extended_code,
            ),
            None => (state_for_api_error(err), 0),
        };
        let mut records = vec![DiagnosticRecord {
            state: state.to_owned(),
            native_code,
            message,
        }];
        // SQLite folds a second diagnostic into the extended code; surface it when it adds detail.
        if let Some(native) = err.sqlite_error() {
            let primary = native.extended_code & 0xff;
            if native.extended_code != primary {
                records.push(DiagnosticRecord {
                    state: state.to_owned(),
                    native_code: primary,
                    message: rusqlite::ffi::code_to_str(native.extended_code).to_owned(),
                });
            }
        }
        records
    }

    #[must_use]
    pub fn diagnostic(err: &rusqlite::Error) -> Diagnostic {
        Diagnostic::from_records(Self::records(err))
    }

    /// Failure while connecting.
    #[must_use]
    pub fn connect(err: &rusqlite::Error) -> SqlBridgeError {
        SqlBridgeError::ConnectionError(Self::diagnostic(err))
    }

    /// Failure while compiling SQL. Syntax-access class states (`42xxx`) become
    /// [`SqlBridgeError::SyntaxError`], everything else a driver error.
    #[must_use]
    pub fn prepare(err: &rusqlite::Error) -> SqlBridgeError {
        let diag = Self::diagnostic(err);
        if diag.state.starts_with("42") {
            SqlBridgeError::SyntaxError(diag)
        } else {
            SqlBridgeError::DriverError(diag)
        }
    }

    #[must_use]
    pub fn execute(err: &rusqlite::Error) -> SqlBridgeError {
        SqlBridgeError::ExecutionError(Self::diagnostic(err))
    }

    #[must_use]
    pub fn driver(err: &rusqlite::Error) -> SqlBridgeError {
        SqlBridgeError::DriverError(Self::diagnostic(err))
    }
}

fn state_for_code(code: ErrorCode, message: &str) -> &'static str {
    match code {
        ErrorCode::CannotOpen | ErrorCode::NotADatabase => "08001",
        ErrorCode::ConstraintViolation => "23000",
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => "HYT00",
        ErrorCode::ReadOnly => "25006",
        ErrorCode::PermissionDenied | ErrorCode::AuthorizationForStatementDenied => "42000",
        ErrorCode::TooBig => "22001",
        ErrorCode::TypeMismatch => "22018",
        ErrorCode::OperationInterrupted => "HY008",
        ErrorCode::OutOfMemory => "HY001",
        ErrorCode::SystemIoFailure => "08S01",
        ErrorCode::ApiMisuse => "HY010",
        ErrorCode::ParameterOutOfRange => "07009",
        ErrorCode::Unknown => state_for_message(message),
        _ => "HY000",
    }
}

// SQLITE_ERROR covers every compile-time failure; the message is the only discriminator.
fn state_for_message(message: &str) -> &'static str {
    let lower = message.to_ascii_lowercase();
    if lower.contains("syntax error") || lower.contains("incomplete input") {
        "42000"
    } else if lower.contains("no such table") {
        "42S02"
    } else if lower.contains("no such column") {
        "42S22"
    } else if lower.contains("already exists") {
        "42S01"
    } else {
        "HY000"
    }
}

fn state_for_api_error(err: &rusqlite::Error) -> &'static str {
    match err {
        rusqlite::Error::InvalidParameterCount(..) | rusqlite::Error::InvalidParameterName(_) => {
            "07002"
        }
        rusqlite::Error::InvalidColumnType(..) | rusqlite::Error::FromSqlConversionFailure(..) => {
            "07006"
        }
        rusqlite::Error::IntegralValueOutOfRange(..) => "22003",
        rusqlite::Error::Utf8Error(_) | rusqlite::Error::NulError(_) => "22018",
        rusqlite::Error::MultipleStatement | rusqlite::Error::InvalidQuery => "42000",
        rusqlite::Error::InvalidColumnIndex(_) | rusqlite::Error::InvalidColumnName(_) => "07009",
        _ => "HY000",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: ErrorCode, extended: i32, message: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code,
                extended_code: extended,
            },
            Some(message.to_owned()),
        )
    }

    #[test]
    fn syntax_errors_map_to_42000() {
        let err = failure(ErrorCode::Unknown, 1, "near \"invalid\": syntax error");
        let translated = ErrorTranslator::prepare(&err);
        assert!(matches!(translated, SqlBridgeError::SyntaxError(_)));
        assert_eq!(translated.sqlstate(), Some("42000"));
        let diag = translated.diagnostic().unwrap();
        assert_eq!(diag.message, "near \"invalid\": syntax error");
        assert_eq!(diag.native_code, 1);
    }

    #[test]
    fn missing_table_is_42s02() {
        let err = failure(ErrorCode::Unknown, 1, "no such table: nope");
        assert_eq!(ErrorTranslator::diagnostic(&err).state, "42S02");
    }

    #[test]
    fn constraint_keeps_extended_record() {
        // SQLITE_CONSTRAINT_UNIQUE = 2067
        let err = failure(ErrorCode::ConstraintViolation, 2067, "UNIQUE constraint failed: t.a");
        let translated = ErrorTranslator::execute(&err);
        let diag = translated.diagnostic().unwrap();
        assert_eq!(diag.state, "23000");
        assert_eq!(diag.native_code, 2067);
        assert_eq!(diag.records.len(), 2);
        assert_eq!(diag.records[1].native_code, 19);
    }

    #[test]
    fn non_syntax_prepare_failures_are_driver_errors() {
        let err = failure(ErrorCode::DatabaseBusy, 5, "database is locked");
        let translated = ErrorTranslator::prepare(&err);
        assert!(matches!(translated, SqlBridgeError::DriverError(_)));
        assert_eq!(translated.sqlstate(), Some("HYT00"));
    }

    #[test]
    fn api_errors_get_states() {
        let err = rusqlite::Error::InvalidParameterCount(1, 2);
        assert_eq!(ErrorTranslator::diagnostic(&err).state, "07002");
        assert_eq!(ErrorTranslator::diagnostic(&rusqlite::Error::InvalidQuery).state, "42000");
    }
}
