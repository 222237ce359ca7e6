//! Handle-based connection, statement, and result-set core over a blocking call-level SQL
//! driver, with a blocking and an asynchronous entry point for every operation.
//!
//! ```rust,no_run
//! use sql_bridge::prelude::*;
//!
//! # async fn run() -> Result<(), SqlBridgeError> {
//! let conn = Connection::new()?;
//! conn.open(":memory:")?;
//!
//! let stmt = conn.create_statement()?;
//! stmt.prepare("select ? as col1, ? as col2")?;
//! stmt.bind(&[Value::from("a"), Value::from("b")])?;
//! let rows = stmt.execute()?.fetch_all(FetchOptions::new(FetchMode::Array))?;
//! # let _ = rows;
//! drop(stmt);
//!
//! let out = conn
//!     .query_async(QueryRequest::new("select 1 as COLINT").include_metadata(true))
//!     .await?;
//! # let _ = out;
//! conn.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod database;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod executor;
pub mod handles;
mod native;
pub mod prelude;
pub mod query;
pub mod results;
pub mod statement;
pub mod types;

pub use config::{DatabaseOptions, DatabaseOptionsBuilder};
pub use connection::Connection;
pub use database::Database;
pub use diagnostics::ErrorTranslator;
pub use environment::{Environment, EnvironmentBuilder, OdbcVersion};
pub use error::{Diagnostic, DiagnosticRecord, SqlBridgeError};
pub use executor::{AsyncExecutor, Completion};
pub use query::QueryRequest;
pub use results::ResultSet;
pub use results::metadata::{ColumnDescriptor, Nullability};
pub use results::row::{FetchOptions, NamedRow, QueryOutput, ResultEnvelope, Row, Rows};
pub use statement::{BoundParameter, ParameterBinder, Statement};
pub use types::{FetchMode, SqlType, Value};
