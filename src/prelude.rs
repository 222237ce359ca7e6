//! Convenient imports for common functionality.

pub use crate::config::{DatabaseOptions, DatabaseOptionsBuilder};
pub use crate::connection::Connection;
pub use crate::database::Database;
pub use crate::environment::{Environment, EnvironmentBuilder};
pub use crate::error::{Diagnostic, SqlBridgeError};
pub use crate::executor::{AsyncExecutor, Completion};
pub use crate::query::QueryRequest;
pub use crate::results::ResultSet;
pub use crate::results::metadata::ColumnDescriptor;
pub use crate::results::row::{FetchOptions, NamedRow, QueryOutput, Row, Rows};
pub use crate::statement::Statement;
pub use crate::types::{FetchMode, Value};
