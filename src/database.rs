//! The host-facing database handle: one connection plus its construction options.

use tracing::debug;

use crate::config::{DatabaseOptions, DatabaseOptionsBuilder};
use crate::connection::Connection;
use crate::environment::Environment;
use crate::error::SqlBridgeError;
use crate::executor::{AsyncExecutor, Completion};
use crate::query::QueryRequest;
use crate::results::ResultSet;
use crate::results::row::QueryOutput;
use crate::statement::Statement;
use crate::types::FetchMode;

/// A database handle configured with [`DatabaseOptions`].
///
/// ```rust,no_run
/// use sql_bridge::prelude::*;
///
/// # fn main() -> Result<(), SqlBridgeError> {
/// let db = Database::builder().fetch_mode(FetchMode::Array).build()?;
/// db.open(":memory:")?;
/// let rows = db.query("select 1 as COLINT, 'x' as COLTEXT")?;
/// assert_eq!(rows.rows().len(), 1);
/// db.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Database {
    connection: Connection,
    options: DatabaseOptions,
}

impl Database {
    /// Allocate on the process-wide environment.
    ///
    /// # Errors
    /// [`SqlBridgeError::ConfigError`] for invalid options, [`SqlBridgeError::ExecutorError`] if
    /// a worker pool cannot be started.
    pub fn new(options: DatabaseOptions) -> Result<Self, SqlBridgeError> {
        Self::with_environment(&Environment::global(), options)
    }

    #[must_use]
    pub fn builder() -> DatabaseOptionsBuilder {
        DatabaseOptionsBuilder::new()
    }

    /// Allocate on `env`. A `worker_threads` option gives this database its own pool.
    ///
    /// # Errors
    /// See [`Database::new`].
    pub fn with_environment(env: &Environment, options: DatabaseOptions) -> Result<Self, SqlBridgeError> {
        options.validate()?;
        let mut connection = match options.worker_threads {
            Some(threads) => env.allocate_with_executor(AsyncExecutor::new(threads)?)?,
            None => env.allocate()?,
        };
        connection.set_fetch_mode(options.fetch_mode);
        connection.set_login_timeout(options.effective_connect_timeout());
        connection.set_statement_cache_capacity(options.statement_cache_capacity);
        debug!(fetch_mode = ?options.fetch_mode, "database handle created");
        Ok(Self {
            connection,
            options,
        })
    }

    #[must_use]
    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    #[must_use]
    pub fn fetch_mode(&self) -> FetchMode {
        self.options.fetch_mode
    }

    /// The underlying connection, for statement-level work and attributes.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// # Errors
    /// [`SqlBridgeError::ConnectionError`] if the driver refuses the connection.
    pub fn open(&self, connection_string: &str) -> Result<(), SqlBridgeError> {
        self.connection.open(connection_string)
    }

    pub fn open_async(&self, connection_string: impl Into<String>) -> Completion<()> {
        self.connection.open_async(connection_string)
    }

    /// # Errors
    /// [`SqlBridgeError::StateError`] while statements are still open.
    pub fn close(&self) -> Result<(), SqlBridgeError> {
        self.connection.close()
    }

    pub fn close_async(&self) -> Completion<()> {
        self.connection.close_async()
    }

    #[must_use]
    pub fn connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// # Errors
    /// [`SqlBridgeError::QueryError`] wrapping the failing step.
    pub fn query(&self, request: impl Into<QueryRequest>) -> Result<QueryOutput, SqlBridgeError> {
        self.connection.query(request)
    }

    pub fn query_async(&self, request: impl Into<QueryRequest>) -> Completion<QueryOutput> {
        self.connection.query_async(request)
    }

    pub fn query_with_callback<F>(&self, request: impl Into<QueryRequest>, callback: F)
    where
        F: FnOnce(Result<QueryOutput, SqlBridgeError>) + Send + 'static,
    {
        self.connection.query_with_callback(request, callback);
    }

    /// # Errors
    /// [`SqlBridgeError::QueryError`] wrapping the failing step.
    pub fn query_result(&self, request: impl Into<QueryRequest>) -> Result<ResultSet, SqlBridgeError> {
        self.connection.query_result(request)
    }

    /// Allocate a statement and prepare `sql` on it.
    ///
    /// # Errors
    /// [`SqlBridgeError::SyntaxError`] or [`SqlBridgeError::DriverError`] from the driver.
    pub fn prepare(&self, sql: &str) -> Result<Statement, SqlBridgeError> {
        let statement = self.connection.create_statement()?;
        statement.prepare(sql)?;
        Ok(statement)
    }

    /// # Errors
    /// [`SqlBridgeError::StateError`] if a transaction is already open.
    pub fn begin_transaction(&self) -> Result<(), SqlBridgeError> {
        self.connection.begin_transaction()
    }

    pub fn begin_transaction_async(&self) -> Completion<()> {
        self.connection.begin_transaction_async()
    }

    /// # Errors
    /// [`SqlBridgeError::StateError`] if no transaction is open.
    pub fn commit_transaction(&self) -> Result<(), SqlBridgeError> {
        self.connection.commit_transaction()
    }

    pub fn commit_transaction_async(&self) -> Completion<()> {
        self.connection.commit_transaction_async()
    }

    /// # Errors
    /// [`SqlBridgeError::StateError`] if no transaction is open.
    pub fn rollback_transaction(&self) -> Result<(), SqlBridgeError> {
        self.connection.rollback_transaction()
    }

    pub fn rollback_transaction_async(&self) -> Completion<()> {
        self.connection.rollback_transaction_async()
    }
}
