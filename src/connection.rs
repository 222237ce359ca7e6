//! Connection handles: open/close, attributes, queries, and transactions.

pub(crate) mod core;
mod tx;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::environment::Environment;
use crate::error::SqlBridgeError;
use crate::executor::{AsyncExecutor, Completion, Reply};
use crate::handles::HandleId;
use crate::native::NativeConnection;
use crate::query::QueryRequest;
use crate::results::ResultSet;
use crate::results::row::{FetchOptions, QueryOutput};
use crate::statement::{self, Statement, StatementState};
use crate::types::FetchMode;

use self::core::{ConnectionShared, ConnectionState};

/// One logical database connection.
///
/// Every operation has a blocking form that runs on the calling thread and an `_async` form that
/// runs on the environment's worker pool. Operations on one connection never overlap: blocking
/// calls fail fast with a state error while another operation holds the connection, and
/// asynchronous calls queue behind earlier ones in submission order.
///
/// Dropping a connection closes it, together with any statements and results still open.
pub struct Connection {
    shared: Arc<ConnectionShared>,
    fetch_mode: FetchMode,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.is_connected())
            .field("login_timeout", &self.login_timeout())
            .finish_non_exhaustive()
    }
}

fn open_in(
    shared: &ConnectionShared,
    state: &mut ConnectionState,
    connection_string: &str,
) -> Result<(), SqlBridgeError> {
    if state.native.is_some() {
        return Err(SqlBridgeError::state("connection is already open"));
    }
    let native = NativeConnection::connect(
        connection_string,
        shared.login_timeout(),
        shared.statement_cache(),
        shared.env.open_counter(),
    )?;
    state.native = Some(native);
    state.connection_string = Some(connection_string.to_owned());
    state.in_transaction = false;
    debug!("connection opened");
    Ok(())
}

fn close_in(state: &mut ConnectionState) -> Result<(), SqlBridgeError> {
    if state.native.is_none() {
        return Ok(());
    }
    if !state.statements.is_empty() {
        return Err(SqlBridgeError::state("connection still has open statements"));
    }
    core::disconnect(state);
    debug!("connection closed");
    Ok(())
}

/// Prepare, bind, and execute `request` on a fresh internal statement. Returns the cursor; on
/// failure the statement is released.
fn execute_request(
    state: &mut ConnectionState,
    request: &QueryRequest,
    owns_statement: bool,
) -> Result<HandleId, SqlBridgeError> {
    state.native()?;
    let id = state.statements.insert(StatementState::default());
    let outcome = run_request(state, id, request, owns_statement);
    if outcome.is_err() {
        state.release_statement(id);
    }
    outcome
}

fn run_request(
    state: &mut ConnectionState,
    id: HandleId,
    request: &QueryRequest,
    owns_statement: bool,
) -> Result<HandleId, SqlBridgeError> {
    statement::prepare_in(state, id, &request.sql)?;
    statement::bind_in(state, id, &request.params)?;
    statement::execute_in(state, id, owns_statement)
}

fn query_in(
    state: &mut ConnectionState,
    request: &QueryRequest,
    options: FetchOptions,
) -> Result<QueryOutput, SqlBridgeError> {
    let cursor = execute_request(state, request, true)?;
    let output = match state.cursors.get_mut(cursor) {
        Some(cur) => cur.drain(options),
        None => Err(SqlBridgeError::state("result set is closed")),
    };
    state.release_cursor(cursor);
    output
}

impl Connection {
    /// Allocate a connection from the process-wide environment.
    ///
    /// # Errors
    /// [`SqlBridgeError::ExecutorError`] if the shared worker pool cannot be started.
    pub fn new() -> Result<Self, SqlBridgeError> {
        Environment::global().allocate()
    }

    pub(crate) fn from_shared(shared: Arc<ConnectionShared>) -> Self {
        Self {
            shared,
            fetch_mode: FetchMode::default(),
        }
    }

    /// Connect with the current login timeout.
    ///
    /// The connection string is handed to the driver verbatim.
    ///
    /// # Errors
    /// [`SqlBridgeError::ConnectionError`] if the driver refuses the connection,
    /// [`SqlBridgeError::StateError`] if already open.
    pub fn open(&self, connection_string: &str) -> Result<(), SqlBridgeError> {
        let shared = &self.shared;
        shared.run_sync(|state| open_in(shared, state, connection_string))
    }

    /// Set the login timeout, then connect.
    ///
    /// # Errors
    /// See [`Connection::open`].
    pub fn open_with_timeout(
        &self,
        connection_string: &str,
        timeout_seconds: u32,
    ) -> Result<(), SqlBridgeError> {
        self.set_login_timeout(timeout_seconds);
        self.open(connection_string)
    }

    pub fn open_async(&self, connection_string: impl Into<String>) -> Completion<()> {
        let connection_string = connection_string.into();
        self.shared
            .submit_future(move |shared, state| open_in(shared, state, &connection_string))
    }

    /// Release the native handle after queued work finishes. A closed connection is a no-op.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] while statements or results are still open.
    pub fn close(&self) -> Result<(), SqlBridgeError> {
        let pending = self.shared.pending_jobs();
        if pending > 0 {
            debug!(pending, "waiting for queued work before close");
        }
        self.shared.run_after_queue(close_in)
    }

    pub fn close_async(&self) -> Completion<()> {
        self.shared.submit_future(|_, state| close_in(state))
    }

    /// Close every statement and result of this connection, then the connection itself.
    pub fn close_all(&self) {
        self.shared.force_close();
    }

    /// Login timeout in seconds; 5 until changed.
    #[must_use]
    pub fn login_timeout(&self) -> u32 {
        self.shared.login_timeout()
    }

    /// Takes effect at the next connect.
    pub fn set_login_timeout(&self, seconds: u32) {
        self.shared.set_login_timeout(seconds);
    }

    /// Prepared-statement cache size for the next connect.
    pub fn set_statement_cache_capacity(&self, capacity: usize) {
        self.shared.set_statement_cache(capacity);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    #[must_use]
    pub fn auto_commit(&self) -> bool {
        self.shared.auto_commit()
    }

    /// Connection string of the open connection.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] if the connection is busy.
    pub fn connection_string(&self) -> Result<Option<String>, SqlBridgeError> {
        self.shared
            .run_sync(|state| Ok(state.connection_string.clone()))
    }

    /// Default row shape for queries that do not override it.
    #[must_use]
    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    pub fn set_fetch_mode(&mut self, mode: FetchMode) {
        self.fetch_mode = mode;
    }

    #[must_use]
    pub fn executor(&self) -> &AsyncExecutor {
        self.shared.executor()
    }

    /// Number of statements currently allocated on this connection.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] if the connection is busy.
    pub fn open_statements(&self) -> Result<usize, SqlBridgeError> {
        self.shared.run_sync(|state| Ok(state.statements.len()))
    }

    /// Allocate a statement handle.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] if the connection is not open or is busy.
    pub fn create_statement(&self) -> Result<Statement, SqlBridgeError> {
        let options = FetchOptions::new(self.fetch_mode);
        let id = self.shared.run_sync(|state| {
            state.native()?;
            Ok(state.statements.insert(StatementState::default()))
        })?;
        Ok(Statement::new(&self.shared, id, options))
    }

    /// Prepare, bind, execute, and drain `request` as one unit on an internal statement.
    ///
    /// # Errors
    /// [`SqlBridgeError::QueryError`] wrapping the failing step.
    pub fn query(&self, request: impl Into<QueryRequest>) -> Result<QueryOutput, SqlBridgeError> {
        let request = request.into();
        let options = request.fetch_options(self.fetch_mode);
        self.shared
            .run_sync(|state| query_in(state, &request, options))
            .map_err(|err| SqlBridgeError::query("Connection::query", err))
    }

    pub fn query_async(&self, request: impl Into<QueryRequest>) -> Completion<QueryOutput> {
        let (reply, completion) = Reply::channel();
        self.submit_query(request.into(), reply);
        completion
    }

    /// Run `request` on the worker pool and hand the outcome to `callback`.
    pub fn query_with_callback<F>(&self, request: impl Into<QueryRequest>, callback: F)
    where
        F: FnOnce(Result<QueryOutput, SqlBridgeError>) + Send + 'static,
    {
        self.submit_query(request.into(), Reply::callback(callback));
    }

    fn submit_query(&self, request: QueryRequest, reply: Reply<QueryOutput>) {
        let options = request.fetch_options(self.fetch_mode);
        self.shared.submit(reply, move |_, state| {
            query_in(state, &request, options)
                .map_err(|err| SqlBridgeError::query("Connection::query", err))
        });
    }

    /// Execute `request` and return its live result set. The internal statement is released
    /// when the result closes.
    ///
    /// # Errors
    /// [`SqlBridgeError::QueryError`] wrapping the failing step.
    pub fn query_result(
        &self,
        request: impl Into<QueryRequest>,
    ) -> Result<ResultSet, SqlBridgeError> {
        let request = request.into();
        let options = request.fetch_options(self.fetch_mode);
        let shared = &self.shared;
        shared
            .run_sync(|state| {
                let cursor = execute_request(state, &request, true)?;
                statement::result_handle(shared, state, cursor, options)
            })
            .map_err(|err| SqlBridgeError::query("Connection::query_result", err))
    }

    pub fn query_result_async(&self, request: impl Into<QueryRequest>) -> Completion<ResultSet> {
        let request = request.into();
        let options = request.fetch_options(self.fetch_mode);
        self.shared.submit_future(move |shared, state| {
            execute_request(state, &request, true)
                .and_then(|cursor| statement::result_handle(shared, state, cursor, options))
                .map_err(|err| SqlBridgeError::query("Connection::query_result", err))
        })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.shared.is_connected() {
            warn!("connection dropped while open; closing it and its statements");
        }
        self.shared.force_close();
        self.shared.env.deregister(&self.shared);
    }
}
