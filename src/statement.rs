//! Prepared statements and their parameter buffers.

mod binder;

use std::sync::{Arc, Weak};

use tracing::debug;

pub use binder::{BoundParameter, ParameterBinder};

use crate::connection::core::{ConnectionShared, ConnectionState, Released, upgrade};
use crate::error::SqlBridgeError;
use crate::executor::Completion;
use crate::handles::HandleId;
use crate::results::ResultSet;
use crate::results::cursor::CursorState;
use crate::results::row::FetchOptions;
use crate::types::Value;

/// Native statement state stored in the connection's statement arena.
#[derive(Debug, Default)]
pub(crate) struct StatementState {
    pub sql: Option<String>,
    pub param_count: usize,
    pub params: Option<Vec<BoundParameter>>,
    pub cursor: Option<HandleId>,
}

impl StatementState {
    fn close_cursor(&mut self, cursors: &mut crate::handles::HandleArena<CursorState>) {
        if let Some(cursor) = self.cursor.take() {
            cursors.remove(cursor);
        }
    }
}

fn closed() -> SqlBridgeError {
    SqlBridgeError::state("statement is closed")
}

fn not_prepared() -> SqlBridgeError {
    SqlBridgeError::state("statement is not prepared")
}

/// Compile `sql` into statement `id`. Any cursor and bound parameters of the previous text are
/// discarded; on failure the statement is left unprepared.
pub(crate) fn prepare_in(
    state: &mut ConnectionState,
    id: HandleId,
    sql: &str,
) -> Result<(), SqlBridgeError> {
    let ConnectionState {
        native,
        statements,
        cursors,
        ..
    } = state;
    let native = native
        .as_ref()
        .ok_or_else(|| SqlBridgeError::state("connection is not open"))?;
    let stmt = statements.get_mut(id).ok_or_else(closed)?;
    stmt.close_cursor(cursors);
    stmt.sql = None;
    stmt.params = None;
    stmt.param_count = 0;

    let shape = native.prepare(sql)?;
    debug!(statement = %id, params = shape.param_count, columns = shape.column_count, "prepared");
    stmt.sql = Some(sql.to_owned());
    stmt.param_count = shape.param_count;
    Ok(())
}

/// Rewrite the parameter buffer of statement `id`, closing its open cursor first.
pub(crate) fn bind_in(
    state: &mut ConnectionState,
    id: HandleId,
    values: &[Value],
) -> Result<(), SqlBridgeError> {
    let ConnectionState {
        statements,
        cursors,
        ..
    } = state;
    let stmt = statements.get_mut(id).ok_or_else(closed)?;
    if stmt.sql.is_none() {
        return Err(not_prepared());
    }
    stmt.close_cursor(cursors);
    stmt.params = None;
    stmt.params = Some(ParameterBinder::new(stmt.param_count).bind(values)?);
    Ok(())
}

/// Execute statement `id` and store its cursor. Failures leave the statement prepared with its
/// parameters intact.
pub(crate) fn execute_in(
    state: &mut ConnectionState,
    id: HandleId,
    owns_statement: bool,
) -> Result<HandleId, SqlBridgeError> {
    let ConnectionState {
        native,
        statements,
        cursors,
        in_transaction,
        ..
    } = state;
    let native = native
        .as_ref()
        .ok_or_else(|| SqlBridgeError::state("connection is not open"))?;
    let stmt = statements.get_mut(id).ok_or_else(closed)?;
    let sql = stmt.sql.as_deref().ok_or_else(not_prepared)?;
    let params: &[BoundParameter] = match &stmt.params {
        Some(params) => params.as_slice(),
        None if stmt.param_count == 0 => &[],
        None => {
            return Err(SqlBridgeError::BindError(format!(
                "statement expects {} parameters but none were bound",
                stmt.param_count
            )));
        }
    };
    if let Some(previous) = stmt.cursor.take() {
        cursors.remove(previous);
    }

    let execution = match native.execute(sql, params) {
        Ok(execution) => execution,
        Err(err) => {
            // A failed statement may have ended the transaction on the driver side.
            *in_transaction = !native.is_autocommit();
            return Err(err);
        }
    };
    *in_transaction = !execution.autocommit;
    debug!(
        statement = %id,
        columns = execution.columns.len(),
        streaming = execution.stream.is_some(),
        affected = ?execution.rows_affected,
        "executed"
    );

    let cursor = cursors.insert(CursorState::from_execution(id, owns_statement, execution));
    stmt.cursor = Some(cursor);
    Ok(cursor)
}

/// Wrap cursor `cursor` of connection `shared` in a public result handle.
pub(crate) fn result_handle(
    shared: &Arc<ConnectionShared>,
    state: &ConnectionState,
    cursor: HandleId,
    options: FetchOptions,
) -> Result<ResultSet, SqlBridgeError> {
    let snapshot = state
        .cursors
        .get(cursor)
        .ok_or_else(|| SqlBridgeError::state("result set is closed"))?;
    Ok(ResultSet::new(
        Arc::downgrade(shared),
        cursor,
        snapshot.metadata(),
        snapshot.column_names(),
        options,
    ))
}

/// A statement handle scoped to one connection.
///
/// Dropping the handle releases the native statement and any cursor it still owns.
pub struct Statement {
    shared: Weak<ConnectionShared>,
    id: HandleId,
    options: FetchOptions,
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Statement {
    pub(crate) fn new(shared: &Arc<ConnectionShared>, id: HandleId, options: FetchOptions) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            id,
            options,
        }
    }

    /// Compile SQL text. Calling it again re-prepares with the new text.
    ///
    /// # Errors
    /// [`SqlBridgeError::SyntaxError`] or [`SqlBridgeError::DriverError`] from the driver,
    /// [`SqlBridgeError::StateError`] if the statement or connection is closed.
    pub fn prepare(&self, sql: &str) -> Result<(), SqlBridgeError> {
        let id = self.id;
        upgrade(&self.shared)?.run_sync(|state| prepare_in(state, id, sql))
    }

    pub fn prepare_async(&self, sql: impl Into<String>) -> Completion<()> {
        let (id, sql) = (self.id, sql.into());
        match upgrade(&self.shared) {
            Ok(shared) => shared.submit_future(move |_, state| prepare_in(state, id, &sql)),
            Err(err) => Completion::failed(err),
        }
    }

    /// Bind positional parameters, replacing any earlier binding.
    ///
    /// # Errors
    /// [`SqlBridgeError::BindError`] on an arity or type mismatch,
    /// [`SqlBridgeError::StateError`] if the statement is not prepared.
    pub fn bind(&self, values: &[Value]) -> Result<(), SqlBridgeError> {
        let id = self.id;
        upgrade(&self.shared)?.run_sync(|state| bind_in(state, id, values))
    }

    pub fn bind_async(&self, values: Vec<Value>) -> Completion<()> {
        let id = self.id;
        match upgrade(&self.shared) {
            Ok(shared) => shared.submit_future(move |_, state| bind_in(state, id, &values)),
            Err(err) => Completion::failed(err),
        }
    }

    /// Execute with the current binding. The previous result of this statement is closed.
    ///
    /// # Errors
    /// [`SqlBridgeError::ExecutionError`] from the driver, [`SqlBridgeError::StateError`] if the
    /// statement is not prepared.
    pub fn execute(&self) -> Result<ResultSet, SqlBridgeError> {
        let (id, options) = (self.id, self.options);
        let shared = upgrade(&self.shared)?;
        shared.run_sync(|state| {
            let cursor = execute_in(state, id, false)?;
            result_handle(&shared, state, cursor, options)
        })
    }

    pub fn execute_async(&self) -> Completion<ResultSet> {
        let (id, options) = (self.id, self.options);
        match upgrade(&self.shared) {
            Ok(shared) => shared.submit_future(move |shared, state| {
                let cursor = execute_in(state, id, false)?;
                result_handle(shared, state, cursor, options)
            }),
            Err(err) => Completion::failed(err),
        }
    }

    /// Release the statement and its open result once queued work on the connection has
    /// finished. Idempotent.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] if the connection lock is poisoned.
    pub fn close(&self) -> Result<(), SqlBridgeError> {
        let id = self.id;
        match self.shared.upgrade() {
            Some(shared) => shared.run_after_queue(|state| {
                state.release_statement(id);
                Ok(())
            }),
            None => Ok(()),
        }
    }

    pub fn close_async(&self) -> Completion<()> {
        let id = self.id;
        match self.shared.upgrade() {
            Some(shared) => shared.submit_future(move |_, state| {
                state.release_statement(id);
                Ok(())
            }),
            None => Completion::ready(()),
        }
    }

    /// Whether prepared SQL is in place.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] if the connection is busy or the statement is closed.
    pub fn is_prepared(&self) -> Result<bool, SqlBridgeError> {
        self.sql().map(|sql| sql.is_some())
    }

    /// SQL text currently prepared.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] if the connection is busy or the statement is closed.
    pub fn sql(&self) -> Result<Option<String>, SqlBridgeError> {
        let id = self.id;
        upgrade(&self.shared)?.run_sync(|state| {
            state
                .statements
                .get(id)
                .map(|stmt| stmt.sql.clone())
                .ok_or_else(closed)
        })
    }

    /// Default shape for results produced by this statement.
    #[must_use]
    pub fn options(&self) -> FetchOptions {
        self.options
    }

    pub fn set_options(&mut self, options: FetchOptions) {
        self.options = options;
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.release(Released::Statement(self.id));
        }
    }
}
