//! Result sets: the cursor and column snapshot of one execution.

pub(crate) mod cursor;
pub mod metadata;
pub mod row;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::connection::core::{ConnectionShared, ConnectionState, Released, upgrade};
use crate::error::SqlBridgeError;
use crate::executor::Completion;
use crate::handles::HandleId;
use crate::types::FetchMode;

use cursor::CursorState;
use metadata::ColumnDescriptor;
use row::{FetchOptions, QueryOutput, Row};

fn cursor_mut(state: &mut ConnectionState, id: HandleId) -> Result<&mut CursorState, SqlBridgeError> {
    state
        .cursors
        .get_mut(id)
        .ok_or_else(|| SqlBridgeError::state("result set is closed"))
}

/// Rows and column metadata produced by one statement execution.
///
/// Metadata is captured when the statement runs and never changes. Rows are read forward only;
/// after the last row [`ResultSet::fetch`] keeps returning `None`. A result with no columns
/// (DDL or DML) fetches as an empty sequence.
pub struct ResultSet {
    shared: Weak<ConnectionShared>,
    cursor: HandleId,
    metadata: Arc<[ColumnDescriptor]>,
    names: Vec<String>,
    options: FetchOptions,
    closed: AtomicBool,
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("cursor", &self.cursor)
            .field("columns", &self.names)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ResultSet {
    pub(crate) fn new(
        shared: Weak<ConnectionShared>,
        cursor: HandleId,
        metadata: Arc<[ColumnDescriptor]>,
        names: Vec<String>,
        options: FetchOptions,
    ) -> Self {
        Self {
            shared,
            cursor,
            metadata,
            names,
            options,
            closed: AtomicBool::new(false),
        }
    }

    fn live(&self) -> Result<Arc<ConnectionShared>, SqlBridgeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SqlBridgeError::state("result set is closed"));
        }
        upgrade(&self.shared)
    }

    /// Column descriptors captured at execution. Empty for row-count statements.
    #[must_use]
    pub fn column_metadata(&self) -> &[ColumnDescriptor] {
        &self.metadata
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Rows affected by a row-count statement, or rows fetched so far for a query.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] once the result is closed or the connection is busy.
    pub fn row_count(&self) -> Result<usize, SqlBridgeError> {
        let cursor = self.cursor;
        self.live()?
            .run_sync(|state| cursor_mut(state, cursor).map(|cur| cur.row_count()))
    }

    /// Fetch the next row, or `None` at the end of the set.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] once the result is closed or the connection is busy.
    pub fn fetch(&self, mode: FetchMode) -> Result<Option<Row>, SqlBridgeError> {
        let (cursor, limit) = (self.cursor, self.options.max_value_size);
        self.live()?
            .run_sync(|state| cursor_mut(state, cursor)?.next_row(mode, limit))
    }

    pub fn fetch_async(&self, mode: FetchMode) -> Completion<Option<Row>> {
        let (cursor, limit) = (self.cursor, self.options.max_value_size);
        match self.live() {
            Ok(shared) => shared.submit_future(move |_, state| {
                cursor_mut(state, cursor)?.next_row(mode, limit)
            }),
            Err(err) => Completion::failed(err),
        }
    }

    /// Drain every remaining row in the requested shape.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] once the result is closed or the connection is busy.
    pub fn fetch_all(&self, options: FetchOptions) -> Result<QueryOutput, SqlBridgeError> {
        let cursor = self.cursor;
        self.live()?
            .run_sync(|state| cursor_mut(state, cursor)?.drain(options))
    }

    pub fn fetch_all_async(&self, options: FetchOptions) -> Completion<QueryOutput> {
        let cursor = self.cursor;
        match self.live() {
            Ok(shared) => {
                shared.submit_future(move |_, state| cursor_mut(state, cursor)?.drain(options))
            }
            Err(err) => Completion::failed(err),
        }
    }

    /// Drain with the options this result was produced with.
    ///
    /// # Errors
    /// See [`ResultSet::fetch_all`].
    pub fn fetch_remaining(&self) -> Result<QueryOutput, SqlBridgeError> {
        self.fetch_all(self.options)
    }

    #[must_use]
    pub fn options(&self) -> FetchOptions {
        self.options
    }

    pub fn set_options(&mut self, options: FetchOptions) {
        self.options = options;
    }

    /// Whether the execution produced a further result set. A native statement runs a single
    /// SQL statement, so there never is one.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] once the result is closed.
    pub fn more_results(&self) -> Result<bool, SqlBridgeError> {
        self.live().map(|_| false)
    }

    /// Release the cursor once queued work on the connection has finished. Idempotent; a closed
    /// result rejects further fetches.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] if the connection lock is poisoned.
    pub fn close(&self) -> Result<(), SqlBridgeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(shared) = self.shared.upgrade() {
            let cursor = self.cursor;
            shared.run_after_queue(|state| {
                state.release_cursor(cursor);
                Ok(())
            })?;
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn close_async(&self) -> Completion<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Completion::ready(());
        }
        let cursor = self.cursor;
        match self.shared.upgrade() {
            Some(shared) => shared.submit_future(move |_, state| {
                state.release_cursor(cursor);
                Ok(())
            }),
            None => Completion::ready(()),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.release(Released::Cursor(self.cursor));
        }
    }
}
