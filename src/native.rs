//! The blocking call-level driver underneath every handle.
//!
//! Each open connection is owned by a driver thread. Native statements and the cursors stepping
//! through them borrow that connection and are not `Send`, so they stay on the driver thread and
//! the rest of the crate reaches them through commands. Callers hold the owning connection's
//! exclusivity token for every call.

mod driver;
mod extract;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rusqlite::OpenFlags;
use tracing::{debug, warn};

use crate::diagnostics::ErrorTranslator;
use crate::error::SqlBridgeError;
use crate::statement::BoundParameter;
use crate::types::Value;

use driver::Command;
pub(crate) use extract::{RawColumn, clamp_values};

/// Shape of a compiled statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PreparedShape {
    pub param_count: usize,
    pub column_count: usize,
}

/// What one execution produced. Row-count statements carry no columns and no stream.
#[derive(Debug, Default)]
pub(crate) struct Execution {
    pub columns: Vec<RawColumn>,
    /// First row, stepped while executing so that execute-time failures surface here.
    pub first: Option<Vec<Value>>,
    /// The rest of the rows, still on the driver.
    pub stream: Option<RowStream>,
    pub rows_affected: Option<usize>,
    pub autocommit: bool,
}

/// Rows of one execution not yet stepped. Dropping the stream closes the native cursor.
#[derive(Debug)]
pub(crate) struct RowStream {
    key: u64,
    commands: Sender<Command>,
    finished: bool,
}

impl RowStream {
    /// Step up to `max_rows` rows, clipping text and binary values to `max_value_size` bytes.
    pub(crate) fn fetch(
        &mut self,
        max_rows: usize,
        max_value_size: Option<usize>,
    ) -> Result<Vec<Vec<Value>>, SqlBridgeError> {
        if self.finished {
            return Ok(Vec::new());
        }
        let cursor = self.key;
        let batch = request(&self.commands, |respond_to| Command::Fetch {
            cursor,
            max_rows,
            max_value_size,
            respond_to,
        });
        match batch {
            Ok(batch) => {
                self.finished = batch.done;
                Ok(batch.rows)
            }
            Err(err) => {
                // The driver drops a cursor whose step failed.
                self.finished = true;
                Err(err)
            }
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.commands.send(Command::CloseCursor { cursor: self.key });
        }
    }
}

/// Tracks one live native connection in its environment's open counter.
#[derive(Debug)]
struct OpenToken(Arc<AtomicUsize>);

impl OpenToken {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for OpenToken {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn driver_gone() -> SqlBridgeError {
    SqlBridgeError::ExecutorError("native driver thread is no longer running".into())
}

fn request<T>(
    commands: &Sender<Command>,
    build: impl FnOnce(Sender<Result<T, SqlBridgeError>>) -> Command,
) -> Result<T, SqlBridgeError> {
    let (respond_to, response) = mpsc::channel();
    commands.send(build(respond_to)).map_err(|_| driver_gone())?;
    response.recv().map_err(|_| driver_gone())?
}

/// One native database handle, served by its driver thread.
#[derive(Debug)]
pub(crate) struct NativeConnection {
    commands: Sender<Command>,
    driver: Option<JoinHandle<()>>,
    _open: OpenToken,
}

impl NativeConnection {
    /// Connect with the connection string passed through verbatim.
    ///
    /// `login_timeout` bounds how long the connect phase waits on a locked database.
    pub(crate) fn connect(
        connection_string: &str,
        login_timeout: u32,
        cache_capacity: usize,
        open_counter: &Arc<AtomicUsize>,
    ) -> Result<Self, SqlBridgeError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = rusqlite::Connection::open_with_flags(connection_string, flags)
            .map_err(|err| ErrorTranslator::connect(&err))?;
        conn.busy_timeout(Duration::from_secs(u64::from(login_timeout)))
            .map_err(|err| ErrorTranslator::connect(&err))?;
        // Opening is lazy; touching the schema surfaces "not a database" and lock failures now.
        conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))
            .map_err(|err| ErrorTranslator::connect(&err))?;
        conn.set_prepared_statement_cache_capacity(cache_capacity);

        let (commands, receiver) = mpsc::channel::<Command>();
        let driver = thread::Builder::new()
            .name("sql-bridge-driver".into())
            .spawn(move || driver::run(conn, &receiver))
            .map_err(|err| {
                SqlBridgeError::ExecutorError(format!("failed to spawn driver thread: {err}"))
            })?;
        debug!(login_timeout, "native connection established");
        Ok(Self {
            commands,
            driver: Some(driver),
            _open: OpenToken::acquire(open_counter),
        })
    }

    pub(crate) fn prepare(&self, sql: &str) -> Result<PreparedShape, SqlBridgeError> {
        request(&self.commands, |respond_to| Command::Prepare {
            sql: sql.to_owned(),
            respond_to,
        })
    }

    /// Run a compiled statement with positional parameters. Rows after the first stay on the
    /// driver until fetched.
    pub(crate) fn execute(
        &self,
        sql: &str,
        params: &[BoundParameter],
    ) -> Result<Execution, SqlBridgeError> {
        let executed = request(&self.commands, |respond_to| Command::Execute {
            sql: sql.to_owned(),
            params: params.to_vec(),
            respond_to,
        })?;
        Ok(Execution {
            columns: executed.columns,
            first: executed.first,
            stream: executed.cursor.map(|key| RowStream {
                key,
                commands: self.commands.clone(),
                finished: false,
            }),
            rows_affected: executed.rows_affected,
            autocommit: executed.autocommit,
        })
    }

    pub(crate) fn execute_batch(&self, sql: &str) -> Result<(), SqlBridgeError> {
        request(&self.commands, |respond_to| Command::ExecuteBatch {
            sql: sql.to_owned(),
            respond_to,
        })
    }

    /// A connection whose driver is gone cannot hold a transaction open.
    pub(crate) fn is_autocommit(&self) -> bool {
        let (respond_to, response) = mpsc::channel();
        if self
            .commands
            .send(Command::IsAutocommit { respond_to })
            .is_err()
        {
            return true;
        }
        response.recv().unwrap_or(true)
    }

    /// Release the native handle. The handle is gone even when the driver reports an error.
    pub(crate) fn disconnect(mut self) -> Result<(), SqlBridgeError> {
        let closed = request(&self.commands, |respond_to| Command::Disconnect { respond_to });
        if let Some(driver) = self.driver.take() {
            if driver.join().is_err() {
                warn!("native driver thread panicked");
            }
        }
        closed
    }
}

impl Drop for NativeConnection {
    fn drop(&mut self) {
        if self.driver.take().is_some() {
            let (respond_to, _response) = mpsc::channel();
            let _ = self.commands.send(Command::Disconnect { respond_to });
        }
    }
}
