use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};

use rusqlite::{CachedStatement, Connection, Rows, params_from_iter};
use self_cell::{MutBorrow, self_cell};
use tracing::{trace, warn};

use super::PreparedShape;
use super::extract::{self, RawColumn};
use crate::diagnostics::ErrorTranslator;
use crate::error::SqlBridgeError;
use crate::statement::BoundParameter;
use crate::types::Value;

type Respond<T> = Sender<Result<T, SqlBridgeError>>;

/// Outcome of an execute command. `cursor` is set while rows remain to be stepped.
#[derive(Debug, Default)]
pub(super) struct Executed {
    pub columns: Vec<RawColumn>,
    pub first: Option<Vec<Value>>,
    pub cursor: Option<u64>,
    pub rows_affected: Option<usize>,
    pub autocommit: bool,
}

/// Rows stepped by one fetch. `done` is set once the cursor has reached its end.
#[derive(Debug)]
pub(super) struct Batch {
    pub rows: Vec<Vec<Value>>,
    pub done: bool,
}

pub(super) enum Command {
    Prepare {
        sql: String,
        respond_to: Respond<PreparedShape>,
    },
    Execute {
        sql: String,
        params: Vec<BoundParameter>,
        respond_to: Respond<Executed>,
    },
    Fetch {
        cursor: u64,
        max_rows: usize,
        max_value_size: Option<usize>,
        respond_to: Respond<Batch>,
    },
    CloseCursor {
        cursor: u64,
    },
    ExecuteBatch {
        sql: String,
        respond_to: Respond<()>,
    },
    IsAutocommit {
        respond_to: Sender<bool>,
    },
    Disconnect {
        respond_to: Respond<()>,
    },
}

type LiveRows<'stmt> = Rows<'stmt>;

self_cell!(
    /// A cached statement together with the rows it is stepping through.
    struct LiveCursor<'conn> {
        owner: MutBorrow<CachedStatement<'conn>>,

        #[not_covariant]
        dependent: LiveRows,
    }
);

struct OpenCursor<'conn> {
    rows: LiveCursor<'conn>,
    columns: Vec<RawColumn>,
}

impl OpenCursor<'_> {
    fn step(
        &mut self,
        max_rows: usize,
        max_value_size: Option<usize>,
    ) -> Result<Batch, SqlBridgeError> {
        let columns = &self.columns;
        self.rows.with_dependent_mut(|_, rows| {
            let mut batch = Batch {
                rows: Vec::new(),
                done: false,
            };
            while batch.rows.len() < max_rows {
                match rows.next().map_err(|err| ErrorTranslator::execute(&err))? {
                    Some(row) => batch
                        .rows
                        .push(extract::row_values(row, columns, max_value_size)),
                    None => {
                        batch.done = true;
                        break;
                    }
                }
            }
            Ok(batch)
        })
    }
}

/// Serve commands until disconnect or until every sender is gone, then close the connection.
pub(super) fn run(conn: Connection, receiver: &Receiver<Command>) {
    let mut cursors: HashMap<u64, OpenCursor<'_>> = HashMap::new();
    let mut next_cursor: u64 = 1;
    let mut respond_on_close = None;

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Prepare { sql, respond_to } => {
                let _ = respond_to.send(prepare(&conn, &sql));
            }
            Command::Execute {
                sql,
                params,
                respond_to,
            } => {
                let result = execute(&conn, &sql, &params).map(|(mut executed, open)| {
                    if let Some(open) = open {
                        let key = next_cursor;
                        next_cursor = next_cursor.wrapping_add(1);
                        cursors.insert(key, open);
                        executed.cursor = Some(key);
                    }
                    executed
                });
                let _ = respond_to.send(result);
            }
            Command::Fetch {
                cursor,
                max_rows,
                max_value_size,
                respond_to,
            } => {
                let result = match cursors.get_mut(&cursor) {
                    Some(open) => open.step(max_rows, max_value_size),
                    None => Ok(Batch {
                        rows: Vec::new(),
                        done: true,
                    }),
                };
                if !matches!(result, Ok(Batch { done: false, .. })) {
                    cursors.remove(&cursor);
                }
                let _ = respond_to.send(result);
            }
            Command::CloseCursor { cursor } => {
                if cursors.remove(&cursor).is_some() {
                    trace!(cursor, "native cursor closed");
                }
            }
            Command::ExecuteBatch { sql, respond_to } => {
                let result = conn
                    .execute_batch(&sql)
                    .map_err(|err| ErrorTranslator::execute(&err));
                let _ = respond_to.send(result);
            }
            Command::IsAutocommit { respond_to } => {
                let _ = respond_to.send(conn.is_autocommit());
            }
            Command::Disconnect { respond_to } => {
                respond_on_close = Some(respond_to);
                break;
            }
        }
    }

    // Cursors borrow the connection and have to go first.
    drop(cursors);
    let closed = conn
        .close()
        .map_err(|(_conn, err)| ErrorTranslator::driver(&err));
    match respond_on_close {
        Some(respond_to) => {
            let _ = respond_to.send(closed);
        }
        None => {
            if let Err(err) = closed {
                warn!(error = %err, "native close reported an error");
            }
        }
    }
}

fn prepare(conn: &Connection, sql: &str) -> Result<PreparedShape, SqlBridgeError> {
    let stmt = conn
        .prepare_cached(sql)
        .map_err(|err| ErrorTranslator::prepare(&err))?;
    Ok(PreparedShape {
        param_count: stmt.parameter_count(),
        column_count: stmt.column_count(),
    })
}

fn execute<'conn>(
    conn: &'conn Connection,
    sql: &str,
    params: &[BoundParameter],
) -> Result<(Executed, Option<OpenCursor<'conn>>), SqlBridgeError> {
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|err| ErrorTranslator::prepare(&err))?;

    if stmt.column_count() == 0 {
        let affected = stmt
            .execute(params_from_iter(params.iter()))
            .map_err(|err| ErrorTranslator::execute(&err))?;
        let executed = Executed {
            rows_affected: Some(affected),
            autocommit: conn.is_autocommit(),
            ..Executed::default()
        };
        return Ok((executed, None));
    }

    let columns = RawColumn::capture(&stmt);
    let rows = LiveCursor::try_new(MutBorrow::new(stmt), |stmt| {
        stmt.borrow_mut().query(params_from_iter(params.iter()))
    })
    .map_err(|err| ErrorTranslator::execute(&err))?;
    let mut open = OpenCursor { rows, columns };
    let head = open.step(1, None)?;

    let executed = Executed {
        columns: open.columns.clone(),
        first: head.rows.into_iter().next(),
        cursor: None,
        rows_affected: None,
        autocommit: conn.is_autocommit(),
    };
    Ok((executed, (!head.done).then_some(open)))
}
