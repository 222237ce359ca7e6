use std::sync::Arc;

use super::metadata::{ColumnDescriptor, describe_columns};
use super::row::{FetchOptions, QueryOutput, ResultEnvelope, Row, Rows};
use crate::error::SqlBridgeError;
use crate::handles::HandleId;
use crate::native::{Execution, RowStream, clamp_values};
use crate::types::{FetchMode, Value};

/// Rows stepped per driver round trip while draining.
const DRAIN_BATCH: usize = 256;

/// Forward-only position over one execution's rows, stored in the connection's cursor arena.
///
/// Rows stay on the driver until fetched; only the first row is read at execute time.
#[derive(Debug)]
pub(crate) struct CursorState {
    /// Statement that produced this cursor.
    pub statement: HandleId,
    /// Set when the statement was created for this cursor alone and dies with it.
    pub owns_statement: bool,
    metadata: Arc<[ColumnDescriptor]>,
    names: Arc<[String]>,
    first: Option<Vec<Value>>,
    stream: Option<RowStream>,
    position: usize,
    rows_affected: Option<usize>,
}

impl CursorState {
    pub(crate) fn from_execution(statement: HandleId, owns_statement: bool, exec: Execution) -> Self {
        let metadata: Arc<[ColumnDescriptor]> =
            describe_columns(&exec.columns, exec.first.as_deref()).into();
        let names: Arc<[String]> = exec.columns.into_iter().map(|col| col.name).collect();
        Self {
            statement,
            owns_statement,
            metadata,
            names,
            first: exec.first,
            stream: exec.stream,
            position: 0,
            rows_affected: exec.rows_affected,
        }
    }

    pub(crate) fn metadata(&self) -> Arc<[ColumnDescriptor]> {
        Arc::clone(&self.metadata)
    }

    pub(crate) fn column_names(&self) -> Vec<String> {
        self.names.to_vec()
    }

    /// Rows touched by a row-count statement. Row-returning results report the rows fetched so
    /// far.
    pub(crate) fn row_count(&self) -> usize {
        self.rows_affected.unwrap_or(self.position)
    }

    /// Step up to `max_rows` rows. An empty batch means the end of the set.
    fn pull(
        &mut self,
        max_rows: usize,
        max_value_size: Option<usize>,
    ) -> Result<Vec<Vec<Value>>, SqlBridgeError> {
        let mut rows = Vec::new();
        if max_rows == 0 {
            return Ok(rows);
        }
        if let Some(first) = self.first.take() {
            rows.push(clamp_values(first, max_value_size));
        }
        if rows.len() < max_rows {
            if let Some(stream) = self.stream.as_mut() {
                let stepped = stream.fetch(max_rows - rows.len(), max_value_size);
                if stream.is_finished() {
                    self.stream = None;
                }
                rows.extend(stepped?);
            }
        }
        self.position += rows.len();
        Ok(rows)
    }

    /// Advance by one row. `None` is the end-of-set sentinel and repeats on every later call.
    pub(crate) fn next_row(
        &mut self,
        mode: FetchMode,
        max_value_size: Option<usize>,
    ) -> Result<Option<Row>, SqlBridgeError> {
        Ok(self
            .pull(1, max_value_size)?
            .pop()
            .map(|values| Row::shape(mode, &self.names, values)))
    }

    /// Take every remaining row.
    pub(crate) fn drain(&mut self, options: FetchOptions) -> Result<QueryOutput, SqlBridgeError> {
        let mut remaining: Vec<Vec<Value>> = Vec::new();
        loop {
            let batch = self.pull(DRAIN_BATCH, options.max_value_size)?;
            if batch.is_empty() {
                break;
            }
            remaining.extend(batch);
        }
        let rows = Rows::shape(options.fetch_mode, &self.names, remaining);
        Ok(if options.include_metadata {
            QueryOutput::WithMetadata(ResultEnvelope {
                metadata: self.metadata(),
                rows,
            })
        } else {
            QueryOutput::Rows(rows)
        })
    }
}
