use tracing::debug;

use super::core::ConnectionState;
use super::Connection;
use crate::error::SqlBridgeError;
use crate::executor::Completion;

pub(crate) fn begin(state: &mut ConnectionState) -> Result<(), SqlBridgeError> {
    let native = state.native()?;
    if state.in_transaction {
        return Err(SqlBridgeError::state("a transaction is already open"));
    }
    native.execute_batch("BEGIN")?;
    state.in_transaction = true;
    debug!("transaction started");
    Ok(())
}

pub(crate) fn commit(state: &mut ConnectionState) -> Result<(), SqlBridgeError> {
    finish(state, "COMMIT")
}

pub(crate) fn rollback(state: &mut ConnectionState) -> Result<(), SqlBridgeError> {
    finish(state, "ROLLBACK")
}

fn finish(state: &mut ConnectionState, boundary: &'static str) -> Result<(), SqlBridgeError> {
    let native = state.native()?;
    if !state.in_transaction {
        return Err(SqlBridgeError::state("no transaction is open"));
    }
    let result = native.execute_batch(boundary);
    // A failed COMMIT may or may not have ended the transaction; the driver knows.
    state.resync_transaction();
    if result.is_ok() {
        debug!(boundary, "transaction finished");
    }
    result
}

impl Connection {
    /// Open a transaction, turning auto-commit off.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] if a transaction is already open or the connection is
    /// closed or busy.
    pub fn begin_transaction(&self) -> Result<(), SqlBridgeError> {
        self.shared.run_sync(begin)
    }

    pub fn begin_transaction_async(&self) -> Completion<()> {
        self.shared.submit_future(|_, state| begin(state))
    }

    /// Commit the open transaction and return to auto-commit.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] if no transaction is open.
    pub fn commit_transaction(&self) -> Result<(), SqlBridgeError> {
        self.shared.run_sync(commit)
    }

    pub fn commit_transaction_async(&self) -> Completion<()> {
        self.shared.submit_future(|_, state| commit(state))
    }

    /// Roll back the open transaction and return to auto-commit.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] if no transaction is open.
    pub fn rollback_transaction(&self) -> Result<(), SqlBridgeError> {
        self.shared.run_sync(rollback)
    }

    pub fn rollback_transaction_async(&self) -> Completion<()> {
        self.shared.submit_future(|_, state| rollback(state))
    }
}
