use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError, Weak};

use tracing::{debug, warn};

use crate::environment::Environment;
use crate::error::SqlBridgeError;
use crate::executor::queue::{Job, SerialQueue};
use crate::executor::{AsyncExecutor, Completion, Reply, Task};
use crate::handles::{HandleArena, HandleId};
use crate::native::NativeConnection;
use crate::results::cursor::CursorState;
use crate::statement::StatementState;

pub(crate) const DEFAULT_LOGIN_TIMEOUT: u32 = 5;
pub(crate) const DEFAULT_STATEMENT_CACHE: usize = 16;

/// Everything guarded by a connection's exclusivity token.
#[derive(Debug, Default)]
pub(crate) struct ConnectionState {
    pub native: Option<NativeConnection>,
    pub connection_string: Option<String>,
    pub in_transaction: bool,
    pub statements: HandleArena<StatementState>,
    pub cursors: HandleArena<CursorState>,
}

impl ConnectionState {
    pub(crate) fn native(&self) -> Result<&NativeConnection, SqlBridgeError> {
        self.native
            .as_ref()
            .ok_or_else(|| SqlBridgeError::state("connection is not open"))
    }

    /// Free a cursor. A cursor that owns its statement takes the statement with it.
    pub(crate) fn release_cursor(&mut self, id: HandleId) {
        let Some(cursor) = self.cursors.remove(id) else {
            return;
        };
        if cursor.owns_statement {
            self.statements.remove(cursor.statement);
        } else if let Some(stmt) = self.statements.get_mut(cursor.statement) {
            if stmt.cursor == Some(id) {
                stmt.cursor = None;
            }
        }
    }

    /// Free a statement together with its open cursor.
    pub(crate) fn release_statement(&mut self, id: HandleId) {
        if let Some(stmt) = self.statements.remove(id) {
            if let Some(cursor) = stmt.cursor {
                self.cursors.remove(cursor);
            }
        }
    }

    /// Leave transactional mode after a failed or forced boundary, trusting the driver's view.
    pub(crate) fn resync_transaction(&mut self) {
        if let Some(native) = &self.native {
            self.in_transaction = !native.is_autocommit();
        }
    }
}

/// Child handles dropped while the connection was busy.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Released {
    Statement(HandleId),
    Cursor(HandleId),
}

/// State shared between a connection and its statements, results and queued jobs.
pub(crate) struct ConnectionShared {
    pub(crate) registry_id: Mutex<Option<HandleId>>,
    pub(crate) env: Environment,
    queue: Arc<SerialQueue>,
    callbacks: Arc<SerialQueue>,
    state: Mutex<ConnectionState>,
    released: Mutex<Vec<Released>>,
    login_timeout: AtomicU32,
    statement_cache: AtomicUsize,
    connected: AtomicBool,
    auto_commit: AtomicBool,
}

impl ConnectionShared {
    pub(crate) fn new(env: Environment, executor: AsyncExecutor) -> Arc<Self> {
        Arc::new(Self {
            registry_id: Mutex::new(None),
            env,
            queue: SerialQueue::new(executor.clone()),
            callbacks: SerialQueue::new(executor),
            state: Mutex::new(ConnectionState::default()),
            released: Mutex::new(Vec::new()),
            login_timeout: AtomicU32::new(DEFAULT_LOGIN_TIMEOUT),
            statement_cache: AtomicUsize::new(DEFAULT_STATEMENT_CACHE),
            connected: AtomicBool::new(false),
            auto_commit: AtomicBool::new(true),
        })
    }

    pub(crate) fn login_timeout(&self) -> u32 {
        self.login_timeout.load(Ordering::SeqCst)
    }

    pub(crate) fn set_login_timeout(&self, seconds: u32) {
        self.login_timeout.store(seconds, Ordering::SeqCst);
    }

    pub(crate) fn statement_cache(&self) -> usize {
        self.statement_cache.load(Ordering::SeqCst)
    }

    pub(crate) fn set_statement_cache(&self, capacity: usize) {
        self.statement_cache.store(capacity, Ordering::SeqCst);
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn auto_commit(&self) -> bool {
        self.auto_commit.load(Ordering::SeqCst)
    }

    pub(crate) fn executor(&self) -> &AsyncExecutor {
        self.queue.executor()
    }

    pub(crate) fn pending_jobs(&self) -> usize {
        self.queue.pending()
    }

    fn finish(&self, state: &mut ConnectionState) {
        self.reclaim(state);
        self.connected.store(state.native.is_some(), Ordering::SeqCst);
        self.auto_commit.store(!state.in_transaction, Ordering::SeqCst);
    }

    fn reclaim(&self, state: &mut ConnectionState) {
        let released: Vec<Released> = std::mem::take(
            &mut *self.released.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in released {
            match handle {
                Released::Statement(id) => state.release_statement(id),
                Released::Cursor(id) => state.release_cursor(id),
            }
        }
    }

    /// Record a child handle dropped without an explicit close and free it now if the token is
    /// free.
    pub(crate) fn release(&self, handle: Released) {
        self.released
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        match self.state.try_lock() {
            Ok(mut state) => self.finish(&mut state),
            Err(TryLockError::Poisoned(poisoned)) => self.finish(&mut poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                debug!(?handle, "connection busy; release deferred");
            }
        }
    }

    /// Run `op` on the calling thread, failing fast when another operation holds the token or
    /// queued work is still waiting for it.
    pub(crate) fn run_sync<T>(
        &self,
        op: impl FnOnce(&mut ConnectionState) -> Result<T, SqlBridgeError>,
    ) -> Result<T, SqlBridgeError> {
        if !self.queue.is_current() && self.queue.is_busy() {
            return Err(busy());
        }
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::WouldBlock) => return Err(busy()),
            Err(TryLockError::Poisoned(_)) => return Err(SqlBridgeError::poisoned("connection")),
        };
        self.reclaim(&mut state);
        let result = op(&mut state);
        self.finish(&mut state);
        result
    }

    /// Run `op` once the token is free. Used by queued jobs and by close.
    pub(crate) fn run_blocking<T>(
        &self,
        op: impl FnOnce(&mut ConnectionState) -> Result<T, SqlBridgeError>,
    ) -> Result<T, SqlBridgeError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SqlBridgeError::poisoned("connection"))?;
        self.reclaim(&mut state);
        let result = op(&mut state);
        self.finish(&mut state);
        result
    }

    /// Queue `op` behind every earlier job of this connection.
    ///
    /// The reply is delivered once the job has left the queue. Futures resolve right away;
    /// callbacks run one at a time in submission order on a queue of their own, so a callback
    /// may use its connection, and even wait on it, without holding up later jobs.
    pub(crate) fn submit<T, F>(self: &Arc<Self>, reply: Reply<T>, op: F)
    where
        T: Send + 'static,
        F: FnOnce(&Arc<ConnectionShared>, &mut ConnectionState) -> Result<T, SqlBridgeError>
            + Send
            + 'static,
    {
        let shared = Arc::clone(self);
        self.queue.enqueue(Box::new(move || {
            // Caught inside the token so a panicking operation does not poison it.
            let result = shared.run_blocking(|state| {
                catch_unwind(AssertUnwindSafe(|| op(&shared, state))).unwrap_or_else(|_| {
                    Err(SqlBridgeError::ExecutorError(
                        "operation panicked on a worker thread".into(),
                    ))
                })
            });
            Some(shared.delivery(reply, result))
        }));
    }

    fn delivery<T: Send + 'static>(
        &self,
        reply: Reply<T>,
        result: Result<T, SqlBridgeError>,
    ) -> Task {
        if !reply.is_callback() {
            return Box::new(move || reply.deliver(result));
        }
        let callbacks = Arc::clone(&self.callbacks);
        Box::new(move || {
            let job: Job = Box::new(move || -> Option<Task> {
                reply.deliver(result);
                None
            });
            callbacks.enqueue(job);
        })
    }

    pub(crate) fn submit_future<T, F>(self: &Arc<Self>, op: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(&Arc<ConnectionShared>, &mut ConnectionState) -> Result<T, SqlBridgeError>
            + Send
            + 'static,
    {
        let (reply, completion) = Reply::channel();
        self.submit(reply, op);
        completion
    }

    /// Wait for queued work, then take the token.
    pub(crate) fn run_after_queue<T>(
        &self,
        op: impl FnOnce(&mut ConnectionState) -> Result<T, SqlBridgeError>,
    ) -> Result<T, SqlBridgeError> {
        self.queue.wait_idle();
        self.run_blocking(op)
    }

    /// Close every child handle and the native connection, whatever state they are in.
    pub(crate) fn force_close(&self) {
        self.queue.wait_idle();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.reclaim(&mut state);
        let statements = state.statements.len();
        state.cursors.drain();
        state.statements.drain();
        if statements > 0 {
            debug!(statements, "closing connection with open statements");
        }
        disconnect(&mut state);
        self.finish(&mut state);
    }
}

fn busy() -> SqlBridgeError {
    SqlBridgeError::state("connection is busy with another operation")
}

/// Roll back an open transaction and release the native handle. No-op when already closed.
pub(crate) fn disconnect(state: &mut ConnectionState) {
    let Some(native) = state.native.take() else {
        return;
    };
    if state.in_transaction {
        warn!("closing connection with an open transaction; rolling back");
        if let Err(err) = native.execute_batch("ROLLBACK") {
            warn!(error = %err, "rollback during close failed");
        }
        state.in_transaction = false;
    }
    if let Err(err) = native.disconnect() {
        warn!(error = %err, "native disconnect reported an error");
    }
    state.connection_string = None;
}

/// Upgrade a child's back-reference, failing with a state error once the connection is gone.
pub(crate) fn upgrade(shared: &Weak<ConnectionShared>) -> Result<Arc<ConnectionShared>, SqlBridgeError> {
    shared
        .upgrade()
        .ok_or_else(|| SqlBridgeError::state("connection has been dropped"))
}
