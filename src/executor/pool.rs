use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{trace, warn};

use crate::error::SqlBridgeError;

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// Upper bound for the default pool size.
pub const MAX_DEFAULT_WORKERS: usize = 16;

struct PoolInner {
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

/// Fixed-size worker pool that runs blocking operations off the caller's thread.
///
/// Cloning is cheap and shares the same workers.
#[derive(Clone)]
pub struct AsyncExecutor {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for AsyncExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncExecutor")
            .field("size", &self.inner.size)
            .finish_non_exhaustive()
    }
}

impl AsyncExecutor {
    /// Spawn `size` named worker threads.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ConfigError`] for a zero size and
    /// [`SqlBridgeError::ExecutorError`] if a thread cannot be spawned.
    pub fn new(size: usize) -> Result<Self, SqlBridgeError> {
        if size == 0 {
            return Err(SqlBridgeError::ConfigError(
                "worker pool size must be at least 1".into(),
            ));
        }
        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(size);
        for n in 0..size {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("sql-bridge-worker-{n}"))
                .spawn(move || run_worker(&receiver))
                .map_err(|err| {
                    SqlBridgeError::ExecutorError(format!("failed to spawn worker thread: {err}"))
                })?;
            workers.push(handle);
        }
        Ok(Self {
            inner: Arc::new(PoolInner {
                sender: Mutex::new(Some(sender)),
                workers: Mutex::new(workers),
                size,
            }),
        })
    }

    /// Pool sized to the host's parallelism, capped at [`MAX_DEFAULT_WORKERS`].
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ExecutorError`] if a thread cannot be spawned.
    pub fn with_default_size() -> Result<Self, SqlBridgeError> {
        Self::new(default_size())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Queue a task. A pool that has shut down hands the task back.
    pub(crate) fn spawn(&self, task: Task) -> Result<(), Task> {
        let guard = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender.send(task).map_err(|returned| returned.0),
            None => Err(task),
        }
    }

    /// Stop accepting work, let queued tasks finish, and join the workers.
    ///
    /// Later submissions run inline on the submitting thread.
    pub fn shutdown(&self) {
        drop(
            self.inner
                .sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let workers: Vec<JoinHandle<()>> = self
            .inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let current: ThreadId = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("worker thread exited with a panic");
            }
        }
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

pub(crate) fn default_size() -> usize {
    thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
        .min(MAX_DEFAULT_WORKERS)
}

fn run_worker(receiver: &Mutex<Receiver<Task>>) {
    loop {
        let task = {
            let guard = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            guard.recv()
        };
        let Ok(task) = task else {
            trace!("worker channel closed");
            break;
        };
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            warn!("task panicked on worker thread");
        }
    }
}
