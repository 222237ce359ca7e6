//! The process-wide environment every connection is allocated from.

use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::connection::core::ConnectionShared;
use crate::error::SqlBridgeError;
use crate::executor::{AsyncExecutor, default_size};
use crate::handles::HandleArena;

/// Call-level API version the environment declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OdbcVersion {
    V2,
    #[default]
    V3,
    V3_80,
}

struct EnvironmentInner {
    odbc_version: OdbcVersion,
    worker_threads: Option<usize>,
    executor: Mutex<Option<AsyncExecutor>>,
    registry: Mutex<HandleArena<Weak<ConnectionShared>>>,
    open_connections: Arc<AtomicUsize>,
}

/// Owner of every connection and of the default worker pool.
///
/// [`Environment::global`] is shared by the whole process; [`Environment::builder`] creates
/// isolated environments, mostly useful in tests that count handles.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvironmentInner>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("odbc_version", &self.inner.odbc_version)
            .field("allocated", &self.allocated_connections())
            .field("open", &self.open_connections())
            .finish_non_exhaustive()
    }
}

static GLOBAL: OnceLock<Environment> = OnceLock::new();

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// The process-wide environment, created on first use.
    #[must_use]
    pub fn global() -> Environment {
        GLOBAL.get_or_init(Environment::new).clone()
    }

    /// An isolated environment with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(OdbcVersion::default(), None)
    }

    #[must_use]
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    fn from_parts(odbc_version: OdbcVersion, worker_threads: Option<usize>) -> Self {
        Self {
            inner: Arc::new(EnvironmentInner {
                odbc_version,
                worker_threads,
                executor: Mutex::new(None),
                registry: Mutex::new(HandleArena::new()),
                open_connections: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    #[must_use]
    pub fn odbc_version(&self) -> OdbcVersion {
        self.inner.odbc_version
    }

    /// The environment's worker pool, started on first use.
    ///
    /// # Errors
    /// [`SqlBridgeError::ExecutorError`] if the worker threads cannot be spawned.
    pub fn executor(&self) -> Result<AsyncExecutor, SqlBridgeError> {
        let mut slot = self
            .inner
            .executor
            .lock()
            .map_err(|_| SqlBridgeError::poisoned("environment executor"))?;
        if let Some(executor) = slot.as_ref() {
            return Ok(executor.clone());
        }
        let size = self.inner.worker_threads.unwrap_or_else(default_size);
        let executor = AsyncExecutor::new(size)?;
        debug!(size, "started environment worker pool");
        *slot = Some(executor.clone());
        Ok(executor)
    }

    /// Allocate a closed connection that runs asynchronous work on the environment's pool.
    ///
    /// # Errors
    /// [`SqlBridgeError::ExecutorError`] if the pool cannot be started.
    pub fn allocate(&self) -> Result<Connection, SqlBridgeError> {
        let executor = self.executor()?;
        self.allocate_with_executor(executor)
    }

    /// Allocate a closed connection that runs asynchronous work on `executor`.
    ///
    /// # Errors
    /// [`SqlBridgeError::StateError`] if the registry lock is poisoned.
    pub fn allocate_with_executor(
        &self,
        executor: AsyncExecutor,
    ) -> Result<Connection, SqlBridgeError> {
        let shared = ConnectionShared::new(self.clone(), executor);
        let id = self
            .inner
            .registry
            .lock()
            .map_err(|_| SqlBridgeError::poisoned("environment registry"))?
            .insert(Arc::downgrade(&shared));
        *shared
            .registry_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(id);
        debug!(connection = %id, "allocated connection");
        Ok(Connection::from_shared(shared))
    }

    pub(crate) fn deregister(&self, shared: &ConnectionShared) {
        let id = shared
            .registry_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = id {
            self.inner
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(id);
        }
    }

    pub(crate) fn open_counter(&self) -> &Arc<AtomicUsize> {
        &self.inner.open_connections
    }

    /// Connections allocated and not yet dropped.
    #[must_use]
    pub fn allocated_connections(&self) -> usize {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Connections holding a live native handle.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.inner
            .open_connections
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Force-close every live connection, children first.
    pub fn shutdown(&self) {
        let live: Vec<Arc<ConnectionShared>> = {
            let registry = self
                .inner
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            registry
                .ids()
                .into_iter()
                .filter_map(|id| registry.get(id).and_then(Weak::upgrade))
                .collect()
        };
        if !live.is_empty() {
            warn!(connections = live.len(), "environment shutdown closing live connections");
        }
        for shared in live {
            shared.force_close();
        }
    }
}

/// Settings for an isolated [`Environment`].
#[derive(Debug, Clone, Default)]
pub struct EnvironmentBuilder {
    odbc_version: OdbcVersion,
    worker_threads: Option<usize>,
}

impl EnvironmentBuilder {
    #[must_use]
    pub fn odbc_version(mut self, version: OdbcVersion) -> Self {
        self.odbc_version = version;
        self
    }

    /// Size of the environment's worker pool. Defaults to the host's parallelism, capped at 16.
    #[must_use]
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// # Errors
    /// [`SqlBridgeError::ConfigError`] for a zero-sized pool.
    pub fn build(self) -> Result<Environment, SqlBridgeError> {
        if self.worker_threads == Some(0) {
            return Err(SqlBridgeError::ConfigError(
                "worker_threads must be at least 1".into(),
            ));
        }
        Ok(Environment::from_parts(self.odbc_version, self.worker_threads))
    }
}
