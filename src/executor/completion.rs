use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::SqlBridgeError;

type Callback<T> = Box<dyn FnOnce(Result<T, SqlBridgeError>) + Send + 'static>;

/// Where an asynchronous operation delivers its single result.
pub(crate) enum Reply<T> {
    Future(oneshot::Sender<Result<T, SqlBridgeError>>),
    Callback(Callback<T>),
}

impl<T: Send + 'static> Reply<T> {
    pub(crate) fn channel() -> (Self, Completion<T>) {
        let (tx, rx) = oneshot::channel();
        (Reply::Future(tx), Completion { rx })
    }

    pub(crate) fn callback<F>(callback: F) -> Self
    where
        F: FnOnce(Result<T, SqlBridgeError>) + Send + 'static,
    {
        Reply::Callback(Box::new(callback))
    }

    pub(crate) fn is_callback(&self) -> bool {
        matches!(self, Reply::Callback(_))
    }

    pub(crate) fn deliver(self, result: Result<T, SqlBridgeError>) {
        match self {
            // The receiver may have been dropped; the result has nowhere to go.
            Reply::Future(tx) => {
                let _ = tx.send(result);
            }
            Reply::Callback(callback) => callback(result),
        }
    }
}

/// Single-shot completion of an asynchronous operation.
///
/// Await it from async code, or call [`Completion::wait`] from a plain thread.
#[must_use = "completions do nothing unless awaited or waited on"]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T, SqlBridgeError>>,
}

impl<T: Send + 'static> Completion<T> {
    pub(crate) fn ready(value: T) -> Self {
        let (reply, completion) = Reply::channel();
        reply.deliver(Ok(value));
        completion
    }

    /// A completion that is already resolved with `err`.
    pub(crate) fn failed(err: SqlBridgeError) -> Self {
        let (reply, completion) = Reply::channel();
        reply.deliver(Err(err));
        completion
    }

    /// Block the current thread until the operation finishes.
    ///
    /// Must not be called from inside an async runtime; await the completion there instead.
    ///
    /// # Errors
    /// Returns the operation's error, or [`SqlBridgeError::ExecutorError`] if the operation was
    /// dropped without reporting.
    pub fn wait(self) -> Result<T, SqlBridgeError> {
        self.rx.blocking_recv().unwrap_or_else(|_| Err(dropped()))
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, SqlBridgeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(dropped())))
    }
}

fn dropped() -> SqlBridgeError {
    SqlBridgeError::ExecutorError("operation ended without delivering a result".into())
}
