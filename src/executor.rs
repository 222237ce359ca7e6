//! Worker pool and per-connection serialization for asynchronous entry points.
//!
//! Every asynchronous operation is the blocking operation submitted to a connection's
//! [`queue::SerialQueue`]; the queue hands one job at a time to the shared
//! [`AsyncExecutor`], and the result travels back through a [`Completion`] or a callback.

mod completion;
mod pool;
pub(crate) mod queue;

pub use completion::Completion;
pub(crate) use completion::Reply;
pub use pool::{AsyncExecutor, MAX_DEFAULT_WORKERS};
pub(crate) use pool::{Task, default_size};
