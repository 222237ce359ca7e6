use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use tracing::{trace, warn};

use super::pool::{AsyncExecutor, Task};

thread_local! {
    // Address of the queue whose job is running on this thread, 0 when none.
    static DRAINING: Cell<usize> = const { Cell::new(0) };
    // Address of the queue whose follow-up is running on this thread, 0 when none.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// A queued job. What it returns runs once the job has given up its slot.
///
/// The follow-up must not block: it runs before the next job of the queue is scheduled.
pub(crate) type Job = Box<dyn FnOnce() -> Option<Task> + Send + 'static>;

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    scheduled: bool,
}

/// Single-slot FIFO in front of the pool: at most one job of a queue runs at a time.
pub(crate) struct SerialQueue {
    state: Mutex<QueueState>,
    idle: Condvar,
    // Held from slot release through the follow-up, so follow-ups run in job order.
    delivering: Mutex<()>,
    executor: AsyncExecutor,
}

impl SerialQueue {
    pub(crate) fn new(executor: AsyncExecutor) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            idle: Condvar::new(),
            delivering: Mutex::new(()),
            executor,
        })
    }

    pub(crate) fn executor(&self) -> &AsyncExecutor {
        &self.executor
    }

    pub(crate) fn enqueue(self: &Arc<Self>, job: Job) {
        let schedule = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.jobs.push_back(job);
            !std::mem::replace(&mut state.scheduled, true)
        };
        if schedule {
            Self::schedule(Arc::clone(self));
        }
    }

    fn schedule(queue: Arc<Self>) {
        let runner = Arc::clone(&queue);
        let task: Task = Box::new(move || Self::step(runner));
        if queue.executor.spawn(task).is_err() {
            warn!("executor unavailable; draining connection queue inline");
            while queue.run_one() {}
        }
    }

    fn step(queue: Arc<Self>) {
        if queue.run_one() {
            Self::schedule(queue);
        }
    }

    /// Run the next job, then its follow-up. Returns whether more jobs are waiting.
    fn run_one(&self) -> bool {
        let job = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match state.jobs.pop_front() {
                Some(job) => job,
                None => {
                    state.scheduled = false;
                    self.idle.notify_all();
                    return false;
                }
            }
        };

        let me = std::ptr::from_ref(self) as usize;
        let outer = DRAINING.with(|cell| cell.replace(me));
        trace!("running queued connection job");
        let follow_up = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
            warn!("queued connection job panicked");
            None
        });
        DRAINING.with(|cell| cell.set(outer));

        // An inline drain started from our own follow-up already holds the lock.
        let nested = DELIVERING.with(|cell| cell.get() == me);
        let _delivering = (!nested).then(|| {
            self.delivering
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
        });
        let more = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.jobs.is_empty() {
                state.scheduled = false;
                self.idle.notify_all();
                false
            } else {
                true
            }
        };

        if let Some(follow_up) = follow_up {
            let outer = DELIVERING.with(|cell| cell.replace(me));
            if catch_unwind(AssertUnwindSafe(follow_up)).is_err() {
                warn!("follow-up of a queued connection job panicked");
            }
            DELIVERING.with(|cell| cell.set(outer));
        }
        more
    }

    /// True while the current thread is running one of this queue's jobs.
    pub(crate) fn is_current(&self) -> bool {
        let me = std::ptr::from_ref(self) as usize;
        DRAINING.with(|cell| cell.get() == me)
    }

    /// True while jobs are queued or running.
    pub(crate) fn is_busy(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .scheduled
    }

    /// Block until every queued job has finished. Returns at once when called from one of this
    /// queue's own jobs, since later jobs cannot start before it returns.
    pub(crate) fn wait_idle(&self) {
        if self.is_current() {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.scheduled {
            state = self
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .jobs
            .len()
    }
}
