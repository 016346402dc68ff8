//! Deferred task scheduling
//!
//! Everything in the lifecycle happens synchronously except the `leave`
//! notification that follows a completion. That one is handed to a
//! [`Scheduler`] and runs on a later turn.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::error::SchedulerError;

/// A unit of deferred work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks on a later scheduling turn, never inline
pub trait Scheduler: Send + Sync {
    /// Queue a task for the next turn
    fn schedule(&self, task: Task);
}

/// Scheduler backed by a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Create a scheduler that spawns onto the given runtime
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Create a scheduler for the runtime this is called from
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoRuntime`] outside a tokio runtime.
    pub fn try_current() -> Result<Self, SchedulerError> {
        Ok(Self::new(Handle::try_current()?))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        self.handle.spawn(async move { task() });
    }
}

/// Scheduler that holds tasks until explicitly drained
///
/// Useful when the caller owns the event loop, and for deterministic tests.
///
/// # Example
///
/// ```
/// use tokenflow_lifecycle::{ManualScheduler, Scheduler};
///
/// let scheduler = ManualScheduler::new();
/// scheduler.schedule(Box::new(|| println!("later")));
/// assert_eq!(scheduler.pending(), 1);
/// assert_eq!(scheduler.run_until_idle(), 1);
/// ```
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<Task>>,
}

impl ManualScheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run the tasks queued so far, in FIFO order
    ///
    /// Tasks queued while running are left for the next turn.
    pub fn run_pending(&self) -> usize {
        let batch: Vec<Task> = self.queue.lock().drain(..).collect();
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }

    /// Run turns until the queue stays empty
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_pending();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Task) {
        self.queue.lock().push_back(task);
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
