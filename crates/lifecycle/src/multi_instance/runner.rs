//! Drives the iterations of a looped activity

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use super::{LoopCharacteristics, LoopMode, LoopState};
use crate::error::ActivityError;
use crate::execution::{Completion, ContextStatus, ExecutionContext, ExecutionOutcome};

/// Runs the activity body for one iteration
pub type IterationExecutor = Arc<dyn Fn(Arc<ExecutionContext>, Completion) + Send + Sync>;

/// Receives iteration notifications
pub type LoopEmitter = Arc<dyn Fn(LoopEvent) + Send + Sync>;

/// Iteration notifications raised by the runner
#[derive(Debug, Clone)]
pub enum LoopEvent {
    /// An iteration is about to execute
    IterationStart {
        /// Iteration context
        context: Arc<ExecutionContext>,
    },

    /// An iteration finished successfully
    IterationEnd {
        /// Iteration context
        context: Arc<ExecutionContext>,

        /// Loop progress including this iteration
        state: LoopState,
    },
}

#[derive(Default)]
struct LoopProgress {
    results: BTreeMap<usize, Value>,
    queue: VecDeque<usize>,
    in_flight: usize,
    driving: bool,
    settled: bool,
    on_done: Option<Completion>,
}

/// Executes 0..N iterations of an activity body
///
/// Each iteration gets its own context appended to the outer context. The
/// loop resolves `on_done` with one array holding every iteration's output
/// in index order, or with the first iteration error. A stopped outer
/// context halts the loop without resolving. An iteration stopped on its
/// own is skipped: it contributes no output and the loop moves on.
pub struct LoopRunner {
    characteristics: LoopCharacteristics,
    count: usize,
    outer: Arc<ExecutionContext>,
    execute: IterationExecutor,
    emit: LoopEmitter,
    progress: Mutex<LoopProgress>,
}

impl LoopRunner {
    /// Create a runner for the outer context
    pub fn new(
        characteristics: LoopCharacteristics,
        outer: Arc<ExecutionContext>,
        execute: IterationExecutor,
        emit: LoopEmitter,
    ) -> Arc<Self> {
        let count = characteristics.iteration_count().unwrap_or(0);
        Arc::new(Self {
            characteristics,
            count,
            outer,
            execute,
            emit,
            progress: Mutex::new(LoopProgress::default()),
        })
    }

    /// Number of iterations this loop runs in total
    pub fn iteration_count(&self) -> usize {
        self.count
    }

    /// Run every iteration from the start
    pub fn execute(self: &Arc<Self>, on_done: Completion) {
        self.start(LoopState::default(), on_done);
    }

    /// Run the iterations not recorded in `state`
    pub fn resume(self: &Arc<Self>, state: LoopState, on_done: Completion) {
        self.start(state, on_done);
    }

    fn start(self: &Arc<Self>, state: LoopState, on_done: Completion) {
        {
            let mut progress = self.progress.lock();
            progress.queue = (0..self.count)
                .filter(|index| !state.is_completed(*index))
                .collect();
            progress.results = state.completed;
            progress.on_done = Some(on_done);
        }

        debug!(
            activity_id = %self.outer.activity_id(),
            count = self.count,
            mode = ?self.characteristics.mode,
            "loop started"
        );

        match self.characteristics.mode {
            LoopMode::Sequential => self.pump(),
            LoopMode::Parallel => self.start_all(),
        }
    }

    /// Start queued iterations one at a time
    ///
    /// An iteration that completes synchronously re-enters here while the
    /// outer call is still driving; it just returns and the outer loop picks
    /// the next index, so the stack stays flat.
    fn pump(self: &Arc<Self>) {
        {
            let mut progress = self.progress.lock();
            if progress.driving {
                return;
            }
            progress.driving = true;
        }

        loop {
            let next = {
                let mut progress = self.progress.lock();
                if progress.settled || self.outer.is_stopped() || progress.in_flight > 0 {
                    progress.driving = false;
                    return;
                }
                match progress.queue.pop_front() {
                    Some(index) => {
                        progress.in_flight += 1;
                        index
                    }
                    None => {
                        progress.driving = false;
                        break;
                    }
                }
            };
            self.run_iteration(next);
        }

        self.finish();
    }

    fn start_all(self: &Arc<Self>) {
        let indices: Vec<usize> = {
            let mut progress = self.progress.lock();
            let indices: Vec<usize> = progress.queue.drain(..).collect();
            progress.in_flight += indices.len();
            indices
        };

        if indices.is_empty() {
            self.finish();
            return;
        }

        for index in indices {
            if self.outer.is_stopped() || self.progress.lock().settled {
                break;
            }
            self.run_iteration(index);
        }
    }

    fn run_iteration(self: &Arc<Self>, index: usize) {
        let message = self.characteristics.iteration_message(index);
        let context = self.outer.create_iteration(index, message);

        (self.emit)(LoopEvent::IterationStart {
            context: context.clone(),
        });
        if context.is_stopped() {
            debug!(activity_id = %self.outer.activity_id(), index, "iteration stopped before execute");
            self.skip(index);
            return;
        }

        let runner = self.clone();
        let settled_context = context.clone();
        let completion = Completion::new(move |outcome| {
            runner.on_iteration_settled(index, settled_context, outcome)
        });
        (self.execute)(context, completion);
    }

    fn on_iteration_settled(
        self: &Arc<Self>,
        index: usize,
        context: Arc<ExecutionContext>,
        outcome: ExecutionOutcome,
    ) {
        if self.outer.is_stopped() {
            debug!(activity_id = %self.outer.activity_id(), index, "ignoring completion, loop stopped");
            return;
        }
        if context.is_stopped() {
            debug!(activity_id = %self.outer.activity_id(), index, "ignoring completion of stopped iteration");
            self.skip(index);
            return;
        }

        match outcome {
            Ok(values) => {
                if !context.try_settle(ContextStatus::Completed) {
                    return;
                }
                context.set_result(values);
                let value = context.get_output().unwrap_or(Value::Null);

                let state = {
                    let mut progress = self.progress.lock();
                    progress.in_flight -= 1;
                    progress.results.insert(index, value);
                    LoopState {
                        completed: progress.results.clone(),
                    }
                };

                (self.emit)(LoopEvent::IterationEnd { context, state });

                match self.characteristics.mode {
                    LoopMode::Sequential => self.pump(),
                    LoopMode::Parallel => self.finish_if_idle(),
                }
            }
            Err(error) => {
                if !context.try_settle(ContextStatus::Failed) {
                    return;
                }
                context.discard_output();
                self.fail(index, error);
            }
        }
    }

    /// Release the slot of an iteration that will never report
    fn skip(self: &Arc<Self>, index: usize) {
        {
            let mut progress = self.progress.lock();
            if progress.settled {
                return;
            }
            progress.in_flight = progress.in_flight.saturating_sub(1);
        }

        debug!(activity_id = %self.outer.activity_id(), index, "iteration skipped");
        match self.characteristics.mode {
            LoopMode::Sequential => self.pump(),
            LoopMode::Parallel => self.finish_if_idle(),
        }
    }

    fn finish_if_idle(&self) {
        let idle = {
            let progress = self.progress.lock();
            progress.in_flight == 0 && progress.queue.is_empty()
        };
        if idle {
            self.finish();
        }
    }

    fn finish(&self) {
        let (on_done, results) = {
            let mut progress = self.progress.lock();
            if progress.settled {
                return;
            }
            progress.settled = true;
            let results: Vec<Value> = progress.results.values().cloned().collect();
            (progress.on_done.take(), results)
        };

        debug!(activity_id = %self.outer.activity_id(), iterations = results.len(), "loop completed");
        if let Some(on_done) = on_done {
            on_done.succeed_with(Value::Array(results));
        }
    }

    fn fail(&self, index: usize, error: ActivityError) {
        let on_done = {
            let mut progress = self.progress.lock();
            if progress.settled {
                return;
            }
            progress.settled = true;
            progress.in_flight = progress.in_flight.saturating_sub(1);
            progress.on_done.take()
        };

        debug!(activity_id = %self.outer.activity_id(), index, %error, "iteration failed");
        for iteration in self.outer.iterations() {
            iteration.stop();
        }
        if let Some(on_done) = on_done {
            on_done.fail(error);
        }
    }
}

impl std::fmt::Debug for LoopRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopRunner")
            .field("activity_id", &self.outer.activity_id())
            .field("count", &self.count)
            .field("mode", &self.characteristics.mode)
            .finish()
    }
}
