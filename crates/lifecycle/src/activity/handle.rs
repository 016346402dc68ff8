//! Control surface of one execution

use std::sync::Arc;

use serde_json::Value;

use super::definition::Form;
use super::lifecycle::Activity;
use super::state::ExecutingState;
use crate::execution::{ActivitySignal, ContextRole, ExecutionContext};

/// Shape of the execution behind a handle
#[derive(Debug, Clone)]
pub enum ControlKind {
    /// Non-looped run
    Single {
        /// Attached external signal
        signal: Option<ActivitySignal>,
    },

    /// Outer run of a looped activity
    LoopParent {
        /// One handle per iteration created so far
        iterations: Vec<ControlHandle>,
    },

    /// One iteration of a looped run
    LoopIteration {
        /// Zero-based iteration index
        index: usize,

        /// Attached external signal
        signal: Option<ActivitySignal>,
    },
}

/// Handle given to supervising code for one execution
///
/// Cloning is cheap. `cancel`, `discard` and `stop` on an iteration handle
/// act on the whole looped run.
#[derive(Clone)]
pub struct ControlHandle {
    activity: Arc<Activity>,
    context: Arc<ExecutionContext>,
}

impl ControlHandle {
    pub(crate) fn new(activity: Arc<Activity>, context: Arc<ExecutionContext>) -> Self {
        Self { activity, context }
    }

    pub fn id(&self) -> &str {
        self.activity.id()
    }

    pub fn activity_type(&self) -> &str {
        self.activity.activity_type()
    }

    pub fn activity(&self) -> &Arc<Activity> {
        &self.activity
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    pub fn form(&self) -> Option<&Form> {
        self.context.get_form()
    }

    pub fn form_key(&self) -> Option<&str> {
        self.context.get_form_key()
    }

    pub fn kind(&self) -> ControlKind {
        match self.context.role() {
            ContextRole::Single => ControlKind::Single {
                signal: self.context.signal().cloned(),
            },
            ContextRole::LoopParent => ControlKind::LoopParent {
                iterations: self.iterations(),
            },
            ContextRole::LoopIteration { index } => ControlKind::LoopIteration {
                index,
                signal: self.context.signal().cloned(),
            },
        }
    }

    pub fn is_loop_context(&self) -> bool {
        self.context.is_loop_context()
    }

    pub fn signal(&self) -> Option<&ActivitySignal> {
        self.context.signal()
    }

    /// Handles of the iterations created so far
    pub fn iterations(&self) -> Vec<ControlHandle> {
        self.context
            .iterations()
            .into_iter()
            .map(|iteration| ControlHandle::new(self.activity.clone(), iteration))
            .collect()
    }

    pub fn get_input(&self) -> Option<Value> {
        self.context.get_input()
    }

    pub fn get_output(&self) -> Option<Value> {
        self.context.get_output()
    }

    /// Persisted state merged with this execution's state
    pub fn get_state(&self) -> ExecutingState {
        ExecutingState {
            persisted: self.activity.get_state(),
            execution: self.context.get_state(),
        }
    }

    /// Cancel the run: notifies `cancel`, completes (outbound flows are still
    /// taken) and stops pending work. No-op once the run has settled.
    pub fn cancel(&self) {
        self.activity.cancel_context(&self.run_context());
    }

    /// Discard the run: stops it and discards every outbound flow without
    /// notifying `end`. No-op once the run has settled.
    pub fn discard(&self) {
        self.activity.discard_context(&self.run_context());
    }

    /// Stop the run and deactivate the activity
    ///
    /// The run stays entered, so a later `resume` picks it up again.
    pub fn stop(&self) {
        self.activity.stop_context(&self.run_context());
    }

    fn run_context(&self) -> Arc<ExecutionContext> {
        if self.context.is_loop_context() {
            if let Some(parent) = self.context.parent() {
                return parent;
            }
        }
        self.context.clone()
    }
}

impl std::fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandle")
            .field("activity_id", &self.activity.id())
            .field("execution_id", &self.context.execution_id())
            .field("role", &self.context.role())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityDefinition, ActivityEvent};
    use crate::execution::{Completion, ContextStatus};
    use crate::flow::SequenceFlow;
    use crate::multi_instance::LoopCharacteristics;
    use crate::scheduler::ManualScheduler;
    use parking_lot::Mutex;
    use serde_json::json;

    type Parked = Arc<Mutex<Vec<Completion>>>;

    fn parking_activity(definition: ActivityDefinition) -> (Arc<Activity>, Parked, Arc<SequenceFlow>) {
        let parked: Parked = Arc::new(Mutex::new(Vec::new()));
        let slot = parked.clone();
        let outbound = SequenceFlow::new("out", definition.id.as_str(), "next");
        let activity = Activity::builder(definition)
            .with_outbound(outbound.clone())
            .with_scheduler(Arc::new(ManualScheduler::new()))
            .with_execute(move |_activity, _ctx, done| slot.lock().push(done))
            .build()
            .expect("should build");
        (activity, parked, outbound)
    }

    #[test]
    fn test_handle_exposes_execution() {
        let definition = ActivityDefinition::new("review", "userTask")
            .with_form(crate::activity::Form::with_key("review-form"));
        let (activity, _parked, _) = parking_activity(definition);

        let handle = activity
            .run(Some(json!({"doc": 7})), Some("f1"))
            .expect("should return handle");

        assert_eq!(handle.id(), "review");
        assert_eq!(handle.activity_type(), "userTask");
        assert_eq!(handle.form_key(), Some("review-form"));
        assert_eq!(handle.get_input(), Some(json!({"doc": 7})));
        assert!(!handle.is_loop_context());
        assert!(matches!(handle.kind(), ControlKind::Single { signal: None }));

        handle.context().io().set_output_value("approved", json!(true));
        let state = serde_json::to_value(handle.get_state()).unwrap();
        assert_eq!(state["entered"], true);
        assert_eq!(state["role"], "single");
        assert_eq!(state["output"], json!({"approved": true}));
    }

    #[test]
    fn test_signal_is_exposed() {
        let (activity, _parked, _) = parking_activity(ActivityDefinition::new("wait", "receiveTask"));

        let handle = activity
            .signal(ActivitySignal::custom("approved", json!({"by": "ops"})), None)
            .expect("should return handle");

        assert_eq!(handle.signal().map(|s| s.signal_type.as_str()), Some("approved"));
        match handle.kind() {
            ControlKind::Single { signal } => assert!(signal.is_some()),
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_cancel_twice_completes_once() {
        let (activity, parked, outbound) = parking_activity(ActivityDefinition::new("task", "task"));
        let ends = Arc::new(Mutex::new(0));
        let counter = ends.clone();
        activity.on(crate::activity::ActivityEventKind::End, move |_: &ActivityEvent| {
            *counter.lock() += 1
        });

        let handle = activity.run(None, None).expect("should return handle");
        handle.cancel();
        handle.cancel();
        parked.lock().pop().expect("should park").succeed(vec![]);

        assert_eq!(*ends.lock(), 1);
        assert_eq!(outbound.taken_count(), 1);
        let state = activity.get_state();
        assert!(state.canceled);
        assert!(!state.taken);
        assert!(!state.entered);
    }

    #[test]
    fn test_discard_after_complete_is_noop() {
        let (activity, parked, outbound) = parking_activity(ActivityDefinition::new("task", "task"));

        let handle = activity.run(None, None).expect("should return handle");
        parked.lock().pop().expect("should park").succeed(vec![]);
        handle.discard();

        assert_eq!(outbound.taken_count(), 1);
        assert_eq!(outbound.discarded_count(), 0);
        assert_eq!(handle.context().status(), ContextStatus::Completed);
    }

    #[test]
    fn test_stop_keeps_entered_and_deactivates() {
        let inbound = SequenceFlow::new("in", "start", "task");
        let parked: Parked = Arc::new(Mutex::new(Vec::new()));
        let slot = parked.clone();
        let activity = Activity::builder(ActivityDefinition::new("task", "task"))
            .with_inbound(inbound.clone())
            .with_scheduler(Arc::new(ManualScheduler::new()))
            .with_execute(move |_activity, _ctx, done| slot.lock().push(done))
            .build()
            .expect("should build");

        let handle = activity.run(None, None).expect("should return handle");
        handle.stop();
        handle.stop();

        assert!(handle.context().is_stopped());
        assert!(activity.get_state().entered);
        assert!(!activity.is_active());
        assert_eq!(inbound.subscriber_count(), 0);

        // late completion is ignored
        parked.lock().pop().expect("should park").succeed(vec![json!(1)]);
        assert!(activity.get_state().entered);
        assert_eq!(handle.get_output(), None);
    }

    #[test]
    fn test_loop_handles() {
        let definition = ActivityDefinition::new("task", "task")
            .with_loop(LoopCharacteristics::parallel(2));
        let (activity, parked, outbound) = parking_activity(definition);

        let handle = activity.run(None, None).expect("should return handle");
        let iterations = match handle.kind() {
            ControlKind::LoopParent { iterations } => iterations,
            other => panic!("unexpected kind: {:?}", other),
        };
        assert_eq!(iterations.len(), 2);
        assert!(iterations[1].is_loop_context());
        assert!(matches!(
            iterations[1].kind(),
            ControlKind::LoopIteration { index: 1, signal: None }
        ));

        // cancel through an iteration acts on the whole run
        iterations[0].cancel();
        assert_eq!(handle.context().status(), ContextStatus::Completed);
        assert!(iterations[1].context().is_stopped());
        assert_eq!(outbound.taken_count(), 1);

        let pending: Vec<Completion> = parked.lock().drain(..).collect();
        for done in pending {
            done.succeed(vec![]);
        }
        assert_eq!(outbound.taken_count(), 1);
    }

    #[test]
    fn test_iteration_stop_stops_whole_run() {
        let definition = ActivityDefinition::new("task", "task")
            .with_loop(LoopCharacteristics::parallel(2));
        let (activity, _parked, _) = parking_activity(definition);

        let handle = activity.run(None, None).expect("should return handle");
        handle.iterations()[1].stop();

        assert!(handle.context().is_stopped());
        assert!(handle.iterations().iter().all(|h| h.context().is_stopped()));
        assert!(!activity.is_active());
        assert!(activity.get_state().entered);
    }
}
