//! Per-attempt execution context

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::ActivitySignal;
use crate::activity::Form;
use crate::environment::Environment;
use crate::flow::SequenceFlow;
use crate::io::ActivityIo;

/// Where a context sits in a (possibly looped) run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ContextRole {
    /// The only context of a non-looped run
    Single,

    /// Outer context of a looped run; owns the iterations
    LoopParent,

    /// One iteration of a looped run
    LoopIteration {
        /// Zero-based iteration index
        index: usize,
    },
}

/// How a context was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    /// Still executing
    Pending,

    /// Completed, normally or through cancel
    Completed,

    /// Outbound flows were discarded
    Discarded,

    /// Execution failed
    Failed,
}

/// Serializable view of a context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextState {
    /// Execution attempt id
    pub execution_id: Uuid,

    /// Role in the run
    #[serde(flatten)]
    pub role: ContextRole,

    /// Settle status
    pub status: ContextStatus,

    /// Stop flag
    pub stopped: bool,

    /// Whether the context was rebuilt by `resume`
    pub resumed: bool,

    /// Number of iterations created so far
    pub iterations: usize,

    /// Accumulated output
    pub output: Option<Value>,
}

/// Construction parameters, filled in by the owning activity
pub(crate) struct ContextInit {
    pub activity_id: String,
    pub activity_type: String,
    pub environment: Arc<Environment>,
    pub message: Option<Value>,
    pub inbound_flow: Option<String>,
    pub discard_root: Option<String>,
    pub signal: Option<ActivitySignal>,
    pub role: ContextRole,
    pub form: Option<Form>,
    pub outbound: Vec<Arc<SequenceFlow>>,
    pub resumed: bool,
}

/// Transient state of one execution attempt
///
/// A context is created per `run`/`resume` and dropped once its completion
/// has propagated. The stop flag is consulted before every side effect;
/// once set it never clears.
pub struct ExecutionContext {
    execution_id: Uuid,
    activity_id: String,
    activity_type: String,
    environment: Arc<Environment>,
    message: Option<Value>,
    inbound_flow: Option<String>,
    discard_root: Option<String>,
    signal: Option<ActivitySignal>,
    role: ContextRole,
    form: Option<Form>,
    outbound: Vec<Arc<SequenceFlow>>,
    io: ActivityIo,
    resumed: bool,
    stopped: AtomicBool,
    status: Mutex<ContextStatus>,
    iterations: Mutex<Vec<Arc<ExecutionContext>>>,
    parent: Weak<ExecutionContext>,
}

impl ExecutionContext {
    pub(crate) fn new(init: ContextInit) -> Arc<Self> {
        Self::with_parent(init, Weak::new())
    }

    fn with_parent(init: ContextInit, parent: Weak<ExecutionContext>) -> Arc<Self> {
        let io = ActivityIo::new(
            init.activity_id.clone(),
            &init.activity_type,
            init.environment.clone(),
        );
        Arc::new(Self {
            execution_id: Uuid::now_v7(),
            activity_id: init.activity_id,
            activity_type: init.activity_type,
            environment: init.environment,
            message: init.message,
            inbound_flow: init.inbound_flow,
            discard_root: init.discard_root,
            signal: init.signal,
            role: init.role,
            form: init.form,
            outbound: init.outbound,
            io,
            resumed: init.resumed,
            stopped: AtomicBool::new(false),
            status: Mutex::new(ContextStatus::Pending),
            iterations: Mutex::new(Vec::new()),
            parent,
        })
    }

    /// Append a new iteration context
    ///
    /// Iterations own no outbound flows and keep their own output.
    pub(crate) fn create_iteration(self: &Arc<Self>, index: usize, message: Option<Value>) -> Arc<Self> {
        let init = ContextInit {
            activity_id: self.activity_id.clone(),
            activity_type: self.activity_type.clone(),
            environment: self.environment.clone(),
            message,
            inbound_flow: self.inbound_flow.clone(),
            discard_root: None,
            signal: self.signal.clone(),
            role: ContextRole::LoopIteration { index },
            form: self.form.clone(),
            outbound: Vec::new(),
            resumed: self.resumed,
        };
        let iteration = Self::with_parent(init, Arc::downgrade(self));
        self.iterations.lock().push(iteration.clone());
        iteration
    }

    /// Execution attempt id
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Owning activity id
    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    /// Owning activity type
    pub fn activity_type(&self) -> &str {
        &self.activity_type
    }

    /// Triggering message, if any
    pub fn message(&self) -> Option<&Value> {
        self.message.as_ref()
    }

    /// Inbound flow that delivered the token, if any
    pub fn inbound_flow(&self) -> Option<&str> {
        self.inbound_flow.as_deref()
    }

    /// Root flow of the discard that created this context, if any
    pub fn discard_root(&self) -> Option<&str> {
        self.discard_root.as_deref()
    }

    /// External signal attached to the run
    pub fn signal(&self) -> Option<&ActivitySignal> {
        self.signal.as_ref()
    }

    /// Role in the run
    pub fn role(&self) -> ContextRole {
        self.role
    }

    /// Whether this context is one loop iteration
    pub fn is_loop_context(&self) -> bool {
        matches!(self.role, ContextRole::LoopIteration { .. })
    }

    /// Whether this context was rebuilt by `resume`
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Input/output adapter
    pub fn io(&self) -> &ActivityIo {
        &self.io
    }

    /// Form metadata of the activity
    pub fn get_form(&self) -> Option<&Form> {
        self.form.as_ref()
    }

    /// Form key of the activity
    pub fn get_form_key(&self) -> Option<&str> {
        self.form.as_ref().and_then(|form| form.key.as_deref())
    }

    /// Logical input derived from the message
    pub fn get_input(&self) -> Option<Value> {
        self.io.get_input(self.message.as_ref())
    }

    /// Accumulated output
    pub fn get_output(&self) -> Option<Value> {
        self.io.get_output()
    }

    /// Store completion values as the result
    ///
    /// No values leaves the output untouched, one value becomes the
    /// result, several become an array.
    pub fn set_result(&self, mut values: Vec<Value>) {
        match values.len() {
            0 => {}
            1 => self.io.set_result(values.remove(0)),
            _ => self.io.set_result(Value::Array(values)),
        }
    }

    /// Drop partial output (after an execution error)
    pub fn discard_output(&self) {
        self.io.clear();
    }

    /// Whether the context was stopped
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop the context and all of its iterations
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        for iteration in self.iterations() {
            iteration.stop();
        }
    }

    /// Outbound flows this context will take or discard
    pub fn outbound(&self) -> &[Arc<SequenceFlow>] {
        &self.outbound
    }

    /// Take every outbound flow; returns whether there were any
    pub fn take_all_outbound(&self) -> bool {
        for flow in &self.outbound {
            flow.take();
        }
        !self.outbound.is_empty()
    }

    /// Iteration contexts, in creation order
    pub fn iterations(&self) -> Vec<Arc<ExecutionContext>> {
        self.iterations.lock().clone()
    }

    /// Owning loop context, for iterations
    pub fn parent(&self) -> Option<Arc<ExecutionContext>> {
        self.parent.upgrade()
    }

    /// Current settle status
    pub fn status(&self) -> ContextStatus {
        *self.status.lock()
    }

    /// Whether the context left `Pending`
    pub fn is_settled(&self) -> bool {
        self.status() != ContextStatus::Pending
    }

    /// Move from `Pending` to `status`; false if already settled
    pub(crate) fn try_settle(&self, status: ContextStatus) -> bool {
        let mut current = self.status.lock();
        if *current != ContextStatus::Pending {
            return false;
        }
        *current = status;
        true
    }

    /// Serializable view of the context
    pub fn get_state(&self) -> ContextState {
        ContextState {
            execution_id: self.execution_id,
            role: self.role,
            status: self.status(),
            stopped: self.is_stopped(),
            resumed: self.resumed,
            iterations: self.iterations.lock().len(),
            output: self.get_output(),
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("activity_id", &self.activity_id)
            .field("role", &self.role)
            .field("status", &self.status())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn context(outbound: Vec<Arc<SequenceFlow>>) -> Arc<ExecutionContext> {
        ExecutionContext::new(ContextInit {
            activity_id: "task".to_string(),
            activity_type: "task".to_string(),
            environment: Arc::new(Environment::new()),
            message: Some(json!({"order": 1})),
            inbound_flow: Some("f1".to_string()),
            discard_root: None,
            signal: None,
            role: ContextRole::Single,
            form: Some(Form::with_key("approve-form")),
            outbound,
            resumed: false,
        })
    }

    #[test]
    fn test_context_creation() {
        let ctx = context(vec![]);

        assert_eq!(ctx.activity_id(), "task");
        assert_eq!(ctx.inbound_flow(), Some("f1"));
        assert_eq!(ctx.get_input(), Some(json!({"order": 1})));
        assert_eq!(ctx.get_form_key(), Some("approve-form"));
        assert!(!ctx.is_stopped());
        assert!(!ctx.is_loop_context());
        assert_eq!(ctx.status(), ContextStatus::Pending);
    }

    #[test]
    fn test_set_result_shapes() {
        let ctx = context(vec![]);

        ctx.set_result(vec![]);
        assert_eq!(ctx.get_output(), None);

        ctx.set_result(vec![json!(1)]);
        assert_eq!(ctx.get_output(), Some(json!(1)));

        ctx.set_result(vec![json!(1), json!("two")]);
        assert_eq!(ctx.get_output(), Some(json!([1, "two"])));

        ctx.discard_output();
        assert_eq!(ctx.get_output(), None);
    }

    #[test]
    fn test_take_all_outbound() {
        assert!(!context(vec![]).take_all_outbound());

        let flow = SequenceFlow::new("f2", "task", "next");
        let ctx = context(vec![flow.clone()]);

        assert!(ctx.take_all_outbound());
        assert_eq!(flow.taken_count(), 1);
    }

    #[test]
    fn test_iterations_are_appended_and_stopped_with_parent() {
        let ctx = context(vec![SequenceFlow::new("f2", "task", "next")]);
        let first = ctx.create_iteration(0, Some(json!("a")));
        let second = ctx.create_iteration(1, Some(json!("b")));

        assert_eq!(ctx.iterations().len(), 2);
        assert!(first.is_loop_context());
        assert_eq!(second.role(), ContextRole::LoopIteration { index: 1 });
        assert_eq!(second.get_input(), Some(json!("b")));
        assert!(second.outbound().is_empty());
        assert_eq!(
            first.parent().map(|p| p.execution_id()),
            Some(ctx.execution_id())
        );

        ctx.stop();
        assert!(first.is_stopped());
        assert!(second.is_stopped());
    }

    #[test]
    fn test_settle_once() {
        let ctx = context(vec![]);

        assert!(ctx.try_settle(ContextStatus::Completed));
        assert!(!ctx.try_settle(ContextStatus::Discarded));
        assert_eq!(ctx.status(), ContextStatus::Completed);
        assert!(ctx.is_settled());
    }

    #[test]
    fn test_state_serialization() {
        let ctx = context(vec![]);
        ctx.io().set_output_value("a", json!(1));

        let state = ctx.get_state();
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["role"], "single");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["output"], json!({"a": 1}));
    }
}
