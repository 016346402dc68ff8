//! The activity state machine
//!
//! An [`Activity`] reacts to tokens on its inbound flows, runs its execute
//! behavior (directly or through a [`LoopRunner`]) and propagates tokens on
//! its outbound flows:
//!
//! ```text
//! Idle -> Entered -> Completed | Canceled | Discarded -> Idle (after leave)
//! ```
//!
//! Notifications are delivered synchronously, except the `leave` that follows
//! a completion, which goes through the activity's [`Scheduler`].

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, instrument, warn, Span};

use super::definition::{ActivityDefinition, Form, LifecycleConfig};
use super::events::{
    ActivityEvent, ActivityEventKind, ActivityListener, KindListener, Listeners, Transition,
};
use super::handle::ControlHandle;
use super::state::PersistedState;
use crate::environment::Environment;
use crate::error::{ActivityError, BuildError};
use crate::execution::{
    ActivitySignal, Completion, ContextInit, ContextRole, ContextStatus, ExecutionContext,
    ExecutionOutcome,
};
use crate::flow::{FlowEvent, SequenceFlow, SubscriptionId};
use crate::multi_instance::{
    IterationExecutor, LoopCharacteristics, LoopEmitter, LoopEvent, LoopRunner, LoopState,
};
use crate::scheduler::{Scheduler, TokioScheduler};

// ============================================================================
// ExecuteBehavior
// ============================================================================

/// The work an activity performs
///
/// Called once per run (once per iteration for looped activities). The
/// behavior resolves `done` whenever it likes, from any thread; resolving
/// after the run was canceled, discarded or stopped has no effect.
pub trait ExecuteBehavior: Send + Sync {
    fn execute(&self, activity: &Arc<Activity>, context: Arc<ExecutionContext>, done: Completion);
}

impl<F> ExecuteBehavior for F
where
    F: Fn(&Arc<Activity>, Arc<ExecutionContext>, Completion) + Send + Sync,
{
    fn execute(&self, activity: &Arc<Activity>, context: Arc<ExecutionContext>, done: Completion) {
        self(activity, context, done)
    }
}

// ============================================================================
// Activity
// ============================================================================

/// One flow node of a process instance
///
/// Built with [`Activity::builder`]. The persisted state has a single
/// mutator, this activity; overlapping top-level runs of the same instance
/// are not supported (use a loop instead).
pub struct Activity {
    id: String,
    activity_type: String,
    environment: Arc<Environment>,
    inbound: Vec<Arc<SequenceFlow>>,
    outbound: Vec<Arc<SequenceFlow>>,
    loop_characteristics: Option<LoopCharacteristics>,
    form: Option<Form>,
    behavior: Arc<dyn ExecuteBehavior>,
    listeners: Listeners,
    scheduler: Arc<dyn Scheduler>,
    config: LifecycleConfig,
    span: Option<Span>,
    state: Mutex<PersistedState>,
    subscriptions: Mutex<Option<Vec<(Arc<SequenceFlow>, SubscriptionId)>>>,
}

impl Activity {
    /// Start building an activity from its definition
    pub fn builder(definition: ActivityDefinition) -> ActivityBuilder {
        ActivityBuilder::new(definition)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn activity_type(&self) -> &str {
        &self.activity_type
    }

    pub fn inbound(&self) -> &[Arc<SequenceFlow>] {
        &self.inbound
    }

    pub fn outbound(&self) -> &[Arc<SequenceFlow>] {
        &self.outbound
    }

    /// Whether the activity is multi-instance
    pub fn is_loop(&self) -> bool {
        self.loop_characteristics.is_some()
    }

    pub fn loop_characteristics(&self) -> Option<&LoopCharacteristics> {
        self.loop_characteristics.as_ref()
    }

    pub fn form(&self) -> Option<&Form> {
        self.form.as_ref()
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Snapshot of the persisted state
    pub fn get_state(&self) -> PersistedState {
        self.state.lock().clone()
    }

    /// Register a listener for every notification
    pub fn add_listener(&self, listener: Arc<dyn ActivityListener>) {
        self.listeners.add(listener);
    }

    /// Register a closure for one notification
    pub fn on<F>(&self, kind: ActivityEventKind, handler: F)
    where
        F: Fn(&ActivityEvent) + Send + Sync + 'static,
    {
        self.listeners.add(Arc::new(KindListener { kind, handler }));
    }

    /// Run the activity for one token
    ///
    /// Returns the control handle of the new execution, or `None` when the
    /// execution was stopped before the behavior was invoked.
    pub fn run(
        self: &Arc<Self>,
        message: Option<Value>,
        inbound_flow: Option<&str>,
    ) -> Option<ControlHandle> {
        self.in_span(|| self.run_inner(message, inbound_flow, None))
    }

    /// Run the activity with an external signal attached
    pub fn signal(
        self: &Arc<Self>,
        signal: ActivitySignal,
        message: Option<Value>,
    ) -> Option<ControlHandle> {
        self.in_span(|| self.signal_inner(signal, message))
    }

    /// Re-run an execution that was interrupted after `enter`
    ///
    /// Does nothing, and notifies nothing, unless the persisted state says
    /// the activity was entered. A looped activity only re-runs the
    /// iterations missing from its persisted loop state.
    pub fn resume(self: &Arc<Self>) -> Option<ControlHandle> {
        self.in_span(|| self.resume_inner())
    }

    /// Control surface of one execution
    pub fn get_control_handle(self: &Arc<Self>, context: &Arc<ExecutionContext>) -> ControlHandle {
        ControlHandle::new(self.clone(), context.clone())
    }

    /// A token arrived on an inbound flow
    pub fn on_inbound_taken(self: &Arc<Self>, flow_id: &str) -> Option<ControlHandle> {
        self.run(None, Some(flow_id))
    }

    /// An inbound flow was discarded
    ///
    /// Enters without executing, then discards every outbound flow with the
    /// same root so the discard keeps propagating downstream.
    pub fn on_inbound_discarded(self: &Arc<Self>, flow_id: &str, root: &str) {
        self.in_span(|| {
            let context = self.new_context(
                None,
                Some(flow_id.to_string()),
                None,
                Some(root.to_string()),
                false,
            );
            self.enter(&context);
            context.try_settle(ContextStatus::Discarded);
            self.discard_all_outbound(&context, Some(root));
        })
    }

    /// Subscribe to inbound flow notifications
    pub fn activate(self: &Arc<Self>) {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.is_some() {
            return;
        }

        let mut active = Vec::with_capacity(self.inbound.len());
        for flow in &self.inbound {
            let activity = Arc::downgrade(self);
            let id = flow.subscribe(Arc::new(move |event: &FlowEvent| {
                let Some(activity) = activity.upgrade() else {
                    return;
                };
                match event {
                    FlowEvent::Taken { flow } => {
                        activity.on_inbound_taken(flow);
                    }
                    FlowEvent::Discarded { flow, root } => activity.on_inbound_discarded(flow, root),
                }
            }));
            active.push((flow.clone(), id));
        }
        *subscriptions = Some(active);
        debug!(activity_id = %self.id, inbound = self.inbound.len(), "activated");
    }

    /// Unsubscribe from inbound flow notifications; safe to repeat
    pub fn deactivate(&self) {
        let Some(active) = self.subscriptions.lock().take() else {
            return;
        };
        for (flow, id) in active {
            flow.unsubscribe(id);
        }
        debug!(activity_id = %self.id, "deactivated");
    }

    /// Whether the activity listens to its inbound flows
    pub fn is_active(&self) -> bool {
        self.subscriptions.lock().is_some()
    }

    // ------------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------------

    #[instrument(name = "run", skip(self, message, signal), fields(activity_id = %self.id))]
    fn run_inner(
        self: &Arc<Self>,
        message: Option<Value>,
        inbound_flow: Option<&str>,
        signal: Option<ActivitySignal>,
    ) -> Option<ControlHandle> {
        let context = self.new_context(
            message,
            inbound_flow.map(str::to_string),
            signal,
            None,
            false,
        );
        self.enter(&context);
        self.execute(&context, None)
    }

    #[instrument(name = "signal", skip(self, signal, message), fields(activity_id = %self.id, signal_type = %signal.signal_type))]
    fn signal_inner(
        self: &Arc<Self>,
        signal: ActivitySignal,
        message: Option<Value>,
    ) -> Option<ControlHandle> {
        self.run_inner(message, None, Some(signal))
    }

    #[instrument(name = "resume", skip(self), fields(activity_id = %self.id))]
    fn resume_inner(self: &Arc<Self>) -> Option<ControlHandle> {
        let (entered, loop_state) = {
            let state = self.state.lock();
            (state.entered, state.loop_state.clone())
        };
        if !entered {
            debug!(activity_id = %self.id, "not entered, nothing to resume");
            return None;
        }

        let context = self.new_context(None, None, None, None, true);
        self.enter(&context);
        self.execute(&context, loop_state)
    }

    fn new_context(
        &self,
        message: Option<Value>,
        inbound_flow: Option<String>,
        signal: Option<ActivitySignal>,
        discard_root: Option<String>,
        resumed: bool,
    ) -> Arc<ExecutionContext> {
        let role = if self.is_loop() {
            ContextRole::LoopParent
        } else {
            ContextRole::Single
        };
        ExecutionContext::new(ContextInit {
            activity_id: self.id.clone(),
            activity_type: self.activity_type.clone(),
            environment: self.environment.clone(),
            message,
            inbound_flow,
            discard_root,
            signal,
            role,
            form: self.form.clone(),
            outbound: self.outbound.clone(),
            resumed,
        })
    }

    fn enter(&self, context: &Arc<ExecutionContext>) {
        {
            let mut state = self.state.lock();
            state.taken = false;
            state.canceled = false;
            state.entered = true;
        }
        debug!(activity_id = %self.id, execution_id = %context.execution_id(), "enter");
        self.emit(Transition::Enter, context);
    }

    fn execute(
        self: &Arc<Self>,
        context: &Arc<ExecutionContext>,
        loop_state: Option<LoopState>,
    ) -> Option<ControlHandle> {
        self.emit(Transition::Start, context);
        if context.is_stopped() {
            debug!(activity_id = %self.id, execution_id = %context.execution_id(), "stopped before execute");
            return None;
        }

        match &self.loop_characteristics {
            Some(characteristics) => self.run_loop(characteristics.clone(), context, loop_state),
            None => self
                .behavior
                .execute(self, context.clone(), self.completion(context)),
        }

        Some(self.get_control_handle(context))
    }

    fn run_loop(
        self: &Arc<Self>,
        characteristics: LoopCharacteristics,
        context: &Arc<ExecutionContext>,
        loop_state: Option<LoopState>,
    ) {
        let activity = self.clone();
        let execute: IterationExecutor =
            Arc::new(move |iteration: Arc<ExecutionContext>, done: Completion| {
                activity.behavior.execute(&activity, iteration, done)
            });

        let activity = self.clone();
        let emit: LoopEmitter = Arc::new(move |event: LoopEvent| match event {
            LoopEvent::IterationStart { context } => {
                activity.emit(Transition::Start, &context)
            }
            LoopEvent::IterationEnd { context, state } => {
                activity.state.lock().loop_state = Some(state);
                activity.emit(Transition::End, &context);
            }
        });

        let runner = LoopRunner::new(characteristics, context.clone(), execute, emit);
        let done = self.completion(context);
        match loop_state {
            Some(state) => {
                debug!(
                    activity_id = %self.id,
                    completed = state.completed_count(),
                    total = runner.iteration_count(),
                    "resuming loop"
                );
                runner.resume(state, done)
            }
            None => runner.execute(done),
        }
    }

    fn completion(self: &Arc<Self>, context: &Arc<ExecutionContext>) -> Completion {
        let activity = self.clone();
        let context = context.clone();
        Completion::new(move |outcome| {
            activity.in_span(|| activity.on_execution_settled(&context, outcome))
        })
    }

    fn on_execution_settled(self: &Arc<Self>, context: &Arc<ExecutionContext>, outcome: ExecutionOutcome) {
        if context.is_stopped() || context.is_settled() {
            debug!(
                activity_id = %self.id,
                execution_id = %context.execution_id(),
                status = ?context.status(),
                "ignoring completion of finished execution"
            );
            return;
        }

        match outcome {
            Ok(values) => {
                context.set_result(values);
                self.complete(context);
            }
            Err(error) => self.fail(context, error),
        }
    }

    fn fail(&self, context: &Arc<ExecutionContext>, error: ActivityError) {
        if !context.try_settle(ContextStatus::Failed) {
            return;
        }
        {
            let mut state = self.state.lock();
            state.entered = false;
            state.loop_state = None;
        }
        context.discard_output();

        warn!(
            activity_id = %self.id,
            execution_id = %context.execution_id(),
            %error,
            "execution failed"
        );
        self.listeners
            .emit(&ActivityEvent::failed(error, &self.id, context));
    }

    fn complete(self: &Arc<Self>, context: &Arc<ExecutionContext>) {
        if !context.try_settle(ContextStatus::Completed) {
            return;
        }
        {
            let mut state = self.state.lock();
            state.entered = false;
            state.taken = !state.canceled;
            state.loop_state = None;
        }
        debug!(activity_id = %self.id, execution_id = %context.execution_id(), "completed");
        self.emit(Transition::End, context);

        if context.take_all_outbound() {
            debug!(activity_id = %self.id, "async leave");
            let activity = self.clone();
            let context = context.clone();
            self.scheduler.schedule(Box::new(move || {
                activity.in_span(|| activity.emit(Transition::Leave, &context))
            }));
        }
    }

    fn discard_all_outbound(&self, context: &Arc<ExecutionContext>, root: Option<&str>) {
        for flow in context.outbound() {
            flow.discard(root);
        }
        self.state.lock().entered = false;
        debug!(activity_id = %self.id, execution_id = %context.execution_id(), root, "discard");
        self.emit(Transition::Leave, context);
    }

    // ------------------------------------------------------------------------
    // Control (through ControlHandle)
    // ------------------------------------------------------------------------

    pub(crate) fn cancel_context(self: &Arc<Self>, context: &Arc<ExecutionContext>) {
        self.in_span(|| {
            if context.is_settled() {
                debug!(activity_id = %self.id, execution_id = %context.execution_id(), "cancel ignored, already settled");
                return;
            }
            self.state.lock().canceled = true;
            debug!(activity_id = %self.id, execution_id = %context.execution_id(), "cancel");
            self.emit(Transition::Cancel, context);
            self.complete(context);
            context.stop();
        })
    }

    pub(crate) fn discard_context(&self, context: &Arc<ExecutionContext>) {
        self.in_span(|| {
            if !context.try_settle(ContextStatus::Discarded) {
                debug!(activity_id = %self.id, execution_id = %context.execution_id(), "discard ignored, already settled");
                return;
            }
            context.stop();
            self.discard_all_outbound(context, None);
        })
    }

    pub(crate) fn stop_context(&self, context: &Arc<ExecutionContext>) {
        context.stop();
        self.deactivate();
    }

    fn emit(&self, transition: Transition, context: &Arc<ExecutionContext>) {
        self.listeners.emit(&ActivityEvent::new(transition, &self.id, context));
    }

    fn in_span<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.span {
            Some(span) => span.in_scope(f),
            None => f(),
        }
    }
}

impl std::fmt::Debug for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activity")
            .field("id", &self.id)
            .field("activity_type", &self.activity_type)
            .field("inbound", &self.inbound.len())
            .field("outbound", &self.outbound.len())
            .field("loop", &self.loop_characteristics.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ============================================================================
// ActivityBuilder
// ============================================================================

/// Builder for [`Activity`]
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tokenflow_lifecycle::prelude::*;
///
/// let scheduler = Arc::new(ManualScheduler::new());
/// let outbound = SequenceFlow::new("to-ship", "pack", "ship");
/// let activity = Activity::builder(ActivityDefinition::new("pack", "serviceTask"))
///     .with_outbound(outbound.clone())
///     .with_scheduler(scheduler.clone())
///     .with_execute(|_activity, _ctx, done| done.succeed(vec![]))
///     .build()
///     .unwrap();
///
/// activity.run(None, None);
/// assert_eq!(outbound.taken_count(), 1);
/// assert_eq!(scheduler.run_until_idle(), 1);
/// ```
pub struct ActivityBuilder {
    definition: ActivityDefinition,
    environment: Option<Arc<Environment>>,
    inbound: Vec<Arc<SequenceFlow>>,
    outbound: Vec<Arc<SequenceFlow>>,
    behavior: Option<Arc<dyn ExecuteBehavior>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    listeners: Vec<Arc<dyn ActivityListener>>,
    config: LifecycleConfig,
    span: Option<Span>,
    state: Option<PersistedState>,
}

impl ActivityBuilder {
    pub fn new(definition: ActivityDefinition) -> Self {
        Self {
            definition,
            environment: None,
            inbound: Vec::new(),
            outbound: Vec::new(),
            behavior: None,
            scheduler: None,
            listeners: Vec::new(),
            config: LifecycleConfig::default(),
            span: None,
            state: None,
        }
    }

    /// Shared process environment (a private one is created otherwise)
    pub fn with_environment(mut self, environment: Arc<Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_inbound(mut self, flow: Arc<SequenceFlow>) -> Self {
        self.inbound.push(flow);
        self
    }

    pub fn with_outbound(mut self, flow: Arc<SequenceFlow>) -> Self {
        self.outbound.push(flow);
        self
    }

    pub fn with_behavior(mut self, behavior: Arc<dyn ExecuteBehavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// Closure form of [`with_behavior`](Self::with_behavior)
    pub fn with_execute<F>(mut self, execute: F) -> Self
    where
        F: Fn(&Arc<Activity>, Arc<ExecutionContext>, Completion) + Send + Sync + 'static,
    {
        self.behavior = Some(Arc::new(execute));
        self
    }

    /// Scheduler for deferred `leave` (defaults to the current tokio runtime)
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ActivityListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Parent span for everything the activity logs
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Restore a previously persisted state (e.g. before `resume`)
    pub fn with_state(mut self, state: PersistedState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn build(self) -> Result<Arc<Activity>, BuildError> {
        let Self {
            definition,
            environment,
            inbound,
            outbound,
            behavior,
            scheduler,
            listeners,
            config,
            span,
            state,
        } = self;
        let ActivityDefinition {
            id,
            activity_type,
            loop_characteristics,
            form,
        } = definition;

        let behavior = behavior.ok_or_else(|| BuildError::MissingBehavior(id.clone()))?;

        if let Some(characteristics) = &loop_characteristics {
            let cardinality = characteristics
                .iteration_count()
                .ok_or_else(|| BuildError::UnboundedLoop(id.clone()))?;
            if cardinality > config.max_loop_cardinality {
                return Err(BuildError::LoopTooLarge {
                    id,
                    cardinality,
                    max: config.max_loop_cardinality,
                });
            }
        }

        let scheduler: Arc<dyn Scheduler> = match scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(TokioScheduler::try_current().map_err(|source| {
                BuildError::MissingScheduler {
                    id: id.clone(),
                    source,
                }
            })?),
        };

        let mut state = state.unwrap_or_default();
        state.id = id.clone();
        state.activity_type = activity_type.clone();

        let registry = Listeners::default();
        for listener in listeners {
            registry.add(listener);
        }

        let auto_activate = config.auto_activate;
        let activity = Arc::new(Activity {
            id,
            activity_type,
            environment: environment.unwrap_or_else(|| Arc::new(Environment::new())),
            inbound,
            outbound,
            loop_characteristics,
            form,
            behavior,
            listeners: registry,
            scheduler,
            config,
            span,
            state: Mutex::new(state),
            subscriptions: Mutex::new(None),
        });

        if auto_activate {
            activity.activate();
        }
        debug!(activity_id = %activity.id, activity_type = %activity.activity_type, "activity built");

        Ok(activity)
    }
}
