//! # Activity Lifecycle Core
//!
//! The per-node state machine of a token-based (BPMN-style) process runtime.
//!
//! ## Features
//!
//! - **Token-driven runs**: an activity runs when one of its inbound flows is taken
//! - **Discard propagation**: discarded inbound flows are forwarded to every outbound flow
//! - **Multi-instance loops**: sequential or parallel iterations with resumable progress
//! - **Control handles**: cancel, discard or stop an execution from supervising code
//! - **Resumption**: re-run an execution interrupted between `enter` and completion
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  taken/discarded  ┌────────────────────────────────────┐
//! │ SequenceFlow │ ────────────────▶ │              Activity              │
//! └──────────────┘                   │  enter → start → execute → end     │
//!        ▲                           │  (ExecuteBehavior or LoopRunner)   │
//!        │  take/discard             └────────────────────────────────────┘
//!        └───────────────────────────────────┘        │ leave (deferred)
//!                                                     ▼
//!                                                 Scheduler
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use tokenflow_lifecycle::prelude::*;
//!
//! let scheduler = Arc::new(ManualScheduler::new());
//! let inbound = SequenceFlow::new("f1", "start", "approve");
//! let outbound = SequenceFlow::new("f2", "approve", "end");
//!
//! let activity = Activity::builder(ActivityDefinition::new("approve", "task"))
//!     .with_inbound(inbound.clone())
//!     .with_outbound(outbound.clone())
//!     .with_scheduler(scheduler.clone())
//!     .with_execute(|_activity, ctx, done| {
//!         ctx.io().set_output_value("approved", serde_json::json!(true));
//!         done.succeed(vec![]);
//!     })
//!     .build()
//!     .unwrap();
//!
//! activity.on(ActivityEventKind::Leave, |event| {
//!     println!("{} left", event.activity_id());
//! });
//!
//! inbound.take();
//! assert_eq!(outbound.taken_count(), 1);
//! scheduler.run_until_idle();
//! ```

pub mod activity;
pub mod environment;
pub mod error;
pub mod execution;
pub mod flow;
pub mod io;
pub mod multi_instance;
pub mod scheduler;

/// Prelude for common imports
pub mod prelude {
    pub use crate::activity::{
        Activity, ActivityBuilder, ActivityDefinition, ActivityEvent, ActivityEventKind,
        ActivityListener, ControlHandle, ControlKind, ExecuteBehavior, LifecycleConfig,
    };
    pub use crate::environment::Environment;
    pub use crate::error::{ActivityError, BuildError};
    pub use crate::execution::{ActivitySignal, Completion, ExecutionContext, ExecutionOutcome};
    pub use crate::flow::{FlowEvent, SequenceFlow};
    pub use crate::multi_instance::{LoopCharacteristics, LoopMode};
    pub use crate::scheduler::{ManualScheduler, Scheduler, TokioScheduler};
}

// Re-export key types at crate root
pub use activity::{
    Activity, ActivityBuilder, ActivityDefinition, ActivityEvent, ActivityEventKind,
    ActivityListener, ControlHandle, ControlKind, ExecuteBehavior, ExecutingState, Form,
    FormField, LifecycleConfig, PersistedState,
};
pub use environment::{Environment, EnvironmentState};
pub use error::{ActivityError, BuildError, SchedulerError};
pub use execution::{
    ActivitySignal, Completion, ContextRole, ContextState, ContextStatus,
    ExecutionContext, ExecutionOutcome,
};
pub use flow::{FlowEvent, FlowListener, SequenceFlow, SubscriptionId};
pub use io::ActivityIo;
pub use multi_instance::{LoopCharacteristics, LoopMode, LoopRunner, LoopState};
pub use scheduler::{ManualScheduler, Scheduler, Task, TokioScheduler};
