//! Activity lifecycle
//!
//! An activity is one flow node of a process. It:
//! - Runs when a token is taken on an inbound flow
//! - Propagates discards from inbound to outbound flows without executing
//! - Completes, cancels or discards, then takes or discards its outbound flows
//! - Can be resumed from its persisted state after an interruption

mod definition;
mod events;
mod handle;
mod lifecycle;
mod state;

pub use definition::{ActivityDefinition, Form, FormField, LifecycleConfig};
pub use events::{ActivityEvent, ActivityEventKind, ActivityListener};
pub use handle::{ControlHandle, ControlKind};
pub use lifecycle::{Activity, ActivityBuilder, ExecuteBehavior};
pub use state::{ExecutingState, PersistedState};
