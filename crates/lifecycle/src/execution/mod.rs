//! Execution attempts
//!
//! This module contains the per-run primitives:
//! - [`ExecutionContext`] for one attempt's transient state
//! - [`Completion`] for resolving an attempt exactly once
//! - [`ActivitySignal`] for external signals attached to a run

mod completion;
pub(crate) mod context;
mod signal;

pub use completion::{Completion, ExecutionOutcome};
pub(crate) use context::ContextInit;
pub use context::{ContextRole, ContextState, ContextStatus, ExecutionContext};
pub use signal::ActivitySignal;
