//! Multi-instance (loop) execution
//!
//! A looped activity runs its body 0..N times inside one outer run. The
//! [`LoopRunner`] creates one iteration context per run of the body and
//! reports progress as [`LoopEvent`]s; the activity translates those into its
//! own `start`/`end` notifications and persists the [`LoopState`].

mod characteristics;
mod runner;

pub use characteristics::{LoopCharacteristics, LoopMode, LoopState};
pub use runner::{IterationExecutor, LoopEmitter, LoopEvent, LoopRunner};
