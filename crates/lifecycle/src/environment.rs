//! Process-wide variable and result store

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Serializable snapshot of an [`Environment`]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentState {
    /// Process variables
    #[serde(default)]
    pub variables: Map<String, Value>,

    /// Results committed by activities
    #[serde(default)]
    pub output: Map<String, Value>,
}

/// Shared store for process variables and committed activity results
///
/// Activities never write here directly; an [`ActivityIo`](crate::ActivityIo)
/// commits its accumulated result through [`Environment::assign_result`].
#[derive(Debug, Default)]
pub struct Environment {
    variables: RwLock<Map<String, Value>>,
    output: RwLock<Map<String, Value>>,
}

impl Environment {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an environment with initial variables
    pub fn with_variables(variables: Map<String, Value>) -> Self {
        Self {
            variables: RwLock::new(variables),
            output: RwLock::new(Map::new()),
        }
    }

    /// Restore an environment from a snapshot
    pub fn from_state(state: EnvironmentState) -> Self {
        Self {
            variables: RwLock::new(state.variables),
            output: RwLock::new(state.output),
        }
    }

    /// Merge a result into the process output
    ///
    /// Keys already present are overwritten, so committing the same result
    /// twice leaves the output unchanged.
    pub fn assign_result(&self, result: Map<String, Value>) {
        self.output.write().extend(result);
    }

    /// Set a process variable
    pub fn set_variable(&self, name: impl Into<String>, value: Value) {
        self.variables.write().insert(name.into(), value);
    }

    /// Get a process variable
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables.read().get(name).cloned()
    }

    /// Copy of the committed output
    pub fn output(&self) -> Map<String, Value> {
        self.output.read().clone()
    }

    /// Snapshot variables and output
    pub fn snapshot(&self) -> EnvironmentState {
        EnvironmentState {
            variables: self.variables.read().clone(),
            output: self.output(),
        }
    }
}
