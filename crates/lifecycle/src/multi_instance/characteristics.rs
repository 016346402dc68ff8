//! Loop configuration and persisted loop progress

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How iterations are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// One iteration at a time, in index order
    #[default]
    Sequential,

    /// All iterations started at once
    Parallel,
}

/// Multi-instance configuration of an activity
///
/// The iteration count is `cardinality` when set, otherwise the length of
/// `collection`. Iteration `i` receives `collection[i]` as its message.
///
/// # Example
///
/// ```
/// use tokenflow_lifecycle::LoopCharacteristics;
///
/// let config: LoopCharacteristics =
///     serde_json::from_str(r#"{"mode": "parallel", "collection": ["a", "b"]}"#).unwrap();
/// assert_eq!(config.iteration_count(), Some(2));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopCharacteristics {
    /// Sequential or parallel
    #[serde(default)]
    pub mode: LoopMode,

    /// Fixed number of iterations
    #[serde(default)]
    pub cardinality: Option<usize>,

    /// Items to iterate over
    #[serde(default)]
    pub collection: Option<Vec<Value>>,
}

impl LoopCharacteristics {
    /// Fixed number of sequential iterations
    pub fn sequential(cardinality: usize) -> Self {
        Self {
            mode: LoopMode::Sequential,
            cardinality: Some(cardinality),
            collection: None,
        }
    }

    /// Fixed number of parallel iterations
    pub fn parallel(cardinality: usize) -> Self {
        Self {
            mode: LoopMode::Parallel,
            cardinality: Some(cardinality),
            collection: None,
        }
    }

    /// One sequential iteration per collection item
    pub fn over(collection: Vec<Value>) -> Self {
        Self {
            mode: LoopMode::Sequential,
            cardinality: None,
            collection: Some(collection),
        }
    }

    /// Set the scheduling mode
    pub fn with_mode(mut self, mode: LoopMode) -> Self {
        self.mode = mode;
        self
    }

    /// Number of iterations, if the loop is bounded
    pub fn iteration_count(&self) -> Option<usize> {
        self.cardinality
            .or_else(|| self.collection.as_ref().map(Vec::len))
    }

    /// Message for iteration `index`
    pub fn iteration_message(&self, index: usize) -> Option<Value> {
        self.collection
            .as_ref()
            .and_then(|items| items.get(index).cloned())
    }
}

/// Progress of a loop, kept in the activity's persisted state
///
/// Holds the result of every finished iteration by index. Resuming
/// re-runs only the iterations missing here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    /// Finished iteration results
    #[serde(default)]
    pub completed: BTreeMap<usize, Value>,
}

impl LoopState {
    /// Number of finished iterations
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Whether iteration `index` finished
    pub fn is_completed(&self, index: usize) -> bool {
        self.completed.contains_key(&index)
    }
}
