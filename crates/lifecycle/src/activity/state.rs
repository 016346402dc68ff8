//! Persisted activity state

use serde::{Deserialize, Serialize};

use crate::execution::ContextState;
use crate::multi_instance::LoopState;

/// State that survives suspension
///
/// Owned and mutated only by its activity. `resume` consults `entered` to
/// decide whether a run was interrupted mid-execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Activity id
    pub id: String,

    /// Activity type
    #[serde(rename = "type")]
    pub activity_type: String,

    /// Between `enter` and the matching complete/discard
    #[serde(default)]
    pub entered: bool,

    /// Last run completed and took its outbound flows
    #[serde(default)]
    pub taken: bool,

    /// Last run was canceled
    #[serde(default)]
    pub canceled: bool,

    /// Progress of an interrupted loop
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_state: Option<LoopState>,
}

impl PersistedState {
    /// Fresh, never-entered state
    pub fn new(id: impl Into<String>, activity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            activity_type: activity_type.into(),
            ..Default::default()
        }
    }
}

/// Persisted state merged with the state of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutingState {
    /// Activity part
    #[serde(flatten)]
    pub persisted: PersistedState,

    /// Execution part
    #[serde(flatten)]
    pub execution: ContextState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ContextRole, ContextStatus};
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_persisted_state_roundtrip() {
        let mut state = PersistedState::new("task", "userTask");
        state.entered = true;

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            json!({"id": "task", "type": "userTask", "entered": true, "taken": false, "canceled": false})
        );

        let parsed: PersistedState = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_persisted_state_reads_loop_progress() {
        let parsed: PersistedState = serde_json::from_value(json!({
            "id": "task",
            "type": "task",
            "entered": true,
            "loop": {"completed": {"0": "done"}}
        }))
        .unwrap();

        assert!(parsed.loop_state.unwrap().is_completed(0));
    }

    #[test]
    fn test_executing_state_is_flat() {
        let state = ExecutingState {
            persisted: PersistedState::new("task", "task"),
            execution: ContextState {
                execution_id: Uuid::nil(),
                role: ContextRole::LoopIteration { index: 2 },
                status: ContextStatus::Pending,
                stopped: false,
                resumed: false,
                iterations: 0,
                output: Some(json!({"a": 1})),
            },
        };

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["id"], "task");
        assert_eq!(json["role"], "loop_iteration");
        assert_eq!(json["index"], 2);
        assert_eq!(json["output"], json!({"a": 1}));
    }
}
