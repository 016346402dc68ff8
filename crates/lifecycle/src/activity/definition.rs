//! Activity definitions and lifecycle configuration

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::multi_instance::LoopCharacteristics;

/// One field of a user form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    /// Field id
    pub id: String,

    /// Display label
    #[serde(default)]
    pub label: Option<String>,

    /// Field type (e.g. "string", "boolean")
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,

    /// Value used when none is supplied
    #[serde(default)]
    pub default_value: Option<Value>,
}

/// Form metadata attached to an activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Form {
    /// External form reference
    #[serde(default)]
    pub key: Option<String>,

    /// Inline form fields
    #[serde(default)]
    pub fields: Vec<FormField>,
}

impl Form {
    /// Form that only references an external key
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            fields: Vec::new(),
        }
    }

    /// Add a field
    pub fn with_field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }
}

/// Static description of an activity, as read from a process model
///
/// # Example
///
/// ```
/// use tokenflow_lifecycle::ActivityDefinition;
///
/// let definition: ActivityDefinition = serde_json::from_str(
///     r#"{"id": "review", "type": "userTask", "loop": {"cardinality": 3}}"#,
/// ).unwrap();
/// assert_eq!(definition.activity_type, "userTask");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDefinition {
    /// Activity id, unique within the process
    pub id: String,

    /// Activity type (e.g. "serviceTask")
    #[serde(rename = "type")]
    pub activity_type: String,

    /// Multi-instance configuration
    #[serde(default, rename = "loop")]
    pub loop_characteristics: Option<LoopCharacteristics>,

    /// Form metadata
    #[serde(default)]
    pub form: Option<Form>,
}

impl ActivityDefinition {
    /// Create a definition without loop or form
    pub fn new(id: impl Into<String>, activity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            activity_type: activity_type.into(),
            loop_characteristics: None,
            form: None,
        }
    }

    /// Set the loop configuration
    pub fn with_loop(mut self, characteristics: LoopCharacteristics) -> Self {
        self.loop_characteristics = Some(characteristics);
        self
    }

    /// Set the form
    pub fn with_form(mut self, form: Form) -> Self {
        self.form = Some(form);
        self
    }
}

/// Runtime knobs for an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Subscribe to inbound flows as soon as the activity is built
    #[serde(default = "default_auto_activate")]
    pub auto_activate: bool,

    /// Upper bound on loop iterations (for safety)
    #[serde(default = "default_max_loop_cardinality")]
    pub max_loop_cardinality: usize,
}

fn default_auto_activate() -> bool {
    true
}

fn default_max_loop_cardinality() -> usize {
    10_000
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            auto_activate: default_auto_activate(),
            max_loop_cardinality: default_max_loop_cardinality(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multi_instance::LoopMode;

    #[test]
    fn test_definition_from_json() {
        let definition: ActivityDefinition = serde_json::from_str(
            r#"{
                "id": "approve",
                "type": "userTask",
                "loop": {"mode": "parallel", "cardinality": 2},
                "form": {"key": "approval", "fields": [{"id": "ok", "type": "boolean"}]}
            }"#,
        )
        .unwrap();

        assert_eq!(definition.id, "approve");
        let characteristics = definition.loop_characteristics.unwrap();
        assert_eq!(characteristics.mode, LoopMode::Parallel);
        let form = definition.form.unwrap();
        assert_eq!(form.key.as_deref(), Some("approval"));
        assert_eq!(form.fields[0].field_type.as_deref(), Some("boolean"));
    }

    #[test]
    fn test_config_defaults() {
        let config: LifecycleConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config, LifecycleConfig::default());
        assert!(config.auto_activate);
        assert_eq!(config.max_loop_cardinality, 10_000);
    }
}
