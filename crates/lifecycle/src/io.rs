//! Activity input/output adapter

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::environment::Environment;

/// Bridges an inbound token payload to input, and accumulates output
///
/// Output is held here until [`ActivityIo::save`] commits it to the
/// [`Environment`]. When to commit is up to the execute behavior.
///
/// `set_output_value` and `set_result` may be mixed freely; the last call
/// wins. A named value written on top of a non-object result replaces it
/// with a fresh object.
#[derive(Debug)]
pub struct ActivityIo {
    id: String,
    io_type: String,
    environment: Arc<Environment>,
    result: Mutex<Option<Value>>,
}

impl ActivityIo {
    /// Create an adapter for the given activity
    pub fn new(
        id: impl Into<String>,
        activity_type: &str,
        environment: Arc<Environment>,
    ) -> Self {
        Self {
            id: id.into(),
            io_type: format!("io:{}", activity_type),
            environment,
            result: Mutex::new(None),
        }
    }

    /// Activity id this adapter belongs to
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Adapter type, `io:<activity type>`
    pub fn io_type(&self) -> &str {
        &self.io_type
    }

    /// Logical input for a message (identity mapping)
    pub fn get_input(&self, message: Option<&Value>) -> Option<Value> {
        message.cloned()
    }

    /// Current accumulated result
    pub fn get_output(&self) -> Option<Value> {
        self.result.lock().clone()
    }

    /// Set one named output field
    pub fn set_output_value(&self, name: impl Into<String>, value: Value) {
        let mut result = self.result.lock();
        if let Some(Value::Object(fields)) = result.as_mut() {
            fields.insert(name.into(), value);
            return;
        }

        if result.is_some() {
            debug!(io_id = %self.id, "replacing non-object result with output fields");
        }
        let mut fields = Map::new();
        fields.insert(name.into(), value);
        *result = Some(Value::Object(fields));
    }

    /// Replace the whole result
    pub fn set_result(&self, value: Value) {
        *self.result.lock() = Some(value);
    }

    /// Drop the accumulated result
    pub fn clear(&self) {
        *self.result.lock() = None;
    }

    /// Commit the accumulated result to the environment
    ///
    /// Object results are merged key by key; any other value is stored under
    /// the activity id. Nothing is committed if no result was set.
    pub fn save(&self) {
        let Some(result) = self.get_output() else {
            return;
        };

        let fields = match result {
            Value::Object(fields) => fields,
            other => {
                let mut fields = Map::new();
                fields.insert(self.id.clone(), other);
                fields
            }
        };

        debug!(io_id = %self.id, keys = fields.len(), "saving result");
        self.environment.assign_result(fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn io() -> (ActivityIo, Arc<Environment>) {
        let env = Arc::new(Environment::new());
        (ActivityIo::new("task", "serviceTask", env.clone()), env)
    }

    #[test]
    fn test_io_type() {
        let (io, _) = io();
        assert_eq!(io.io_type(), "io:serviceTask");
        assert_eq!(io.id(), "task");
    }

    #[test]
    fn test_input_is_identity() {
        let (io, _) = io();
        let message = json!({"order": 7});

        assert_eq!(io.get_input(Some(&message)), Some(message));
        assert_eq!(io.get_input(None), None);
    }

    #[test]
    fn test_output_values_accumulate() {
        let (io, _) = io();
        assert_eq!(io.get_output(), None);

        io.set_output_value("a", json!(1));
        io.set_output_value("b", json!(2));

        assert_eq!(io.get_output(), Some(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_set_result_replaces_output() {
        let (io, _) = io();
        io.set_output_value("a", json!(1));
        io.set_result(json!("done"));

        assert_eq!(io.get_output(), Some(json!("done")));
    }

    #[test]
    fn test_output_value_over_scalar_result() {
        let (io, _) = io();
        io.set_result(json!(42));
        io.set_output_value("a", json!(1));

        assert_eq!(io.get_output(), Some(json!({"a": 1})));
    }

    #[test]
    fn test_save_commits_to_environment() {
        let (io, env) = io();
        io.save();
        assert!(env.output().is_empty());

        io.set_output_value("approved", json!(true));
        io.save();
        io.save();

        assert_eq!(Value::Object(env.output()), json!({"approved": true}));
    }

    #[test]
    fn test_save_scalar_under_activity_id() {
        let (io, env) = io();
        io.set_result(json!([1, 2]));
        io.save();

        assert_eq!(Value::Object(env.output()), json!({"task": [1, 2]}));
    }
}
