//! External signals attached to a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An external signal that triggered or accompanies an execution
///
/// The signal is carried on the execution context and exposed through the
/// control handle so the execute behavior can react to it.
///
/// # Example
///
/// ```
/// use tokenflow_lifecycle::ActivitySignal;
///
/// let signal = ActivitySignal::custom("payment_received", serde_json::json!({"amount": 10}));
/// assert_eq!(signal.payload["amount"], 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivitySignal {
    /// Signal type identifier
    pub signal_type: String,

    /// Signal payload (JSON)
    pub payload: serde_json::Value,

    /// When the signal was sent
    pub sent_at: DateTime<Utc>,
}

impl ActivitySignal {
    /// Create a new signal
    pub fn new(signal_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            signal_type: signal_type.into(),
            payload,
            sent_at: Utc::now(),
        }
    }

    /// Create a custom signal
    pub fn custom(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(name, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_signal() {
        let signal = ActivitySignal::custom("order_updated", serde_json::json!({"status": "shipped"}));

        assert_eq!(signal.signal_type, "order_updated");
        assert_eq!(signal.payload["status"], "shipped");
    }

    #[test]
    fn test_signal_serializes_type_and_payload() {
        let signal = ActivitySignal::new("approved", serde_json::json!({"by": "ops"}));

        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["signal_type"], "approved");
        assert_eq!(json["payload"]["by"], "ops");
        assert!(json["sent_at"].is_string());
    }
}
