//! Error types for activity execution and construction

use serde::{Deserialize, Serialize};

/// Error delivered through a completion's error channel
///
/// An execution error is terminal for the run that produced it: the
/// activity notifies `error`, drops any partial output and does not
/// propagate tokens. Retrying is the execute behavior's business.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityError {
    /// Error message
    pub message: String,

    /// Error code for programmatic handling
    pub code: Option<String>,

    /// Additional error details (for debugging)
    pub details: Option<serde_json::Value>,
}

impl ActivityError {
    /// Create a new execution error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            details: None,
        }
    }

    /// Set the error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Add error details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ActivityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ActivityError {}

impl From<anyhow::Error> for ActivityError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{:#}", err))
    }
}

/// Errors raised while building an activity
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No execute behavior was supplied
    #[error("activity {0} has no execute behavior")]
    MissingBehavior(String),

    /// No scheduler was supplied and none could be derived
    #[error("activity {id} has no scheduler: {source}")]
    MissingScheduler {
        /// Activity id
        id: String,
        /// Why the default scheduler was unavailable
        #[source]
        source: SchedulerError,
    },

    /// Loop has neither a cardinality nor a collection
    #[error("activity {0} loop has neither cardinality nor collection")]
    UnboundedLoop(String),

    /// Loop cardinality exceeds the configured maximum
    #[error("activity {id} loop cardinality {cardinality} exceeds maximum {max}")]
    LoopTooLarge {
        /// Activity id
        id: String,
        /// Requested iteration count
        cardinality: usize,
        /// Configured bound
        max: usize,
    },
}

/// Errors from scheduler construction
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Not called from inside a tokio runtime
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
