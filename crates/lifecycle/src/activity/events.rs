// Activity notifications and observer registration
//
// Listeners are invoked synchronously, in registration order, on the thread
// that drives the activity. A panicking listener is not caught.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ActivityError;
use crate::execution::ExecutionContext;

// ============================================================================
// ActivityEvent
// ============================================================================

/// Names of the notifications an activity publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEventKind {
    Enter,
    Start,
    Cancel,
    End,
    Leave,
    Error,
}

impl ActivityEventKind {
    /// Lowercase name, as used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Start => "start",
            Self::Cancel => "cancel",
            Self::End => "end",
            Self::Leave => "leave",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ActivityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications that carry nothing beyond the activity and its context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Enter,
    Start,
    Cancel,
    End,
    Leave,
}

/// A lifecycle notification
///
/// Every notification carries the activity id and the execution context it
/// concerns; `Error` carries the execution error as well.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    Enter {
        activity_id: String,
        context: Arc<ExecutionContext>,
    },
    Start {
        activity_id: String,
        context: Arc<ExecutionContext>,
    },
    Cancel {
        activity_id: String,
        context: Arc<ExecutionContext>,
    },
    End {
        activity_id: String,
        context: Arc<ExecutionContext>,
    },
    Leave {
        activity_id: String,
        context: Arc<ExecutionContext>,
    },
    Error {
        error: ActivityError,
        activity_id: String,
        context: Arc<ExecutionContext>,
    },
}

impl ActivityEvent {
    pub(crate) fn new(
        transition: Transition,
        activity_id: &str,
        context: &Arc<ExecutionContext>,
    ) -> Self {
        let activity_id = activity_id.to_string();
        let context = context.clone();
        match transition {
            Transition::Enter => Self::Enter { activity_id, context },
            Transition::Start => Self::Start { activity_id, context },
            Transition::Cancel => Self::Cancel { activity_id, context },
            Transition::End => Self::End { activity_id, context },
            Transition::Leave => Self::Leave { activity_id, context },
        }
    }

    pub(crate) fn failed(
        error: ActivityError,
        activity_id: &str,
        context: &Arc<ExecutionContext>,
    ) -> Self {
        Self::Error {
            error,
            activity_id: activity_id.to_string(),
            context: context.clone(),
        }
    }

    /// Notification name
    pub fn kind(&self) -> ActivityEventKind {
        match self {
            Self::Enter { .. } => ActivityEventKind::Enter,
            Self::Start { .. } => ActivityEventKind::Start,
            Self::Cancel { .. } => ActivityEventKind::Cancel,
            Self::End { .. } => ActivityEventKind::End,
            Self::Leave { .. } => ActivityEventKind::Leave,
            Self::Error { .. } => ActivityEventKind::Error,
        }
    }

    /// Id of the activity that published the notification
    pub fn activity_id(&self) -> &str {
        match self {
            Self::Enter { activity_id, .. }
            | Self::Start { activity_id, .. }
            | Self::Cancel { activity_id, .. }
            | Self::End { activity_id, .. }
            | Self::Leave { activity_id, .. }
            | Self::Error { activity_id, .. } => activity_id,
        }
    }

    /// Execution context the notification concerns
    pub fn context(&self) -> &Arc<ExecutionContext> {
        match self {
            Self::Enter { context, .. }
            | Self::Start { context, .. }
            | Self::Cancel { context, .. }
            | Self::End { context, .. }
            | Self::Leave { context, .. }
            | Self::Error { context, .. } => context,
        }
    }

    /// Execution error, for `Error`
    pub fn error(&self) -> Option<&ActivityError> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }
}

// ============================================================================
// ActivityListener Trait
// ============================================================================

/// Observer of activity notifications
///
/// # Example
///
/// ```ignore
/// struct AuditListener;
///
/// impl ActivityListener for AuditListener {
///     fn on_event(&self, event: &ActivityEvent) {
///         tracing::info!(activity = event.activity_id(), kind = %event.kind(), "audit");
///     }
/// }
/// ```
pub trait ActivityListener: Send + Sync {
    /// Called for every notification this listener accepts
    fn on_event(&self, event: &ActivityEvent);

    /// Notifications this listener cares about; `None` means all
    fn event_kinds(&self) -> Option<Vec<ActivityEventKind>> {
        None
    }

    /// Human-readable name for logging/debugging
    fn name(&self) -> &'static str {
        "ActivityListener"
    }
}

impl<F> ActivityListener for F
where
    F: Fn(&ActivityEvent) + Send + Sync,
{
    fn on_event(&self, event: &ActivityEvent) {
        self(event)
    }

    fn name(&self) -> &'static str {
        "FnListener"
    }
}

/// Closure listener restricted to one notification
pub(crate) struct KindListener<F> {
    pub kind: ActivityEventKind,
    pub handler: F,
}

impl<F> ActivityListener for KindListener<F>
where
    F: Fn(&ActivityEvent) + Send + Sync,
{
    fn on_event(&self, event: &ActivityEvent) {
        (self.handler)(event)
    }

    fn event_kinds(&self) -> Option<Vec<ActivityEventKind>> {
        Some(vec![self.kind])
    }

    fn name(&self) -> &'static str {
        "KindListener"
    }
}

// ============================================================================
// Listener registry
// ============================================================================

/// Ordered set of listeners for one activity
#[derive(Default)]
pub(crate) struct Listeners {
    listeners: RwLock<Vec<Arc<dyn ActivityListener>>>,
}

impl Listeners {
    pub fn add(&self, listener: Arc<dyn ActivityListener>) {
        self.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver to every accepting listener
    ///
    /// The registry is snapshotted first, so listeners may register more
    /// listeners or drive other activities while being notified.
    pub fn emit(&self, event: &ActivityEvent) {
        let listeners = self.listeners.read().clone();
        let kind = event.kind();
        for listener in listeners {
            if let Some(kinds) = listener.event_kinds() {
                if !kinds.contains(&kind) {
                    continue;
                }
            }
            listener.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::tests::context;
    use parking_lot::Mutex;

    #[test]
    fn test_event_accessors() {
        let ctx = context(vec![]);
        let event = ActivityEvent::new(Transition::End, "task", &ctx);

        assert_eq!(event.kind(), ActivityEventKind::End);
        assert_eq!(event.activity_id(), "task");
        assert_eq!(event.context().execution_id(), ctx.execution_id());
        assert!(event.error().is_none());
    }

    #[test]
    fn test_error_event_carries_error() {
        let ctx = context(vec![]);
        let event = ActivityEvent::failed(ActivityError::new("boom"), "task", &ctx);

        assert_eq!(event.kind(), ActivityEventKind::Error);
        assert_eq!(event.error().map(|e| e.message.as_str()), Some("boom"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ActivityEventKind::Leave.to_string(), "leave");
        assert_eq!(
            serde_json::to_string(&ActivityEventKind::Enter).unwrap(),
            "\"enter\""
        );
    }

    #[test]
    fn test_listeners_run_in_order_with_filters() {
        let listeners = Listeners::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        let sink = log.clone();
        listeners.add(Arc::new(move |event: &ActivityEvent| {
            sink.lock().push(format!("all:{}", event.kind()));
        }));
        let sink = log.clone();
        listeners.add(Arc::new(KindListener {
            kind: ActivityEventKind::Start,
            handler: move |_: &ActivityEvent| sink.lock().push("start-only".to_string()),
        }));

        let ctx = context(vec![]);
        listeners.emit(&ActivityEvent::new(Transition::Enter, "task", &ctx));
        listeners.emit(&ActivityEvent::new(Transition::Start, "task", &ctx));

        assert_eq!(listeners.len(), 2);
        assert_eq!(*log.lock(), vec!["all:enter", "all:start", "start-only"]);
    }
}
