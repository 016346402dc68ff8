//! Sequence flow: the token carrier between two activities

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Notification published by a sequence flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    /// The flow was taken; its target should run
    Taken {
        /// Flow id
        flow: String,
    },

    /// The flow will not carry a token on this path
    Discarded {
        /// Flow id
        flow: String,

        /// Flow where the discard originated, for correlation
        root: String,
    },
}

impl FlowEvent {
    /// Id of the flow that published the event
    pub fn flow_id(&self) -> &str {
        match self {
            Self::Taken { flow } | Self::Discarded { flow, .. } => flow,
        }
    }
}

/// Subscriber callback
pub type FlowListener = Arc<dyn Fn(&FlowEvent) + Send + Sync>;

/// Handle returned by [`SequenceFlow::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A directed connection between two activities
///
/// Subscribers are notified synchronously in registration order. The list
/// is snapshotted before dispatch, so a subscriber may unsubscribe while
/// being notified.
pub struct SequenceFlow {
    id: String,
    source_id: String,
    target_id: String,
    subscribers: RwLock<Vec<(SubscriptionId, FlowListener)>>,
    next_subscription: AtomicU64,
    discarding: Mutex<HashSet<String>>,
    taken_count: AtomicUsize,
    discarded_count: AtomicUsize,
}

impl SequenceFlow {
    /// Create a flow from `source_id` to `target_id`
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            discarding: Mutex::new(HashSet::new()),
            taken_count: AtomicUsize::new(0),
            discarded_count: AtomicUsize::new(0),
        })
    }

    /// Flow id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Source activity id
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Target activity id
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Register a subscriber
    pub fn subscribe(&self, listener: FlowListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, listener));
        id
    }

    /// Remove a subscriber; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Take the flow, activating its target
    pub fn take(&self) {
        self.taken_count.fetch_add(1, Ordering::SeqCst);
        debug!(flow_id = %self.id, target = %self.target_id, "taken");
        self.publish(&FlowEvent::Taken {
            flow: self.id.clone(),
        });
    }

    /// Discard the flow
    ///
    /// `root` identifies where the discard started; `None` makes this flow
    /// the root. A discard that arrives back at a flow still propagating the
    /// same root is a loop and stops there.
    pub fn discard(&self, root: Option<&str>) {
        let root = root.unwrap_or(self.id.as_str()).to_string();

        if !self.discarding.lock().insert(root.clone()) {
            debug!(flow_id = %self.id, %root, "discard looped");
            return;
        }

        self.discarded_count.fetch_add(1, Ordering::SeqCst);
        debug!(flow_id = %self.id, %root, "discarded");
        self.publish(&FlowEvent::Discarded {
            flow: self.id.clone(),
            root: root.clone(),
        });

        self.discarding.lock().remove(&root);
    }

    /// How many times the flow was taken
    pub fn taken_count(&self) -> usize {
        self.taken_count.load(Ordering::SeqCst)
    }

    /// How many times the flow was discarded
    pub fn discarded_count(&self) -> usize {
        self.discarded_count.load(Ordering::SeqCst)
    }

    fn publish(&self, event: &FlowEvent) {
        let subscribers: Vec<FlowListener> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in subscribers {
            listener(event);
        }
    }
}

impl std::fmt::Debug for SequenceFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceFlow")
            .field("id", &self.id)
            .field("source_id", &self.source_id)
            .field("target_id", &self.target_id)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
