//! Sequence flows connecting activities
//!
//! A flow is taken (activating its target) or discarded (signalling that no
//! token will arrive on that path). Activities subscribe to their inbound
//! flows and drive their outbound flows.

mod sequence_flow;

pub use sequence_flow::{FlowEvent, FlowListener, SequenceFlow, SubscriptionId};
