//! Invocation notifications.
//!
//! The router publishes an event just before it hands an invocation to a
//! worker and another one when a policy drops the call. Subscribers see the
//! operation's native and wire names together with the argument list.

use crate::capability::Selector;
use crate::value::WireValue;
use tokio::sync::broadcast;

/// Buffered events per subscriber before the oldest are skipped
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why an invocation was not carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// An argument was null or undefined while the null-argument policy is on
    NullArgument,
}

/// What happened to an invocation
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// The invocation passed routing and is about to run
    WillInvoke,
    /// The invocation was dropped by a policy
    Ignored(IgnoreReason),
}

/// Notification published by the router
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationEvent {
    /// What happened
    pub kind: EventKind,
    /// Selector of the target operation
    pub native_name: Selector,
    /// Name the script used
    pub wire_name: String,
    /// Arguments as received, before coercion
    pub args: Vec<WireValue>,
}

/// Fan-out of invocation events to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<InvocationEvent>,
}

impl EventHub {
    /// Create a hub with the default capacity
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<InvocationEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; without subscribers the event is discarded
    pub fn emit(&self, event: InvocationEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
