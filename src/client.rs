//! Native client for a bridge.
//!
//! [`PendingCalls`] mirrors the bookkeeping of the generated proxy: each call
//! gets a correlation id, a completion handle and a timer. A record ends in
//! exactly one of three ways (reply, timeout, cancellation) because whichever
//! comes first removes it from the table.
//!
//! [`ClientProxy`] sends requests through a [`MessageSink`] and resolves them
//! from delivered replies, which makes a bridge usable without a script
//! engine.

use crate::bridge::dispatch::{InvocationReply, ReplyStream};
use crate::bridge::extract::InvocationDescriptor;
use crate::error::CallError;
use crate::surface::MessageSink;
use crate::value::WireValue;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Settled value of a call: the serialized result (if any) or the rejection
pub type CallResult = std::result::Result<Option<String>, CallError>;

struct PendingEntry {
    name: String,
    started_at: DateTime<Utc>,
    sender: oneshot::Sender<CallResult>,
    timer: Option<JoinHandle<()>>,
}

/// Public view of a pending call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCallInfo {
    /// Correlation id
    pub callback_id: String,
    /// Wire name of the operation
    pub name: String,
    /// When the call was issued
    pub started_at: DateTime<Utc>,
}

struct PendingInner {
    entries: DashMap<String, PendingEntry>,
    timeout: Duration,
    runtime: Handle,
}

impl PendingInner {
    fn settle(&self, callback_id: &str, result: CallResult) -> bool {
        match self.entries.remove(callback_id) {
            Some((_, entry)) => {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
                let _ = entry.sender.send(result);
                true
            }
            None => false,
        }
    }
}

/// Table of calls awaiting a reply
#[derive(Clone)]
pub struct PendingCalls {
    inner: Arc<PendingInner>,
}

impl PendingCalls {
    /// Create a table whose calls expire after `timeout`
    pub fn new(timeout: Duration, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(PendingInner {
                entries: DashMap::new(),
                timeout,
                runtime,
            }),
        }
    }

    /// Fresh correlation id (32 lowercase hex digits)
    pub fn create_callback_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Register a pending call and start its timer
    ///
    /// A live call already using `callback_id` is cancelled first.
    pub fn add(&self, callback_id: &str, name: &str) -> PendingReply {
        self.cancel(callback_id, None);

        let (sender, receiver) = oneshot::channel();
        self.inner.entries.insert(
            callback_id.to_string(),
            PendingEntry {
                name: name.to_string(),
                started_at: Utc::now(),
                sender,
                timer: None,
            },
        );

        let weak: Weak<PendingInner> = Arc::downgrade(&self.inner);
        let id = callback_id.to_string();
        let timeout = self.inner.timeout;
        let timer = self.inner.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                if let Some((_, entry)) = inner.entries.remove(&id) {
                    debug!(callback_id = %id, name = %entry.name, "Pending call timed out");
                    let _ = entry.sender.send(Err(CallError::Timeout { callback_id: id }));
                }
            }
        });

        match self.inner.entries.get_mut(callback_id) {
            Some(mut entry) => entry.timer = Some(timer),
            None => timer.abort(),
        }

        PendingReply {
            callback_id: callback_id.to_string(),
            receiver,
        }
    }

    /// Resolve a pending call; `false` when the id is no longer pending
    pub fn resolve(&self, callback_id: &str, value: Option<String>) -> bool {
        self.inner.settle(callback_id, Ok(value))
    }

    /// Reject a pending call with `reason` or the default cancellation message
    pub fn cancel(&self, callback_id: &str, reason: Option<String>) -> bool {
        self.inner
            .settle(callback_id, Err(CallError::cancelled(callback_id, reason)))
    }

    /// Cancel every pending call; returns how many were cancelled
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self
            .inner
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.iter().filter(|id| self.cancel(id, None)).count()
    }

    /// Whether `callback_id` is pending
    pub fn contains(&self, callback_id: &str) -> bool {
        self.inner.entries.contains_key(callback_id)
    }

    /// Number of pending calls
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether no call is pending
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Snapshot of the pending calls
    pub fn pending(&self) -> Vec<PendingCallInfo> {
        self.inner
            .entries
            .iter()
            .map(|entry| PendingCallInfo {
                callback_id: entry.key().clone(),
                name: entry.name.clone(),
                started_at: entry.started_at,
            })
            .collect()
    }
}

/// Completion of one call
///
/// Resolves to the serialized result, or to the timeout or cancellation
/// error.
#[derive(Debug)]
pub struct PendingReply {
    callback_id: String,
    receiver: oneshot::Receiver<CallResult>,
}

impl PendingReply {
    /// Correlation id of the call
    pub fn callback_id(&self) -> &str {
        &self.callback_id
    }
}

impl Future for PendingReply {
    type Output = CallResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let callback_id = self.callback_id.clone();
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.unwrap_or_else(|_| Err(CallError::cancelled(callback_id, None)))
        })
    }
}

/// Native counterpart of the generated proxy
pub struct ClientProxy {
    descriptors: Vec<InvocationDescriptor>,
    pending: PendingCalls,
}

impl ClientProxy {
    /// Create a client for `descriptors`
    pub fn new(
        descriptors: Vec<InvocationDescriptor>,
        timeout: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            descriptors,
            pending: PendingCalls::new(timeout, runtime),
        }
    }

    /// Names of the exposed members
    pub fn members(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.wire_name.as_str()).collect()
    }

    /// Call a method member
    ///
    /// Arguments are sent as given; the bridge checks their number.
    pub fn call<S: MessageSink + ?Sized>(
        &self,
        sink: &S,
        name: &str,
        args: Vec<WireValue>,
    ) -> Result<PendingReply, CallError> {
        match self.descriptors.iter().find(|d| d.wire_name == name) {
            Some(descriptor) if !descriptor.is_property() => Ok(self.send(sink, name, args)),
            _ => Err(CallError::NotExposed(name.to_string())),
        }
    }

    /// Read a property member
    pub fn get<S: MessageSink + ?Sized>(
        &self,
        sink: &S,
        name: &str,
    ) -> Result<PendingReply, CallError> {
        match self.descriptors.iter().find(|d| d.wire_name == name) {
            Some(descriptor) if descriptor.is_property() => Ok(self.send(sink, name, Vec::new())),
            _ => Err(CallError::NotExposed(name.to_string())),
        }
    }

    fn send<S: MessageSink + ?Sized>(
        &self,
        sink: &S,
        name: &str,
        mut args: Vec<WireValue>,
    ) -> PendingReply {
        let callback_id = PendingCalls::create_callback_id();
        let reply = self.pending.add(&callback_id, name);
        args.push(WireValue::String(callback_id));
        let outcome = sink.post_message(name, WireValue::Array(args));
        debug!(name = %name, outcome = %outcome, "Posted invocation request");
        reply
    }

    /// Settle the call a reply is addressed to; late replies are ignored
    pub fn deliver(&self, reply: InvocationReply) -> bool {
        self.pending.resolve(&reply.callback_id, reply.value)
    }

    /// Deliver every reply that is ready on `stream`
    pub fn deliver_ready(&self, stream: &mut ReplyStream) -> usize {
        let mut delivered = 0;
        while let Some(reply) = stream.try_recv() {
            if self.deliver(reply) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Cancel one call
    pub fn cancel(&self, callback_id: &str, reason: Option<String>) -> bool {
        self.pending.cancel(callback_id, reason)
    }

    /// Cancel every pending call
    pub fn cancel_all(&self) -> usize {
        self.pending.cancel_all()
    }

    /// The pending-call table
    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::dispatch::RouteOutcome;
    use crate::capability::Selector;
    use parking_lot::Mutex;

    fn calls(timeout_ms: u64) -> PendingCalls {
        PendingCalls::new(Duration::from_millis(timeout_ms), Handle::current())
    }

    #[derive(Default)]
    struct RecordingSink {
        posted: Mutex<Vec<(String, WireValue)>>,
    }

    impl MessageSink for RecordingSink {
        fn post_message(&self, name: &str, body: WireValue) -> RouteOutcome {
            self.posted.lock().push((name.to_string(), body));
            RouteOutcome::Dispatched
        }
    }

    fn descriptor(selector: &str, returns_value: bool) -> InvocationDescriptor {
        let native_name = Selector::parse(selector).unwrap();
        InvocationDescriptor {
            wire_name: native_name.name().to_string(),
            parameter_count: native_name.arity(),
            native_name,
            returns_value,
        }
    }

    #[test]
    fn test_callback_id_format() {
        let id = PendingCalls::create_callback_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, PendingCalls::create_callback_id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_settles_once() {
        let pending = calls(1000);
        let reply = pending.add("a", "isSubmitted");
        assert!(pending.resolve("a", Some("true".into())));
        assert!(!pending.resolve("a", Some("false".into())));
        assert!(!pending.cancel("a", None));

        assert_eq!(reply.await, Ok(Some("true".into())));
        assert!(pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rejects_exactly_once() {
        let pending = calls(500);
        let reply = pending.add("a", "onSubmit");

        assert_eq!(
            reply.await,
            Err(CallError::Timeout {
                callback_id: "a".into()
            })
        );
        assert!(!pending.contains("a"));
        assert!(!pending.resolve("a", None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_with_reason() {
        let pending = calls(1000);
        let reply = pending.add("a", "onSubmit");
        assert!(pending.cancel("a", Some("page closed".into())));

        let err = reply.await.unwrap_err();
        assert_eq!(err.to_string(), "page closed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_empties_table() {
        let pending = calls(1000);
        let replies: Vec<PendingReply> = ["a", "b", "c"]
            .iter()
            .map(|id| pending.add(id, "onSubmit"))
            .collect();
        assert_eq!(pending.len(), 3);

        assert_eq!(pending.cancel_all(), 3);
        assert!(pending.is_empty());
        for reply in replies {
            let id = reply.callback_id().to_string();
            assert_eq!(reply.await, Err(CallError::cancelled(id, None)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_id_cancels_previous() {
        let pending = calls(1000);
        let first = pending.add("a", "onSubmit");
        let second = pending.add("a", "onCancel");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.pending()[0].name, "onCancel");

        assert!(matches!(first.await, Err(CallError::Cancelled { .. })));
        pending.resolve("a", None);
        assert_eq!(second.await, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_shapes() {
        let client = ClientProxy::new(
            vec![descriptor("onSubmit:", false), descriptor("isSubmitted", true)],
            Duration::from_secs(1),
            Handle::current(),
        );
        let sink = RecordingSink::default();

        assert!(matches!(
            client.call(&sink, "isSubmitted", vec![]),
            Err(CallError::NotExposed(_))
        ));
        assert!(matches!(
            client.get(&sink, "onSubmit"),
            Err(CallError::NotExposed(_))
        ));
        assert!(matches!(
            client.call(&sink, "missing", vec![]),
            Err(CallError::NotExposed(_))
        ));

        let reply = client.get(&sink, "isSubmitted").unwrap();
        let posted = sink.posted.lock().clone();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, "isSubmitted");
        assert_eq!(
            posted[0].1,
            WireValue::Array(vec![WireValue::from(reply.callback_id())])
        );

        assert!(client.deliver(InvocationReply {
            callback_id: reply.callback_id().to_string(),
            value: Some("true".into()),
        }));
        assert_eq!(reply.await, Ok(Some("true".into())));
    }
}
