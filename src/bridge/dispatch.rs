//! Message routing and dispatch.
//!
//! Requests arrive as `{ name, body: [args..., callbackId] }`. Routing is
//! synchronous and fail-closed: anything that does not match a descriptor
//! and a handler is dropped without a reply. Validated invocations run on a
//! blocking worker; their replies travel back through a [`ReplyStream`] to
//! the thread that owns the surface.

use super::ScriptBridge;
use crate::coerce::{coerce_arguments, quote, serialize_result};
use crate::events::{EventKind, IgnoreReason, InvocationEvent};
use crate::metrics::HandlerTimer;
use crate::value::WireValue;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, error, instrument, warn};

/// Message posted by a script to a named handler
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptMessage {
    /// Handler name (the operation's wire name)
    pub name: String,
    /// Message body
    pub body: WireValue,
}

impl ScriptMessage {
    /// Create a message
    pub fn new(name: impl Into<String>, body: WireValue) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    /// Create a message from a JSON body
    pub fn from_json(name: impl Into<String>, body: &str) -> serde_json::Result<Self> {
        Ok(Self::new(name, serde_json::from_str(body)?))
    }
}

/// What the router did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to a worker; exactly one reply follows unless the handler fails
    Dispatched,
    /// No descriptor has this wire name
    UnknownOperation,
    /// Body is not an array ending in a string correlation id
    MalformedBody,
    /// Argument count differs from the descriptor's
    ArityMismatch,
    /// The target has no handler for the operation
    MissingHandler,
    /// The capability target has been dropped
    TargetReleased,
    /// A null argument was received while the null policy is on
    IgnoredNullArgument,
}

impl RouteOutcome {
    /// Stable label used in metrics
    pub fn as_str(self) -> &'static str {
        match self {
            RouteOutcome::Dispatched => "dispatched",
            RouteOutcome::UnknownOperation => "unknown_operation",
            RouteOutcome::MalformedBody => "malformed_body",
            RouteOutcome::ArityMismatch => "arity_mismatch",
            RouteOutcome::MissingHandler => "missing_handler",
            RouteOutcome::TargetReleased => "target_released",
            RouteOutcome::IgnoredNullArgument => "ignored_null_argument",
        }
    }
}

impl fmt::Display for RouteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a completed invocation, addressed to one pending call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationReply {
    /// Correlation id of the pending call
    pub callback_id: String,
    /// Serialized result; `None` for fire-and-forget operations
    pub value: Option<String>,
}

impl InvocationReply {
    /// Script that settles the pending call inside the proxy
    ///
    /// The script does nothing when the call is no longer pending.
    pub fn to_script(&self, namespace: &str) -> String {
        let id = quote(&self.callback_id);
        let value = self.value.as_deref().unwrap_or("");
        let ns = namespace;
        format!(
            r#"(() => {{
    const callback = {ns}._callbackList[{id}];
    if (!callback) return;
    delete {ns}._callbackList[{id}];
    clearTimeout(callback.timer);
    callback.resolve({value});
}})();"#
        )
    }

    /// Parse the serialized result when it is plain JSON
    pub fn parse_value(&self) -> Option<WireValue> {
        self.value
            .as_deref()
            .and_then(|text| serde_json::from_str(text).ok())
    }
}

/// Evaluates scripts on the channel-owning thread
pub trait ScriptEvaluator {
    /// Evaluate `script` in the surface's page
    fn evaluate_script(&mut self, script: &str);
}

impl<F: FnMut(&str)> ScriptEvaluator for F {
    fn evaluate_script(&mut self, script: &str) {
        self(script)
    }
}

/// Receiving end of a bridge's replies
///
/// Owned by the thread that owns the surface; workers never touch the
/// surface directly.
#[derive(Debug)]
pub struct ReplyStream {
    namespace: String,
    receiver: mpsc::UnboundedReceiver<InvocationReply>,
}

impl ReplyStream {
    pub(crate) fn new(
        namespace: String,
        receiver: mpsc::UnboundedReceiver<InvocationReply>,
    ) -> Self {
        Self {
            namespace,
            receiver,
        }
    }

    /// Wait for the next reply; `None` once the bridge and all workers are gone
    pub async fn recv(&mut self) -> Option<InvocationReply> {
        self.receiver.recv().await
    }

    /// Take a reply if one is ready
    pub fn try_recv(&mut self) -> Option<InvocationReply> {
        self.receiver.try_recv().ok()
    }

    /// Evaluate every ready reply; returns how many were delivered
    pub fn drain<E: ScriptEvaluator + ?Sized>(&mut self, evaluator: &mut E) -> usize {
        let mut delivered = 0;
        while let Some(reply) = self.try_recv() {
            evaluator.evaluate_script(&reply.to_script(&self.namespace));
            delivered += 1;
        }
        delivered
    }

    /// Evaluate replies as they arrive until the bridge is dropped
    pub async fn pump<E: ScriptEvaluator + ?Sized>(&mut self, evaluator: &mut E) {
        while let Some(reply) = self.receiver.recv().await {
            evaluator.evaluate_script(&reply.to_script(&self.namespace));
        }
    }
}

/// Split a request body into arguments and the trailing correlation id.
fn split_body(body: WireValue) -> Option<(Vec<WireValue>, String)> {
    let mut items = match body {
        WireValue::Array(items) => items,
        _ => return None,
    };
    match items.pop() {
        Some(WireValue::String(id)) => Some((items, id)),
        _ => None,
    }
}

impl ScriptBridge {
    /// Route one message from the channel
    ///
    /// Must be called on the channel-owning thread. Returns immediately; a
    /// dispatched invocation replies through the [`ReplyStream`].
    #[instrument(
        skip(self, message),
        fields(namespace = %self.namespace, wire_name = %message.name)
    )]
    pub fn receive(&self, message: ScriptMessage) -> RouteOutcome {
        self.metrics.record_message();
        let outcome = self.route(message);
        if outcome != RouteOutcome::Dispatched {
            self.metrics.record_drop(outcome.as_str());
        }
        outcome
    }

    fn route(&self, message: ScriptMessage) -> RouteOutcome {
        let log_enabled = self.log_enabled();

        let target = match self.target.upgrade() {
            Some(target) => target,
            None => {
                if log_enabled {
                    debug!("Capability target released; dropping request");
                }
                return RouteOutcome::TargetReleased;
            }
        };

        let descriptor = match self.descriptors.iter().find(|d| d.wire_name == message.name) {
            Some(descriptor) => descriptor,
            None => return RouteOutcome::UnknownOperation,
        };

        let (args, callback_id) = match split_body(message.body) {
            Some(parts) => parts,
            None => {
                if log_enabled {
                    warn!("Request body is not an argument list ending in a callback id");
                }
                return RouteOutcome::MalformedBody;
            }
        };

        if args.len() != descriptor.parameter_count {
            if log_enabled {
                warn!(
                    selector = %descriptor.native_name,
                    received = args.len(),
                    required = descriptor.parameter_count,
                    "Argument count differs from the declaration"
                );
            }
            return RouteOutcome::ArityMismatch;
        }

        let handler = match target.handler(&descriptor.native_name) {
            Some(handler) if handler.arity() == descriptor.parameter_count => handler,
            _ => {
                if log_enabled {
                    warn!(
                        selector = %descriptor.native_name,
                        "An unimplemented operation has been called"
                    );
                }
                return RouteOutcome::MissingHandler;
            }
        };

        let config = self.config();
        self.events.emit(InvocationEvent {
            kind: EventKind::WillInvoke,
            native_name: descriptor.native_name.clone(),
            wire_name: descriptor.wire_name.clone(),
            args: args.clone(),
        });

        if config.ignore_null_arguments && args.iter().any(WireValue::is_null) {
            self.events.emit(InvocationEvent {
                kind: EventKind::Ignored(IgnoreReason::NullArgument),
                native_name: descriptor.native_name.clone(),
                wire_name: descriptor.wire_name.clone(),
                args,
            });
            return RouteOutcome::IgnoredNullArgument;
        }

        let selector = descriptor.native_name.clone();
        let returns_value = descriptor.returns_value;
        let decode_json_strings = config.decode_json_strings;
        let replies = self.replies.clone();
        let metrics = self.metrics.clone();

        self.metrics.record_dispatch();
        self.runtime.spawn(async move {
            let timer = HandlerTimer::start();
            let joined = tokio::task::spawn_blocking(move || {
                // Keep the target alive for the duration of the call.
                let _target = target;
                handler.invoke(coerce_arguments(args, decode_json_strings))
            })
            .await;
            let elapsed = timer.elapsed();

            let result = match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    metrics.record_completion(elapsed, false);
                    if log_enabled {
                        error!(
                            selector = %selector,
                            callback_id = %callback_id,
                            error = %e,
                            "Handler failed"
                        );
                    }
                    return;
                }
                Err(e) => {
                    metrics.record_completion(elapsed, false);
                    if log_enabled {
                        error!(
                            selector = %selector,
                            callback_id = %callback_id,
                            error = %e,
                            "Handler panicked"
                        );
                    }
                    return;
                }
            };
            metrics.record_completion(elapsed, true);

            let value = returns_value.then(|| match &result {
                Some(value) => serialize_result(value),
                None => "undefined".to_string(),
            });
            if replies.send(InvocationReply { callback_id, value }).is_ok() {
                metrics.record_reply();
            }
        });

        RouteOutcome::Dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_body() {
        let body: WireValue = serde_json::from_str(r#"[1, "x", "id-1"]"#).unwrap();
        let (args, id) = split_body(body).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(id, "id-1");

        assert!(split_body(WireValue::from("id")).is_none());
        assert!(split_body(WireValue::Array(vec![])).is_none());
        assert!(split_body(WireValue::Array(vec![WireValue::from(1i64)])).is_none());
    }

    #[test]
    fn test_reply_script() {
        let reply = InvocationReply {
            callback_id: "abc".into(),
            value: Some("true".into()),
        };
        let script = reply.to_script("formBridge");
        assert!(script.contains(r#"const callback = formBridge._callbackList["abc"];"#));
        assert!(script.contains("if (!callback) return;"));
        assert!(script.contains("clearTimeout(callback.timer);"));
        assert!(script.contains("callback.resolve(true);"));
    }

    #[test]
    fn test_void_reply_resolves_without_value() {
        let reply = InvocationReply {
            callback_id: "abc".into(),
            value: None,
        };
        assert!(reply.to_script("ns").contains("callback.resolve();"));
        assert_eq!(reply.parse_value(), None);
    }

    #[test]
    fn test_parse_value() {
        let reply = InvocationReply {
            callback_id: "abc".into(),
            value: Some(r#"["message1","message2"]"#.into()),
        };
        assert_eq!(
            reply.parse_value(),
            Some(WireValue::from(vec!["message1", "message2"]))
        );
    }

    #[tokio::test]
    async fn test_reply_stream_drain() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = ReplyStream::new("ns".into(), rx);
        tx.send(InvocationReply {
            callback_id: "a".into(),
            value: None,
        })
        .unwrap();
        tx.send(InvocationReply {
            callback_id: "b".into(),
            value: Some("1".into()),
        })
        .unwrap();

        let mut scripts = Vec::new();
        let delivered = stream.drain(&mut |script: &str| scripts.push(script.to_string()));
        assert_eq!(delivered, 2);
        assert!(scripts[1].contains("callback.resolve(1);"));

        drop(tx);
        assert!(stream.recv().await.is_none());
    }
}
