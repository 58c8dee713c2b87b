//! Client proxy generation.
//!
//! The proxy is a script installed before page content. It defines
//! `window.<namespace>` with one member per descriptor plus the control
//! members that track pending calls. Each call posts
//! `[args..., callbackId]` to the message handler named after the
//! operation's wire name and returns a promise settled by the reply script,
//! a timeout, or a cancellation.

use super::extract::InvocationDescriptor;
use std::fmt::Write as _;
use std::time::Duration;

/// First line of every generated proxy; used to find stale copies on re-injection
pub const PROXY_MARKER: &str = "/* NexusScriptBridge */";

/// Script-side object exposing the per-name message handlers
pub const MESSAGE_HANDLERS: &str = "webkit.messageHandlers";

/// Whether a user script was produced by [`generate_proxy`]
pub fn is_proxy_script(source: &str) -> bool {
    source.starts_with(PROXY_MARKER)
}

/// Generate the proxy source for `namespace`
///
/// Methods are emitted in descriptor order inside the object literal;
/// properties are defined afterwards as getters.
pub fn generate_proxy(
    namespace: &str,
    descriptors: &[InvocationDescriptor],
    callback_timeout: Duration,
) -> String {
    let ns = namespace;
    let timeout_ms = callback_timeout.as_millis();
    let mut source = String::with_capacity(2048);

    source.push_str(PROXY_MARKER);
    source.push('\n');

    let _ = write!(
        source,
        r#"window.{ns} = {{
    _createUUID: function() {{
        const s4 = () => ((1 + Math.random()) * 0x10000 | 0).toString(16).substring(1);
        return s4() + s4() + s4() + s4() + s4() + s4() + s4() + s4();
    }},
    _cancel: function(id, reason) {{
        const callback = {ns}._callbackList[id];
        if (!callback) return;
        delete {ns}._callbackList[id];
        clearTimeout(callback.timer);
        callback.reject(reason || new Error(`Callback cancelled. (id: ${{id}})`));
    }},
    _cancelAll: function() {{
        Object.getOwnPropertyNames({ns}._callbackList).forEach((id) => {{
            {ns}._cancel(id);
        }});
    }},
    _addCallback: function(id, name, resolve, reject) {{
        const timer = setTimeout(() => {{
            {ns}._cancel(id, new Error(`Callback timeout. (id: ${{id}})`));
        }}, {timeout_ms});
        {ns}._callbackList[id] = {{ name, resolve, reject, timer, start: new Date() }};
    }},
    _callbackList: {{}},
"#
    );

    for descriptor in descriptors.iter().filter(|d| !d.is_property()) {
        let name = &descriptor.wire_name;
        let _ = write!(
            source,
            r#"    {name}: function() {{
        const id = {ns}._createUUID();
        const args = Array.from(arguments).concat(id);
        return new Promise((resolve, reject) => {{
            {ns}._addCallback(id, '{name}', resolve, reject);
            {MESSAGE_HANDLERS}.{name}.postMessage(args);
        }});
    }},
"#
        );
    }
    source.push_str("};\n");

    for descriptor in descriptors.iter().filter(|d| d.is_property()) {
        let name = &descriptor.wire_name;
        let _ = write!(
            source,
            r#"Object.defineProperty({ns}, '{name}', {{
    get: function() {{
        const id = {ns}._createUUID();
        return new Promise((resolve, reject) => {{
            {ns}._addCallback(id, '{name}', resolve, reject);
            {MESSAGE_HANDLERS}.{name}.postMessage([id]);
        }});
    }},
}});
"#
        );
    }

    source
}
