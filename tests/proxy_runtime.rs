//! Runs the generated proxy and reply scripts in a real script engine.
//!
//! The text-level tests in `bridge::proxy` check what is emitted; these check
//! that the emitted script behaves: promises settle once, timers fire, and
//! replies for settled calls do nothing. Needs `node` on the PATH and is
//! skipped without it.

use nexus_script_bridge::bridge::proxy::generate_proxy;
use nexus_script_bridge::{InvocationDescriptor, InvocationReply, Selector};
use std::io::Write;
use std::process::Command;
use std::time::Duration;

const CALLBACK_PLACEHOLDER: &str = "__CALLBACK_ID__";

/// Global surface the proxy expects: `window` and a recording message handler table.
const PRELUDE: &str = r#"
globalThis.window = globalThis;
const posts = [];
globalThis.webkit = {
    messageHandlers: new Proxy({}, {
        get: (_, name) => ({ postMessage: (args) => posts.push({ name: String(name), args }) }),
    }),
};
"#;

const SCENARIO: &str = r#"
const assert = require('assert');
const settle = (p) => p.then((v) => ({ ok: true, v }), (e) => ({ ok: false, e }));
const reply = (template, id) =>
    (0, eval)(template.split(JSON.stringify(PLACEHOLDER)).join(JSON.stringify(id)));

(async () => {
    const submit = settle(ns.onSubmit({ name: 'a' }));
    const request = posts.shift();
    assert.strictEqual(request.name, 'onSubmit');
    assert.strictEqual(request.args.length, 2);
    assert.deepStrictEqual(request.args[0], { name: 'a' });
    const submitId = request.args[1];
    assert.ok(ns._callbackList[submitId]);
    reply(VOID_REPLY, submitId);
    const submitted = await submit;
    assert.ok(submitted.ok);
    assert.strictEqual(submitted.v, undefined);
    assert.strictEqual(ns._callbackList[submitId], undefined);

    // A reply for a call that already settled is a no-op.
    reply(TRUE_REPLY, submitId);
    assert.deepStrictEqual(Object.keys(ns._callbackList), []);

    const flag = settle(ns.isSubmitted);
    const read = posts.shift();
    assert.strictEqual(read.name, 'isSubmitted');
    assert.strictEqual(read.args.length, 1);
    reply(TRUE_REPLY, read.args[0]);
    const flagged = await flag;
    assert.ok(flagged.ok);
    assert.strictEqual(flagged.v, true);
    assert.strictEqual(Object.getOwnPropertyDescriptor(ns, 'isSubmitted').set, undefined);

    const slow = await settle(ns.onCancel());
    const slowId = posts.shift().args[0];
    assert.ok(!slow.ok);
    assert.strictEqual(slow.e.message, `Callback timeout. (id: ${slowId})`);
    assert.deepStrictEqual(Object.keys(ns._callbackList), []);

    const closing = settle(ns.onCancel());
    const closingId = posts.shift().args[0];
    const reason = new Error('page closed');
    ns._cancel(closingId, reason);
    const closed = await closing;
    assert.ok(!closed.ok);
    assert.strictEqual(closed.e, reason);

    const first = settle(ns.onCancel());
    const second = settle(ns.onSubmit(1));
    const firstId = posts.shift().args[0];
    assert.strictEqual(Object.keys(ns._callbackList).length, 2);
    ns._cancelAll();
    assert.deepStrictEqual(Object.keys(ns._callbackList), []);
    const firstResult = await first;
    assert.ok(!firstResult.ok);
    assert.strictEqual(firstResult.e.message, `Callback cancelled. (id: ${firstId})`);
    assert.ok(!(await second).ok);

    console.log('ok');
})().catch((e) => {
    console.error(e);
    process.exit(1);
});
"#;

fn descriptor(selector: &str, returns_value: bool) -> InvocationDescriptor {
    let native_name = Selector::parse(selector).unwrap();
    InvocationDescriptor {
        wire_name: native_name.name().to_string(),
        parameter_count: native_name.arity(),
        native_name,
        returns_value,
    }
}

fn reply_template(value: Option<&str>) -> String {
    let reply = InvocationReply {
        callback_id: CALLBACK_PLACEHOLDER.into(),
        value: value.map(str::to_string),
    };
    serde_json::to_string(&reply.to_script("ns")).unwrap()
}

fn node_available() -> bool {
    Command::new("node")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

#[test]
fn test_proxy_settles_calls_in_script_engine() {
    if !node_available() {
        eprintln!("node not found, skipping script engine test");
        return;
    }

    let descriptors = vec![
        descriptor("onSubmit:", false),
        descriptor("onCancel", false),
        descriptor("isSubmitted", true),
    ];
    let proxy = generate_proxy("ns", &descriptors, Duration::from_millis(50));

    let mut script = String::from(PRELUDE);
    script.push_str(&proxy);
    script.push_str(&format!(
        "const PLACEHOLDER = {};\nconst VOID_REPLY = {};\nconst TRUE_REPLY = {};\n",
        serde_json::to_string(CALLBACK_PLACEHOLDER).unwrap(),
        reply_template(None),
        reply_template(Some("true")),
    ));
    script.push_str(SCENARIO);

    let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
    file.write_all(script.as_bytes()).unwrap();
    file.flush().unwrap();

    let output = Command::new("node").arg(file.path()).output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "script failed:\n{stderr}");
    assert!(stdout.contains("ok"), "unexpected output: {stdout}");
}

#[test]
fn test_proxy_defines_namespace_once_evaluated() {
    if !node_available() {
        eprintln!("node not found, skipping script engine test");
        return;
    }

    let descriptors = [descriptor("onCancel", false)];
    let proxy = generate_proxy("formBridge", &descriptors, Duration::from_secs(1));
    let mut script = String::from(PRELUDE);
    script.push_str(&proxy);
    script.push_str(
        "console.log(typeof formBridge.onCancel, JSON.stringify(formBridge._callbackList));\n",
    );

    let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
    file.write_all(script.as_bytes()).unwrap();
    file.flush().unwrap();

    let output = Command::new("node").arg(file.path()).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "function {}");
}
