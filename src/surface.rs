//! Rendering-surface plumbing.
//!
//! A [`ContentController`] holds the user scripts and message-handler names
//! of a content surface. [`WebSurface`] pairs one with an optional bridge,
//! injects the proxy when the bridge asks for it, and routes messages posted
//! by scripts to the bridge.

use crate::bridge::dispatch::{RouteOutcome, ScriptMessage};
use crate::bridge::ScriptBridge;
use crate::value::WireValue;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// When a user script runs relative to page content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionTime {
    /// Before any page content is parsed
    AtDocumentStart,
    /// After the document finished loading
    AtDocumentEnd,
}

/// A script installed into every page the surface loads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserScript {
    /// Script source
    pub source: String,
    /// When the script runs
    pub injection_time: InjectionTime,
    /// Whether the script runs in the main frame only
    pub main_frame_only: bool,
}

impl UserScript {
    /// Create a script
    pub fn new(
        source: impl Into<String>,
        injection_time: InjectionTime,
        main_frame_only: bool,
    ) -> Self {
        Self {
            source: source.into(),
            injection_time,
            main_frame_only,
        }
    }
}

/// User scripts and message handlers of a content surface
pub trait ContentController {
    /// Installed scripts, in installation order
    fn user_scripts(&self) -> Vec<UserScript>;

    /// Remove every installed script
    fn remove_all_user_scripts(&mut self);

    /// Install a script
    fn add_user_script(&mut self, script: UserScript);

    /// Register a message handler name
    fn add_message_handler(&mut self, name: &str);

    /// Unregister a message handler name
    fn remove_message_handler(&mut self, name: &str);

    /// Whether a message handler name is registered
    fn has_message_handler(&self, name: &str) -> bool;
}

/// In-memory [`ContentController`]
///
/// Registering the same handler name twice is an error on real surfaces, so
/// duplicate registrations are counted to make them visible.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentController {
    scripts: Vec<UserScript>,
    handlers: BTreeSet<String>,
    duplicate_registrations: usize,
}

impl MemoryContentController {
    /// Create an empty controller
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered handler names, sorted
    pub fn message_handlers(&self) -> Vec<String> {
        self.handlers.iter().cloned().collect()
    }

    /// Times a name was registered while already present
    pub fn duplicate_registrations(&self) -> usize {
        self.duplicate_registrations
    }
}

impl ContentController for MemoryContentController {
    fn user_scripts(&self) -> Vec<UserScript> {
        self.scripts.clone()
    }

    fn remove_all_user_scripts(&mut self) {
        self.scripts.clear();
    }

    fn add_user_script(&mut self, script: UserScript) {
        self.scripts.push(script);
    }

    fn add_message_handler(&mut self, name: &str) {
        if !self.handlers.insert(name.to_string()) {
            self.duplicate_registrations += 1;
        }
    }

    fn remove_message_handler(&mut self, name: &str) {
        self.handlers.remove(name);
    }

    fn has_message_handler(&self, name: &str) -> bool {
        self.handlers.contains(name)
    }
}

/// Where scripts post invocation requests
pub trait MessageSink {
    /// Post `body` to the message handler `name`
    fn post_message(&self, name: &str, body: WireValue) -> RouteOutcome;
}

/// A content surface that can carry a script bridge
pub struct WebSurface<C: ContentController> {
    controller: C,
    scripting_enabled: bool,
    bridge: Option<Arc<ScriptBridge>>,
}

impl<C: ContentController> WebSurface<C> {
    /// Wrap a controller; scripting starts enabled
    pub fn new(controller: C) -> Self {
        Self {
            controller,
            scripting_enabled: true,
            bridge: None,
        }
    }

    /// Attach or detach the bridge
    pub fn set_bridge(&mut self, bridge: Option<Arc<ScriptBridge>>) {
        self.bridge = bridge;
    }

    /// The attached bridge
    pub fn bridge(&self) -> Option<&Arc<ScriptBridge>> {
        self.bridge.as_ref()
    }

    /// Enable or disable scripting
    pub fn set_scripting_enabled(&mut self, enabled: bool) {
        self.scripting_enabled = enabled;
    }

    /// Whether scripting is enabled
    pub fn scripting_enabled(&self) -> bool {
        self.scripting_enabled
    }

    /// Inject the bridge's proxy before a load, if it needs (re)injection
    ///
    /// Returns whether an injection took place.
    pub fn prepare_for_bridge(&mut self) -> bool {
        if !self.scripting_enabled {
            return false;
        }
        match &self.bridge {
            Some(bridge) if bridge.is_inject_required() => {
                bridge.inject_into(&mut self.controller);
                true
            }
            _ => false,
        }
    }

    /// The underlying controller
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Mutable access to the underlying controller
    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }
}

impl<C: ContentController> MessageSink for WebSurface<C> {
    fn post_message(&self, name: &str, body: WireValue) -> RouteOutcome {
        let bridge = match &self.bridge {
            Some(bridge) if self.controller.has_message_handler(name) => bridge,
            _ => {
                debug!(name = %name, "Message posted to unregistered handler");
                return RouteOutcome::UnknownOperation;
            }
        };
        bridge.receive(ScriptMessage::new(name, body))
    }
}
