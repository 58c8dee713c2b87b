//! # Nexus Script Bridge
//!
//! This library lets scripts running in a host-controlled content surface
//! call a declared set of host capabilities asynchronously. Each capability
//! appears in the page as a promise-returning member of `window.<namespace>`;
//! calls travel over a per-operation message channel and are answered by a
//! reply script keyed by a correlation id.
//!
//! ## Architecture
//!
//! ```text
//! Page script (window.<namespace>.op(...))
//!     │
//!     │ postMessage([args..., callbackId])
//!     ▼
//! ScriptBridge (route + coerce)
//!     │
//!     │ blocking worker
//!     ▼
//! Capability handler ──► ReplyStream ──► reply script
//! ```
//!
//! ## Features
//!
//! - **Declaration-driven**: operations are extracted from a capability
//!   declaration, with unsupported signatures excluded and name clashes
//!   resolved deterministically
//! - **Typed handlers**: closures of up to ten arguments, arity-checked at
//!   registration
//! - **Numeric fidelity**: booleans, integers and floats are told apart on
//!   the way in and rendered back faithfully
//! - **Bounded calls**: every call settles exactly once, by reply, timeout or
//!   cancellation

#![deny(missing_docs)]

pub mod bridge;
pub mod capability;
pub mod client;
pub mod coerce;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod surface;
pub mod value;

// Re-export commonly used types
pub use bridge::dispatch::{
    InvocationReply, ReplyStream, RouteOutcome, ScriptEvaluator, ScriptMessage,
};
pub use bridge::extract::{
    extract_descriptors, Exclusion, ExclusionReason, ExtractionReport, InvocationDescriptor,
};
pub use bridge::{ScriptBridge, ScriptBridgeBuilder};
pub use capability::{CapabilityDeclaration, OperationSignature, Selector, TypeTag};
pub use client::{ClientProxy, PendingCalls, PendingReply};
pub use config::BridgeConfig;
pub use error::{BridgeError, CallError, ErrorCode};
pub use events::{EventKind, InvocationEvent};
pub use handlers::{CapabilityTarget, HandlerTable};
pub use surface::{ContentController, MemoryContentController, MessageSink, UserScript, WebSurface};
pub use value::{HostValue, JsBool, JsFloat, JsInt, WireValue};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
