//! The script bridge.
//!
//! A [`ScriptBridge`] exposes the operations of a capability declaration to
//! scripts running in a content surface under `window.<namespace>`. It owns
//! the extracted descriptors, generates and injects the client proxy, and
//! routes incoming requests to the capability target's handlers.

pub mod dispatch;
pub mod extract;
pub mod proxy;

use crate::capability::{is_identifier, CapabilityDeclaration};
use crate::client::ClientProxy;
use crate::config::{BridgeConfig, ConfigError};
use crate::error::{BridgeError, Result};
use crate::events::{EventHub, InvocationEvent};
use crate::handlers::CapabilityTarget;
use crate::metrics::{BridgeMetrics, BridgeStats};
use crate::surface::{ContentController, InjectionTime, UserScript};
use dispatch::{InvocationReply, ReplyStream};
use extract::{extract_descriptors, is_reserved, Exclusion, InvocationDescriptor};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// Bridge between a capability target and the scripts of a content surface
pub struct ScriptBridge {
    /// Script-side object name
    namespace: String,
    /// Operations exposed to scripts
    descriptors: Vec<InvocationDescriptor>,
    /// Operations that were left out
    exclusions: Vec<Exclusion>,
    /// Handler provider; dropped targets deactivate the router
    target: Weak<dyn CapabilityTarget>,
    /// Runtime policies
    config: RwLock<BridgeConfig>,
    /// Whether the proxy must be (re)injected before the next load
    inject_required: AtomicBool,
    /// Runtime that hosts the workers
    runtime: Handle,
    /// Worker → channel-owning thread hand-off
    replies: mpsc::UnboundedSender<InvocationReply>,
    /// Invocation notifications
    events: EventHub,
    /// Counters
    metrics: Arc<BridgeMetrics>,
}

impl ScriptBridge {
    /// Start building a bridge for `declaration` under `window.<namespace>`
    pub fn builder(
        namespace: impl Into<String>,
        declaration: CapabilityDeclaration,
    ) -> ScriptBridgeBuilder {
        ScriptBridgeBuilder {
            namespace: namespace.into(),
            declaration,
            target: None,
            config: BridgeConfig::default(),
            runtime: None,
        }
    }

    /// Script-side object name
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Exposed operations, in declaration order
    pub fn descriptors(&self) -> &[InvocationDescriptor] {
        &self.descriptors
    }

    /// Operations left out during extraction
    pub fn exclusions(&self) -> &[Exclusion] {
        &self.exclusions
    }

    /// Look up a descriptor by wire name
    pub fn descriptor(&self, wire_name: &str) -> Option<&InvocationDescriptor> {
        self.descriptors.iter().find(|d| d.wire_name == wire_name)
    }

    /// Whether the capability target is still alive
    pub fn is_active(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Current configuration
    pub fn config(&self) -> BridgeConfig {
        self.config.read().clone()
    }

    /// Drop calls that carry a null argument
    pub fn set_ignore_null_arguments(&self, enable: bool) {
        self.config.write().ignore_null_arguments = enable;
    }

    /// Decode string arguments holding JSON arrays or objects
    pub fn set_decode_json_strings(&self, enable: bool) {
        self.config.write().decode_json_strings = enable;
    }

    /// Emit extraction and routing diagnostics
    pub fn set_log_enabled(&self, enable: bool) {
        self.config.write().log_enabled = enable;
    }

    /// Change the per-call timeout; the proxy must be re-injected afterwards
    pub fn set_callback_timeout(&self, timeout: Duration) -> Result<()> {
        let timeout_ms = timeout.as_millis() as u64;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "callback_timeout_ms".into(),
                reason: "must be greater than 0".into(),
            }
            .into());
        }

        let mut config = self.config.write();
        if config.callback_timeout_ms != timeout_ms {
            config.callback_timeout_ms = timeout_ms;
            self.inject_required.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    pub(crate) fn log_enabled(&self) -> bool {
        self.config.read().log_enabled
    }

    /// Whether the proxy must be injected before the next page load
    pub fn is_inject_required(&self) -> bool {
        self.inject_required.load(Ordering::SeqCst)
    }

    /// Proxy source for the current descriptors and timeout
    pub fn proxy_source(&self) -> String {
        proxy::generate_proxy(
            &self.namespace,
            &self.descriptors,
            self.config.read().callback_timeout(),
        )
    }

    /// The proxy wrapped as a document-start, main-frame user script
    pub fn proxy_script(&self) -> UserScript {
        UserScript::new(self.proxy_source(), InjectionTime::AtDocumentStart, true)
    }

    /// Install the proxy and message handlers into `controller`
    ///
    /// Earlier proxies are removed; every other script is kept in order after
    /// the fresh proxy. Each wire name ends up registered exactly once.
    pub fn inject_into(&self, controller: &mut dyn ContentController) {
        let kept: Vec<UserScript> = controller
            .user_scripts()
            .into_iter()
            .filter(|script| !proxy::is_proxy_script(&script.source))
            .collect();
        controller.remove_all_user_scripts();

        controller.add_user_script(self.proxy_script());
        for descriptor in &self.descriptors {
            controller.remove_message_handler(&descriptor.wire_name);
            controller.add_message_handler(&descriptor.wire_name);
        }

        let kept_count = kept.len();
        for script in kept {
            controller.add_user_script(script);
        }

        self.inject_required.store(false, Ordering::SeqCst);

        if self.log_enabled() {
            debug!(
                namespace = %self.namespace,
                handlers = self.descriptors.len(),
                kept_scripts = kept_count,
                "Injected script proxy"
            );
        }
    }

    /// Subscribe to invocation notifications
    pub fn subscribe(&self) -> broadcast::Receiver<InvocationEvent> {
        self.events.subscribe()
    }

    /// Native client for the exposed operations, sharing this bridge's timeout
    pub fn client(&self) -> ClientProxy {
        ClientProxy::new(
            self.descriptors.clone(),
            self.config.read().callback_timeout(),
            self.runtime.clone(),
        )
    }

    /// Counters snapshot
    pub fn stats(&self) -> BridgeStats {
        self.metrics.snapshot()
    }

    /// Counters in Prometheus text format
    pub fn metrics_prometheus(&self) -> String {
        self.metrics.to_prometheus()
    }
}

/// Builder for [`ScriptBridge`]
pub struct ScriptBridgeBuilder {
    namespace: String,
    declaration: CapabilityDeclaration,
    target: Option<Weak<dyn CapabilityTarget>>,
    config: BridgeConfig,
    runtime: Option<Handle>,
}

impl ScriptBridgeBuilder {
    /// Object whose handlers implement the operations (held weakly)
    pub fn target<T: CapabilityTarget + 'static>(mut self, target: &Arc<T>) -> Self {
        let weak: Weak<dyn CapabilityTarget> = Arc::downgrade(target) as Weak<dyn CapabilityTarget>;
        self.target = Some(weak);
        self
    }

    /// Runtime policies
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Runtime that hosts handler workers (defaults to the current one)
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Extract descriptors and create the bridge with its reply stream
    pub fn build(self) -> Result<(Arc<ScriptBridge>, ReplyStream)> {
        if !is_identifier(&self.namespace) || is_reserved(&self.namespace) {
            return Err(BridgeError::InvalidNamespace(self.namespace));
        }
        self.config.validate()?;

        let target = self.target.ok_or(BridgeError::MissingTarget)?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BridgeError::NoRuntime)?,
        };

        let report = extract_descriptors(&self.declaration, self.config.log_enabled);
        if self.config.log_enabled {
            info!(
                namespace = %self.namespace,
                declaration = %self.declaration.name,
                exposed = report.descriptors.len(),
                excluded = report.exclusions.len(),
                "Creating script bridge"
            );
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let bridge = Arc::new(ScriptBridge {
            namespace: self.namespace.clone(),
            descriptors: report.descriptors,
            exclusions: report.exclusions,
            target,
            config: RwLock::new(self.config),
            inject_required: AtomicBool::new(true),
            runtime,
            replies: sender,
            events: EventHub::new(),
            metrics: Arc::new(BridgeMetrics::new()),
        });

        Ok((bridge, ReplyStream::new(self.namespace, receiver)))
    }
}
