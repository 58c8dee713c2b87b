//! Diagnostic output setup.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<bool> = OnceCell::new();

/// Default filter directive for this crate's diagnostics
pub const DEFAULT_DIRECTIVE: &str = "nexus_script_bridge=debug";

/// Install a `fmt` subscriber filtered by `RUST_LOG`
///
/// Only the first call has an effect. Returns `false` when another global
/// subscriber was already installed.
pub fn init() -> bool {
    *INIT.get_or_init(|| {
        let mut filter = EnvFilter::from_default_env();
        if let Ok(directive) = DEFAULT_DIRECTIVE.parse() {
            filter = filter.add_directive(directive);
        }
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .is_ok()
    })
}
