//! Host-side handler registry.
//!
//! Capability implementations are plain closures taking between zero and ten
//! [`HostValue`] arguments. Registering a closure under a selector checks its
//! parameter count against the selector's arity, so a mismatch is caught when
//! the table is built instead of when a script calls it.
//!
//! ```
//! use nexus_script_bridge::{HandlerTable, HostValue, JsBool};
//!
//! let table = HandlerTable::new()
//!     .register("onSubmit:clear:", |form: HostValue, clear: HostValue| {
//!         let _ = (form, clear.as_bool());
//!     })
//!     .unwrap()
//!     .register("isSubmitted", || JsBool::new(true))
//!     .unwrap();
//! assert_eq!(table.len(), 2);
//! ```

use crate::capability::Selector;
use crate::error::{BridgeError, Result};
use crate::value::{HostValue, JsBool, JsFloat, JsInt};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Outcome of running a handler: an optional value, or a failure
pub type HandlerResult = std::result::Result<Option<HostValue>, anyhow::Error>;

/// Type-erased handler body
pub type Callable = Arc<dyn Fn(Vec<HostValue>) -> HandlerResult + Send + Sync>;

/// Values a handler may return
pub trait IntoReply {
    /// Convert into the handler outcome
    fn into_reply(self) -> HandlerResult;
}

impl IntoReply for () {
    fn into_reply(self) -> HandlerResult {
        Ok(None)
    }
}

impl IntoReply for HostValue {
    fn into_reply(self) -> HandlerResult {
        Ok(Some(self))
    }
}

macro_rules! impl_into_reply {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoReply for $ty {
                fn into_reply(self) -> HandlerResult {
                    Ok(Some(HostValue::from(self)))
                }
            }
        )*
    };
}

impl_into_reply!(JsBool, JsInt, JsFloat, bool, i64, i32, f64, String, &'static str, DateTime<Utc>);

impl<T: Into<HostValue>> IntoReply for Vec<T> {
    fn into_reply(self) -> HandlerResult {
        Ok(Some(HostValue::from(self)))
    }
}

impl<T: Into<HostValue>> IntoReply for Option<T> {
    fn into_reply(self) -> HandlerResult {
        Ok(Some(HostValue::from(self)))
    }
}

impl<T, E> IntoReply for std::result::Result<T, E>
where
    T: IntoReply,
    E: Into<anyhow::Error>,
{
    fn into_reply(self) -> HandlerResult {
        self.map_err(Into::into).and_then(IntoReply::into_reply)
    }
}

/// Closures usable as capability handlers
///
/// `Args` is a tuple with one [`HostValue`] per parameter; it only serves to
/// tell the implementations for different arities apart.
pub trait IntoHandler<Args>: Send + Sync + 'static {
    /// Number of parameters the closure takes
    const ARITY: usize;

    /// Erase the closure's signature
    fn into_callable(self) -> Callable;
}

macro_rules! host_value {
    ($_arg:ident) => {
        HostValue
    };
}

macro_rules! impl_into_handler {
    ($arity:literal; $($arg:ident),*) => {
        impl<F, R> IntoHandler<($(host_value!($arg),)*)> for F
        where
            F: Fn($(host_value!($arg)),*) -> R + Send + Sync + 'static,
            R: IntoReply,
        {
            const ARITY: usize = $arity;

            #[allow(unused_mut, unused_variables)]
            fn into_callable(self) -> Callable {
                Arc::new(move |args: Vec<HostValue>| {
                    let mut args = args.into_iter();
                    $(let $arg = args.next().unwrap_or_default();)*
                    (self)($($arg),*).into_reply()
                })
            }
        }
    };
}

impl_into_handler!(0;);
impl_into_handler!(1; a0);
impl_into_handler!(2; a0, a1);
impl_into_handler!(3; a0, a1, a2);
impl_into_handler!(4; a0, a1, a2, a3);
impl_into_handler!(5; a0, a1, a2, a3, a4);
impl_into_handler!(6; a0, a1, a2, a3, a4, a5);
impl_into_handler!(7; a0, a1, a2, a3, a4, a5, a6);
impl_into_handler!(8; a0, a1, a2, a3, a4, a5, a6, a7);
impl_into_handler!(9; a0, a1, a2, a3, a4, a5, a6, a7, a8);
impl_into_handler!(10; a0, a1, a2, a3, a4, a5, a6, a7, a8, a9);

/// A handler together with the arity it was registered with
#[derive(Clone)]
pub struct RegisteredHandler {
    arity: usize,
    call: Callable,
}

impl RegisteredHandler {
    /// Wrap an already erased callable
    pub fn new(arity: usize, call: Callable) -> Self {
        Self { arity, call }
    }

    /// Parameter count of the underlying closure
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Run the handler with coerced arguments
    pub fn invoke(&self, args: Vec<HostValue>) -> HandlerResult {
        (self.call)(args)
    }
}

impl fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// The object whose operations a bridge exposes
///
/// The bridge holds its target weakly; once the target is dropped, incoming
/// requests are discarded.
pub trait CapabilityTarget: Send + Sync {
    /// Look up the handler implementing `selector`
    fn handler(&self, selector: &Selector) -> Option<RegisteredHandler>;
}

/// Map from selector to handler
#[derive(Debug, Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<Selector, RegisteredHandler>,
}

impl HandlerTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `selector`, replacing any previous entry
    ///
    /// Fails when the selector cannot be parsed or declares a different
    /// number of parameters than the closure takes.
    pub fn register<Args, F>(mut self, selector: &str, handler: F) -> Result<Self>
    where
        F: IntoHandler<Args>,
    {
        let selector = Selector::parse(selector)?;
        if selector.arity() != F::ARITY {
            return Err(BridgeError::ArityMismatch {
                selector: selector.to_string(),
                declared: selector.arity(),
                handler: F::ARITY,
            });
        }

        self.handlers
            .insert(selector, RegisteredHandler::new(F::ARITY, handler.into_callable()));
        Ok(self)
    }

    /// Whether a handler exists for `selector`
    pub fn contains(&self, selector: &Selector) -> bool {
        self.handlers.contains_key(selector)
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl CapabilityTarget for HandlerTable {
    fn handler(&self, selector: &Selector) -> Option<RegisteredHandler> {
        self.handlers.get(selector).cloned()
    }
}
