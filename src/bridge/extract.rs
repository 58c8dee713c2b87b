//! Capability descriptor extraction.
//!
//! Walks a [`CapabilityDeclaration`] (bases first) and turns every operation
//! the bridge can relay into an [`InvocationDescriptor`]. Operations that
//! cannot be relayed are excluded with a recorded reason; extraction itself
//! never fails.

use crate::capability::{
    CapabilityDeclaration, OperationScope, OperationSignature, Selector, TypeClass, TypeTag,
};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Maximum number of parameters an exposed operation may take
pub const MAX_PARAMETERS: usize = 10;

/// Member names the generated proxy uses for its own bookkeeping
pub const RESERVED_NAMES: [&str; 5] = [
    "_createUUID",
    "_callbackList",
    "_addCallback",
    "_cancel",
    "_cancelAll",
];

/// Whether `name` is one of the proxy's control members
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// One operation as exposed to scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationDescriptor {
    /// Selector of the host operation
    pub native_name: Selector,
    /// Collision-free name scripts call
    pub wire_name: String,
    /// Number of arguments the operation takes
    pub parameter_count: usize,
    /// Whether the operation produces a value
    pub returns_value: bool,
}

impl InvocationDescriptor {
    /// Zero-argument value-returning operations are exposed as read-only properties
    pub fn is_property(&self) -> bool {
        self.parameter_count == 0 && self.returns_value
    }
}

/// Why an operation was left out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    /// Parameter list does not match the selector's arity
    Malformed {
        /// Arity implied by the selector
        selector_arity: usize,
        /// Number of declared parameter types
        declared: usize,
    },
    /// Type-level operations are not supported
    TypeLevel,
    /// Return type cannot be marshaled
    UnsupportedReturn(TypeTag),
    /// A parameter uses a reference type that cannot be marshaled
    UnsupportedParameter {
        /// Zero-based parameter position
        index: usize,
        /// Offending type
        tag: TypeTag,
    },
    /// A parameter is a raw scalar instead of a wrapper
    ScalarParameter {
        /// Zero-based parameter position
        index: usize,
        /// Offending type
        tag: TypeTag,
    },
    /// More than [`MAX_PARAMETERS`] parameters
    TooManyParameters(usize),
    /// Derived wire name is a proxy control member
    ReservedName(String),
    /// Derived wire name clashes with an already exposed operation
    NameCollision(String),
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::Malformed {
                selector_arity,
                declared,
            } => write!(
                f,
                "selector takes {} arguments but {} parameter types are declared",
                selector_arity, declared
            ),
            ExclusionReason::TypeLevel => write!(f, "type-level operations are not supported"),
            ExclusionReason::UnsupportedReturn(tag) => {
                write!(f, "return type {} is not supported", tag)
            }
            ExclusionReason::UnsupportedParameter { index, tag } => {
                write!(f, "parameter {} has unsupported type {}", index, tag)
            }
            ExclusionReason::ScalarParameter { index, tag } => write!(
                f,
                "parameter {} is a raw {}; use JsBool, JsInt or JsFloat",
                index, tag
            ),
            ExclusionReason::TooManyParameters(count) => write!(
                f,
                "{} parameters exceed the limit of {}",
                count, MAX_PARAMETERS
            ),
            ExclusionReason::ReservedName(name) => write!(f, "'{}' is a reserved name", name),
            ExclusionReason::NameCollision(name) => {
                write!(f, "'{}' collides with an exposed operation", name)
            }
        }
    }
}

/// An operation that was not exposed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    /// Declaration the operation came from
    pub declaration: String,
    /// The operation's selector
    pub selector: Selector,
    /// Why it was excluded
    pub reason: ExclusionReason,
}

/// Result of extracting a declaration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Exposed operations, in declaration order
    pub descriptors: Vec<InvocationDescriptor>,
    /// Operations left out
    pub exclusions: Vec<Exclusion>,
}

impl ExtractionReport {
    /// Look up a descriptor by wire name
    pub fn find(&self, wire_name: &str) -> Option<&InvocationDescriptor> {
        self.descriptors.iter().find(|d| d.wire_name == wire_name)
    }
}

/// Build the descriptor list for a declaration
///
/// Declarations are visited base-first and, within each, required operations
/// precede optional ones. A derived declaration redeclaring a selector
/// replaces the inherited descriptor in place.
pub fn extract_descriptors(
    declaration: &CapabilityDeclaration,
    log_enabled: bool,
) -> ExtractionReport {
    let mut report = ExtractionReport::default();

    for decl in declaration.lineage() {
        for op in decl.required.iter().chain(decl.optional.iter()) {
            let outcome = check_signature(op).and_then(|()| admit(&mut report.descriptors, op));
            if let Err(reason) = outcome {
                if log_enabled {
                    warn!(
                        declaration = %decl.name,
                        selector = %op.selector,
                        reason = %reason,
                        "Operation excluded from bridge"
                    );
                }
                report.exclusions.push(Exclusion {
                    declaration: decl.name.clone(),
                    selector: op.selector.clone(),
                    reason,
                });
            }
        }
    }

    if log_enabled {
        debug!(
            declaration = %declaration.name,
            exposed = report.descriptors.len(),
            excluded = report.exclusions.len(),
            "Extracted invocation descriptors"
        );
    }

    report
}

/// Signature filters, applied in order; the first failure wins.
fn check_signature(op: &OperationSignature) -> Result<(), ExclusionReason> {
    let selector_arity = op.selector.arity();
    if op.params.len() != selector_arity {
        return Err(ExclusionReason::Malformed {
            selector_arity,
            declared: op.params.len(),
        });
    }

    if op.scope == OperationScope::Type {
        return Err(ExclusionReason::TypeLevel);
    }

    if !matches!(op.returns.class(), TypeClass::Void | TypeClass::Reference) {
        return Err(ExclusionReason::UnsupportedReturn(op.returns.clone()));
    }

    for (index, tag) in op.params.iter().enumerate() {
        if matches!(tag.class(), TypeClass::Void | TypeClass::UnsupportedReference) {
            return Err(ExclusionReason::UnsupportedParameter {
                index,
                tag: tag.clone(),
            });
        }
    }

    for (index, tag) in op.params.iter().enumerate() {
        if tag.class() == TypeClass::Scalar {
            return Err(ExclusionReason::ScalarParameter {
                index,
                tag: tag.clone(),
            });
        }
    }

    if op.params.len() > MAX_PARAMETERS {
        return Err(ExclusionReason::TooManyParameters(op.params.len()));
    }

    Ok(())
}

/// Name the operation and add it, extending its name group when needed.
fn admit(
    descriptors: &mut Vec<InvocationDescriptor>,
    op: &OperationSignature,
) -> Result<(), ExclusionReason> {
    let returns_value = op.returns != TypeTag::Void;

    if let Some(existing) = descriptors
        .iter_mut()
        .find(|d| d.native_name == op.selector)
    {
        existing.returns_value = returns_value;
        return Ok(());
    }

    let key = op.selector.name();
    let group: Vec<usize> = descriptors
        .iter()
        .enumerate()
        .filter(|(_, d)| d.native_name.name() == key)
        .map(|(i, _)| i)
        .collect();

    let candidate = if group.is_empty() {
        key.to_string()
    } else {
        op.selector.qualified_name()
    };

    if is_reserved(&candidate) {
        return Err(ExclusionReason::ReservedName(candidate));
    }

    let outside = |name: &str| {
        descriptors
            .iter()
            .enumerate()
            .any(|(i, d)| !group.contains(&i) && d.wire_name == name)
    };

    if group.is_empty() {
        if outside(&candidate) {
            return Err(ExclusionReason::NameCollision(candidate));
        }
    } else {
        let mut prospective: Vec<String> = group
            .iter()
            .map(|&i| descriptors[i].native_name.qualified_name())
            .collect();
        for name in &prospective {
            if outside(name) {
                return Err(ExclusionReason::NameCollision(name.clone()));
            }
        }
        if prospective.contains(&candidate) || outside(&candidate) {
            return Err(ExclusionReason::NameCollision(candidate));
        }
        for (&i, name) in group.iter().zip(prospective.drain(..)) {
            descriptors[i].wire_name = name;
        }
    }

    descriptors.push(InvocationDescriptor {
        native_name: op.selector.clone(),
        wire_name: candidate,
        parameter_count: op.params.len(),
        returns_value,
    });
    Ok(())
}
