//! Capability declarations.
//!
//! A declaration is the host's statement of which operations a page script
//! may call: named selectors with typed parameters and a return type, split
//! into required and optional groups, optionally extending other
//! declarations. The extractor in [`crate::bridge::extract`] turns a
//! declaration into invocation descriptors.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation identifier: a name followed by one `label:` per parameter
///
/// `onCancel` takes no arguments, `onSubmit:` takes one, and
/// `onSubmit:clear:` takes two. The label of the first parameter is folded
/// into the name, so it is always empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector(String);

impl Selector {
    /// Parse a selector from its textual form
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |reason: &str| BridgeError::InvalidSelector {
            selector: text.to_string(),
            reason: reason.to_string(),
        };

        let components: Vec<&str> = text.split(':').collect();
        if !is_identifier(components[0]) {
            return Err(invalid("name must be an identifier"));
        }

        if components.len() > 1 {
            if !text.ends_with(':') {
                return Err(invalid("parameter labels must end with ':'"));
            }
            // Labels of the second and later parameters.
            for label in &components[1..components.len() - 1] {
                if !is_identifier(label) {
                    return Err(invalid("labels after the first parameter must be identifiers"));
                }
            }
        }

        Ok(Self(text.to_string()))
    }

    /// Build a selector from a name and one label per parameter
    ///
    /// The first label is dropped since it is part of the name.
    pub fn from_parts(name: &str, labels: &[&str]) -> Result<Self> {
        let mut text = name.to_string();
        for (index, label) in labels.iter().enumerate() {
            if index > 0 {
                text.push_str(label);
            }
            text.push(':');
        }
        Self::parse(&text)
    }

    /// The selector's textual form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The leading name component
    pub fn name(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.0.matches(':').count()
    }

    /// Non-empty labels after the name, in order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.split(':').skip(1).filter(|c| !c.is_empty())
    }

    /// Camel-joined form that keeps every label: `nameWithXAndY`
    pub fn qualified_name(&self) -> String {
        let mut qualified = self.name().to_string();
        for (index, label) in self.labels().enumerate() {
            qualified.push_str(if index == 0 { "With" } else { "And" });
            qualified.push_str(&capitalize(label));
        }
        qualified
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Selector {
    type Error = BridgeError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.0
    }
}

/// Upper-case the first character and lower-case the rest.
fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Whether `s` is usable as a script identifier
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Declared type of a parameter or return value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeTag {
    /// No value
    Void,
    /// Opaque object reference
    Object,
    /// String
    String,
    /// Date
    Date,
    /// Ordered sequence
    Array,
    /// Key-value mapping
    Dictionary,
    /// Null
    Null,
    /// Boxed number of unspecified kind
    Number,
    /// Boolean wrapper
    JsBool,
    /// Integer wrapper
    JsInt,
    /// Float wrapper
    JsFloat,
    /// Raw character
    Char,
    /// Raw unsigned character
    UnsignedChar,
    /// Class reference
    Class,
    /// Method selector
    Selector,
    /// Fixed-size array of the given length
    FixedArray(usize),
    /// Struct with the given name
    Struct(String),
    /// Union with the given name
    Union(String),
    /// Bit field of the given width
    Bitfield(u8),
    /// Pointer to another type
    Pointer(Box<TypeTag>),
    /// Function pointer
    FunctionPointer,
    /// Raw signed integer
    Int,
    /// Raw unsigned integer
    UInt,
    /// Raw short
    Short,
    /// Raw unsigned short
    UShort,
    /// Raw long
    Long,
    /// Raw unsigned long
    ULong,
    /// Raw long long
    LongLong,
    /// Raw unsigned long long
    ULongLong,
    /// Raw float
    Float,
    /// Raw double
    Double,
    /// Raw boolean
    Bool,
}

/// How the extractor treats a [`TypeTag`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    /// No value (valid only as a return type)
    Void,
    /// Reference the bridge can marshal
    Reference,
    /// Reference-like type the bridge cannot marshal
    UnsupportedReference,
    /// Raw scalar that cannot be relayed through the generic call path
    Scalar,
}

impl TypeTag {
    /// Classify this type for signature filtering
    pub fn class(&self) -> TypeClass {
        match self {
            TypeTag::Void => TypeClass::Void,
            TypeTag::Object
            | TypeTag::String
            | TypeTag::Date
            | TypeTag::Array
            | TypeTag::Dictionary
            | TypeTag::Null
            | TypeTag::Number
            | TypeTag::JsBool
            | TypeTag::JsInt
            | TypeTag::JsFloat => TypeClass::Reference,
            TypeTag::Char
            | TypeTag::UnsignedChar
            | TypeTag::Class
            | TypeTag::Selector
            | TypeTag::FixedArray(_)
            | TypeTag::Struct(_)
            | TypeTag::Union(_)
            | TypeTag::Bitfield(_)
            | TypeTag::Pointer(_)
            | TypeTag::FunctionPointer => TypeClass::UnsupportedReference,
            TypeTag::Int
            | TypeTag::UInt
            | TypeTag::Short
            | TypeTag::UShort
            | TypeTag::Long
            | TypeTag::ULong
            | TypeTag::LongLong
            | TypeTag::ULongLong
            | TypeTag::Float
            | TypeTag::Double
            | TypeTag::Bool => TypeClass::Scalar,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::FixedArray(len) => write!(f, "FixedArray[{}]", len),
            TypeTag::Struct(name) => write!(f, "Struct {}", name),
            TypeTag::Union(name) => write!(f, "Union {}", name),
            TypeTag::Bitfield(bits) => write!(f, "Bitfield:{}", bits),
            TypeTag::Pointer(inner) => write!(f, "Pointer<{}>", inner),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Whether an operation belongs to instances or to the type itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationScope {
    /// Called on the capability target
    #[default]
    Instance,
    /// Called on the type (not supported by the bridge)
    Type,
}

/// Signature of one declared operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSignature {
    /// Operation identifier
    pub selector: Selector,

    /// Declared return type
    pub returns: TypeTag,

    /// Declared parameter types, in order
    pub params: Vec<TypeTag>,

    /// Instance or type level
    #[serde(default)]
    pub scope: OperationScope,
}

impl OperationSignature {
    /// Create an instance-level signature
    pub fn new(selector: Selector, returns: TypeTag, params: Vec<TypeTag>) -> Self {
        Self {
            selector,
            returns,
            params,
            scope: OperationScope::Instance,
        }
    }

    /// Parse the selector and create an instance-level signature
    pub fn parse(selector: &str, returns: TypeTag, params: Vec<TypeTag>) -> Result<Self> {
        Ok(Self::new(Selector::parse(selector)?, returns, params))
    }

    /// Mark the operation as type-level
    pub fn type_level(mut self) -> Self {
        self.scope = OperationScope::Type;
        self
    }
}

/// A named, possibly inherited, set of operations exposed to scripts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDeclaration {
    /// Declaration name (diagnostics only)
    pub name: String,

    /// Declarations this one extends
    #[serde(default)]
    pub extends: Vec<CapabilityDeclaration>,

    /// Operations every target must provide
    #[serde(default)]
    pub required: Vec<OperationSignature>,

    /// Operations a target may provide
    #[serde(default)]
    pub optional: Vec<OperationSignature>,
}

impl CapabilityDeclaration {
    /// Create an empty declaration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Extend another declaration
    pub fn extending(mut self, base: CapabilityDeclaration) -> Self {
        self.extends.push(base);
        self
    }

    /// Add a required operation
    pub fn required(mut self, op: OperationSignature) -> Self {
        self.required.push(op);
        self
    }

    /// Add an optional operation
    pub fn optional(mut self, op: OperationSignature) -> Self {
        self.optional.push(op);
        self
    }

    /// The inheritance chain, base-first
    ///
    /// A base reached through several paths appears once. Declarations that
    /// only share a name are all kept.
    pub fn lineage(&self) -> Vec<&CapabilityDeclaration> {
        let mut out = Vec::new();
        self.collect_lineage(&mut out);
        out
    }

    fn collect_lineage<'a>(&'a self, out: &mut Vec<&'a CapabilityDeclaration>) {
        for base in &self.extends {
            base.collect_lineage(out);
        }
        // Names are not unique; only the same declaration reached twice is skipped.
        if !out.iter().any(|seen| *seen == self) {
            out.push(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parse() {
        let s = Selector::parse("onSubmit:clear:").unwrap();
        assert_eq!(s.name(), "onSubmit");
        assert_eq!(s.arity(), 2);
        assert_eq!(s.labels().collect::<Vec<_>>(), vec!["clear"]);

        let s = Selector::parse("onCancel").unwrap();
        assert_eq!(s.arity(), 0);
        assert_eq!(s.labels().count(), 0);
    }

    #[test]
    fn test_selector_rejects_malformed() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("1abc").is_err());
        assert!(Selector::parse("on:Submit").is_err());
        assert!(Selector::parse("on::x:").is_err());
        assert!(Selector::parse("on-submit:").is_err());
    }

    #[test]
    fn test_selector_from_parts() {
        let s = Selector::from_parts("getErrorMessages", &["codes"]).unwrap();
        assert_eq!(s.as_str(), "getErrorMessages:");

        let s = Selector::from_parts("onSubmit", &["", "clear"]).unwrap();
        assert_eq!(s.as_str(), "onSubmit:clear:");
    }

    #[test]
    fn test_qualified_name() {
        let s = Selector::parse(
            "onSubmit:firstName:lastName:address1:address2:zipCode:phoneNumber:",
        )
        .unwrap();
        assert_eq!(
            s.qualified_name(),
            "onSubmitWithFirstnameAndLastnameAndAddress1AndAddress2AndZipcodeAndPhonenumber"
        );
        assert_eq!(Selector::parse("onSubmit:").unwrap().qualified_name(), "onSubmit");
        assert_eq!(Selector::parse("onCancel").unwrap().qualified_name(), "onCancel");
    }

    #[test]
    fn test_type_classes() {
        assert_eq!(TypeTag::Void.class(), TypeClass::Void);
        assert_eq!(TypeTag::Dictionary.class(), TypeClass::Reference);
        assert_eq!(TypeTag::JsInt.class(), TypeClass::Reference);
        assert_eq!(
            TypeTag::Pointer(Box::new(TypeTag::Int)).class(),
            TypeClass::UnsupportedReference
        );
        assert_eq!(TypeTag::Double.class(), TypeClass::Scalar);
    }

    #[test]
    fn test_lineage_is_base_first() {
        let root = CapabilityDeclaration::new("Root");
        let base = CapabilityDeclaration::new("Base").extending(root.clone());
        let other = CapabilityDeclaration::new("Other").extending(root);
        let derived = CapabilityDeclaration::new("Derived")
            .extending(base)
            .extending(other);

        let names: Vec<&str> = derived.lineage().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Base", "Other", "Derived"]);
    }

    #[test]
    fn test_lineage_keeps_derived_sharing_base_name() {
        let close = OperationSignature::parse("close", TypeTag::Void, vec![]).unwrap();
        let open =
            OperationSignature::parse("open:", TypeTag::Void, vec![TypeTag::String]).unwrap();
        let base = CapabilityDeclaration::new("Caps").required(close);
        let derived = CapabilityDeclaration::new("Caps")
            .extending(base)
            .required(open.clone());

        let lineage = derived.lineage();
        assert_eq!(lineage.len(), 2);
        assert_eq!(lineage[1].required, vec![open]);
    }

    #[test]
    fn test_selector_serde() {
        let s: Selector = serde_json::from_str("\"onSubmit:\"").unwrap();
        assert_eq!(s.arity(), 1);
        assert!(serde_json::from_str::<Selector>("\"bad name\"").is_err());
    }
}
