//! Value types on both sides of the bridge.
//!
//! [`WireValue`] is the restricted grammar the message channel can carry.
//! [`HostValue`] is what handlers receive and return; the three wrappers
//! [`JsBool`], [`JsInt`] and [`JsFloat`] recover the numeric kind that the
//! wire grammar cannot express.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Wire value types (the channel's value grammar)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(untagged)]
pub enum WireValue {
    /// Null or undefined
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (f64 for JS compatibility)
    Number(f64),
    /// String value
    String(String),
    /// Array of values
    Array(Vec<WireValue>),
    /// Object/map of values
    Object(BTreeMap<String, WireValue>),
}

impl WireValue {
    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WireValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            WireValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&Vec<WireValue>> {
        match self {
            WireValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get as object
    pub fn as_object(&self) -> Option<&BTreeMap<String, WireValue>> {
        match self {
            WireValue::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl From<bool> for WireValue {
    fn from(b: bool) -> Self {
        WireValue::Bool(b)
    }
}

impl From<f64> for WireValue {
    fn from(n: f64) -> Self {
        WireValue::Number(n)
    }
}

impl From<i64> for WireValue {
    fn from(n: i64) -> Self {
        WireValue::Number(n as f64)
    }
}

impl From<String> for WireValue {
    fn from(s: String) -> Self {
        WireValue::String(s)
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        WireValue::String(s.to_string())
    }
}

impl<T: Into<WireValue>> From<Vec<T>> for WireValue {
    fn from(v: Vec<T>) -> Self {
        WireValue::Array(v.into_iter().map(Into::into).collect())
    }
}

/// Boolean received from (or returned to) the script side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct JsBool(bool);

impl JsBool {
    /// Wrap a boolean
    pub fn new(value: bool) -> Self {
        Self(value)
    }

    /// The wrapped boolean
    pub fn value(self) -> bool {
        self.0
    }
}

impl fmt::Display for JsBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0 { "true" } else { "false" })
    }
}

/// Integral number received from (or returned to) the script side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct JsInt(i64);

impl JsInt {
    /// Wrap an integer
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The wrapped integer
    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for JsInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fractional number received from (or returned to) the script side
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JsFloat(f64);

impl JsFloat {
    /// Wrap a float
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// The wrapped float
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for JsFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host-side value handed to and returned from capability handlers
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    /// Null (rendered as `undefined` on the wire)
    #[default]
    Null,
    /// Boolean wrapper
    Bool(JsBool),
    /// Integer wrapper
    Int(JsInt),
    /// Float wrapper
    Float(JsFloat),
    /// String value
    String(String),
    /// Point in time
    Date(DateTime<Utc>),
    /// Ordered sequence
    Array(Vec<HostValue>),
    /// Key-value mapping
    Map(BTreeMap<String, HostValue>),
    /// Anything else, carried as its textual form
    Opaque(String),
}

impl HostValue {
    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(b.value()),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(n) => Some(n.value()),
            _ => None,
        }
    }

    /// Get as float (integers widen)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            HostValue::Float(n) => Some(n.value()),
            HostValue::Int(n) => Some(n.value() as f64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as date
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            HostValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&Vec<HostValue>> {
        match self {
            HostValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get as map
    pub fn as_map(&self) -> Option<&BTreeMap<String, HostValue>> {
        match self {
            HostValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<JsBool> for HostValue {
    fn from(b: JsBool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<JsInt> for HostValue {
    fn from(n: JsInt) -> Self {
        HostValue::Int(n)
    }
}

impl From<JsFloat> for HostValue {
    fn from(n: JsFloat) -> Self {
        HostValue::Float(n)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(JsBool(b))
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        HostValue::Int(JsInt(n))
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        HostValue::Int(JsInt(n as i64))
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Float(JsFloat(n))
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<DateTime<Utc>> for HostValue {
    fn from(d: DateTime<Utc>) -> Self {
        HostValue::Date(d)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(v: Vec<T>) -> Self {
        HostValue::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<HostValue>> From<BTreeMap<String, T>> for HostValue {
    fn from(m: BTreeMap<String, T>) -> Self {
        HostValue::Map(m.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(HostValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_value_conversions() {
        let v: WireValue = true.into();
        assert_eq!(v.as_bool(), Some(true));

        let v: WireValue = 42.0.into();
        assert_eq!(v.as_number(), Some(42.0));

        let v: WireValue = "hello".into();
        assert_eq!(v.as_str(), Some("hello"));
    }

    #[test]
    fn test_wire_value_from_json() {
        let v: WireValue = serde_json::from_str(r#"[1, 2.5, null, "x", {"k": true}]"#).unwrap();
        let items = v.as_array().unwrap();
        assert_eq!(items[0], WireValue::Number(1.0));
        assert_eq!(items[1], WireValue::Number(2.5));
        assert!(items[2].is_null());
        assert_eq!(items[3].as_str(), Some("x"));
        assert_eq!(
            items[4].as_object().unwrap().get("k"),
            Some(&WireValue::Bool(true))
        );
    }

    #[test]
    fn test_wrapper_display() {
        assert_eq!(JsBool::new(true).to_string(), "true");
        assert_eq!(JsInt::new(-7).to_string(), "-7");
        assert_eq!(JsFloat::new(3.5).to_string(), "3.5");
    }

    #[test]
    fn test_host_value_conversions() {
        assert_eq!(HostValue::from(true).as_bool(), Some(true));
        assert_eq!(HostValue::from(3i64).as_int(), Some(3));
        assert_eq!(HostValue::from(3i64).as_float(), Some(3.0));
        assert_eq!(HostValue::from(None::<String>), HostValue::Null);

        let list: HostValue = vec!["a", "b"].into();
        assert_eq!(list.as_array().map(Vec::len), Some(2));
    }
}
