//! Type coercion between the wire grammar and host values.
//!
//! Requests flow wire → host through [`coerce_argument`]; results flow
//! host → wire text through [`serialize_result`]. The text produced for a
//! result is a script expression, evaluated as the argument of the pending
//! call's `resolve`.

use crate::value::{HostValue, JsBool, JsFloat, JsInt, WireValue};

/// Coerce a full argument list
pub fn coerce_arguments(args: Vec<WireValue>, decode_json_strings: bool) -> Vec<HostValue> {
    args.into_iter()
        .map(|arg| coerce_argument(arg, decode_json_strings))
        .collect()
}

/// Coerce a single wire value into a host value
///
/// Numbers are classified into the three wrappers, JSON-bearing strings are
/// decoded when `decode_json_strings` is set, and containers are coerced
/// recursively.
pub fn coerce_argument(value: WireValue, decode_json_strings: bool) -> HostValue {
    match value {
        WireValue::Null => HostValue::Null,
        WireValue::Bool(b) => HostValue::Bool(JsBool::new(b)),
        WireValue::Number(n) => coerce_number(n),
        WireValue::String(s) => {
            if decode_json_strings {
                if let Some(decoded) = decode_structured(&s) {
                    return coerce_argument(decoded, decode_json_strings);
                }
            }
            HostValue::String(s)
        }
        WireValue::Array(items) => HostValue::Array(
            items
                .into_iter()
                .map(|item| coerce_argument(item, decode_json_strings))
                .collect(),
        ),
        WireValue::Object(map) => HostValue::Map(
            map.into_iter()
                .map(|(k, v)| (k, coerce_argument(v, decode_json_strings)))
                .collect(),
        ),
    }
}

/// Classify a wire number into the integer or float wrapper
pub fn coerce_number(n: f64) -> HostValue {
    if n.is_nan() {
        return HostValue::Int(JsInt::new(0));
    }
    // Integral values outside the i64 range keep their float form. `i64::MAX as f64`
    // rounds up to 2^63, which is already out of range.
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        HostValue::Int(JsInt::new(n as i64))
    } else {
        HostValue::Float(JsFloat::new(n))
    }
}

/// Only top-level arrays and objects count as structured strings.
fn decode_structured(s: &str) -> Option<WireValue> {
    match serde_json::from_str::<WireValue>(s) {
        Ok(value @ (WireValue::Array(_) | WireValue::Object(_))) => Some(value),
        _ => None,
    }
}

/// Render a host value as a wire-safe script expression
pub fn serialize_result(value: &HostValue) -> String {
    match value {
        HostValue::Null => "undefined".to_string(),
        HostValue::Bool(b) => b.to_string(),
        HostValue::Int(n) => n.to_string(),
        HostValue::Float(n) => serialize_float(n.value()),
        HostValue::String(s) => quote(s),
        HostValue::Date(d) => format!("new Date({})", d.timestamp_millis()),
        HostValue::Array(items) => {
            let parts: Vec<String> = items.iter().map(serialize_result).collect();
            format!("[{}]", parts.join(","))
        }
        HostValue::Map(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}:{}", quote(k), serialize_result(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        HostValue::Opaque(text) => text.clone(),
    }
}

fn serialize_float(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let token = if n > 0.0 { "Infinity" } else { "-Infinity" };
        token.to_string()
    } else {
        n.to_string()
    }
}

/// Quote a string as a JSON string literal, which is also a valid script literal.
pub(crate) fn quote(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn wire(json: &str) -> WireValue {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_numeric_disambiguation() {
        assert_eq!(coerce_argument(wire("3"), true), HostValue::Int(JsInt::new(3)));
        assert_eq!(
            coerce_argument(wire("3.5"), true),
            HostValue::Float(JsFloat::new(3.5))
        );
        assert_eq!(
            coerce_argument(wire("true"), true),
            HostValue::Bool(JsBool::new(true))
        );
        assert_eq!(
            coerce_argument(WireValue::Number(f64::NAN), true),
            HostValue::Int(JsInt::new(0))
        );
        assert_eq!(
            coerce_argument(wire("-12"), true),
            HostValue::Int(JsInt::new(-12))
        );
    }

    #[test]
    fn test_integer_range_edges() {
        let two_pow_63 = 9_223_372_036_854_775_808.0;
        assert_eq!(coerce_number(two_pow_63), HostValue::Float(JsFloat::new(two_pow_63)));
        assert_eq!(coerce_number(-two_pow_63), HostValue::Int(JsInt::new(i64::MIN)));
        assert_eq!(
            coerce_number(9_007_199_254_740_992.0),
            HostValue::Int(JsInt::new(9_007_199_254_740_992))
        );
    }

    #[test]
    fn test_round_trip_equal_under_wire_comparison() {
        for text in ["3", "3.5", "true", "false", "-0.25"] {
            let sent = wire(text);
            let host = coerce_argument(sent.clone(), true);
            let back = wire(&serialize_result(&host));
            assert_eq!(back, sent, "round trip of {}", text);
        }
    }

    #[test]
    fn test_json_string_decoding() {
        let arg = WireValue::String(r#"{"codes": [1, 2.5]}"#.into());
        let host = coerce_argument(arg, true);
        let map = host.as_map().unwrap();
        let codes = map.get("codes").unwrap().as_array().unwrap();
        assert_eq!(codes[0], HostValue::Int(JsInt::new(1)));
        assert_eq!(codes[1], HostValue::Float(JsFloat::new(2.5)));
    }

    #[test]
    fn test_json_string_decoding_disabled() {
        let text = r#"[1, 2]"#;
        let host = coerce_argument(WireValue::String(text.into()), false);
        assert_eq!(host.as_str(), Some(text));
    }

    #[test]
    fn test_scalar_and_invalid_strings_stay_strings() {
        for text in ["42", "\"quoted\"", "not json", "{broken"] {
            let host = coerce_argument(WireValue::String(text.into()), true);
            assert_eq!(host.as_str(), Some(text));
        }
    }

    #[test]
    fn test_nested_containers() {
        let host = coerce_argument(wire(r#"[[1], {"a": false}, "x"]"#), true);
        let items = host.as_array().unwrap();
        assert_eq!(
            items[0],
            HostValue::Array(vec![HostValue::Int(JsInt::new(1))])
        );
        assert_eq!(items[1].as_map().unwrap().get("a"), Some(&HostValue::from(false)));
        assert_eq!(items[2].as_str(), Some("x"));
    }

    #[test]
    fn test_serialize_scalars() {
        assert_eq!(serialize_result(&HostValue::Null), "undefined");
        assert_eq!(serialize_result(&HostValue::from(false)), "false");
        assert_eq!(serialize_result(&HostValue::from(12i64)), "12");
        assert_eq!(serialize_result(&HostValue::from(0.5)), "0.5");
        assert_eq!(serialize_result(&HostValue::from(f64::NAN)), "NaN");
        assert_eq!(
            serialize_result(&HostValue::from(f64::NEG_INFINITY)),
            "-Infinity"
        );
        assert_eq!(
            serialize_result(&HostValue::Opaque("window".into())),
            "window"
        );
    }

    #[test]
    fn test_serialize_escapes_strings() {
        assert_eq!(serialize_result(&HostValue::from("it's")), "\"it's\"");
        assert_eq!(
            serialize_result(&HostValue::from("a\"b\n")),
            "\"a\\\"b\\n\""
        );
    }

    #[test]
    fn test_serialize_containers_and_dates() {
        let mut map = BTreeMap::new();
        map.insert("ok".to_string(), HostValue::from(true));
        map.insert("list".to_string(), HostValue::from(vec!["message1", "message2"]));
        assert_eq!(
            serialize_result(&HostValue::Map(map)),
            r#"{"list":["message1","message2"],"ok":true}"#
        );

        let date = Utc.timestamp_millis_opt(1_500_000_000_123).unwrap();
        assert_eq!(
            serialize_result(&HostValue::Date(date)),
            "new Date(1500000000123)"
        );
    }
}
