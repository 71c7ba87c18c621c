//! Reading the consent decision out of the document cookie string.
//!
//! The decision cookie holds either a truthy sentinel (`1`, `true`) or a JSON
//! mapping of category slug to boolean, usually percent-encoded. Presence of any
//! truthy value means the user already decided and no banner should be shown.

use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::Value;
use std::collections::BTreeMap;

/// Returns the value of cookie `name` in `cookie_string`, percent-decoded and
/// with surrounding double quotes removed.
///
/// Parses the string on every call. Returns `None` when the cookie is absent or
/// its value cannot be decoded.
pub fn read_cookie(cookie_string: &str, name: &str) -> Option<String> {
    for part in cookie_string.split(';') {
        let Some((k, v)) = part.trim().split_once('=') else {
            continue;
        };
        if k.trim() != name {
            continue;
        }

        let decoded = percent_decode_str(v.trim()).decode_utf8().ok()?;
        let unquoted = decoded
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(&decoded);
        return Some(unquoted.to_string());
    }
    None
}

/// JavaScript-style truthiness of a JSON value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A consent decision as written by the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentDecision {
    /// Everything accepted
    AcceptedAll,
    /// Per-category choices
    Categories(BTreeMap<String, bool>),
}

impl ConsentDecision {
    /// The raw cookie value (percent-encoded where needed).
    pub fn cookie_value(&self) -> String {
        match self {
            ConsentDecision::AcceptedAll => "1".to_string(),
            ConsentDecision::Categories(map) => {
                // A BTreeMap<String, bool> always serializes
                let json = serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string());
                utf8_percent_encode(&json, NON_ALPHANUMERIC).to_string()
            }
        }
    }

    /// Interprets a decoded cookie value. `None` when the value records no decision.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value == "1" || value == "true" {
            return Some(ConsentDecision::AcceptedAll);
        }

        let parsed: Value = serde_json::from_str(value).ok()?;
        let members: Vec<&Value> = match &parsed {
            Value::Object(map) => map.values().collect(),
            Value::Array(items) => items.iter().collect(),
            _ => return None,
        };
        if !members.into_iter().any(is_truthy) {
            return None;
        }

        match parsed {
            Value::Object(map) => Some(ConsentDecision::Categories(
                map.into_iter().map(|(k, v)| (k, is_truthy(&v))).collect(),
            )),
            _ => Some(ConsentDecision::AcceptedAll),
        }
    }
}

/// True when `cookie_string` carries a recorded decision in cookie `name`.
/// Never fails; anything unreadable counts as "no decision".
pub fn has_recorded_decision(cookie_string: &str, name: &str) -> bool {
    read_cookie(cookie_string, name)
        .and_then(|value| ConsentDecision::parse(&value))
        .is_some()
}
