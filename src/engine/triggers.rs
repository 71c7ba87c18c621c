//! Server pushed UI events.
//!
//! Fragment-swap responses may carry an `HX-Trigger` header holding a JSON
//! object of event names. Two are understood here: `removeConsentBanner` and
//! `showToast: { html }`. The header must be strict JSON; anything else is
//! ignored rather than guessed at.

use crate::engine::cookies::is_truthy;
use http::HeaderMap;
use serde_json::Value;

pub const TRIGGER_HEADER: &str = "HX-Trigger";

/// Local actions requested by one trigger header. Both may be set at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerActions {
    pub remove_banner: bool,
    pub toast_html: Option<String>,
}

impl TriggerActions {
    pub fn is_empty(&self) -> bool {
        !self.remove_banner && self.toast_html.is_none()
    }
}

/// Parses a trigger header value. `None` when it is not a JSON object.
pub fn parse_trigger(raw: &str) -> Option<TriggerActions> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("Triggers: ignoring header that is not strict JSON: {}", e);
            return None;
        }
    };
    let Value::Object(map) = value else {
        log::debug!("Triggers: ignoring header that is not a JSON object");
        return None;
    };

    let remove_banner = map.get("removeConsentBanner").is_some_and(is_truthy);
    let toast_html = map
        .get("showToast")
        .and_then(|t| t.get("html"))
        .and_then(Value::as_str)
        .filter(|html| !html.trim().is_empty())
        .map(str::to_string);

    Some(TriggerActions {
        remove_banner,
        toast_html,
    })
}

/// Reads and parses the trigger header of a response, if it has one.
pub fn from_headers(headers: &HeaderMap) -> Option<TriggerActions> {
    let raw = headers.get(TRIGGER_HEADER)?.to_str().ok()?;
    parse_trigger(raw)
}
