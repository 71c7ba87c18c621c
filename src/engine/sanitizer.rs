//! Allow-list cleaner for server supplied fragments.
//!
//! Runs on a detached fragment before it is attached to the live document. It is
//! a second line of defence for first-party markup, not a general purpose HTML
//! sanitizer: it neutralizes inline scripts, inline event handlers and
//! script-scheme URLs, and drops every element outside a short allow-list.
//!
//! Sanitizing is idempotent and never fails.

use crate::engine::dom::{Document, NodeData, NodeId};

/// Elements allowed to survive sanitization.
pub const ALLOWED_TAGS: &[&str] = &[
    "div", "p", "span", "button", "a", "ul", "ol", "li", "input", "label", "section", "article",
    "form",
];

/// URL-carrying attributes that get their scheme checked.
const URL_ATTRIBUTES: &[&str] = &["href", "src"];

/// What a sanitize pass changed. Only used for diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SanitizeReport {
    pub scripts_removed: usize,
    pub elements_removed: usize,
    pub attributes_stripped: usize,
}

impl SanitizeReport {
    pub fn is_clean(&self) -> bool {
        self.scripts_removed == 0 && self.elements_removed == 0 && self.attributes_stripped == 0
    }
}

/// True for inline event handler attributes (`onclick`, `onerror`, ...).
pub fn is_event_handler(name: &str) -> bool {
    name.len() > 2 && name.as_bytes()[..2].eq_ignore_ascii_case(b"on")
}

/// True when `value` starts with a scheme that executes script or embeds HTML.
///
/// Browsers ignore ASCII whitespace and control characters inside the scheme,
/// so `" java\tscript:"` counts too.
pub fn is_dangerous_url(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();

    compact.starts_with("javascript:") || compact.starts_with("vbscript:") || compact.starts_with("data:text/html")
}

/// Sanitizes everything below `root` in place. `root` itself is never removed.
pub fn sanitize(doc: &mut Document, root: NodeId) -> SanitizeReport {
    let mut report = SanitizeReport::default();

    if !doc.contains(root) {
        log::debug!("Sanitizer: root {} is gone, nothing to do", root);
        return report;
    }

    // Pass 1: scripts, outright
    for node in doc.descendants(root) {
        if doc.tag_name(node) == Some("script") {
            if doc.remove(node).is_err() {
                log::warn!("Sanitizer: stopping early, could not remove script {}", node);
                return report;
            }
            report.scripts_removed += 1;
        }
    }

    // Pass 2: allow-list and attributes
    for node in doc.descendants(root) {
        // Already freed as part of a removed ancestor
        if !doc.contains(node) {
            continue;
        }

        let Some(NodeData::Element(el)) = doc.node(node).map(|n| &n.data) else {
            continue;
        };

        if !ALLOWED_TAGS.contains(&el.tag.as_str()) {
            if doc.remove(node).is_err() {
                log::warn!("Sanitizer: stopping early, could not remove {}", node);
                return report;
            }
            report.elements_removed += 1;
            continue;
        }

        let doomed: Vec<String> = el
            .attributes
            .iter()
            .filter(|a| {
                is_event_handler(&a.name)
                    || (URL_ATTRIBUTES.contains(&a.name.as_str()) && is_dangerous_url(&a.value))
            })
            .map(|a| a.name.clone())
            .collect();

        for name in doomed {
            if doc.remove_attr(node, &name) {
                report.attributes_stripped += 1;
            }
        }
    }

    if !report.is_clean() {
        log::debug!("Sanitizer: cleaned fragment {}: {:?}", root, report);
    }
    report
}
