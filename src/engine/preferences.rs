//! Granular preferences: collecting checkbox state and debouncing saves.

use crate::engine::dom::{Document, Element, NodeId, Selector};
use crate::engine::errors::WidgetError;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// `input[type=checkbox]`
pub fn checkbox_selector() -> Selector {
    Selector::All(vec![Selector::Tag("input"), Selector::AttrEq("type", "checkbox")])
}

/// Category slug of a checkbox: `data-consent-slug`, falling back to `name`.
pub fn preference_slug(el: &Element) -> Option<&str> {
    el.attr("data-consent-slug")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| el.attr("name").map(str::trim).filter(|s| !s.is_empty()))
}

/// Reflects a checkbox toggle in the document.
pub fn set_checked(doc: &mut Document, node: NodeId, checked: bool) -> Result<(), WidgetError> {
    if checked {
        doc.set_attr(node, "checked", "")
    } else {
        doc.remove_attr(node, "checked");
        Ok(())
    }
}

/// Maps every slugged checkbox below `banner` to its checked state. Controls
/// without a slug are skipped; the last control wins on duplicate slugs.
pub fn collect_preferences(doc: &Document, banner: NodeId) -> BTreeMap<String, bool> {
    doc.query_all(banner, &checkbox_selector())
        .into_iter()
        .filter_map(|node| {
            let el = doc.element(node)?;
            let slug = preference_slug(el)?;
            Some((slug.to_string(), el.attr("checked").is_some()))
        })
        .collect()
}

/// Trailing-edge debounce for granular saves. Every change restarts the
/// timer; only the last one within a quiet period results in a save.
#[derive(Debug, Clone)]
pub struct PreferenceSaver {
    delay: Duration,
    deadline: Option<Instant>,
}

impl PreferenceSaver {
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None }
    }

    /// (Re)starts the timer.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Stops a pending save. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True exactly once when the timer has run out.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(at) if at <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
