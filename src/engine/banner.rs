//! Banner lifecycle: states, mounting, control wiring and teardown.
//!
//! The controller owns the banner subtree once mounted. Deciding *when* to
//! fetch or tear down is the widget's job; this module only performs the DOM
//! side of each transition.

use crate::engine::config::WidgetConfig;
use crate::engine::dom::{structurally_equal, Document, Element, NodeData, NodeId};
use crate::engine::errors::WidgetError;
use crate::engine::sanitizer::sanitize;
use std::fmt::{Display, Formatter};

/// Lifecycle of the banner on one page.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum BannerState {
    /// Page not ready yet
    #[default]
    Unloaded,
    /// Looking at the decision cookie
    Checking,
    /// Auto loading is off; waiting for an explicit load
    NoBannerNeeded,
    /// Banner request in flight
    Fetching,
    /// Banner is in the document and wired
    Mounted,
    /// Banner is gone for this page
    Dismissed,
}

impl Display for BannerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BannerState::Unloaded => "unloaded",
            BannerState::Checking => "checking",
            BannerState::NoBannerNeeded => "no-banner-needed",
            BannerState::Fetching => "fetching",
            BannerState::Mounted => "mounted",
            BannerState::Dismissed => "dismissed",
        };
        write!(f, "{}", name)
    }
}

/// What a wired banner control does.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ControlKind {
    AcceptAll,
    RejectAll,
    Close,
    /// Granular category checkbox
    Preference,
}

impl ControlKind {
    /// Accept-all, reject-all and close. Disabled while a decision is posted.
    pub fn is_action(self) -> bool {
        !matches!(self, ControlKind::Preference)
    }
}

/// Recognises a banner control.
///
/// `data-consent-action` wins; the legacy ids (`consent-accept-all`, ...) and
/// legacy attributes (`data-accept-all`, ...) are still honoured.
pub fn classify_control(el: &Element) -> Option<ControlKind> {
    if let Some(action) = el.attr("data-consent-action") {
        return match action.trim().to_ascii_lowercase().as_str() {
            "accept-all" => Some(ControlKind::AcceptAll),
            "reject-all" => Some(ControlKind::RejectAll),
            "close" => Some(ControlKind::Close),
            _ => None,
        };
    }

    match el.attr("id") {
        Some("consent-accept-all") => return Some(ControlKind::AcceptAll),
        Some("consent-reject-all") => return Some(ControlKind::RejectAll),
        Some("consent-close") => return Some(ControlKind::Close),
        _ => {}
    }

    if el.attr("data-accept-all").is_some() {
        return Some(ControlKind::AcceptAll);
    }
    if el.attr("data-reject-all").is_some() {
        return Some(ControlKind::RejectAll);
    }
    if el.attr("data-consent-close").is_some() {
        return Some(ControlKind::Close);
    }

    let is_checkbox = el.tag == "input" && el.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("checkbox"));
    is_checkbox.then_some(ControlKind::Preference)
}

/// Result of rendering a banner response.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A new banner was mounted
    Mounted(NodeId),
    /// Same structure as the mounted banner; nothing was replaced
    Unchanged(NodeId),
    /// Nothing to show
    Empty,
}

pub struct BannerController {
    slot_id: String,
    banner_id: String,
    state: BannerState,
    banner: Option<NodeId>,
    // Wired controls in document order; a node appears at most once
    bindings: Vec<(NodeId, ControlKind)>,
    busy: bool,
}

impl BannerController {
    pub fn new(config: &WidgetConfig) -> Self {
        Self {
            slot_id: config.banner_slot_id.clone(),
            banner_id: config.banner_id.clone(),
            state: BannerState::default(),
            banner: None,
            bindings: Vec::new(),
            busy: false,
        }
    }

    pub fn state(&self) -> BannerState {
        self.state
    }

    /// Moves to `to`, returning the previous state if it changed.
    pub fn set_state(&mut self, to: BannerState) -> Option<BannerState> {
        let from = std::mem::replace(&mut self.state, to);
        (from != to).then_some(from)
    }

    /// The mounted banner, or any connected element carrying the banner id.
    pub fn live_banner(&self, doc: &Document) -> Option<NodeId> {
        self.banner
            .filter(|b| doc.is_connected(*b))
            .or_else(|| doc.get_element_by_id(&self.banner_id))
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Wired controls, in document order.
    pub fn controls(&self) -> Vec<(NodeId, ControlKind)> {
        self.bindings.clone()
    }

    fn binding(&self, node: NodeId) -> Option<ControlKind> {
        self.bindings.iter().find(|(n, _)| *n == node).map(|(_, k)| *k)
    }

    /// Parses, sanitizes and mounts `html` into the slot.
    pub fn render(&mut self, doc: &mut Document, html: &str) -> Result<RenderOutcome, WidgetError> {
        if html.trim().is_empty() {
            return Ok(RenderOutcome::Empty);
        }

        let fragment = doc.parse_fragment(html);
        let report = sanitize(doc, fragment);
        if !report.is_clean() {
            log::debug!("BannerController: banner fragment needed cleaning: {:?}", report);
        }

        let Some(top) = doc.first_element_child(fragment) else {
            doc.remove(fragment)?;
            return Ok(RenderOutcome::Empty);
        };

        let current = self.live_banner(doc);
        if let Some(current) = current {
            if structurally_equal(doc, current, top) {
                doc.remove(fragment)?;
                self.banner = Some(current);
                self.wire(doc);
                return Ok(RenderOutcome::Unchanged(current));
            }
            doc.remove(current)?;
        }

        let slot = self.ensure_slot(doc)?;
        doc.clear_children(slot)?;
        self.bindings.retain(|(node, _)| doc.contains(*node));

        doc.append_child(slot, fragment)?;
        let banner = doc.find_by_id(slot, &self.banner_id).unwrap_or(top);
        self.banner = Some(banner);
        self.wire(doc);

        Ok(RenderOutcome::Mounted(banner))
    }

    /// Wires every control of the banner that is not wired yet. Returns the
    /// number of newly wired controls.
    pub fn wire(&mut self, doc: &Document) -> usize {
        let Some(banner) = self.banner.filter(|b| doc.contains(*b)) else {
            return 0;
        };

        let mut added = 0;
        for node in std::iter::once(banner).chain(doc.descendants(banner)) {
            if self.binding(node).is_some() {
                continue;
            }
            if let Some(kind) = doc.element(node).and_then(classify_control) {
                self.bindings.push((node, kind));
                added += 1;
            }
        }

        if added > 0 {
            log::debug!("BannerController: wired {} control(s) on {}", added, banner);
        }
        added
    }

    /// The wired control `target` belongs to (itself or its closest wired
    /// ancestor inside the banner).
    pub fn control_at(&self, doc: &Document, target: NodeId) -> Option<(NodeId, ControlKind)> {
        let banner = self.banner.filter(|b| doc.contains(*b))?;
        if !doc.is_inclusive_ancestor(banner, target) {
            return None;
        }

        let mut cur = Some(target);
        while let Some(node) = cur {
            if let Some(kind) = self.binding(node) {
                return Some((node, kind));
            }
            if node == banner {
                break;
            }
            cur = doc.parent(node);
        }
        None
    }

    /// Disables (or re-enables) the action controls while a decision is posted.
    pub fn set_busy(&mut self, doc: &mut Document, busy: bool) -> Result<(), WidgetError> {
        self.busy = busy;
        for (node, kind) in self.controls() {
            if !kind.is_action() || !doc.contains(node) {
                continue;
            }
            if busy {
                doc.set_attr(node, "disabled", "")?;
                doc.set_attr(node, "aria-busy", "true")?;
            } else {
                doc.remove_attr(node, "disabled");
                doc.remove_attr(node, "aria-busy");
            }
        }
        Ok(())
    }

    /// Removes the banner, any stray element with the banner id, and the slot
    /// once it holds nothing else. Returns whether anything was removed.
    pub fn teardown(&mut self, doc: &mut Document) -> Result<bool, WidgetError> {
        let mut removed = false;

        if let Some(banner) = self.banner.take().filter(|b| doc.contains(*b)) {
            doc.remove(banner)?;
            removed = true;
        }
        while let Some(stray) = doc.get_element_by_id(&self.banner_id) {
            doc.remove(stray)?;
            removed = true;
        }

        if let Some(slot) = doc.get_element_by_id(&self.slot_id) {
            let empty = doc.children(slot).iter().all(|c| match doc.node(*c).map(|n| &n.data) {
                Some(NodeData::Text(t)) => t.trim().is_empty(),
                Some(NodeData::Comment(_)) => true,
                _ => false,
            });
            if empty {
                doc.remove(slot)?;
                removed = true;
            }
        }

        self.bindings.clear();
        self.busy = false;
        Ok(removed)
    }

    fn ensure_slot(&self, doc: &mut Document) -> Result<NodeId, WidgetError> {
        if let Some(slot) = doc.get_element_by_id(&self.slot_id) {
            return Ok(slot);
        }

        let slot = doc.create_element("div");
        doc.set_attr(slot, "id", &self.slot_id)?;
        doc.append_child(doc.body(), slot)?;
        Ok(slot)
    }
}
