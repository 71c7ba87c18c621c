//! Toast notifications.
//!
//! Toasts either go to a host supplied [`ToastHost`] (the page's own toast
//! system) or are rendered as plain elements inside a lazily created container
//! and removed again once their deadline passes. Deadlines are driven by
//! [`ToastBridge::expire`], which the widget calls from its tick.

use crate::engine::dom::{Document, NodeId, Selector};
use crate::engine::errors::WidgetError;
use crate::engine::sanitizer::sanitize;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Unique toast identifier
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ToastId(Uuid);

impl ToastId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ToastId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ToastId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A toast currently in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ToastEntry {
    pub id: ToastId,
    pub node: NodeId,
    pub message: String,
    pub title: Option<String>,
    /// `None` when the host animates the toast and owns its dismissal.
    pub expires_at: Option<Instant>,
}

/// The page's own toast system, when it has one.
pub trait ToastHost {
    /// Shows a plain message toast.
    fn show(&mut self, message: &str, title: Option<&str>);

    /// Animates a server rendered toast element already placed in the
    /// container. Once called, the host is responsible for dismissing it.
    fn animate(&mut self, _doc: &Document, _node: NodeId) {}
}

/// Elements recognised as toasts inside a server fragment.
pub fn toast_selector() -> Selector {
    Selector::Any(vec![Selector::Class("toast"), Selector::HasAttr("data-toast")])
}

pub struct ToastBridge {
    container_id: String,
    host: Option<Box<dyn ToastHost>>,
    entries: Vec<ToastEntry>,
}

impl ToastBridge {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            host: None,
            entries: Vec::new(),
        }
    }

    pub fn with_host(mut self, host: Box<dyn ToastHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    pub fn entries(&self) -> &[ToastEntry] {
        &self.entries
    }

    /// Shows `message`, through the host when present, otherwise as a native
    /// element removed after `duration`.
    pub fn show(
        &mut self,
        doc: &mut Document,
        message: &str,
        title: Option<&str>,
        duration: Duration,
        now: Instant,
    ) -> Result<ToastId, WidgetError> {
        let id = ToastId::new();

        if let Some(host) = self.host.as_mut() {
            host.show(message, title);
            return Ok(id);
        }

        let container = self.ensure_container(doc)?;
        let toast = doc.create_element("div");
        doc.set_attr(toast, "class", "toast")?;
        doc.set_attr(toast, "role", "status")?;
        doc.set_attr(toast, "data-toast", &id.to_string())?;

        if let Some(title) = title {
            let heading = doc.create_element("span");
            doc.set_attr(heading, "class", "toast-title")?;
            let text = doc.create_text(title);
            doc.append_child(heading, text)?;
            doc.append_child(toast, heading)?;
        }

        let body = doc.create_element("p");
        doc.set_attr(body, "class", "toast-body")?;
        let text = doc.create_text(message);
        doc.append_child(body, text)?;
        doc.append_child(toast, body)?;
        doc.append_child(container, toast)?;

        self.entries.push(ToastEntry {
            id,
            node: toast,
            message: message.to_string(),
            title: title.map(str::to_string),
            expires_at: Some(now + duration),
        });
        Ok(id)
    }

    /// Places the first toast-shaped element of `html` into the container.
    ///
    /// Returns `None` when the fragment holds no toast that survives
    /// sanitizing; nothing is added to the document in that case.
    pub fn inject_from_fragment(
        &mut self,
        doc: &mut Document,
        html: &str,
        duration: Duration,
        now: Instant,
    ) -> Result<Option<ToastEntry>, WidgetError> {
        let fragment = doc.parse_fragment(html);
        let Some(found) = doc.query(fragment, &toast_selector()) else {
            doc.remove(fragment)?;
            return Ok(None);
        };

        // Sanitize the toast on its own, so its own attributes are checked too
        let holder = doc.create_fragment();
        doc.append_child(holder, found)?;
        doc.remove(fragment)?;
        sanitize(doc, holder);

        let Some(toast) = doc.first_element_child(holder) else {
            doc.remove(holder)?;
            return Ok(None);
        };

        let container = self.ensure_container(doc)?;
        doc.append_child(container, toast)?;
        doc.remove(holder)?;

        let expires_at = match self.host.as_mut() {
            Some(host) => {
                host.animate(doc, toast);
                None
            }
            None => Some(now + duration),
        };

        let entry = ToastEntry {
            id: ToastId::new(),
            node: toast,
            message: doc.text_content(toast).trim().to_string(),
            title: None,
            expires_at,
        };
        self.entries.push(entry.clone());
        Ok(Some(entry))
    }

    /// Removes a toast before its deadline. Unknown ids are ignored.
    pub fn dismiss(&mut self, doc: &mut Document, id: ToastId) -> Result<bool, WidgetError> {
        let Some(pos) = self.entries.iter().position(|e| e.id == id) else {
            return Ok(false);
        };
        let entry = self.entries.remove(pos);
        if doc.contains(entry.node) {
            doc.remove(entry.node)?;
        }
        Ok(true)
    }

    /// Removes every toast whose deadline has passed.
    pub fn expire(&mut self, doc: &mut Document, now: Instant) -> Result<Vec<ToastId>, WidgetError> {
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|e| e.expires_at.is_some_and(|at| at <= now));
        self.entries = kept;

        let mut ids = Vec::with_capacity(expired.len());
        for entry in expired {
            if doc.contains(entry.node) {
                doc.remove(entry.node)?;
            }
            ids.push(entry.id);
        }
        Ok(ids)
    }

    /// Removes every toast, timed or not.
    pub fn clear(&mut self, doc: &mut Document) -> Result<Vec<ToastId>, WidgetError> {
        let mut ids = Vec::with_capacity(self.entries.len());
        for entry in std::mem::take(&mut self.entries) {
            if doc.contains(entry.node) {
                doc.remove(entry.node)?;
            }
            ids.push(entry.id);
        }
        Ok(ids)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().filter_map(|e| e.expires_at).min()
    }

    fn ensure_container(&self, doc: &mut Document) -> Result<NodeId, WidgetError> {
        if let Some(existing) = doc.get_element_by_id(&self.container_id) {
            return Ok(existing);
        }

        let container = doc.create_element("div");
        doc.set_attr(container, "id", &self.container_id)?;
        doc.set_attr(container, "aria-live", "polite")?;
        doc.append_child(doc.body(), container)?;
        Ok(container)
    }
}
