use crate::engine::dom::document::{Document, Element, NodeId};

/// The small selector language the widget needs to find controls and toasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// `tag`
    Tag(&'static str),
    /// `#id`
    Id(&'static str),
    /// `.class`
    Class(&'static str),
    /// `[name]`
    HasAttr(&'static str),
    /// `[name="value"]` (ASCII case-insensitive value match)
    AttrEq(&'static str, &'static str),
    /// Every inner selector matches (compound selector)
    All(Vec<Selector>),
    /// Any inner selector matches (selector list)
    Any(Vec<Selector>),
}

impl Selector {
    pub fn matches_element(&self, el: &Element) -> bool {
        match self {
            Selector::Tag(tag) => el.tag == *tag,
            Selector::Id(id) => el.attr("id") == Some(*id),
            Selector::Class(class) => el.has_class(class),
            Selector::HasAttr(name) => el.attr(name).is_some(),
            Selector::AttrEq(name, value) => el.attr(name).is_some_and(|v| v.eq_ignore_ascii_case(value)),
            Selector::All(inner) => inner.iter().all(|s| s.matches_element(el)),
            Selector::Any(inner) => inner.iter().any(|s| s.matches_element(el)),
        }
    }

    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        doc.element(id).is_some_and(|el| self.matches_element(el))
    }
}

impl Document {
    /// `root.querySelectorAll(selector)`: matching descendants in document order.
    pub fn query_all(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|n| selector.matches(self, *n))
            .collect()
    }

    /// `root.querySelector(selector)`.
    pub fn query(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|n| selector.matches(self, *n))
    }
}
