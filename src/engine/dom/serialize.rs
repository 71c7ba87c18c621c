use crate::engine::dom::document::{Document, Element, NodeData, NodeId};
use crate::engine::dom::parser::VOID_ELEMENTS;
use std::collections::BTreeMap;

fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

/// Work item of the serializer's explicit stack.
enum Step<'a> {
    Enter(NodeId),
    Close(&'a str),
}

impl Document {
    /// Serializes `id` and its subtree.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    /// Serializes the children of `id`.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for c in self.children(id) {
            self.write_node(*c, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let mut stack = vec![Step::Enter(id)];

        while let Some(step) = stack.pop() {
            let id = match step {
                Step::Enter(id) => id,
                Step::Close(tag) => {
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                    continue;
                }
            };
            let Some(node) = self.node(id) else {
                continue;
            };

            match &node.data {
                NodeData::Fragment => {}
                NodeData::Text(t) => escape_text(t, out),
                NodeData::Comment(t) => {
                    out.push_str("<!--");
                    out.push_str(t);
                    out.push_str("-->");
                }
                NodeData::Element(el) => {
                    out.push('<');
                    out.push_str(&el.tag);
                    for attr in &el.attributes {
                        out.push(' ');
                        out.push_str(&attr.name);
                        out.push_str("=\"");
                        escape_attr(&attr.value, out);
                        out.push('"');
                    }
                    out.push('>');

                    if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                        continue;
                    }
                    stack.push(Step::Close(&el.tag));
                }
            }
            stack.extend(node.children.iter().rev().map(|c| Step::Enter(*c)));
        }
    }

    /// Children that take part in structural comparison: elements and
    /// non-blank text. Comments and whitespace-only text are layout noise.
    fn significant_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| match self.node(*c).map(|n| &n.data) {
                Some(NodeData::Element(_)) => true,
                Some(NodeData::Text(t)) => !t.trim().is_empty(),
                _ => false,
            })
            .collect()
    }
}

/// Structural equality of two subtrees of `doc`.
///
/// Tags must match, attributes are compared as a set (order does not matter),
/// text is compared trimmed, comments and whitespace-only text are ignored.
pub fn structurally_equal(doc: &Document, a: NodeId, b: NodeId) -> bool {
    let mut pending = vec![(a, b)];

    while let Some((a, b)) = pending.pop() {
        let (Some(na), Some(nb)) = (doc.node(a), doc.node(b)) else {
            return false;
        };

        let same_node = match (&na.data, &nb.data) {
            (NodeData::Fragment, NodeData::Fragment) => true,
            (NodeData::Text(x), NodeData::Text(y)) => x.trim() == y.trim(),
            (NodeData::Comment(x), NodeData::Comment(y)) => x == y,
            (NodeData::Element(x), NodeData::Element(y)) => {
                let attrs = |el: &Element| -> BTreeMap<String, String> {
                    el.attributes
                        .iter()
                        .map(|at| (at.name.clone(), at.value.clone()))
                        .collect()
                };
                x.tag == y.tag && attrs(x) == attrs(y)
            }
            _ => false,
        };
        if !same_node {
            return false;
        }

        let ca = doc.significant_children(a);
        let cb = doc.significant_children(b);
        if ca.len() != cb.len() {
            return false;
        }
        pending.extend(ca.into_iter().zip(cb));
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_with_escaping() {
        let mut doc = Document::new();
        let frag = doc.parse_fragment(r#"<p title="a &quot;b&quot;">1 &lt; 2 &amp; <br>x</p>"#);
        assert_eq!(doc.inner_html(frag), r#"<p title="a &quot;b&quot;">1 &lt; 2 &amp; <br>x</p>"#);
    }

    #[test]
    fn outer_html_of_fragment_is_its_content() {
        let mut doc = Document::new();
        let frag = doc.parse_fragment("<span>a</span><!--c-->");
        assert_eq!(doc.outer_html(frag), "<span>a</span><!--c-->");
    }

    #[test]
    fn attribute_order_does_not_matter() {
        let mut doc = Document::new();
        let a = doc.parse_fragment(r#"<div id="b" class="x"><p>Hi</p></div>"#);
        let b = doc.parse_fragment(r#"<div class="x" id="b">
            <p>Hi</p>
        </div>"#);
        let (a, b) = (doc.first_element_child(a).unwrap(), doc.first_element_child(b).unwrap());
        assert!(structurally_equal(&doc, a, b));
    }

    #[test]
    fn content_changes_are_detected() {
        let mut doc = Document::new();
        let a = doc.parse_fragment(r#"<div id="b"><p>Hi</p></div>"#);
        let b = doc.parse_fragment(r#"<div id="b"><p>Hello</p></div>"#);
        let c = doc.parse_fragment(r#"<div id="b" data-v="2"><p>Hi</p></div>"#);
        let (a, b, c) = (
            doc.first_element_child(a).unwrap(),
            doc.first_element_child(b).unwrap(),
            doc.first_element_child(c).unwrap(),
        );
        assert!(!structurally_equal(&doc, a, b));
        assert!(!structurally_equal(&doc, a, c));
    }

    #[test]
    fn removed_nodes_are_never_equal() {
        let mut doc = Document::new();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        assert!(structurally_equal(&doc, a, b));
        doc.remove(b).unwrap();
        assert!(!structurally_equal(&doc, a, b));
    }

    fn chain(doc: &mut Document, depth: usize) -> NodeId {
        let root = doc.create_element("div");
        let mut cur = root;
        for _ in 0..depth {
            let next = doc.create_element("span");
            doc.append_child(cur, next).unwrap();
            cur = next;
        }
        let text = doc.create_text("x");
        doc.append_child(cur, text).unwrap();
        root
    }

    #[test]
    fn deep_trees_serialize_and_compare() {
        let mut doc = Document::new();
        let a = chain(&mut doc, 100_000);
        let b = chain(&mut doc, 100_000);

        let html = doc.outer_html(a);
        assert!(html.starts_with("<div><span><span>"));
        assert!(html.ends_with("x</span></span></div>"));
        assert_eq!(html.len(), "<div></div>".len() + 100_000 * "<span></span>".len() + 1);
        assert!(structurally_equal(&doc, a, b));

        let c = chain(&mut doc, 99_999);
        assert!(!structurally_equal(&doc, a, c));
    }
}
