use crate::engine::errors::WidgetError;
use std::fmt::{Display, Formatter};

/// Handle of a node inside a [`Document`].
///
/// Arena slots are recycled, but every reuse bumps the slot's generation. A
/// handle to a removed node therefore stays dead even after its slot is taken
/// by a new node, so a handle held across an await can be checked with
/// [`Document::contains`] instead of silently pointing at a different node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.generation {
            0 => write!(f, "#{}", self.index),
            g => write!(f, "#{}.{}", self.index, g),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name
    pub tag: String,
    /// Attributes in source order, names lowercased
    pub attributes: Vec<Attribute>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|v| v.split_ascii_whitespace().any(|c| c == class))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// Detached container produced by the fragment parser
    Fragment,
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub data: NodeData,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena-backed document. The root is a `<body>` element; everything reachable
/// from it is "connected", everything else is detached.
#[derive(Debug, Clone)]
pub struct Document {
    slots: Vec<Slot>,
    // Indices of empty slots, reused before the arena grows
    free: Vec<usize>,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates a document with an empty body.
    pub fn new() -> Self {
        let mut doc = Self {
            slots: Vec::new(),
            free: Vec::new(),
            body: NodeId { index: 0, generation: 0 },
        };
        doc.body = doc.alloc(NodeData::Element(Element {
            tag: "body".to_string(),
            attributes: Vec::new(),
        }));
        doc
    }

    /// Creates a document whose body holds the parsed `html`.
    pub fn parse(html: &str) -> Self {
        let mut doc = Self::new();
        let fragment = doc.parse_fragment(html);
        // The body and a fresh fragment are always live
        let _ = doc.append_child(doc.body, fragment);
        doc
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let node = Node {
            parent: None,
            children: Vec::new(),
            data,
        };

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    /// Empties the slot of `id` and hands it back to the free list.
    fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index).filter(|s| s.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element(Element {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Comment(text.to_string()))
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.alloc(NodeData::Fragment)
    }

    /// True while `id` refers to a live node (attached or not).
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, WidgetError> {
        self.slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or(WidgetError::StaleNode)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.node(id)?.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn first_element_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|c| self.element(*c).is_some())
    }

    /// Sets (or replaces) attribute `name`. Names are lowercased.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), WidgetError> {
        let name = name.to_ascii_lowercase();
        let NodeData::Element(el) = &mut self.node_mut(id)?.data else {
            return Err(WidgetError::StaleNode);
        };

        match el.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value.to_string(),
            None => el.attributes.push(Attribute {
                name,
                value: value.to_string(),
            }),
        }
        Ok(())
    }

    /// Removes attribute `name`, returning whether it was present.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> bool {
        let Ok(node) = self.node_mut(id) else {
            return false;
        };
        let NodeData::Element(el) = &mut node.data else {
            return false;
        };
        let before = el.attributes.len();
        el.attributes.retain(|a| a.name != name);
        before != el.attributes.len()
    }

    /// True when `ancestor` is `id` itself or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.parent(c);
        }
        false
    }

    /// True when `id` is reachable from the body.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.contains(id) && self.is_inclusive_ancestor(self.body, id)
    }

    /// Unlinks `id` from its parent. The subtree stays alive.
    pub fn detach(&mut self, id: NodeId) -> Result<(), WidgetError> {
        let parent = self.node_mut(id)?.parent.take();
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|c| *c != id);
        }
        Ok(())
    }

    /// Appends `child` to `parent`, moving it if it is attached elsewhere.
    ///
    /// Appending a fragment moves its children and consumes the fragment.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), WidgetError> {
        if !self.contains(parent) || !self.contains(child) {
            return Err(WidgetError::StaleNode);
        }
        // A childless node can only contain `parent` by being it
        let cyclic = if self.children(child).is_empty() {
            child == parent
        } else {
            self.is_inclusive_ancestor(child, parent)
        };
        if cyclic {
            return Err(WidgetError::InvalidHierarchy);
        }

        if let Some(NodeData::Fragment) = self.node(child).map(|n| &n.data) {
            let moved = std::mem::take(&mut self.node_mut(child)?.children);
            for c in &moved {
                self.node_mut(*c)?.parent = Some(parent);
            }
            self.node_mut(parent)?.children.extend(moved);
            return self.remove(child);
        }

        self.detach(child)?;
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Detaches `id` and frees its whole subtree. The body cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> Result<(), WidgetError> {
        if id == self.body {
            return Err(WidgetError::InvalidHierarchy);
        }
        self.detach(id)?;

        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.release(cur) {
                stack.extend(node.children);
            }
        }
        Ok(())
    }

    /// Removes every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) -> Result<(), WidgetError> {
        let children = self.node_mut(id)?.children.clone();
        for c in children {
            self.remove(c)?;
        }
        Ok(())
    }

    /// All nodes below `root` in document order, `root` excluded.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(cur) = stack.pop() {
            out.push(cur);
            stack.extend(self.children(cur).iter().rev().copied());
        }
        out
    }

    /// First element in `root`'s subtree (root included) with `id` attribute `id_value`.
    pub fn find_by_id(&self, root: NodeId, id_value: &str) -> Option<NodeId> {
        std::iter::once(root)
            .chain(self.descendants(root))
            .find(|n| self.attr(*n, "id") == Some(id_value))
    }

    /// `document.getElementById`: connected elements only.
    pub fn get_element_by_id(&self, id_value: &str) -> Option<NodeId> {
        self.find_by_id(self.body, id_value)
    }

    /// Concatenated text of the subtree.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for n in std::iter::once(id).chain(self.descendants(id)) {
            if let Some(NodeData::Text(t)) = self.node(n).map(|n| &n.data) {
                out.push_str(t);
            }
        }
        out
    }

    /// Number of live nodes in the arena.
    pub fn live_nodes(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of slots the arena has allocated, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
