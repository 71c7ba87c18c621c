// src/engine/dom.rs
//! Minimal document model: an arena of nodes, a lenient fragment parser, a
//! serializer and the handful of selectors the widget needs.
//!
//! This is the "render fragment into container" primitive of the widget. A host
//! embedding the widget either renders straight from this tree or mirrors the
//! mutations onto its own DOM.

mod document;
mod parser;
mod selector;
mod serialize;

pub use document::{Attribute, Document, Element, Node, NodeData, NodeId};
pub use selector::Selector;
pub use serialize::structurally_equal;
