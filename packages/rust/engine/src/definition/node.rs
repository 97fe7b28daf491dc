//! Resolved definition nodes and trees.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::element::ElementInfo;
use super::{Location, QName};
use crate::runtime::Operation;

/// One item of an element's body, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyPart {
    /// Literal text content (whitespace-only runs are dropped at resolution).
    Text(String),
    /// A nested element.
    Element(DefinitionNode),
}

/// An element bound to the operation that executes it.
///
/// Immutable once resolved. Attribute values are kept raw; operations
/// evaluate them at run time.
#[derive(Clone)]
pub struct DefinitionNode {
    name: QName,
    attributes: IndexMap<String, String>,
    body: Vec<BodyPart>,
    location: Location,
    operation: Arc<dyn Operation>,
    slot: bool,
}

impl DefinitionNode {
    /// A node bound to `operation`, with no attributes or body.
    pub fn new(name: QName, operation: Arc<dyn Operation>) -> Self {
        Self {
            name,
            attributes: IndexMap::new(),
            body: Vec::new(),
            location: Location::default(),
            operation,
            slot: false,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: DefinitionNode) -> Self {
        self.body.push(BodyPart::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body.push(BodyPart::Text(text.into()));
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub(crate) fn into_slot(mut self) -> Self {
        self.slot = true;
        self
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn operation(&self) -> &Arc<dyn Operation> {
        &self.operation
    }

    pub fn info(&self) -> &ElementInfo {
        self.operation.info()
    }

    /// Whether this node fills a named slot of its parent.
    pub fn is_slot(&self) -> bool {
        self.slot
    }

    /// Raw (unevaluated) attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn body(&self) -> &[BodyPart] {
        &self.body
    }

    /// Element children in document order.
    pub fn children(&self) -> impl Iterator<Item = &DefinitionNode> {
        self.body.iter().filter_map(|part| match part {
            BodyPart::Element(node) => Some(node),
            BodyPart::Text(_) => None,
        })
    }

    /// Slot children with the given local name.
    pub fn slots<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a DefinitionNode> + use<'a, 'n> {
        self.children()
            .filter(move |c| c.slot && c.name.local == name)
    }

    /// First slot child with the given local name.
    pub fn slot(&self, name: &str) -> Option<&DefinitionNode> {
        self.slots(name).next()
    }

    /// This node plus all descendant elements.
    pub fn element_count(&self) -> usize {
        1 + self.children().map(DefinitionNode::element_count).sum::<usize>()
    }
}

impl PartialEq for DefinitionNode {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.attributes == other.attributes
            && self.body == other.body
            && self.location == other.location
            && self.slot == other.slot
            && self.info().name == other.info().name
    }
}

impl fmt::Debug for DefinitionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefinitionNode")
            .field("name", &self.name.to_string())
            .field("attributes", &self.attributes)
            .field("body", &self.body)
            .field("location", &self.location)
            .field("slot", &self.slot)
            .finish()
    }
}

/// The resolved form of one definition document.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionTree {
    root: DefinitionNode,
    source: String,
}

impl DefinitionTree {
    pub fn new(root: DefinitionNode, source: impl Into<String>) -> Self {
        Self {
            root,
            source: source.into(),
        }
    }

    pub fn root(&self) -> &DefinitionNode {
        &self.root
    }

    /// Identity of the configuration source the tree was resolved from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of elements in the tree.
    pub fn node_count(&self) -> usize {
        self.root.element_count()
    }
}
