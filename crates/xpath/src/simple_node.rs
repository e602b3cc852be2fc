//! Immutable Arc-backed tree implementing [`XdmNode`].
//!
//! Trees are assembled bottom-up with [`SimpleNodeBuilder`]; once built a node never changes,
//! so trees can be shared freely between threads. The XML loader in [`crate::xml`] produces
//! the same representation.
//!
//! ```
//! use relay_xpath::simple_node::{attr, doc, elem, text};
//! use relay_xpath::XdmNode;
//!
//! // <order id="7"><item>pen</item><item>ink</item></order>
//! let document = doc()
//!     .child(
//!         elem("order")
//!             .attr(attr("id", "7"))
//!             .child(elem("item").child(text("pen")))
//!             .child(elem("item").child(text("ink"))),
//!     )
//!     .build();
//! let order = document.children()[0].clone();
//! assert_eq!(order.string_value(), "penink");
//! assert_eq!(order.attributes()[0].string_value(), "7");
//! ```
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::model::{NodeKind, QName, XdmNode};

struct Inner {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    parent: OnceLock<Weak<Inner>>,
    attributes: Vec<SimpleNode>,
    namespaces: Vec<SimpleNode>,
    children: Vec<SimpleNode>,
    text: OnceLock<String>,
}

/// A node of an immutable in-memory tree. Equality is identity.
#[derive(Clone)]
pub struct SimpleNode(Arc<Inner>);

impl PartialEq for SimpleNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SimpleNode {}

impl std::hash::Hash for SimpleNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for SimpleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleNode")
            .field("kind", &self.0.kind)
            .field("name", &self.0.name)
            .field("value", &self.0.value)
            .finish_non_exhaustive()
    }
}

impl SimpleNode {
    fn leaf(kind: NodeKind, name: Option<QName>, value: Option<String>) -> Self {
        SimpleNode(Arc::new(Inner {
            kind,
            name,
            value,
            parent: OnceLock::new(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
            children: Vec::new(),
            text: OnceLock::new(),
        }))
    }

    pub fn document() -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Document, None)
    }

    pub fn element(name: &str) -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Element, Some(QName::local(name)))
    }

    pub fn element_qname(name: QName) -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Element, Some(name))
    }

    pub fn attribute(name: &str, value: &str) -> SimpleNode {
        Self::attribute_qname(QName::local(name), value)
    }

    pub fn attribute_qname(name: QName, value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Attribute, Some(name), Some(value.to_string()))
    }

    pub fn text(value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Text, None, Some(value.to_string()))
    }

    pub fn comment(value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Comment, None, Some(value.to_string()))
    }

    pub fn pi(target: &str, data: &str) -> SimpleNode {
        Self::leaf(NodeKind::ProcessingInstruction, Some(QName::local(target)), Some(data.to_string()))
    }

    pub fn namespace(prefix: &str, uri: &str) -> SimpleNode {
        let name = QName { prefix: None, local: prefix.to_string(), ns_uri: None };
        Self::leaf(NodeKind::Namespace, Some(name), Some(uri.to_string()))
    }

    /// Resolves `prefix` against the namespace nodes of this node and its ancestors.
    pub fn lookup_namespace_uri(&self, prefix: &str) -> Option<String> {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if let Some(uri) = node
                .0
                .namespaces
                .iter()
                .find(|ns| ns.0.name.as_ref().is_some_and(|q| q.local == prefix))
                .and_then(|ns| ns.0.value.clone())
            {
                return Some(uri);
            }
            current = node.parent();
        }
        None
    }

    fn collect_text(&self, out: &mut String) {
        let mut pending: Vec<&SimpleNode> = self.0.children.iter().rev().collect();
        while let Some(node) = pending.pop() {
            match node.0.kind {
                NodeKind::Text => out.push_str(node.0.value.as_deref().unwrap_or_default()),
                NodeKind::Element => pending.extend(node.0.children.iter().rev()),
                _ => {}
            }
        }
    }
}

impl Drop for Inner {
    // Unlinks subtrees onto a work list so that dropping a deep tree does not recurse once
    // per level.
    fn drop(&mut self) {
        if self.children.is_empty() && self.attributes.is_empty() && self.namespaces.is_empty() {
            return;
        }
        let mut pending = std::mem::take(&mut self.children);
        pending.append(&mut self.attributes);
        pending.append(&mut self.namespaces);
        while let Some(node) = pending.pop() {
            if let Ok(mut inner) = Arc::try_unwrap(node.0) {
                pending.append(&mut inner.children);
                pending.append(&mut inner.attributes);
                pending.append(&mut inner.namespaces);
            }
        }
    }
}

/// Builds one node together with its attributes, namespace nodes and children.
///
/// A node keeps the parent it is first attached to; attaching it to a second tree is a
/// programming error.
pub struct SimpleNodeBuilder {
    kind: NodeKind,
    name: Option<QName>,
    attributes: Vec<SimpleNode>,
    namespaces: Vec<SimpleNode>,
    children: Vec<SimpleNode>,
}

impl SimpleNodeBuilder {
    fn new(kind: NodeKind, name: Option<QName>) -> Self {
        Self { kind, name, attributes: Vec::new(), namespaces: Vec::new(), children: Vec::new() }
    }

    #[must_use]
    pub fn child(mut self, child: impl Into<SimpleNodeOrBuilder>) -> Self {
        self.children.push(child.into().into_node());
        self
    }

    #[must_use]
    pub fn children<I: IntoIterator<Item = SimpleNodeOrBuilder>>(mut self, it: I) -> Self {
        self.children.extend(it.into_iter().map(SimpleNodeOrBuilder::into_node));
        self
    }

    #[must_use]
    pub fn attr(mut self, attr: SimpleNode) -> Self {
        debug_assert_eq!(attr.kind(), NodeKind::Attribute);
        self.attributes.push(attr);
        self
    }

    #[must_use]
    pub fn namespace(mut self, ns: SimpleNode) -> Self {
        debug_assert_eq!(ns.kind(), NodeKind::Namespace);
        self.namespaces.push(ns);
        self
    }

    pub fn build(self) -> SimpleNode {
        let node = SimpleNode(Arc::new(Inner {
            kind: self.kind,
            name: self.name,
            value: None,
            parent: OnceLock::new(),
            attributes: self.attributes,
            namespaces: self.namespaces,
            children: self.children,
            text: OnceLock::new(),
        }));
        let weak = Arc::downgrade(&node.0);
        for member in node.0.attributes.iter().chain(&node.0.namespaces).chain(&node.0.children) {
            let attached = member.0.parent.set(weak.clone()).is_ok();
            debug_assert!(attached, "node is already part of another tree");
        }
        node
    }
}

pub enum SimpleNodeOrBuilder {
    Built(SimpleNode),
    Builder(SimpleNodeBuilder),
}

impl SimpleNodeOrBuilder {
    fn into_node(self) -> SimpleNode {
        match self {
            SimpleNodeOrBuilder::Built(n) => n,
            SimpleNodeOrBuilder::Builder(b) => b.build(),
        }
    }
}

impl From<SimpleNode> for SimpleNodeOrBuilder {
    fn from(n: SimpleNode) -> Self {
        SimpleNodeOrBuilder::Built(n)
    }
}

impl From<SimpleNodeBuilder> for SimpleNodeOrBuilder {
    fn from(b: SimpleNodeBuilder) -> Self {
        SimpleNodeOrBuilder::Builder(b)
    }
}

pub fn doc() -> SimpleNodeBuilder {
    SimpleNode::document()
}

pub fn elem(name: &str) -> SimpleNodeBuilder {
    SimpleNode::element(name)
}

pub fn text(v: &str) -> SimpleNode {
    SimpleNode::text(v)
}

pub fn attr(name: &str, v: &str) -> SimpleNode {
    SimpleNode::attribute(name, v)
}

pub fn comment(v: &str) -> SimpleNode {
    SimpleNode::comment(v)
}

pub fn ns(prefix: &str, uri: &str) -> SimpleNode {
    SimpleNode::namespace(prefix, uri)
}

impl XdmNode for SimpleNode {
    fn kind(&self) -> NodeKind {
        self.0.kind
    }

    fn name(&self) -> Option<QName> {
        self.0.name.clone()
    }

    fn string_value(&self) -> String {
        match self.0.kind {
            NodeKind::Element | NodeKind::Document => self
                .0
                .text
                .get_or_init(|| {
                    let mut out = String::new();
                    self.collect_text(&mut out);
                    out
                })
                .clone(),
            _ => self.0.value.clone().unwrap_or_default(),
        }
    }

    fn parent(&self) -> Option<Self> {
        self.0.parent.get().and_then(Weak::upgrade).map(SimpleNode)
    }

    fn children(&self) -> Vec<Self> {
        self.0.children.clone()
    }

    fn attributes(&self) -> Vec<Self> {
        self.0.attributes.clone()
    }

    fn namespaces(&self) -> Vec<Self> {
        self.0.namespaces.clone()
    }
}
