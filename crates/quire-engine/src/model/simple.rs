//! In-memory tree implementing [`XdmNode`], used by tests, benches and quick
//! prototypes.
//!
//! Trees are assembled bottom-up with small builders; parent links are fixed
//! once when the parent is built.
//!
//! ```
//! use quire_engine::model::simple::{attr, doc, elem, text};
//! use quire_engine::model::XdmNode;
//!
//! // <root id="r"><child>Hello</child><child/></root>
//! let document = doc()
//!     .child(
//!         elem("root")
//!             .attr(attr("id", "r"))
//!             .child(elem("child").child(text("Hello")))
//!             .child(elem("child")),
//!     )
//!     .build();
//! let root = document.children().next().unwrap();
//! assert_eq!(root.children().count(), 2);
//! assert_eq!(root.string_value(), "Hello");
//! ```
use crate::model::{NodeKind, QName, XdmNode};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

struct Inner {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    parent: OnceLock<Weak<Inner>>,
    attributes: Vec<SimpleNode>,
    children: Vec<SimpleNode>,
    text: OnceLock<String>,
}

/// Arc-backed node with identity equality.
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
        Arc::as_ptr(&self.0).hash(state)
    }
}

impl fmt::Debug for SimpleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("SimpleNode");
        d.field("kind", &self.0.kind);
        if let Some(name) = &self.0.name {
            d.field("name", &name.local);
        }
        if let Some(value) = &self.0.value {
            d.field("value", value);
        }
        d.finish()
    }
}

impl SimpleNode {
    fn leaf(kind: NodeKind, name: Option<QName>, value: &str) -> Self {
        SimpleNode(Arc::new(Inner {
            kind,
            name,
            value: Some(value.to_string()),
            parent: OnceLock::new(),
            attributes: Vec::new(),
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

    /// Element in a namespace; `prefix` is kept for display only.
    pub fn element_ns(prefix: Option<&str>, ns_uri: &str, local: &str) -> SimpleNodeBuilder {
        let name = QName {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
            ns_uri: Some(ns_uri.to_string()),
        };
        SimpleNodeBuilder::new(NodeKind::Element, Some(name))
    }

    pub fn attribute(name: &str, value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Attribute, Some(QName::local(name)), value)
    }

    pub fn text(value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Text, None, value)
    }

    pub fn comment(value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Comment, None, value)
    }

    pub fn pi(target: &str, data: &str) -> SimpleNode {
        Self::leaf(NodeKind::ProcessingInstruction, Some(QName::local(target)), data)
    }
}

pub struct SimpleNodeBuilder {
    kind: NodeKind,
    name: Option<QName>,
    attributes: Vec<SimpleNode>,
    children: Vec<SimpleNode>,
}

impl SimpleNodeBuilder {
    fn new(kind: NodeKind, name: Option<QName>) -> Self {
        Self {
            kind,
            name,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn child(mut self, child: impl Into<SimpleNodeOrBuilder>) -> Self {
        self.children.push(child.into().into_node());
        self
    }

    pub fn children<I>(mut self, it: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SimpleNodeOrBuilder>,
    {
        self.children.extend(it.into_iter().map(|c| c.into().into_node()));
        self
    }

    pub fn attr(mut self, attr: SimpleNode) -> Self {
        debug_assert!(attr.kind() == NodeKind::Attribute);
        self.attributes.push(attr);
        self
    }

    pub fn build(self) -> SimpleNode {
        let node = SimpleNode(Arc::new(Inner {
            kind: self.kind,
            name: self.name,
            value: None,
            parent: OnceLock::new(),
            attributes: self.attributes,
            children: self.children,
            text: OnceLock::new(),
        }));
        for n in node.0.attributes.iter().chain(node.0.children.iter()) {
            // A node can only be attached once; a second attachment keeps the first parent.
            let _ = n.0.parent.set(Arc::downgrade(&node.0));
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

impl XdmNode for SimpleNode {
    type Children<'a> = std::iter::Cloned<std::slice::Iter<'a, SimpleNode>>;
    type Attributes<'a> = std::iter::Cloned<std::slice::Iter<'a, SimpleNode>>;

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
                    fn collect(n: &SimpleNode, out: &mut String) {
                        for c in &n.0.children {
                            match c.0.kind {
                                NodeKind::Text => out.push_str(c.0.value.as_deref().unwrap_or_default()),
                                NodeKind::Element => collect(c, out),
                                _ => {}
                            }
                        }
                    }
                    let mut out = String::new();
                    collect(self, &mut out);
                    out
                })
                .clone(),
            _ => self.0.value.clone().unwrap_or_default(),
        }
    }

    fn parent(&self) -> Option<Self> {
        self.0.parent.get().and_then(Weak::upgrade).map(SimpleNode)
    }

    fn children(&self) -> Self::Children<'_> {
        self.0.children.iter().cloned()
    }

    fn attributes(&self) -> Self::Attributes<'_> {
        self.0.attributes.iter().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cmp::Ordering;

    #[test]
    fn attributes_precede_children_in_document_order() {
        let r = elem("r").attr(attr("a", "1")).child(elem("c")).build();
        let a = r.attributes().next().expect("attribute");
        let c = r.children().next().expect("child");
        assert_eq!(a.compare_document_order(&c).expect("same tree"), Ordering::Less);
        assert_eq!(r.compare_document_order(&a).expect("same tree"), Ordering::Less);
    }

    #[test]
    fn separate_roots_are_unordered() {
        let a = elem("a").build();
        let b = elem("b").build();
        let err = a.compare_document_order(&b).expect_err("different roots");
        assert_eq!(err.code.local, "FOER0000");
    }
}
