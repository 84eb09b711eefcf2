//! Node abstraction consumed by the evaluation core.
//!
//! The engine never owns a tree. Hosts implement [`XdmNode`] over their own
//! representation; [`simple::SimpleNode`] is the in-memory implementation used
//! by tests and benches.
use crate::engine::runtime::{Error, ErrorCode};
use crate::xdm::XdmAtomicValue;
use core::cmp::Ordering;

pub mod simple;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: Option<String>,
}

impl QName {
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local: local.into(),
            ns_uri: None,
        }
    }
}

/// Compare two nodes by ancestry and stable sibling order.
///
/// - An ancestor precedes its descendants.
/// - Among siblings, attributes precede child nodes; each group keeps the
///   order provided by the adapter.
/// - Nodes from different roots cannot be ordered by this fallback and yield
///   `err:FOER0000`. Adapters with multi-root forests must override
///   [`XdmNode::compare_document_order`].
pub fn try_compare_by_ancestry<N: XdmNode>(a: &N, b: &N) -> Result<Ordering, Error> {
    if a == b {
        return Ok(Ordering::Equal);
    }
    fn path_to_root<N: XdmNode>(mut n: N) -> Vec<N> {
        let mut p = vec![n.clone()];
        while let Some(parent) = n.parent() {
            p.push(parent.clone());
            n = parent;
        }
        p.reverse();
        p
    }
    let pa = path_to_root(a.clone());
    let pb = path_to_root(b.clone());
    let len = pa.len().min(pb.len());
    let i = pa.iter().zip(pb.iter()).take_while(|(x, y)| x == y).count();
    if i == len {
        return Ok(pa.len().cmp(&pb.len()));
    }
    if i == 0 {
        return Err(Error::from_code(
            ErrorCode::FOER0000,
            "document order requires adapter: nodes from different roots",
        ));
    }
    let parent = &pa[i - 1];
    let (na, nb) = (&pa[i], &pb[i]);
    let position = |target: &N| {
        parent
            .attributes()
            .chain(parent.children())
            .position(|n| &n == target)
    };
    Ok(match (position(na), position(nb)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => Ordering::Equal,
    })
}

pub trait XdmNode: Clone + Eq + core::fmt::Debug + Send + Sync + 'static {
    type Children<'a>: Iterator<Item = Self> + Send + 'a
    where
        Self: 'a;
    type Attributes<'a>: Iterator<Item = Self> + Send + 'a
    where
        Self: 'a;

    fn kind(&self) -> NodeKind;
    fn name(&self) -> Option<QName>;
    fn string_value(&self) -> String;

    fn parent(&self) -> Option<Self>;
    fn children(&self) -> Self::Children<'_>;
    fn attributes(&self) -> Self::Attributes<'_>;

    /// Typed value used by atomization. Untyped trees yield `xs:untypedAtomic`
    /// for documents, elements, attributes and text; comments and processing
    /// instructions yield `xs:string`.
    fn typed_value(&self) -> Vec<XdmAtomicValue> {
        let s = self.string_value();
        match self.kind() {
            NodeKind::Comment | NodeKind::ProcessingInstruction => vec![XdmAtomicValue::string(s)],
            _ => vec![XdmAtomicValue::untyped(s)],
        }
    }

    /// Document order comparison. The default walks ancestry and fails for
    /// nodes under different roots.
    fn compare_document_order(&self, other: &Self) -> Result<Ordering, Error> {
        try_compare_by_ancestry(self, other)
    }

    fn children_vec(&self) -> Vec<Self>
    where
        Self: Sized,
    {
        self.children().collect()
    }

    fn attributes_vec(&self) -> Vec<Self>
    where
        Self: Sized,
    {
        self.attributes().collect()
    }
}
