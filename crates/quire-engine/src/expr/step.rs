//! Axes and node tests shared by axis steps and patterns.
use crate::model::{NodeKind, QName, XdmNode};
use core::fmt;
use smallvec::SmallVec;
use string_cache::DefaultAtom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Attribute,
    SelfAxis,
    Parent,
    Descendant,
    DescendantOrSelf,
    Ancestor,
}

impl Axis {
    pub fn is_forward(&self) -> bool {
        !matches!(self, Axis::Parent | Axis::Ancestor)
    }

    /// Kind selected by a name test on this axis.
    pub fn principal_kind(&self) -> NodeKind {
        match self {
            Axis::Attribute => NodeKind::Attribute,
            _ => NodeKind::Element,
        }
    }

    /// Nodes on this axis from `node`, in document order.
    pub fn nodes<N: XdmNode>(&self, node: &N) -> SmallVec<[N; 8]> {
        self.walk(node).collect()
    }

    /// Lazy walk over the nodes on this axis from `node`, in document order.
    pub fn walk<N: XdmNode>(&self, node: &N) -> AxisWalk<N> {
        let mut walk = AxisWalk {
            pending: None,
            levels: SmallVec::new(),
            deep: matches!(self, Axis::Descendant | Axis::DescendantOrSelf),
        };
        match self {
            Axis::Child | Axis::Descendant => walk.levels.push(node.children_vec().into_iter()),
            Axis::Attribute => walk.levels.push(node.attributes_vec().into_iter()),
            Axis::SelfAxis | Axis::DescendantOrSelf => walk.pending = Some(node.clone()),
            Axis::Parent => walk.pending = node.parent(),
            Axis::Ancestor => {
                let mut chain = Vec::new();
                let mut current = node.parent();
                while let Some(p) = current {
                    current = p.parent();
                    chain.push(p);
                }
                chain.reverse();
                walk.levels.push(chain.into_iter());
            }
        }
        walk
    }

    /// Whether [`walk`](Self::walk) already holds every node before the first
    /// one is pulled.
    pub fn is_materialized(&self) -> bool {
        matches!(self, Axis::Ancestor)
    }
}

/// Pre-order walk along an axis. On the descendant axes a node's children are
/// fetched only when the walk reaches that node, so stopping early never
/// touches the rest of the subtree.
#[derive(Debug)]
pub struct AxisWalk<N> {
    pending: Option<N>,
    levels: SmallVec<[std::vec::IntoIter<N>; 8]>,
    deep: bool,
}

impl<N: XdmNode> AxisWalk<N> {
    fn visit(&mut self, node: N) -> N {
        if self.deep {
            self.levels.push(node.children_vec().into_iter());
        }
        node
    }
}

impl<N: XdmNode> Iterator for AxisWalk<N> {
    type Item = N;

    fn next(&mut self) -> Option<N> {
        if let Some(node) = self.pending.take() {
            return Some(self.visit(node));
        }
        while let Some(level) = self.levels.last_mut() {
            match level.next() {
                Some(node) => return Some(self.visit(node)),
                None => {
                    self.levels.pop();
                }
            }
        }
        None
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::Child => "child",
            Axis::Attribute => "attribute",
            Axis::SelfAxis => "self",
            Axis::Parent => "parent",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Ancestor => "ancestor",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameTest {
    /// `prefix:local` or `local`.
    Exact { ns: Option<DefaultAtom>, local: DefaultAtom },
    /// `prefix:*`
    AnyLocal { ns: Option<DefaultAtom> },
    /// `*:local`
    AnyNamespace { local: DefaultAtom },
    /// `*`
    Any,
}

impl NameTest {
    pub fn exact(ns: Option<&str>, local: &str) -> Self {
        NameTest::Exact {
            ns: ns.map(DefaultAtom::from),
            local: DefaultAtom::from(local),
        }
    }

    pub fn matches(&self, name: &QName) -> bool {
        let ns_eq = |ns: &Option<DefaultAtom>| ns.as_deref() == name.ns_uri.as_deref();
        match self {
            NameTest::Exact { ns, local } => &**local == name.local && ns_eq(ns),
            NameTest::AnyLocal { ns } => ns_eq(ns),
            NameTest::AnyNamespace { local } => &**local == name.local,
            NameTest::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeTest {
    /// `node()`
    AnyNode,
    /// `element()`, `text()`, `document-node()`, ...
    Kind(NodeKind),
    Name { kind: NodeKind, name: NameTest },
}

impl NodeTest {
    pub fn element(local: &str) -> Self {
        NodeTest::Name {
            kind: NodeKind::Element,
            name: NameTest::exact(None, local),
        }
    }

    pub fn attribute(local: &str) -> Self {
        NodeTest::Name {
            kind: NodeKind::Attribute,
            name: NameTest::exact(None, local),
        }
    }

    pub fn matches<N: XdmNode>(&self, node: &N) -> bool {
        match self {
            NodeTest::AnyNode => true,
            NodeTest::Kind(k) => node.kind() == *k,
            NodeTest::Name { kind, name } => {
                node.kind() == *kind && node.name().is_some_and(|q| name.matches(&q))
            }
        }
    }

    /// Node kind every match must have, if fixed.
    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            NodeTest::AnyNode => None,
            NodeTest::Kind(k) | NodeTest::Name { kind: k, .. } => Some(*k),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::{attr, elem, text};

    #[test]
    fn descendants_come_in_document_order() {
        let root = elem("r")
            .child(elem("a").child(elem("a1")).child(elem("a2")))
            .child(elem("b"))
            .build();
        let names: Vec<String> = Axis::Descendant
            .nodes(&root)
            .iter()
            .filter_map(|n| n.name().map(|q| q.local))
            .collect();
        assert_eq!(names, ["a", "a1", "a2", "b"]);
    }

    #[test]
    fn descendant_walk_expands_only_visited_nodes() {
        let root = elem("r")
            .child(elem("a").child(elem("a1")).child(elem("a2")))
            .child(elem("b").child(elem("b1")))
            .build();
        let mut walk = Axis::Descendant.walk(&root);
        let first = walk.next().and_then(|n| n.name()).map(|q| q.local);
        assert_eq!(first.as_deref(), Some("a"));
        // "b" is queued, "b1" has not been fetched yet.
        let queued: usize = walk.levels.iter().map(|level| level.len()).sum();
        assert_eq!(queued, 3);
        assert_eq!(walk.count(), 4);
    }

    #[test]
    fn ancestors_come_root_first() {
        let root = elem("r").child(elem("a").child(elem("b").child(text("t")))).build();
        let a = root.children().next().expect("a");
        let b = a.children().next().expect("b");
        let t = b.children().next().expect("t");
        let anc = Axis::Ancestor.nodes(&t);
        assert_eq!(anc.as_slice(), [root, a, b].as_slice());
    }

    #[test]
    fn name_tests() {
        let e = elem("x").attr(attr("id", "1")).build();
        assert!(NodeTest::element("x").matches(&e));
        assert!(!NodeTest::attribute("x").matches(&e));
        assert!(NodeTest::Name { kind: NodeKind::Element, name: NameTest::Any }.matches(&e));
        let id = e.attributes().next().expect("id");
        assert!(NodeTest::attribute("id").matches(&id));
    }
}
