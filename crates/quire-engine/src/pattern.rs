//! Match patterns used by rules.
use crate::engine::runtime::{DynamicContext, Error, StaticContext};
use crate::expr::{AtomicType, Expression, NameTest, NodeTest, RebindingMap, predicate_matches};
use crate::model::{NodeKind, XdmNode};
use crate::xdm::XdmItem;
use string_cache::DefaultAtom;

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Matches every item (`.`).
    AnyItem,
    Node(NodeTest),
    /// `parent/step`: the node matches `step` and its parent matches `parent`.
    WithParent { step: NodeTest, parent: Box<Pattern> },
    /// `base[predicate]`, evaluated with the candidate as context item.
    Predicate { base: Box<Pattern>, predicate: Expression },
    Union(Vec<Pattern>),
    /// Atomic values of the given type.
    Atomic(AtomicType),
}

/// Key under which rules are chained for fast dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiscriminatorKey {
    /// Named nodes of a kind: elements, attributes, processing instructions.
    Named {
        kind: NodeKind,
        ns: Option<DefaultAtom>,
        local: DefaultAtom,
    },
    Kind(NodeKind),
}

impl DiscriminatorKey {
    /// Keys to look up for `item`, most specific first. Atomic values have none.
    pub fn for_item<N: XdmNode>(item: &XdmItem<N>) -> Option<(Option<DiscriminatorKey>, DiscriminatorKey)> {
        let XdmItem::Node(node) = item else {
            return None;
        };
        let kind = node.kind();
        let named = node.name().map(|q| DiscriminatorKey::Named {
            kind,
            ns: q.ns_uri.as_deref().map(DefaultAtom::from),
            local: DefaultAtom::from(q.local.as_str()),
        });
        Some((named, DiscriminatorKey::Kind(kind)))
    }
}

impl Pattern {
    pub fn element(local: &str) -> Self {
        Pattern::Node(NodeTest::element(local))
    }

    pub fn matches<N: XdmNode>(&self, item: &XdmItem<N>, ctx: &DynamicContext<N>) -> Result<bool, Error> {
        match self {
            Pattern::AnyItem => Ok(true),
            Pattern::Node(test) => Ok(item.as_node().is_some_and(|n| test.matches(n))),
            Pattern::WithParent { step, parent } => {
                let Some(node) = item.as_node() else {
                    return Ok(false);
                };
                if !step.matches(node) {
                    return Ok(false);
                }
                match node.parent() {
                    Some(p) => parent.matches(&XdmItem::Node(p), ctx),
                    None => Ok(false),
                }
            }
            Pattern::Predicate { base, predicate } => {
                if !base.matches(item, ctx)? {
                    return Ok(false);
                }
                let focus = ctx.with_focus(item.clone(), 1, Some(1));
                predicate_matches(predicate, &focus, 1)
            }
            Pattern::Union(branches) => {
                for branch in branches {
                    if branch.matches(item, ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Pattern::Atomic(t) => Ok(item.as_atomic().is_some_and(|a| a.type_of().is_subtype_of(*t))),
        }
    }

    /// Priority used when a rule declares none.
    pub fn default_priority(&self) -> f64 {
        match self {
            Pattern::AnyItem => -1.0,
            Pattern::Node(NodeTest::Name { name, .. }) => match name {
                NameTest::Exact { .. } => 0.0,
                NameTest::AnyLocal { .. } | NameTest::AnyNamespace { .. } => -0.25,
                NameTest::Any => -0.5,
            },
            Pattern::Node(NodeTest::Kind(_) | NodeTest::AnyNode) => -0.5,
            Pattern::Atomic(_) => -0.5,
            Pattern::WithParent { .. } | Pattern::Predicate { .. } => 0.5,
            Pattern::Union(branches) => branches
                .iter()
                .map(Pattern::default_priority)
                .fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// Chain key for rules with this pattern; `None` puts the rule in the
    /// generic chain.
    pub fn discriminator(&self) -> Option<DiscriminatorKey> {
        let test = match self {
            Pattern::Node(test) | Pattern::WithParent { step: test, .. } => test,
            Pattern::Predicate { base, .. } => return base.discriminator(),
            Pattern::AnyItem | Pattern::Union(_) | Pattern::Atomic(_) => return None,
        };
        match test {
            NodeTest::AnyNode => None,
            NodeTest::Kind(kind) => Some(DiscriminatorKey::Kind(*kind)),
            NodeTest::Name {
                kind,
                name: NameTest::Exact { ns, local },
            } => Some(DiscriminatorKey::Named {
                kind: *kind,
                ns: ns.clone(),
                local: local.clone(),
            }),
            NodeTest::Name { kind, .. } => Some(DiscriminatorKey::Kind(*kind)),
        }
    }

    /// Whether every item that reaches this pattern's chain matches it, so
    /// the test can be skipped.
    pub(crate) fn matches_whole_chain(&self) -> bool {
        match self {
            Pattern::AnyItem => true,
            Pattern::Node(NodeTest::Kind(_)) => true,
            Pattern::Node(NodeTest::Name {
                name: NameTest::Exact { .. },
                ..
            }) => true,
            _ => false,
        }
    }

    pub fn into_branches(self) -> Vec<Pattern> {
        match self {
            Pattern::Union(branches) => branches.into_iter().flat_map(Pattern::into_branches).collect(),
            other => vec![other],
        }
    }

    pub fn type_check(self, ctx: &StaticContext) -> Result<Pattern, Error> {
        Ok(match self {
            Pattern::WithParent { step, parent } => Pattern::WithParent {
                step,
                parent: Box::new(parent.type_check(ctx)?),
            },
            Pattern::Predicate { base, predicate } => Pattern::Predicate {
                base: Box::new(base.type_check(ctx)?),
                predicate: predicate.simplify().type_check(ctx)?.optimize(ctx)?,
            },
            Pattern::Union(branches) => Pattern::Union(
                branches
                    .into_iter()
                    .map(|b| b.type_check(ctx))
                    .collect::<Result<_, _>>()?,
            ),
            other => other,
        })
    }

    /// Deep copy; predicate expressions are rebound through `map`.
    pub fn copy(&self, map: &mut RebindingMap<'_>) -> Result<Pattern, Error> {
        Ok(match self {
            Pattern::WithParent { step, parent } => Pattern::WithParent {
                step: step.clone(),
                parent: Box::new(parent.copy(map)?),
            },
            Pattern::Predicate { base, predicate } => Pattern::Predicate {
                base: Box::new(base.copy(map)?),
                predicate: predicate.copy(map)?,
            },
            Pattern::Union(branches) => Pattern::Union(
                branches
                    .iter()
                    .map(|b| b.copy(map))
                    .collect::<Result<_, _>>()?,
            ),
            other => other.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::{attr, elem};

    #[test]
    fn default_priorities() {
        assert_eq!(Pattern::element("a").default_priority(), 0.0);
        assert_eq!(
            Pattern::Node(NodeTest::Name {
                kind: NodeKind::Element,
                name: NameTest::Any
            })
            .default_priority(),
            -0.5
        );
        assert_eq!(Pattern::AnyItem.default_priority(), -1.0);
        let parent = Pattern::WithParent {
            step: NodeTest::element("b"),
            parent: Box::new(Pattern::element("a")),
        };
        assert_eq!(parent.default_priority(), 0.5);
    }

    #[test]
    fn parent_qualified_pattern_checks_the_parent() {
        let root = elem("a").child(elem("b")).child(elem("c").child(elem("b"))).build();
        let ctx = DynamicContext::default();
        let pattern = Pattern::WithParent {
            step: NodeTest::element("b"),
            parent: Box::new(Pattern::element("a")),
        };
        let direct = root.children().next().expect("first child");
        let nested = root
            .children()
            .nth(1)
            .and_then(|c| c.children().next())
            .expect("nested b");
        assert!(pattern.matches(&XdmItem::Node(direct), &ctx).expect("ok"));
        assert!(!pattern.matches(&XdmItem::Node(nested), &ctx).expect("ok"));
    }

    #[test]
    fn attribute_discriminator_is_named() {
        let e = elem("x").attr(attr("id", "1")).build();
        let id = e.attributes().next().expect("attribute");
        let (named, kind) = DiscriminatorKey::for_item(&XdmItem::Node(id)).expect("node");
        assert_eq!(
            named,
            Some(DiscriminatorKey::Named {
                kind: NodeKind::Attribute,
                ns: None,
                local: DefaultAtom::from("id")
            })
        );
        assert_eq!(kind, DiscriminatorKey::Kind(NodeKind::Attribute));
    }
}
