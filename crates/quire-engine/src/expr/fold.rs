//! Compile-time evaluation of operand-free subtrees.
use super::{ExprKind, Expression};
use crate::engine::runtime::{DynamicContext, Error};
use crate::model::{NodeKind, QName, XdmNode};
use crate::xdm::{XdmAtomicValue, XdmItem};
use core::cmp::Ordering;
use tracing::debug;

/// Node type with no values: evaluating a constant expression never touches a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NoNode {}

impl XdmNode for NoNode {
    type Children<'a> = std::iter::Empty<NoNode>;
    type Attributes<'a> = std::iter::Empty<NoNode>;

    fn kind(&self) -> NodeKind {
        match *self {}
    }
    fn name(&self) -> Option<QName> {
        match *self {}
    }
    fn string_value(&self) -> String {
        match *self {}
    }
    fn parent(&self) -> Option<Self> {
        match *self {}
    }
    fn children(&self) -> Self::Children<'_> {
        match *self {}
    }
    fn attributes(&self) -> Self::Attributes<'_> {
        match *self {}
    }
    fn compare_document_order(&self, _other: &Self) -> Result<Ordering, Error> {
        match *self {}
    }
}

/// Whether `expr` is an operator applied only to literals, so its value is
/// known at compile time.
fn is_foldable(expr: &Expression) -> bool {
    let foldable_kind = matches!(
        expr.kind,
        ExprKind::Arithmetic { .. }
            | ExprKind::ValueComparison { .. }
            | ExprKind::Logical { .. }
            | ExprKind::Call { .. }
            | ExprKind::Atomize(_)
            | ExprKind::UntypedConvert { .. }
            | ExprKind::Cast { .. }
            | ExprKind::CardinalityCheck { .. }
            | ExprKind::If { .. }
    );
    foldable_kind && expr.operands().iter().all(|op| op.expr.is_literal())
}

/// Replace a literal-only subtree by its value. Subtrees whose evaluation
/// fails are kept so the error surfaces at run time, where it belongs.
pub(crate) fn fold_constant(expr: Expression) -> Expression {
    if !is_foldable(&expr) {
        return expr;
    }
    let ctx = DynamicContext::<NoNode>::default();
    let values: Result<Vec<XdmAtomicValue>, Error> = expr.iterate(&ctx).and_then(|mut it| {
        let mut out = Vec::new();
        while let Some(item) = it.next_item() {
            match item? {
                XdmItem::Atomic(a) => out.push(a),
                XdmItem::Node(n) => match n {},
            }
        }
        Ok(out)
    });
    match values {
        Ok(values) => {
            debug!(rewrite = "constant-fold", location = %expr.location, "folded constant expression");
            expr.replaced_by(Expression::literal(values, Default::default()))
        }
        Err(_) => expr,
    }
}
