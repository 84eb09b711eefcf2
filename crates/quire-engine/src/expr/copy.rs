use super::binding::RebindingMap;
use super::{ExprKind, Expression};
use crate::engine::runtime::Error;

impl Expression {
    /// Deep copy. References to variables bound outside the subtree are
    /// redirected through `map`; variables declared inside it get fresh
    /// bindings, so the copy never aliases the original's slots.
    pub fn copy(&self, map: &mut RebindingMap<'_>) -> Result<Expression, Error> {
        let mut copy = self.clone();
        copy.rebind(map)?;
        Ok(copy)
    }

    fn rebind(&mut self, map: &mut RebindingMap<'_>) -> Result<(), Error> {
        match &mut self.kind {
            ExprKind::LocalVariable { binding, .. } => {
                *binding = map.resolve(binding).map_err(|e| e.at(Some(&self.location)))?;
            }
            ExprKind::Let { binding, value, body }
            | ExprKind::For {
                binding,
                input: value,
                body,
            } => {
                // the bound value is outside the new variable's scope
                value.expr.rebind(map)?;
                *binding = map.declare(binding);
                body.expr.rebind(map)?;
            }
            _ => {
                for op in self.operands_mut() {
                    op.expr.rebind(map)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runtime::{ErrorKind, Location};
    use crate::expr::{BindingAllocator, Operand, OperandRole};
    use crate::xdm::{ExpandedName, XdmAtomicValue};

    #[test]
    fn unmapped_outer_variable_is_internal_error() {
        let mut alloc = BindingAllocator::new();
        let outer = alloc.declare(ExpandedName::local("x"));
        let reference = Expression::new(
            ExprKind::LocalVariable {
                binding: outer,
                ty: None,
            },
            Location::new(3, 7),
        );
        let mut map = RebindingMap::new(&mut alloc);
        let err = reference.copy(&mut map).expect_err("no entry");
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.location, Some(Location::new(3, 7)));
    }

    #[test]
    fn inner_let_gets_fresh_slot() {
        let mut alloc = BindingAllocator::new();
        let inner = alloc.declare(ExpandedName::local("v"));
        let body = Expression::new(
            ExprKind::LocalVariable {
                binding: inner.clone(),
                ty: None,
            },
            Location::default(),
        );
        let original = Expression::new(
            ExprKind::Let {
                binding: inner.clone(),
                value: Operand::new(
                    OperandRole::NAVIGATE,
                    Expression::literal(vec![XdmAtomicValue::Integer(5)], Location::default()),
                ),
                body: Operand::new(OperandRole::NAVIGATE, body),
            },
            Location::default(),
        );
        let mut map = RebindingMap::new(&mut alloc);
        let copy = original.copy(&mut map).expect("copied");
        let ExprKind::Let { binding, body, .. } = &copy.kind else {
            panic!("let expected");
        };
        assert_ne!(binding.slot, inner.slot);
        assert!(body.expr.references_binding(binding.id));
        assert!(!copy.references_binding(inner.id));
    }
}
