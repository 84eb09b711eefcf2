//! Rewrites that use static properties to pick cheaper evaluation shapes.
use super::fold::fold_constant;
use super::{BoolOp, BuiltinFunction, Cardinality, Dependencies, ExprKind, Expression, Operand, OperandRole};
use crate::engine::runtime::{Error, OptimizationLevel, StaticContext};
use crate::expr::types::{AtomicType, ItemType};
use crate::xdm::XdmAtomicValue;
use tracing::debug;

impl Expression {
    /// Optimize a type-checked tree. Applying it to its own output changes
    /// nothing.
    pub fn optimize(mut self, ctx: &StaticContext) -> Result<Expression, Error> {
        if ctx.optimization == OptimizationLevel::None {
            return Ok(self);
        }
        self.rewrite_operands(|e| e.optimize(ctx))?;
        let rewritten = match &self.kind {
            ExprKind::Call {
                function: BuiltinFunction::Exists | BuiltinFunction::Empty,
                ..
            } => self.split_union_test(ctx)?,
            ExprKind::Filter { .. } => self.optimize_filter(ctx.optimization),
            ExprKind::Let { .. } => self.eliminate_dead_let(),
            _ => self,
        };
        Ok(fold_constant(rewritten))
    }

    /// `exists(a | b)` is `exists(a) or exists(b)`; `empty` likewise with `and`.
    /// The new calls are optimized in turn, so nested unions split fully.
    fn split_union_test(self, ctx: &StaticContext) -> Result<Expression, Error> {
        let ExprKind::Call { function, args } = &self.kind else {
            return Ok(self);
        };
        let [arg] = args.as_slice() else {
            return Ok(self);
        };
        let ExprKind::Union { lhs, rhs } = &arg.expr.kind else {
            return Ok(self);
        };
        let op = if *function == BuiltinFunction::Exists {
            BoolOp::Or
        } else {
            BoolOp::And
        };
        let call = |operand: &Operand| {
            Expression::new(
                ExprKind::Call {
                    function: *function,
                    args: vec![Operand::new(OperandRole::NAVIGATE, (*operand.expr).clone())],
                },
                operand.expr.location.clone(),
            )
            .optimize(ctx)
        };
        debug!(rewrite = "split-union-test", function = function.local_name(), "split test over union");
        let location = self.location.clone();
        Ok(Expression::new(
            ExprKind::Logical {
                op,
                lhs: Operand::new(OperandRole::ATOMIC, call(lhs)?),
                rhs: Operand::new(OperandRole::ATOMIC, call(rhs)?),
            },
            location,
        ))
    }

    fn optimize_filter(self, level: OptimizationLevel) -> Expression {
        let ExprKind::Filter { base, predicate } = &self.kind else {
            return self;
        };
        if let Some([value]) = predicate.expr.literal_values() {
            return match positional_literal(value) {
                Some(Some(position)) => {
                    debug!(rewrite = "positional-filter", position, "filter on constant position");
                    let location = self.location.clone();
                    let int = |v: i64| Operand::new(OperandRole::ATOMIC, Expression::literal(vec![XdmAtomicValue::Integer(v)], location.clone()));
                    Expression::new(
                        ExprKind::Call {
                            function: BuiltinFunction::Subsequence,
                            args: vec![
                                Operand::new(OperandRole::NAVIGATE, (*base.expr).clone()),
                                int(position),
                                int(1),
                            ],
                        },
                        location.clone(),
                    )
                }
                Some(None) => {
                    debug!(rewrite = "positional-filter", "fractional position never matches");
                    self.replaced_by(Expression::empty())
                }
                None => match value {
                    XdmAtomicValue::Boolean(true) => {
                        debug!(rewrite = "constant-filter", "always-true predicate removed");
                        self.replaced_by((*base.expr).clone())
                    }
                    XdmAtomicValue::Boolean(false) => {
                        debug!(rewrite = "constant-filter", "always-false predicate");
                        self.replaced_by(Expression::empty())
                    }
                    _ => self,
                },
            };
        }
        let pred = &predicate.expr;
        if level == OptimizationLevel::Full
            && !pred.dependencies().intersects(Dependencies::FOCUS)
            && pred.item_type() == ItemType::Atomic(AtomicType::Boolean)
            && pred.cardinality() == Cardinality::EXACTLY_ONE
        {
            debug!(rewrite = "hoist-predicate", "focus-independent predicate evaluated once");
            let location = self.location.clone();
            return Expression::new(
                ExprKind::If {
                    condition: Operand::new(OperandRole::ATOMIC, (**pred).clone()),
                    then: Operand::new(OperandRole::NAVIGATE, (*base.expr).clone()),
                    otherwise: Operand::new(OperandRole::NAVIGATE, Expression::empty()),
                },
                location,
            );
        }
        self
    }

    fn eliminate_dead_let(self) -> Expression {
        let ExprKind::Let { binding, body, .. } = &self.kind else {
            return self;
        };
        if body.expr.references_binding(binding.id) {
            return self;
        }
        debug!(rewrite = "dead-let", variable = %binding.name, "removed unused variable");
        self.replaced_by((*body.expr).clone())
    }
}

/// `Some(Some(k))` for a numeric literal equal to integer position `k`,
/// `Some(None)` for a numeric literal no position equals, `None` otherwise.
fn positional_literal(value: &XdmAtomicValue) -> Option<Option<i64>> {
    let d = match value {
        XdmAtomicValue::Integer(i) => return Some(Some(*i)),
        XdmAtomicValue::Decimal(d) | XdmAtomicValue::Double(d) => *d,
        XdmAtomicValue::Float(f) => f64::from(*f),
        _ => return None,
    };
    if d.fract() == 0.0 && d.is_finite() && d >= i64::MIN as f64 && d < i64::MAX as f64 {
        Some(Some(d as i64))
    } else {
        Some(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runtime::{Location, StaticContextBuilder};
    use crate::expr::{Axis, NodeTest};

    fn children() -> Expression {
        Expression::new(
            ExprKind::AxisStep {
                axis: Axis::Child,
                test: NodeTest::element("item"),
            },
            Location::default(),
        )
    }

    #[test]
    fn literal_position_becomes_subsequence() {
        let ctx = StaticContextBuilder::new().build();
        let filter = Expression::new(
            ExprKind::Filter {
                base: Operand::new(OperandRole::NAVIGATE, children()),
                predicate: Operand::new(
                    OperandRole::PREDICATE,
                    Expression::literal(vec![XdmAtomicValue::Integer(2)], Location::default()),
                ),
            },
            Location::default(),
        );
        let once = filter.optimize(&ctx).expect("optimized");
        assert!(matches!(
            once.kind,
            ExprKind::Call {
                function: BuiltinFunction::Subsequence,
                ..
            }
        ));
        let twice = once.clone().optimize(&ctx).expect("optimized");
        assert_eq!(once, twice);
    }

    #[test]
    fn level_none_leaves_tree_alone() {
        let ctx = StaticContextBuilder::new()
            .with_optimization(OptimizationLevel::None)
            .build();
        let filter = Expression::new(
            ExprKind::Filter {
                base: Operand::new(OperandRole::NAVIGATE, children()),
                predicate: Operand::new(
                    OperandRole::PREDICATE,
                    Expression::literal(vec![XdmAtomicValue::Boolean(true)], Location::default()),
                ),
            },
            Location::default(),
        );
        let out = filter.clone().optimize(&ctx).expect("unchanged");
        assert_eq!(out, filter);
    }

    #[test]
    fn fractional_position_is_empty() {
        assert_eq!(positional_literal(&XdmAtomicValue::Double(1.5)), Some(None));
        assert_eq!(positional_literal(&XdmAtomicValue::Decimal(3.0)), Some(Some(3)));
        assert_eq!(positional_literal(&XdmAtomicValue::string("1")), None);
    }
}
