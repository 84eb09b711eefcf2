//! Static typing: variable types, operand conversions and calculator selection.
use super::arith::{comparable_types, select_calculator};
use super::{BindingId, BuiltinFunction, Cardinality, ExprKind, Expression, Operand, OperandRole, SequenceType};
use crate::engine::runtime::{Error, ErrorCode, NumericConversion, StaticContext};
use crate::expr::types::AtomicType;
use crate::xdm::XdmAtomicValue;
use tracing::debug;

impl Expression {
    /// Annotate the tree with static types and insert the conversions the
    /// operators need. Errors detected here are static.
    pub fn type_check(mut self, ctx: &StaticContext) -> Result<Expression, Error> {
        match &mut self.kind {
            ExprKind::Let { binding, value, body } => {
                value.rewrite(|v| v.type_check(ctx))?;
                let ty = static_type(&value.expr);
                annotate_references(&mut body.expr, binding.id, ty);
                body.rewrite(|b| b.type_check(ctx))?;
            }
            ExprKind::For { binding, input, body } => {
                input.rewrite(|v| v.type_check(ctx))?;
                let ty = SequenceType::new(input.expr.item_type(), Cardinality::EXACTLY_ONE);
                annotate_references(&mut body.expr, binding.id, ty);
                body.rewrite(|b| b.type_check(ctx))?;
            }
            _ => {
                for op in self.operands_mut() {
                    op.rewrite(|e| e.type_check(ctx))?;
                }
            }
        }
        self.reset_properties();
        Ok(self.check_node(ctx)?.collapse_empty())
    }

    /// Anything statically known to yield no items becomes the empty literal.
    fn collapse_empty(self) -> Expression {
        if self.is_literal() || !self.cardinality().is_empty_only() {
            return self;
        }
        debug!(rewrite = "empty-sequence", location = %self.location, "expression is always empty");
        self.replaced_by(Expression::empty())
    }

    fn check_node(self, ctx: &StaticContext) -> Result<Expression, Error> {
        match &self.kind {
            ExprKind::GlobalVariable { .. } => self.check_global(ctx),
            ExprKind::Arithmetic { .. } => self.check_arithmetic(ctx),
            ExprKind::ValueComparison { .. } => self.check_comparison(),
            ExprKind::Call { .. } => self.check_call(),
            ExprKind::CardinalityCheck { .. } => self.check_cardinality(),
            ExprKind::Cast { .. } => self.check_cast(),
            ExprKind::Path { start, step } => {
                if matches!(step.expr.kind, ExprKind::AxisStep { .. })
                    && start.expr.item_type().is_atomic()
                    && !start.expr.cardinality().is_empty_only()
                {
                    return Err(Error::static_error(
                        ErrorCode::XPTY0019,
                        "axis step applied to a sequence of atomic values",
                    )
                    .at(Some(&self.location)));
                }
                Ok(self)
            }
            _ => Ok(self),
        }
    }

    fn check_global(mut self, ctx: &StaticContext) -> Result<Expression, Error> {
        if let ExprKind::GlobalVariable { name, ty } = &mut self.kind {
            let Some(declared) = ctx.global_type(name) else {
                return Err(Error::static_error(
                    ErrorCode::XPST0008,
                    format!("variable ${name} is not declared"),
                )
                .at(Some(&self.location)));
            };
            *ty = Some(*declared);
        }
        self.reset_properties();
        Ok(self)
    }

    fn check_arithmetic(mut self, ctx: &StaticContext) -> Result<Expression, Error> {
        let ExprKind::Arithmetic {
            op,
            lhs,
            rhs,
            calculator,
        } = &mut self.kind
        else {
            return Ok(self);
        };
        if lhs.expr.cardinality().is_empty_only() || rhs.expr.cardinality().is_empty_only() {
            debug!(rewrite = "arithmetic-empty-operand", "arithmetic on empty sequence");
            return Ok(self.replaced_by(Expression::empty()));
        }
        for operand in [&mut *lhs, &mut *rhs] {
            operand.rewrite(|e| Ok(prepare_atomic_operand(e, Some(ctx.numeric_conversion))))?;
            let t = operand.expr.item_type().atomized();
            if t.is_known_non_numeric() {
                return Err(operand
                    .expr
                    .static_type_error(format!("arithmetic operand of type xs:{} is not numeric", t.local_name())));
            }
        }
        let chosen = select_calculator(*op, lhs.expr.item_type().atomized(), rhs.expr.item_type().atomized());
        if chosen != *calculator {
            debug!(rewrite = "select-calculator", calculator = ?chosen, "chose arithmetic calculator");
            *calculator = chosen;
        }
        self.reset_properties();
        Ok(self)
    }

    fn check_comparison(mut self) -> Result<Expression, Error> {
        let ExprKind::ValueComparison { lhs, rhs, .. } = &mut self.kind else {
            return Ok(self);
        };
        if lhs.expr.cardinality().is_empty_only() || rhs.expr.cardinality().is_empty_only() {
            return Ok(self.replaced_by(Expression::empty()));
        }
        for operand in [&mut *lhs, &mut *rhs] {
            operand.rewrite(|e| Ok(prepare_atomic_operand(e, None)))?;
        }
        let (a, b) = (lhs.expr.item_type().atomized(), rhs.expr.item_type().atomized());
        if !comparable_types(a, b) {
            return Err(self.static_type_error(format!(
                "values of type xs:{} and xs:{} cannot be compared",
                a.local_name(),
                b.local_name()
            )));
        }
        self.reset_properties();
        Ok(self)
    }

    fn check_call(self) -> Result<Expression, Error> {
        let ExprKind::Call { function, args } = &self.kind else {
            return Ok(self);
        };
        let Some(first) = args.first() else {
            return Ok(self);
        };
        let card = first.expr.cardinality();
        let replacement = match function {
            BuiltinFunction::ExactlyOne if card.is_empty_only() => {
                return Err(Error::static_error(
                    ErrorCode::FORG0005,
                    "exactly-one() applied to an expression that is always empty",
                )
                .at(Some(&self.location)));
            }
            BuiltinFunction::ExactlyOne if card == Cardinality::EXACTLY_ONE => (*first.expr).clone(),
            BuiltinFunction::ZeroOrOne if card.at_most_one() => (*first.expr).clone(),
            BuiltinFunction::Exists if card.is_empty_only() => literal(XdmAtomicValue::Boolean(false)),
            BuiltinFunction::Empty if card.is_empty_only() => literal(XdmAtomicValue::Boolean(true)),
            BuiltinFunction::Count if card.is_empty_only() => literal(XdmAtomicValue::Integer(0)),
            _ => return Ok(self),
        };
        debug!(rewrite = "static-call", function = function.local_name(), "resolved call from static cardinality");
        Ok(self.replaced_by(replacement))
    }

    fn check_cardinality(self) -> Result<Expression, Error> {
        let ExprKind::CardinalityCheck { operand, required } = &self.kind else {
            return Ok(self);
        };
        let actual = operand.expr.cardinality();
        if actual.is_empty_only() && !required.allows_zero() {
            return Err(self.static_type_error(
                "an empty sequence is not allowed here, but the expression is always empty",
            ));
        }
        if (actual & *required).is_empty() {
            return Err(self.static_type_error(format!(
                "required cardinality {required:?} can never be satisfied"
            )));
        }
        if required.contains(actual) {
            debug!(rewrite = "cardinality-check-removed", "operand already satisfies the check");
            let inner = (*operand.expr).clone();
            return Ok(self.replaced_by(inner));
        }
        Ok(self)
    }

    fn check_cast(mut self) -> Result<Expression, Error> {
        let ExprKind::Cast {
            operand,
            target,
            allows_empty,
        } = &mut self.kind
        else {
            return Ok(self);
        };
        if target.is_abstract() && *target != AtomicType::Numeric {
            return Err(Error::static_error(
                ErrorCode::XPST0051,
                format!("cannot cast to abstract type xs:{}", target.local_name()),
            )
            .at(Some(&self.location)));
        }
        let card = operand.expr.cardinality();
        if card.is_empty_only() {
            if *allows_empty {
                return Ok(self.replaced_by(Expression::empty()));
            }
            return Err(self.static_type_error("cast of an empty sequence requires '?'"));
        }
        operand.rewrite(|e| Ok(atomize(e)))?;
        self.reset_properties();
        Ok(self)
    }
}

fn literal(value: XdmAtomicValue) -> Expression {
    Expression::literal(vec![value], Default::default())
}

fn annotate_references(expr: &mut Expression, id: BindingId, ty: SequenceType) {
    if let ExprKind::LocalVariable { binding, ty: slot_ty } = &mut expr.kind
        && binding.id == id
    {
        *slot_ty = Some(ty);
    }
    for op in expr.operands_mut() {
        annotate_references(&mut op.expr, id, ty);
    }
    expr.reset_properties();
}

fn wrap(expr: Expression, make: impl FnOnce(Operand) -> ExprKind) -> Expression {
    let location = expr.location.clone();
    Expression::new(make(Operand::new(OperandRole::NAVIGATE, expr)), location)
}

fn atomize(expr: Expression) -> Expression {
    if expr.item_type().is_atomic() || matches!(expr.kind, ExprKind::Atomize(_)) {
        return expr;
    }
    debug!(rewrite = "atomize", "inserted atomization");
    wrap(expr, ExprKind::Atomize)
}

/// Atomize, require at most one item, and convert untyped values: to
/// `xs:double` for arithmetic (`conversion` given) or `xs:string` for
/// comparisons.
fn prepare_atomic_operand(expr: Expression, conversion: Option<NumericConversion>) -> Expression {
    if matches!(expr.kind, ExprKind::UntypedConvert { .. }) {
        return expr;
    }
    let mut expr = atomize(expr);
    if expr.cardinality().allows_many() {
        debug!(rewrite = "cardinality-check", "inserted zero-or-one check");
        expr = wrap(expr, |operand| ExprKind::CardinalityCheck {
            operand,
            required: Cardinality::ZERO_OR_ONE,
        });
    }
    if expr.item_type().atomized().may_be_untyped() {
        let (target, conversion) = match conversion {
            Some(mode) => (AtomicType::Double, mode),
            None => (AtomicType::String, NumericConversion::Strict),
        };
        debug!(rewrite = "untyped-convert", target = target.local_name(), "inserted untyped conversion");
        expr = wrap(expr, |operand| ExprKind::UntypedConvert {
            operand,
            target,
            conversion,
        });
    }
    expr
}

/// Type of an expression as a sequence type.
pub(crate) fn static_type(expr: &Expression) -> SequenceType {
    SequenceType::new(expr.item_type(), expr.cardinality())
}
