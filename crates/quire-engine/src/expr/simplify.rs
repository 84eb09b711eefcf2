//! Local rewrites that need no type information.
use super::eval::literal_ebv;
use super::fold::fold_constant;
use super::{BuiltinFunction, ExprKind, Expression, Operand};
use crate::xdm::XdmAtomicValue;
use tracing::debug;

impl Expression {
    /// Constant folding, block flattening and literal-condition elimination.
    /// Children are simplified first; reapplying is a no-op.
    pub fn simplify(mut self) -> Expression {
        for operand in self.operands_mut() {
            let child = std::mem::take(&mut *operand.expr);
            *operand.expr = child.simplify();
        }
        self.reset_properties();

        match self.kind {
            ExprKind::Block(_) => self.flatten_block(),
            ExprKind::If { .. } => self.eliminate_literal_condition(),
            ExprKind::Call {
                function: BuiltinFunction::Not,
                ..
            } => self.collapse_double_negation(),
            ExprKind::Path { .. } => self.drop_context_start(),
            _ => fold_constant(self),
        }
    }

    fn flatten_block(self) -> Expression {
        let ExprKind::Block(items) = self.kind else {
            return self;
        };
        let mut flat: Vec<Operand> = Vec::with_capacity(items.len());
        let mut changed = false;
        for op in items {
            match op.expr.kind {
                ExprKind::Block(inner) => {
                    changed = true;
                    flat.extend(inner);
                }
                ExprKind::Literal(ref v) if v.is_empty() => changed = true,
                _ => flat.push(op),
            }
        }
        // Merge runs of adjacent literals.
        let mut merged: Vec<Operand> = Vec::with_capacity(flat.len());
        for op in flat {
            if let (Some(prev), Some(values)) = (merged.last_mut(), op.expr.literal_values())
                && let Some(prev_values) = prev.expr.literal_values()
            {
                let joined: Vec<XdmAtomicValue> = prev_values.iter().chain(values.iter()).cloned().collect();
                let location = prev.expr.location.clone();
                *prev.expr = Expression::literal(joined, location);
                changed = true;
                continue;
            }
            merged.push(op);
        }
        let location = self.location;
        let result = match merged.len() {
            0 => Expression::new(ExprKind::Literal(Vec::new().into()), location),
            1 => {
                changed = true;
                merged.pop().map(|op| *op.expr).unwrap_or_default()
            }
            _ => Expression::new(ExprKind::Block(merged), location),
        };
        if changed {
            debug!(rewrite = "block-flatten", "flattened sequence block");
        }
        result
    }

    fn eliminate_literal_condition(self) -> Expression {
        let ExprKind::If {
            condition,
            then,
            otherwise,
        } = &self.kind
        else {
            return self;
        };
        let Some(values) = condition.expr.literal_values() else {
            return fold_constant(self);
        };
        match literal_ebv(values) {
            Ok(true) => {
                debug!(rewrite = "if-literal-condition", branch = "then", "eliminated conditional");
                self.replaced_by((*then.expr).clone())
            }
            Ok(false) => {
                debug!(rewrite = "if-literal-condition", branch = "else", "eliminated conditional");
                self.replaced_by((*otherwise.expr).clone())
            }
            // EBV error is raised at run time
            Err(_) => self,
        }
    }

    fn collapse_double_negation(self) -> Expression {
        if let ExprKind::Call { args, .. } = &self.kind
            && let [arg] = args.as_slice()
            && let ExprKind::Call {
                function: BuiltinFunction::Not,
                args: inner,
            } = &arg.expr.kind
        {
            debug!(rewrite = "double-negation", "rewrote not(not(x)) to boolean(x)");
            let location = self.location.clone();
            return Expression::new(
                ExprKind::Call {
                    function: BuiltinFunction::Boolean,
                    args: inner.clone(),
                },
                location,
            );
        }
        fold_constant(self)
    }

    fn drop_context_start(self) -> Expression {
        if let ExprKind::Path { start, step } = &self.kind
            && matches!(start.expr.kind, ExprKind::ContextItem)
            && matches!(step.expr.kind, ExprKind::AxisStep { .. })
        {
            debug!(rewrite = "path-context-start", "removed leading context item from path");
            return self.replaced_by((*step.expr).clone());
        }
        self
    }
}
