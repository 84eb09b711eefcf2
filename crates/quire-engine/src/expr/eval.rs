//! Evaluation: pull (`iterate`), single item (`evaluate_item`) and push
//! (`process`). Every expression supports all three; the ones it does not
//! implement natively are derived from the others.
use super::arith::{compare, compute};
use super::cursors::{
    AtomizeCursor, AxisCursor, CardinalityCursor, ConcatCursor, FilterCursor, ForCursor, PathCursor, SubsequenceCursor,
    UntypedConvertCursor, convert_untyped,
};
use super::types::cast_atomic;
use super::{BoolOp, BuiltinFunction, Dependencies, EvaluationMethods, ExprKind, Expression, SpecialProperties};
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::engine::sink::{CopyNamespaces, OutputSink, SequenceCollector};
use crate::iter::{
    ArrayIterator, EmptyIterator, IteratorProperties, RangeIterator, SeqIter, SequenceIterator, collect_sequence,
    count_items, first_item, length_of,
};
use crate::model::XdmNode;
use crate::rules::apply;
use crate::xdm::{SequenceValue, XdmAtomicValue, XdmItem};
use core::cmp::Ordering;
use std::cell::RefCell;
use std::rc::Rc;

fn boxed<'a, N: Clone + 'a>(values: SequenceValue<N>) -> SeqIter<'a, N> {
    if values.is_empty() {
        Box::new(EmptyIterator::new())
    } else {
        Box::new(ArrayIterator::new(values))
    }
}

fn optional<'a, N: Clone + 'a>(item: Option<XdmItem<N>>) -> SeqIter<'a, N> {
    match item {
        Some(item) => Box::new(ArrayIterator::singleton(item)),
        None => Box::new(EmptyIterator::new()),
    }
}

impl Expression {
    /// Lazy iterator over the result. The iterator borrows the expression
    /// tree but not `ctx`.
    pub fn iterate<'a, N: XdmNode>(&'a self, ctx: &DynamicContext<N>) -> Result<SeqIter<'a, N>, Error> {
        self.iterate_inner(ctx).map_err(|e| e.at(Some(&self.location)))
    }

    fn iterate_inner<'a, N: XdmNode>(&'a self, ctx: &DynamicContext<N>) -> Result<SeqIter<'a, N>, Error> {
        let methods = self.properties().methods;
        if !methods.contains(EvaluationMethods::ITERATE) {
            if methods.contains(EvaluationMethods::EVALUATE_ITEM) {
                return Ok(optional(self.evaluate_item(ctx)?));
            }
            return self.iterate_via_process(ctx);
        }
        let iter: SeqIter<'a, N> = match &self.kind {
            ExprKind::Literal(values) => boxed(values.iter().cloned().map(XdmItem::Atomic).collect()),
            ExprKind::LocalVariable { binding, .. } => boxed(ctx.get_local_variable(binding.slot)?),
            ExprKind::GlobalVariable { name, .. } => boxed(ctx.global_variable(name)?.clone()),
            ExprKind::Let { binding, value, body } => {
                let value = collect_sequence(value.expr.iterate(ctx)?)?;
                let mut inner = ctx.clone();
                inner.set_local_variable(binding.slot, value);
                body.expr.iterate(&inner)?
            }
            ExprKind::For { binding, input, body } => {
                Box::new(ForCursor::new(input.expr.iterate(ctx)?, binding.slot, &body.expr, ctx))
            }
            ExprKind::Block(parts) => Box::new(ConcatCursor::new(parts, ctx)),
            ExprKind::If {
                condition,
                then,
                otherwise,
            } => {
                if effective_boolean_value(condition.expr.iterate(ctx)?)? {
                    then.expr.iterate(ctx)?
                } else {
                    otherwise.expr.iterate(ctx)?
                }
            }
            ExprKind::Call { function, args } => match function {
                BuiltinFunction::Data => match args.first() {
                    Some(arg) => Box::new(AtomizeCursor::new(arg.expr.iterate(ctx)?)),
                    None => Box::new(EmptyIterator::new()),
                },
                BuiltinFunction::Subsequence => self.subsequence(args, ctx)?,
                _ => optional(self.evaluate_item(ctx)?),
            },
            ExprKind::Range { lo, hi } => {
                let lo = integer_operand(&lo.expr, ctx)?;
                let hi = integer_operand(&hi.expr, ctx)?;
                match (lo, hi) {
                    (Some(lo), Some(hi)) if lo <= hi => Box::new(RangeIterator::new(lo, hi)),
                    _ => Box::new(EmptyIterator::new()),
                }
            }
            ExprKind::AxisStep { axis, test } => {
                let XdmItem::Node(node) = ctx.get_context_item()? else {
                    return Err(Error::from_code(
                        ErrorCode::XPTY0020,
                        format!("{axis} axis step needs a node as context item"),
                    ));
                };
                if !axis.is_materialized() {
                    return Ok(Box::new(AxisCursor::new(axis.walk(node), test)));
                }
                let nodes: Vec<XdmItem<N>> = axis
                    .walk(node)
                    .filter(|n| test.matches(n))
                    .map(XdmItem::Node)
                    .collect();
                boxed(SequenceValue::from_items(nodes))
            }
            ExprKind::Path { start, step } => {
                let mut start_iter = start.expr.iterate(ctx)?;
                let mut size = None;
                if step.expr.dependencies().contains(Dependencies::LAST) {
                    size = match length_of(&*start_iter) {
                        Some(n) => Some(n?),
                        None => {
                            let items = collect_sequence(start_iter)?;
                            let n = items.len();
                            start_iter = boxed(items);
                            Some(n)
                        }
                    };
                }
                let cursor: SeqIter<'a, N> =
                    Box::new(PathCursor::new(start_iter, size, &step.expr, ctx, &self.location));
                if self.special().contains(SpecialProperties::ORDERED_NODESET) {
                    cursor
                } else {
                    boxed(sort_path_result(collect_sequence(cursor)?)?)
                }
            }
            ExprKind::Filter { base, predicate } => {
                let mut base_iter = base.expr.iterate(ctx)?;
                let mut size = None;
                if predicate.expr.dependencies().contains(Dependencies::LAST) {
                    size = match length_of(&*base_iter) {
                        Some(n) => Some(n?),
                        None => {
                            let items = collect_sequence(base_iter)?;
                            let n = items.len();
                            base_iter = boxed(items);
                            Some(n)
                        }
                    };
                }
                Box::new(FilterCursor::new(base_iter, size, &predicate.expr, ctx, &self.location))
            }
            ExprKind::Union { lhs, rhs } => {
                let left = collect_sequence(lhs.expr.iterate(ctx)?)?;
                let right = collect_sequence(rhs.expr.iterate(ctx)?)?;
                boxed(union_of(&left, &right)?)
            }
            ExprKind::Atomize(operand) => Box::new(AtomizeCursor::new(operand.expr.iterate(ctx)?)),
            ExprKind::UntypedConvert {
                operand,
                target,
                conversion,
            } => Box::new(UntypedConvertCursor::new(operand.expr.iterate(ctx)?, *target, *conversion)),
            ExprKind::CardinalityCheck { operand, required } => {
                Box::new(CardinalityCursor::new(operand.expr.iterate(ctx)?, *required, &self.location))
            }
            _ => optional(self.evaluate_item(ctx)?),
        };
        Ok(iter)
    }

    /// Process-only expressions are pulled by running them against a
    /// private collector.
    fn iterate_via_process<'a, N: XdmNode>(&'a self, ctx: &DynamicContext<N>) -> Result<SeqIter<'a, N>, Error> {
        let collector = SequenceCollector::<N>::shared();
        let sink: Rc<RefCell<dyn OutputSink<N>>> = collector.clone();
        self.process(&ctx.with_sink(sink))?;
        let items = collector.borrow_mut().take();
        Ok(boxed(SequenceValue::from_items(items)))
    }

    /// First item of the result, or `None` when it is empty.
    pub fn evaluate_item<N: XdmNode>(&self, ctx: &DynamicContext<N>) -> Result<Option<XdmItem<N>>, Error> {
        self.evaluate_item_inner(ctx).map_err(|e| e.at(Some(&self.location)))
    }

    fn evaluate_item_inner<N: XdmNode>(&self, ctx: &DynamicContext<N>) -> Result<Option<XdmItem<N>>, Error> {
        let atomic = |v: XdmAtomicValue| -> Result<Option<XdmItem<N>>, Error> { Ok(Some(XdmItem::Atomic(v))) };
        match &self.kind {
            ExprKind::Literal(values) => Ok(values.first().cloned().map(XdmItem::Atomic)),
            ExprKind::ContextItem => ctx.get_context_item().cloned().map(Some),
            ExprKind::ContextPosition => atomic(XdmAtomicValue::Integer(position_as_i64(ctx.position()?))),
            ExprKind::ContextSize => atomic(XdmAtomicValue::Integer(position_as_i64(ctx.size()?))),
            ExprKind::If {
                condition,
                then,
                otherwise,
            } => {
                if effective_boolean_value(condition.expr.iterate(ctx)?)? {
                    then.expr.evaluate_item(ctx)
                } else {
                    otherwise.expr.evaluate_item(ctx)
                }
            }
            ExprKind::Arithmetic {
                op,
                lhs,
                rhs,
                calculator,
            } => {
                let (Some(a), Some(b)) = (single_atomic(&lhs.expr, ctx)?, single_atomic(&rhs.expr, ctx)?) else {
                    return Ok(None);
                };
                atomic(compute(*op, &a, &b, *calculator)?)
            }
            ExprKind::ValueComparison { op, lhs, rhs } => {
                let (Some(a), Some(b)) = (single_atomic(&lhs.expr, ctx)?, single_atomic(&rhs.expr, ctx)?) else {
                    return Ok(None);
                };
                atomic(XdmAtomicValue::Boolean(compare(*op, &a, &b)?))
            }
            ExprKind::Logical { op, lhs, rhs } => {
                let left = effective_boolean_value(lhs.expr.iterate(ctx)?)?;
                let value = match (op, left) {
                    (BoolOp::And, false) => false,
                    (BoolOp::Or, true) => true,
                    _ => effective_boolean_value(rhs.expr.iterate(ctx)?)?,
                };
                atomic(XdmAtomicValue::Boolean(value))
            }
            ExprKind::Call { function, args } => self.call_item(*function, args, ctx),
            ExprKind::Cast {
                operand,
                target,
                allows_empty,
            } => match single_atomic(&operand.expr, ctx)? {
                Some(v) => atomic(cast_atomic(&v, *target)?),
                None if *allows_empty => Ok(None),
                None => Err(Error::from_code(
                    ErrorCode::XPTY0004,
                    "empty sequence cannot be cast without '?'",
                )),
            },
            ExprKind::UntypedConvert {
                operand,
                target,
                conversion,
            } if operand.expr.cardinality().at_most_one() => match single_atomic(&operand.expr, ctx)? {
                Some(v) => atomic(convert_untyped(v, *target, *conversion)?),
                None => Ok(None),
            },
            _ => first_item(self.iterate(ctx)?),
        }
    }

    fn call_item<N: XdmNode>(
        &self,
        function: BuiltinFunction,
        args: &[super::Operand],
        ctx: &DynamicContext<N>,
    ) -> Result<Option<XdmItem<N>>, Error> {
        let boolean =
            |b: bool| -> Result<Option<XdmItem<N>>, Error> { Ok(Some(XdmItem::Atomic(XdmAtomicValue::Boolean(b)))) };
        let Some(arg) = args.first() else {
            return Err(Error::internal(format!("{}() called without arguments", function.local_name())));
        };
        match function {
            BuiltinFunction::Not => boolean(!effective_boolean_value(arg.expr.iterate(ctx)?)?),
            BuiltinFunction::Boolean => boolean(effective_boolean_value(arg.expr.iterate(ctx)?)?),
            BuiltinFunction::Exists | BuiltinFunction::Empty => {
                let mut it = arg.expr.iterate(ctx)?;
                let found = match it.has_next() {
                    Some(found) => found,
                    None => it.next_item().transpose()?.is_some(),
                };
                it.close();
                boolean(found == (function == BuiltinFunction::Exists))
            }
            BuiltinFunction::Count => {
                let n = count_items(arg.expr.iterate(ctx)?)?;
                Ok(Some(XdmItem::Atomic(XdmAtomicValue::Integer(position_as_i64(n)))))
            }
            BuiltinFunction::ExactlyOne | BuiltinFunction::ZeroOrOne => {
                let mut it = arg.expr.iterate(ctx)?;
                let first = it.next_item().transpose()?;
                let second = if first.is_some() { it.next_item().transpose()? } else { None };
                it.close();
                match (function, &first, second) {
                    (BuiltinFunction::ExactlyOne, None, _) | (BuiltinFunction::ExactlyOne, _, Some(_)) => Err(
                        Error::from_code(ErrorCode::FORG0005, "exactly-one() requires exactly one item"),
                    ),
                    (_, _, Some(_)) => Err(Error::from_code(
                        ErrorCode::FORG0003,
                        "zero-or-one() called with more than one item",
                    )),
                    _ => Ok(first),
                }
            }
            BuiltinFunction::Data | BuiltinFunction::Subsequence => first_item(self.iterate(ctx)?),
        }
    }

    fn subsequence<'a, N: XdmNode>(
        &'a self,
        args: &'a [super::Operand],
        ctx: &DynamicContext<N>,
    ) -> Result<SeqIter<'a, N>, Error> {
        let [source, start, rest @ ..] = args else {
            return Err(Error::internal("subsequence() needs at least two arguments"));
        };
        let start = numeric_operand(&start.expr, ctx)?;
        let length = match rest.first() {
            Some(len) => Some(numeric_operand(&len.expr, ctx)?),
            None => None,
        };
        let Some((min, max)) = subsequence_bounds(start, length) else {
            return Ok(Box::new(EmptyIterator::new()));
        };
        let mut iter = source.expr.iterate(ctx)?;
        if iter.properties().contains(IteratorProperties::GROUNDED)
            && let Some(items) = iter.materialize()
        {
            iter.close();
            return Ok(ArrayIterator::new(items).make_slice_iterator(min, max));
        }
        Ok(Box::new(SubsequenceCursor::new(iter, min, max)))
    }

    /// Push the result to the context's output sink.
    pub fn process<N: XdmNode>(&self, ctx: &DynamicContext<N>) -> Result<(), Error> {
        self.process_inner(ctx).map_err(|e| e.at(Some(&self.location)))
    }

    fn process_inner<N: XdmNode>(&self, ctx: &DynamicContext<N>) -> Result<(), Error> {
        match &self.kind {
            ExprKind::ApplyRules { select, mode } => {
                apply::apply_rules(select.expr.iterate(ctx)?, mode, ctx, &self.location)
            }
            ExprKind::NextMatch => apply::next_match(ctx, &self.location),
            ExprKind::Block(parts) => {
                for part in parts {
                    part.expr.process(ctx)?;
                }
                Ok(())
            }
            ExprKind::If {
                condition,
                then,
                otherwise,
            } => {
                if effective_boolean_value(condition.expr.iterate(ctx)?)? {
                    then.expr.process(ctx)
                } else {
                    otherwise.expr.process(ctx)
                }
            }
            ExprKind::Let { binding, value, body } => {
                let value = collect_sequence(value.expr.iterate(ctx)?)?;
                let mut inner = ctx.clone();
                inner.set_local_variable(binding.slot, value);
                body.expr.process(&inner)
            }
            ExprKind::For { binding, input, body } => {
                let mut inner = ctx.clone();
                let mut items = input.expr.iterate(ctx)?;
                while let Some(item) = items.next_item() {
                    let item = match item {
                        Ok(item) => item,
                        Err(e) => {
                            items.close();
                            return Err(e);
                        }
                    };
                    inner.set_local_variable(binding.slot, SequenceValue::singleton(item));
                    if let Err(e) = body.expr.process(&inner) {
                        items.close();
                        return Err(e);
                    }
                }
                Ok(())
            }
            _ => {
                let mut items = self.iterate(ctx)?;
                while let Some(item) = items.next_item() {
                    let appended = item.and_then(|item| {
                        ctx.get_output_sink()?
                            .append(item, Some(&self.location), CopyNamespaces::Preserve)
                    });
                    if let Err(e) = appended {
                        items.close();
                        return Err(e);
                    }
                }
                Ok(())
            }
        }
    }
}

fn position_as_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Effective boolean value of a sequence.
pub(crate) fn effective_boolean_value<'a, N>(mut iter: SeqIter<'a, N>) -> Result<bool, Error> {
    let first = match iter.next_item().transpose() {
        Ok(first) => first,
        Err(e) => {
            iter.close();
            return Err(e);
        }
    };
    let result = match first {
        None => Ok(false),
        Some(XdmItem::Node(_)) => Ok(true),
        Some(XdmItem::Atomic(a)) => match iter.next_item() {
            Some(Err(e)) => Err(e),
            Some(Ok(_)) => Err(Error::from_code(
                ErrorCode::FORG0006,
                "effective boolean value of a sequence of several atomic values",
            )),
            None => atomic_ebv(&a),
        },
    };
    iter.close();
    result
}

fn atomic_ebv(a: &XdmAtomicValue) -> Result<bool, Error> {
    match a {
        XdmAtomicValue::Boolean(b) => Ok(*b),
        XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) | XdmAtomicValue::AnyUri(s) => {
            Ok(!s.is_empty())
        }
        XdmAtomicValue::Integer(i) => Ok(*i != 0),
        XdmAtomicValue::Decimal(d) | XdmAtomicValue::Double(d) => Ok(*d != 0.0 && !d.is_nan()),
        XdmAtomicValue::Float(f) => Ok(*f != 0.0 && !f.is_nan()),
    }
}

/// Effective boolean value of a literal sequence.
pub(crate) fn literal_ebv(values: &[XdmAtomicValue]) -> Result<bool, Error> {
    match values {
        [] => Ok(false),
        [single] => atomic_ebv(single),
        _ => Err(Error::from_code(
            ErrorCode::FORG0006,
            "effective boolean value of a sequence of several atomic values",
        )),
    }
}

/// Predicate truth: a single numeric value selects the item at that
/// position, anything else goes through the effective boolean value.
pub(crate) fn predicate_matches<N: XdmNode>(
    predicate: &Expression,
    ctx: &DynamicContext<N>,
    position: usize,
) -> Result<bool, Error> {
    let mut iter = predicate.iterate(ctx)?;
    let first = match iter.next_item().transpose() {
        Ok(first) => first,
        Err(e) => {
            iter.close();
            return Err(e);
        }
    };
    if let Some(XdmItem::Atomic(a)) = &first
        && a.is_numeric()
    {
        let result = match iter.next_item() {
            Some(Err(e)) => Err(e),
            Some(Ok(_)) => Err(Error::from_code(
                ErrorCode::FORG0006,
                "predicate evaluates to a sequence of several atomic values",
            )),
            None => Ok(numeric_value(a).is_some_and(|d| d == position as f64)),
        };
        iter.close();
        return result;
    }
    let rest: SeqIter<'_, N> = match first {
        Some(item) => Box::new(Prepend {
            first: Some(item),
            rest: iter,
        }),
        None => {
            iter.close();
            return Ok(false);
        }
    };
    effective_boolean_value(rest)
}

/// Puts back an item already pulled from `rest`.
struct Prepend<'a, N> {
    first: Option<XdmItem<N>>,
    rest: SeqIter<'a, N>,
}

impl<'a, N> SequenceIterator<'a, N> for Prepend<'a, N> {
    fn next_item(&mut self) -> Option<crate::xdm::XdmItemResult<N>> {
        match self.first.take() {
            Some(item) => Some(Ok(item)),
            None => self.rest.next_item(),
        }
    }

    fn close(&mut self) {
        self.first = None;
        self.rest.close();
    }
}

fn numeric_value(a: &XdmAtomicValue) -> Option<f64> {
    match a {
        XdmAtomicValue::Integer(i) => Some(*i as f64),
        XdmAtomicValue::Decimal(d) | XdmAtomicValue::Double(d) => Some(*d),
        XdmAtomicValue::Float(f) => Some(f64::from(*f)),
        _ => None,
    }
}

/// Atomized value of an operand that must yield at most one item.
fn single_atomic<N: XdmNode>(expr: &Expression, ctx: &DynamicContext<N>) -> Result<Option<XdmAtomicValue>, Error> {
    let mut iter: SeqIter<'_, N> = Box::new(AtomizeCursor::new(expr.iterate(ctx)?));
    let first = iter.next_item().transpose();
    let second = match &first {
        Ok(Some(_)) => iter.next_item().transpose(),
        _ => Ok(None),
    };
    iter.close();
    let first = first?;
    if second?.is_some() {
        return Err(Error::from_code(
            ErrorCode::XPTY0004,
            "a sequence of more than one item is not allowed as an operand here",
        )
        .at(Some(&expr.location)));
    }
    Ok(first.and_then(|item| match item {
        XdmItem::Atomic(a) => Some(a),
        XdmItem::Node(_) => None,
    }))
}

fn numeric_operand<N: XdmNode>(expr: &Expression, ctx: &DynamicContext<N>) -> Result<f64, Error> {
    let value = single_atomic(expr, ctx)?
        .ok_or_else(|| Error::from_code(ErrorCode::XPTY0004, "numeric argument is empty").at(Some(&expr.location)))?;
    let value = convert_untyped(value, super::AtomicType::Double, Default::default())?;
    numeric_value(&value).ok_or_else(|| {
        Error::from_code(
            ErrorCode::XPTY0004,
            format!("xs:{} is not numeric", value.type_of().local_name()),
        )
        .at(Some(&expr.location))
    })
}

fn integer_operand<N: XdmNode>(expr: &Expression, ctx: &DynamicContext<N>) -> Result<Option<i64>, Error> {
    match single_atomic(expr, ctx)? {
        None => Ok(None),
        Some(XdmAtomicValue::Integer(i)) => Ok(Some(i)),
        Some(untyped @ XdmAtomicValue::UntypedAtomic(_)) => match cast_atomic(&untyped, super::AtomicType::Integer)? {
            XdmAtomicValue::Integer(i) => Ok(Some(i)),
            _ => Err(Error::internal("integer cast produced a non-integer")),
        },
        Some(other) => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("range bound of type xs:{} is not an xs:integer", other.type_of().local_name()),
        )
        .at(Some(&expr.location))),
    }
}

/// 1-based inclusive bounds selected by `subsequence($s, start, length)`,
/// with XPath rounding. `None` when nothing can be selected.
pub(crate) fn subsequence_bounds(start: f64, length: Option<f64>) -> Option<(i64, i64)> {
    let round = |d: f64| (d + 0.5).floor();
    let first = round(start);
    if first.is_nan() {
        return None;
    }
    let last = match length {
        None => f64::INFINITY,
        Some(len) => {
            let len = round(len);
            if len.is_nan() {
                return None;
            }
            first + len - 1.0
        }
    };
    if last < first.max(1.0) {
        return None;
    }
    let clamp = |d: f64| {
        if d >= i64::MAX as f64 {
            i64::MAX
        } else if d <= 1.0 {
            1
        } else {
            d as i64
        }
    };
    Some((clamp(first), clamp(last)))
}

fn document_order<N: XdmNode>(items: &mut [XdmItem<N>]) -> Result<(), Error> {
    let mut failure = None;
    items.sort_by(|a, b| match (a, b) {
        (XdmItem::Node(x), XdmItem::Node(y)) => x.compare_document_order(y).unwrap_or_else(|e| {
            failure.get_or_insert(e);
            Ordering::Equal
        }),
        _ => Ordering::Equal,
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Nodes sorted into document order without duplicates; atomic results keep
/// their order. A mixture is an error.
fn sort_path_result<N: XdmNode>(items: SequenceValue<N>) -> Result<SequenceValue<N>, Error> {
    let nodes = items.iter().filter(|i| i.is_node()).count();
    if nodes == 0 {
        return Ok(items);
    }
    if nodes != items.len() {
        return Err(Error::from_code(
            ErrorCode::XPTY0018,
            "path result contains both nodes and atomic values",
        ));
    }
    let mut items = items.to_vec();
    document_order(&mut items)?;
    items.dedup();
    Ok(SequenceValue::from_items(items))
}

fn union_of<N: XdmNode>(left: &SequenceValue<N>, right: &SequenceValue<N>) -> Result<SequenceValue<N>, Error> {
    if left.iter().chain(right.iter()).any(|i| !i.is_node()) {
        return Err(Error::from_code(ErrorCode::XPTY0004, "union operands must be nodes"));
    }
    let mut items: Vec<XdmItem<N>> = left.iter().chain(right.iter()).cloned().collect();
    document_order(&mut items)?;
    items.dedup();
    Ok(SequenceValue::from_items(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsequence_rounding() {
        assert_eq!(subsequence_bounds(2.0, Some(2.0)), Some((2, 3)));
        assert_eq!(subsequence_bounds(1.5, Some(1.0)), Some((2, 2)));
        assert_eq!(subsequence_bounds(0.0, Some(3.0)), Some((1, 2)));
        assert_eq!(subsequence_bounds(f64::NAN, None), None);
        assert_eq!(subsequence_bounds(3.0, Some(0.0)), None);
        assert_eq!(subsequence_bounds(-1.0, None), Some((1, i64::MAX)));
    }

    #[test]
    fn literal_ebv_rules() {
        assert_eq!(literal_ebv(&[]).ok(), Some(false));
        assert_eq!(literal_ebv(&[XdmAtomicValue::string("")]).ok(), Some(false));
        assert_eq!(literal_ebv(&[XdmAtomicValue::Double(f64::NAN)]).ok(), Some(false));
        assert_eq!(literal_ebv(&[XdmAtomicValue::Integer(3)]).ok(), Some(true));
        let err = literal_ebv(&[XdmAtomicValue::Integer(1), XdmAtomicValue::Integer(2)]).expect_err("FORG0006");
        assert_eq!(err.code_enum(), ErrorCode::FORG0006);
    }
}
