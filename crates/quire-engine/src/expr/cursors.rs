//! Lazy iterators behind `Expression::iterate`.
//!
//! Each cursor owns a clone of the dynamic context it was created with, so
//! later slot assignments by the caller never leak into a running cursor.
//! Once a cursor yields an error or `None` it stays exhausted.
use super::eval::predicate_matches;
use super::step::{AxisWalk, NodeTest};
use super::types::{AtomicType, cast_atomic};
use super::{Cardinality, Expression, Operand};
use crate::engine::runtime::{DynamicContext, Error, ErrorCode, Location, NumericConversion};
use crate::iter::{SeqIter, SequenceIterator};
use crate::model::XdmNode;
use crate::xdm::{SequenceValue, XdmAtomicValue, XdmItem, XdmItemResult};
use std::collections::VecDeque;

/// Nodes of an axis step that pass the node test, pulled from the tree one
/// at a time.
pub(crate) struct AxisCursor<'a, N> {
    walk: Option<AxisWalk<N>>,
    test: &'a NodeTest,
}

impl<'a, N: XdmNode> AxisCursor<'a, N> {
    pub(crate) fn new(walk: AxisWalk<N>, test: &'a NodeTest) -> Self {
        Self { walk: Some(walk), test }
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for AxisCursor<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        let test = self.test;
        match self.walk.as_mut()?.find(|n| test.matches(n)) {
            Some(node) => Some(Ok(XdmItem::Node(node))),
            None => {
                self.close();
                None
            }
        }
    }

    fn close(&mut self) {
        self.walk = None;
    }
}

/// `start/step`: evaluates `step` once per item of `start`.
pub(crate) struct PathCursor<'a, N> {
    start: SeqIter<'a, N>,
    step: &'a Expression,
    ctx: DynamicContext<N>,
    size: Option<usize>,
    position: usize,
    current: Option<SeqIter<'a, N>>,
    location: &'a Location,
    finished: bool,
}

impl<'a, N: XdmNode> PathCursor<'a, N> {
    pub(crate) fn new(
        start: SeqIter<'a, N>,
        size: Option<usize>,
        step: &'a Expression,
        ctx: &DynamicContext<N>,
        location: &'a Location,
    ) -> Self {
        Self {
            start,
            step,
            ctx: ctx.clone(),
            size,
            position: 0,
            current: None,
            location,
            finished: false,
        }
    }

    fn fail(&mut self, err: Error) -> Option<XdmItemResult<N>> {
        self.close();
        Some(Err(err.at(Some(self.location))))
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for PathCursor<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.finished {
            return None;
        }
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next_item() {
                    Some(Ok(item)) => return Some(Ok(item)),
                    Some(Err(e)) => return self.fail(e),
                    None => {
                        current.close();
                        self.current = None;
                    }
                }
            }
            match self.start.next_item() {
                None => {
                    self.close();
                    return None;
                }
                Some(Err(e)) => return self.fail(e),
                Some(Ok(item)) => {
                    if !item.is_node() {
                        return self.fail(Error::from_code(
                            ErrorCode::XPTY0019,
                            "path step applied to an atomic value",
                        ));
                    }
                    self.position += 1;
                    let focus = self.ctx.with_focus(item, self.position, self.size);
                    match self.step.iterate(&focus) {
                        Ok(it) => self.current = Some(it),
                        Err(e) => return self.fail(e),
                    }
                }
            }
        }
    }

    fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            if let Some(mut current) = self.current.take() {
                current.close();
            }
            self.start.close();
        }
    }
}

/// `base[predicate]` for predicates that depend on the focus.
pub(crate) struct FilterCursor<'a, N> {
    base: SeqIter<'a, N>,
    predicate: &'a Expression,
    ctx: DynamicContext<N>,
    size: Option<usize>,
    position: usize,
    location: &'a Location,
    finished: bool,
}

impl<'a, N: XdmNode> FilterCursor<'a, N> {
    pub(crate) fn new(
        base: SeqIter<'a, N>,
        size: Option<usize>,
        predicate: &'a Expression,
        ctx: &DynamicContext<N>,
        location: &'a Location,
    ) -> Self {
        Self {
            base,
            predicate,
            ctx: ctx.clone(),
            size,
            position: 0,
            location,
            finished: false,
        }
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for FilterCursor<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.finished {
            return None;
        }
        loop {
            let item = match self.base.next_item() {
                None => {
                    self.close();
                    return None;
                }
                Some(Err(e)) => {
                    self.close();
                    return Some(Err(e));
                }
                Some(Ok(item)) => item,
            };
            self.position += 1;
            let focus = self.ctx.with_focus(item.clone(), self.position, self.size);
            match predicate_matches(self.predicate, &focus, self.position) {
                Ok(true) => return Some(Ok(item)),
                Ok(false) => {}
                Err(e) => {
                    self.close();
                    return Some(Err(e.at(Some(self.location))));
                }
            }
        }
    }

    fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            self.base.close();
        }
    }
}

/// `for $x in input return body`.
pub(crate) struct ForCursor<'a, N> {
    input: SeqIter<'a, N>,
    body: &'a Expression,
    slot: usize,
    ctx: DynamicContext<N>,
    current: Option<SeqIter<'a, N>>,
    finished: bool,
}

impl<'a, N: XdmNode> ForCursor<'a, N> {
    pub(crate) fn new(input: SeqIter<'a, N>, slot: usize, body: &'a Expression, ctx: &DynamicContext<N>) -> Self {
        Self {
            input,
            body,
            slot,
            ctx: ctx.clone(),
            current: None,
            finished: false,
        }
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for ForCursor<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.finished {
            return None;
        }
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next_item() {
                    Some(Ok(item)) => return Some(Ok(item)),
                    Some(Err(e)) => {
                        self.close();
                        return Some(Err(e));
                    }
                    None => {
                        current.close();
                        self.current = None;
                    }
                }
            }
            match self.input.next_item() {
                None => {
                    self.close();
                    return None;
                }
                Some(Err(e)) => {
                    self.close();
                    return Some(Err(e));
                }
                Some(Ok(item)) => {
                    self.ctx.set_local_variable(self.slot, SequenceValue::singleton(item));
                    match self.body.iterate(&self.ctx) {
                        Ok(it) => self.current = Some(it),
                        Err(e) => {
                            self.close();
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }

    fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            if let Some(mut current) = self.current.take() {
                current.close();
            }
            self.input.close();
        }
    }
}

/// Items of each block member in turn.
pub(crate) struct ConcatCursor<'a, N> {
    parts: &'a [Operand],
    next_part: usize,
    ctx: DynamicContext<N>,
    current: Option<SeqIter<'a, N>>,
    finished: bool,
}

impl<'a, N: XdmNode> ConcatCursor<'a, N> {
    pub(crate) fn new(parts: &'a [Operand], ctx: &DynamicContext<N>) -> Self {
        Self {
            parts,
            next_part: 0,
            ctx: ctx.clone(),
            current: None,
            finished: false,
        }
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for ConcatCursor<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.finished {
            return None;
        }
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next_item() {
                    Some(Ok(item)) => return Some(Ok(item)),
                    Some(Err(e)) => {
                        self.close();
                        return Some(Err(e));
                    }
                    None => {
                        current.close();
                        self.current = None;
                    }
                }
            }
            let Some(part) = self.parts.get(self.next_part) else {
                self.close();
                return None;
            };
            self.next_part += 1;
            match part.expr.iterate(&self.ctx) {
                Ok(it) => self.current = Some(it),
                Err(e) => {
                    self.close();
                    return Some(Err(e));
                }
            }
        }
    }

    fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            if let Some(mut current) = self.current.take() {
                current.close();
            }
        }
    }
}

/// Replaces nodes by their typed values.
pub(crate) struct AtomizeCursor<'a, N> {
    inner: SeqIter<'a, N>,
    pending: VecDeque<XdmAtomicValue>,
    finished: bool,
}

impl<'a, N: XdmNode> AtomizeCursor<'a, N> {
    pub(crate) fn new(inner: SeqIter<'a, N>) -> Self {
        Self {
            inner,
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for AtomizeCursor<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        loop {
            if let Some(value) = self.pending.pop_front() {
                return Some(Ok(XdmItem::Atomic(value)));
            }
            if self.finished {
                return None;
            }
            match self.inner.next_item() {
                None => {
                    self.close();
                    return None;
                }
                Some(Err(e)) => {
                    self.close();
                    return Some(Err(e));
                }
                Some(Ok(XdmItem::Atomic(a))) => return Some(Ok(XdmItem::Atomic(a))),
                Some(Ok(XdmItem::Node(n))) => self.pending.extend(n.typed_value()),
            }
        }
    }

    fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            self.pending.clear();
            self.inner.close();
        }
    }
}

/// Casts `xs:untypedAtomic` items to a target type, passing others through.
pub(crate) struct UntypedConvertCursor<'a, N> {
    inner: SeqIter<'a, N>,
    target: AtomicType,
    conversion: NumericConversion,
    finished: bool,
}

impl<'a, N: XdmNode> UntypedConvertCursor<'a, N> {
    pub(crate) fn new(inner: SeqIter<'a, N>, target: AtomicType, conversion: NumericConversion) -> Self {
        Self {
            inner,
            target,
            conversion,
            finished: false,
        }
    }
}

pub(crate) fn convert_untyped(
    value: XdmAtomicValue,
    target: AtomicType,
    conversion: NumericConversion,
) -> Result<XdmAtomicValue, Error> {
    if !matches!(value, XdmAtomicValue::UntypedAtomic(_)) {
        return Ok(value);
    }
    match cast_atomic(&value, target) {
        Err(e)
            if conversion == NumericConversion::Lenient
                && e.code_enum() == ErrorCode::FORG0001
                && matches!(target, AtomicType::Double | AtomicType::Numeric) =>
        {
            Ok(XdmAtomicValue::Double(f64::NAN))
        }
        other => other,
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for UntypedConvertCursor<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.finished {
            return None;
        }
        let result = match self.inner.next_item()? {
            Ok(XdmItem::Atomic(a)) => convert_untyped(a, self.target, self.conversion).map(XdmItem::Atomic),
            other => other,
        };
        if result.is_err() {
            self.close();
        }
        Some(result)
    }

    fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            self.inner.close();
        }
    }
}

/// Passes items through while checking the count against `required`.
pub(crate) struct CardinalityCursor<'a, N> {
    inner: SeqIter<'a, N>,
    required: Cardinality,
    count: usize,
    location: &'a Location,
    finished: bool,
}

impl<'a, N: XdmNode> CardinalityCursor<'a, N> {
    pub(crate) fn new(inner: SeqIter<'a, N>, required: Cardinality, location: &'a Location) -> Self {
        Self {
            inner,
            required,
            count: 0,
            location,
            finished: false,
        }
    }

    fn violation(&mut self) -> Option<XdmItemResult<N>> {
        self.close();
        let msg = if self.count == 0 {
            "an empty sequence is not allowed here".to_string()
        } else {
            format!("a sequence of more than {} item(s) is not allowed here", self.count - 1)
        };
        Some(Err(Error::from_code(ErrorCode::XPTY0004, msg).at(Some(self.location))))
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for CardinalityCursor<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.finished {
            return None;
        }
        match self.inner.next_item() {
            None => {
                if self.count == 0 && !self.required.allows_zero() {
                    return self.violation();
                }
                self.close();
                None
            }
            Some(Err(e)) => {
                self.close();
                Some(Err(e))
            }
            Some(Ok(item)) => {
                self.count += 1;
                if !self.required.admits(self.count) {
                    return self.violation();
                }
                Some(Ok(item))
            }
        }
    }

    fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            self.inner.close();
        }
    }
}

/// Items at 1-based positions `min..=max` of a sequence that cannot be sliced
/// directly. The source is closed as soon as `max` is passed.
pub(crate) struct SubsequenceCursor<'a, N> {
    inner: SeqIter<'a, N>,
    min: i64,
    max: i64,
    position: i64,
    finished: bool,
}

impl<'a, N: XdmNode> SubsequenceCursor<'a, N> {
    pub(crate) fn new(inner: SeqIter<'a, N>, min: i64, max: i64) -> Self {
        Self {
            inner,
            min,
            max,
            position: 0,
            finished: false,
        }
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for SubsequenceCursor<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        while !self.finished {
            if self.position >= self.max {
                self.close();
                break;
            }
            match self.inner.next_item() {
                None => self.close(),
                Some(Err(e)) => {
                    self.close();
                    return Some(Err(e));
                }
                Some(Ok(item)) => {
                    self.position += 1;
                    if self.position >= self.min {
                        return Some(Ok(item));
                    }
                }
            }
        }
        None
    }

    fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            self.inner.close();
        }
    }
}
