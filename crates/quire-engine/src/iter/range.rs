use super::{IteratorProperties, SeqIter, SequenceIterator};
use crate::xdm::{XdmAtomicValue, XdmItem, XdmItemResult};
use core::marker::PhantomData;

/// Ascending run of `xs:integer` values `lo..=hi`, computed on demand.
pub struct RangeIterator<N> {
    lo: i64,
    hi: i64,
    next: Option<i64>,
    _marker: PhantomData<fn() -> N>,
}

impl<N> RangeIterator<N> {
    pub fn new(lo: i64, hi: i64) -> Self {
        Self {
            lo,
            hi,
            next: (lo <= hi).then_some(lo),
            _marker: PhantomData,
        }
    }
}

impl<'a, N: 'a> SequenceIterator<'a, N> for RangeIterator<N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        let current = self.next?;
        self.next = if current < self.hi { Some(current + 1) } else { None };
        Some(Ok(XdmItem::Atomic(XdmAtomicValue::Integer(current))))
    }

    fn close(&mut self) {
        self.next = None;
    }

    fn properties(&self) -> IteratorProperties {
        IteratorProperties::LOOKAHEAD
            | IteratorProperties::LAST_POSITION_FINDER
            | IteratorProperties::RESTARTABLE
    }

    fn has_next(&mut self) -> Option<bool> {
        Some(self.next.is_some())
    }

    fn length(&self) -> Option<usize> {
        if self.lo > self.hi {
            return Some(0);
        }
        let span = i128::from(self.hi) - i128::from(self.lo) + 1;
        Some(usize::try_from(span).unwrap_or(usize::MAX))
    }

    fn clone_fresh(&self) -> Option<SeqIter<'a, N>> {
        Some(Box::new(RangeIterator::new(self.lo, self.hi)))
    }
}
