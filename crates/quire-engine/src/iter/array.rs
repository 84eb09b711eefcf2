use super::{IteratorProperties, SeqIter, SequenceIterator};
use crate::xdm::{SequenceValue, XdmItem, XdmItemResult};
use core::marker::PhantomData;

/// Iterator over the `[start, end)` window of a shared item array.
pub struct ArrayIterator<N> {
    items: SequenceValue<N>,
    start: usize,
    end: usize,
    index: usize,
}

impl<N> ArrayIterator<N> {
    pub fn new(items: SequenceValue<N>) -> Self {
        let end = items.len();
        Self {
            items,
            start: 0,
            end,
            index: 0,
        }
    }

    /// Window over `items`; bounds are clamped to the array.
    pub fn with_bounds(items: SequenceValue<N>, start: usize, end: usize) -> Self {
        let end = end.min(items.len());
        let start = start.min(end);
        Self {
            items,
            start,
            end,
            index: start,
        }
    }

    pub fn singleton(item: XdmItem<N>) -> Self {
        Self::new(SequenceValue::singleton(item))
    }

    pub fn bounds(&self) -> (usize, usize) {
        (self.start, self.end)
    }

    /// Sub-window for the 1-based inclusive positions `min..=max` of this
    /// window, clamped to `[start, end)`. `None` when nothing is left.
    pub fn slice(&self, min: i64, max: i64) -> Option<ArrayIterator<N>> {
        let start = to_i64(self.start);
        let end = to_i64(self.end);
        let lo = start.saturating_add(min).saturating_sub(1).clamp(start, end);
        let hi = start.saturating_add(max).clamp(start, end);
        if lo >= hi {
            return None;
        }
        // lo and hi lie within [start, end], so they fit in usize again.
        Some(ArrayIterator {
            items: self.items.clone(),
            start: lo as usize,
            end: hi as usize,
            index: lo as usize,
        })
    }

    /// [`slice`](Self::slice) as a boxed iterator, explicitly empty when the
    /// clamped range is empty.
    pub fn make_slice_iterator<'a>(&self, min: i64, max: i64) -> SeqIter<'a, N>
    where
        N: Clone + 'a,
    {
        match self.slice(min, max) {
            Some(it) => Box::new(it),
            None => Box::new(EmptyIterator::new()),
        }
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl<'a, N: Clone + 'a> SequenceIterator<'a, N> for ArrayIterator<N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.index >= self.end {
            return None;
        }
        let item = self.items.get(self.index)?.clone();
        self.index += 1;
        Some(Ok(item))
    }

    fn close(&mut self) {
        self.index = self.end;
    }

    fn properties(&self) -> IteratorProperties {
        IteratorProperties::ALL
    }

    fn has_next(&mut self) -> Option<bool> {
        Some(self.index < self.end)
    }

    fn length(&self) -> Option<usize> {
        Some(self.end - self.start)
    }

    fn materialize(&self) -> Option<SequenceValue<N>> {
        if self.start == 0 && self.end == self.items.len() {
            return Some(self.items.clone());
        }
        Some(self.items.items()[self.start..self.end].to_vec().into())
    }

    fn clone_fresh(&self) -> Option<SeqIter<'a, N>> {
        Some(Box::new(ArrayIterator {
            items: self.items.clone(),
            start: self.start,
            end: self.end,
            index: self.start,
        }))
    }
}

pub struct EmptyIterator<N> {
    _marker: PhantomData<fn() -> N>,
}

impl<N> EmptyIterator<N> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<N> Default for EmptyIterator<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, N: 'a> SequenceIterator<'a, N> for EmptyIterator<N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        None
    }

    fn properties(&self) -> IteratorProperties {
        IteratorProperties::ALL
    }

    fn has_next(&mut self) -> Option<bool> {
        Some(false)
    }

    fn length(&self) -> Option<usize> {
        Some(0)
    }

    fn materialize(&self) -> Option<SequenceValue<N>> {
        Some(SequenceValue::empty())
    }

    fn clone_fresh(&self) -> Option<SeqIter<'a, N>> {
        Some(Box::new(EmptyIterator::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xdm::XdmAtomicValue;

    fn ints(n: i64) -> SequenceValue<()> {
        (1..=n).map(|i| XdmItem::Atomic(XdmAtomicValue::Integer(i))).collect()
    }

    #[test]
    fn slice_of_a_window_is_relative_to_its_start() {
        let window = ArrayIterator::with_bounds(ints(10), 2, 8);
        let sub = window.slice(2, 4).expect("non-empty");
        assert_eq!(sub.bounds(), (3, 6));
    }

    #[test]
    fn extreme_bounds_saturate() {
        let it = ArrayIterator::new(ints(3));
        assert_eq!(it.slice(i64::MIN, i64::MAX).map(|s| s.bounds()), Some((0, 3)));
        assert!(it.slice(i64::MAX, i64::MAX).is_none());
        assert!(it.slice(3, 2).is_none());
    }
}
