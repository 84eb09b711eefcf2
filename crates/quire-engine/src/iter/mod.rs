//! Lazy pull iteration over sequences.
//!
//! A [`SequenceIterator`] yields items one at a time. Optional capabilities
//! are advertised through [`IteratorProperties`]; a consumer checks the flags
//! once and only then calls the matching method, which returns `Some` exactly
//! when the flag is set.
use crate::engine::runtime::Error;
use crate::xdm::{SequenceValue, XdmItem, XdmItemResult};
use bitflags::bitflags;

mod adapters;
mod array;
mod range;

pub use adapters::{BufferedIterator, ExternalCursor, ExternalIterator, LookaheadIterator};
pub use array::{ArrayIterator, EmptyIterator};
pub use range::RangeIterator;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IteratorProperties: u8 {
        /// `has_next` can answer without consuming.
        const LOOKAHEAD = 1;
        /// `length` knows the total number of items.
        const LAST_POSITION_FINDER = 1 << 1;
        /// `materialize` returns the complete backing sequence.
        const GROUNDED = 1 << 2;
        /// `clone_fresh` yields a new iterator positioned before the first item.
        const RESTARTABLE = 1 << 3;
    }
}

impl IteratorProperties {
    pub const ALL: Self = Self::all();
}

pub type SeqIter<'a, N> = Box<dyn SequenceIterator<'a, N> + 'a>;

/// Single-use pull cursor.
///
/// After `next_item` returns `None` once it keeps returning `None`. A dynamic
/// error is returned in place of an item; iterators in this crate are
/// exhausted after yielding an error.
pub trait SequenceIterator<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>>;

    /// Release held resources. Idempotent and valid after exhaustion.
    fn close(&mut self) {}

    fn properties(&self) -> IteratorProperties {
        IteratorProperties::empty()
    }

    fn has_next(&mut self) -> Option<bool> {
        None
    }

    /// Total number of items, independent of the current position.
    fn length(&self) -> Option<usize> {
        None
    }

    /// The full backing sequence; iteration position is unaffected.
    fn materialize(&self) -> Option<SequenceValue<N>> {
        None
    }

    fn clone_fresh(&self) -> Option<SeqIter<'a, N>> {
        None
    }
}

impl<'a, N> SequenceIterator<'a, N> for SeqIter<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        (**self).next_item()
    }
    fn close(&mut self) {
        (**self).close()
    }
    fn properties(&self) -> IteratorProperties {
        (**self).properties()
    }
    fn has_next(&mut self) -> Option<bool> {
        (**self).has_next()
    }
    fn length(&self) -> Option<usize> {
        (**self).length()
    }
    fn materialize(&self) -> Option<SequenceValue<N>> {
        (**self).materialize()
    }
    fn clone_fresh(&self) -> Option<SeqIter<'a, N>> {
        (**self).clone_fresh()
    }
}

/// First item of a fresh iterator; the iterator is closed afterwards.
pub fn first_item<'a, N>(mut iter: SeqIter<'a, N>) -> Result<Option<XdmItem<N>>, Error> {
    let first = iter.next_item().transpose();
    iter.close();
    first
}

/// Drain a fresh iterator into a sequence. Grounded iterators hand over their
/// backing storage without copying.
pub fn collect_sequence<'a, N: Clone>(mut iter: SeqIter<'a, N>) -> Result<SequenceValue<N>, Error> {
    if iter.properties().contains(IteratorProperties::GROUNDED)
        && let Some(value) = iter.materialize()
    {
        iter.close();
        return Ok(value);
    }
    let mut items = Vec::new();
    while let Some(item) = iter.next_item() {
        match item {
            Ok(item) => items.push(item),
            Err(e) => {
                iter.close();
                return Err(e);
            }
        }
    }
    Ok(SequenceValue::from_items(items))
}

/// Number of items in a fresh iterator, using `length` when advertised.
pub fn count_items<'a, N>(mut iter: SeqIter<'a, N>) -> Result<usize, Error> {
    if iter.properties().contains(IteratorProperties::LAST_POSITION_FINDER)
        && let Some(n) = iter.length()
    {
        iter.close();
        return Ok(n);
    }
    let mut n = 0usize;
    while let Some(item) = iter.next_item() {
        if let Err(e) = item {
            iter.close();
            return Err(e);
        }
        n += 1;
    }
    Ok(n)
}

/// Length of the sequence behind `iter` without moving it: `length` when
/// available, otherwise counting a restarted copy.
pub fn length_of<'a, N>(iter: &dyn SequenceIterator<'a, N>) -> Option<Result<usize, Error>> {
    let props = iter.properties();
    if props.contains(IteratorProperties::LAST_POSITION_FINDER) {
        return iter.length().map(Ok);
    }
    if props.contains(IteratorProperties::RESTARTABLE) {
        return iter.clone_fresh().map(count_items);
    }
    None
}
