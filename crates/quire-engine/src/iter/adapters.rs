use super::{IteratorProperties, SeqIter, SequenceIterator};
use crate::engine::runtime::Error;
use crate::xdm::{SequenceValue, XdmItem, XdmItemResult};
use std::cell::RefCell;
use std::rc::Rc;

/// Adds `has_next` to any iterator by holding back one pulled result.
pub struct LookaheadIterator<'a, N> {
    inner: SeqIter<'a, N>,
    peeked: Option<Option<XdmItemResult<N>>>,
}

impl<'a, N> LookaheadIterator<'a, N> {
    pub fn new(inner: SeqIter<'a, N>) -> Self {
        Self { inner, peeked: None }
    }

    pub fn peek(&mut self) -> Option<&XdmItemResult<N>> {
        if self.peeked.is_none() {
            self.peeked = Some(self.inner.next_item());
        }
        self.peeked.as_ref().and_then(Option::as_ref)
    }
}

impl<'a, N: 'a> SequenceIterator<'a, N> for LookaheadIterator<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        match self.peeked.take() {
            Some(peeked) => peeked,
            None => self.inner.next_item(),
        }
    }

    fn close(&mut self) {
        self.peeked = Some(None);
        self.inner.close();
    }

    fn properties(&self) -> IteratorProperties {
        self.inner.properties() | IteratorProperties::LOOKAHEAD
    }

    /// A pending error counts as a next item: the following `next_item` returns it.
    fn has_next(&mut self) -> Option<bool> {
        Some(self.peek().is_some())
    }

    fn length(&self) -> Option<usize> {
        self.inner.length()
    }

    fn materialize(&self) -> Option<SequenceValue<N>> {
        self.inner.materialize()
    }

    fn clone_fresh(&self) -> Option<SeqIter<'a, N>> {
        self.inner.clone_fresh()
    }
}

struct Replay<'a, N> {
    source: Option<SeqIter<'a, N>>,
    buffer: Vec<XdmItem<N>>,
    error: Option<Error>,
    readers: usize,
}

impl<'a, N> Replay<'a, N> {
    /// Make sure `index` is buffered if the source still has it.
    fn fill_to(&mut self, index: usize) {
        while self.buffer.len() <= index {
            let Some(source) = self.source.as_mut() else {
                return;
            };
            match source.next_item() {
                Some(Ok(item)) => self.buffer.push(item),
                Some(Err(e)) => {
                    self.error = Some(e);
                    self.release();
                }
                None => self.release(),
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
        }
    }

    fn leave(&mut self) {
        self.readers = self.readers.saturating_sub(1);
        if self.readers == 0 {
            self.release();
        }
    }
}

/// Restartable view over a one-shot source.
///
/// Pulled items are kept in a buffer shared by every iterator derived
/// through `clone_fresh`, so restarting never re-reads the source. A source
/// error is replayed to each reader at the position where it occurred.
pub struct BufferedIterator<'a, N> {
    shared: Rc<RefCell<Replay<'a, N>>>,
    index: usize,
    done: bool,
}

impl<'a, N> BufferedIterator<'a, N> {
    pub fn new(source: SeqIter<'a, N>) -> Self {
        Self {
            shared: Rc::new(RefCell::new(Replay {
                source: Some(source),
                buffer: Vec::new(),
                error: None,
                readers: 1,
            })),
            index: 0,
            done: false,
        }
    }
}

impl<'a, N: Clone + 'a> SequenceIterator<'a, N> for BufferedIterator<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.done {
            return None;
        }
        let mut replay = self.shared.borrow_mut();
        replay.fill_to(self.index);
        if let Some(item) = replay.buffer.get(self.index) {
            self.index += 1;
            return Some(Ok(item.clone()));
        }
        self.done = true;
        replay.leave();
        replay.error.clone().map(Err)
    }

    /// Closing the last open reader releases the source.
    fn close(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.shared.borrow_mut().leave();
    }

    fn properties(&self) -> IteratorProperties {
        IteratorProperties::LOOKAHEAD | IteratorProperties::RESTARTABLE
    }

    fn has_next(&mut self) -> Option<bool> {
        if self.done {
            return Some(false);
        }
        let mut replay = self.shared.borrow_mut();
        replay.fill_to(self.index);
        Some(self.index < replay.buffer.len() || replay.error.is_some())
    }

    fn clone_fresh(&self) -> Option<SeqIter<'a, N>> {
        self.shared.borrow_mut().readers += 1;
        Some(Box::new(BufferedIterator {
            shared: Rc::clone(&self.shared),
            index: 0,
            done: false,
        }))
    }
}

/// A host-provided source of items holding a resource that must be released.
pub trait ExternalCursor<N> {
    fn fetch(&mut self) -> Result<Option<XdmItem<N>>, Error>;

    /// Called exactly once, on exhaustion, error or close.
    fn release(&mut self);
}

/// Adapts an [`ExternalCursor`] to the iterator protocol.
pub struct ExternalIterator<C> {
    cursor: C,
    finished: bool,
    released: bool,
}

impl<C> ExternalIterator<C> {
    pub fn new(cursor: C) -> Self {
        Self {
            cursor,
            finished: false,
            released: false,
        }
    }

    pub fn cursor(&self) -> &C {
        &self.cursor
    }
}

impl<C> ExternalIterator<C> {
    fn finish<N>(&mut self)
    where
        C: ExternalCursor<N>,
    {
        self.finished = true;
        if !self.released {
            self.released = true;
            self.cursor.release();
        }
    }
}

impl<'a, N, C> SequenceIterator<'a, N> for ExternalIterator<C>
where
    C: ExternalCursor<N> + 'a,
{
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.finished {
            return None;
        }
        match self.cursor.fetch() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finish::<N>();
                None
            }
            Err(e) => {
                self.finish::<N>();
                Some(Err(e))
            }
        }
    }

    fn close(&mut self) {
        self.finish::<N>();
    }
}
