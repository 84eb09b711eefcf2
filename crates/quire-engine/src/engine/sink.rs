//! Push-mode output destinations.
use crate::engine::runtime::{Error, Location};
use crate::xdm::{XdmItem, XdmSequence};
use std::cell::RefCell;
use std::rc::Rc;

/// Namespace handling requested when a node is copied to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyNamespaces {
    #[default]
    Preserve,
    NoNamespaces,
}

/// Receives the items of a sequence one at a time, in order.
pub trait OutputSink<N> {
    fn append(
        &mut self,
        item: XdmItem<N>,
        location: Option<&Location>,
        copy_namespaces: CopyNamespaces,
    ) -> Result<(), Error>;
}

/// Sink that keeps every appended item.
#[derive(Debug)]
pub struct SequenceCollector<N> {
    items: XdmSequence<N>,
}

impl<N> Default for SequenceCollector<N> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<N> SequenceCollector<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector behind the shared handle a [`crate::DynamicContext`] expects.
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn items(&self) -> &[XdmItem<N>] {
        &self.items
    }

    pub fn take(&mut self) -> XdmSequence<N> {
        std::mem::take(&mut self.items)
    }

    pub fn into_items(self) -> XdmSequence<N> {
        self.items
    }
}

impl<N> OutputSink<N> for SequenceCollector<N> {
    fn append(&mut self, item: XdmItem<N>, _location: Option<&Location>, _: CopyNamespaces) -> Result<(), Error> {
        self.items.push(item);
        Ok(())
    }
}
