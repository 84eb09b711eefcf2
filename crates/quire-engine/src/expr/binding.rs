//! Local variable bindings and the rebinding map used by `copy`.
use crate::engine::runtime::Error;
use crate::xdm::ExpandedName;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u32);

impl BindingId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// A declared local variable: identity, name for diagnostics, and the slot it
/// occupies in the evaluation frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableBinding {
    pub id: BindingId,
    pub name: ExpandedName,
    pub slot: usize,
}

/// Hands out binding ids and frame slots for one compiled unit.
#[derive(Debug, Default, Clone)]
pub struct BindingAllocator {
    next_id: u32,
    next_slot: usize,
}

impl BindingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: ExpandedName) -> VariableBinding {
        let binding = VariableBinding {
            id: BindingId(self.next_id),
            name,
            slot: self.next_slot,
        };
        self.next_id += 1;
        self.next_slot += 1;
        binding
    }

    /// Number of slots a frame needs to evaluate anything declared so far.
    pub fn frame_size(&self) -> usize {
        self.next_slot
    }
}

/// Maps bindings of an original subtree to the bindings its copy must use.
///
/// Entries for variables bound *outside* the copied subtree are supplied by
/// the caller through [`bind`](Self::bind). Variables declared *inside* the
/// subtree get fresh bindings from the allocator while copying.
pub struct RebindingMap<'a> {
    entries: HashMap<BindingId, VariableBinding>,
    allocator: &'a mut BindingAllocator,
}

impl<'a> RebindingMap<'a> {
    pub fn new(allocator: &'a mut BindingAllocator) -> Self {
        Self {
            entries: HashMap::new(),
            allocator,
        }
    }

    pub fn bind(&mut self, original: &VariableBinding, replacement: VariableBinding) {
        self.entries.insert(original.id, replacement);
    }

    pub fn contains(&self, original: &VariableBinding) -> bool {
        self.entries.contains_key(&original.id)
    }

    /// Binding a reference in the copy must point at. A missing entry is an
    /// internal error: the caller forgot a variable the subtree uses.
    pub fn resolve(&self, original: &VariableBinding) -> Result<VariableBinding, Error> {
        self.entries.get(&original.id).cloned().ok_or_else(|| {
            Error::internal(format!(
                "no rebinding for variable ${} (binding {}) referenced by copied expression",
                original.name,
                original.id.index()
            ))
        })
    }

    /// Fresh binding for a variable declared inside the copied subtree.
    pub fn declare(&mut self, original: &VariableBinding) -> VariableBinding {
        let fresh = self.allocator.declare(original.name.clone());
        self.entries.insert(original.id, fresh.clone());
        fresh
    }
}
