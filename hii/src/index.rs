//! Id indirection table shared by the string and image lookups
//!
//! Built once per lookup: every id maps either to the block that stores it
//! or to the id it duplicates. Alias chains are followed in the table
//! instead of re-walking the stream for every hop. Ids reserved by skip
//! blocks have no slot and resolve to [`HiiError::NotFound`].

use alloc::collections::BTreeMap;

use crate::error::{HiiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Stored { offset: usize, entry: usize },
    Alias(u16),
}

/// Map from a 1-based id to its storage location
#[derive(Debug, Default)]
pub struct IdIndex {
    slots: BTreeMap<u16, Slot>,
}

impl IdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` lives in the block at `offset`, entry `entry`
    pub fn insert_stored(&mut self, id: u16, offset: usize, entry: usize) {
        self.slots.insert(id, Slot::Stored { offset, entry });
    }

    /// Record that `id` duplicates `target`
    pub fn insert_alias(&mut self, id: u16, target: u16) {
        self.slots.insert(id, Slot::Alias(target));
    }

    /// Resolve `id` to `(block offset, entry index)`
    pub fn resolve(&self, id: u16) -> Result<(usize, usize)> {
        let mut current = id;
        // An acyclic chain visits each slot at most once
        for _ in 0..=self.slots.len() {
            match self.slots.get(&current) {
                Some(Slot::Stored { offset, entry }) => return Ok((*offset, *entry)),
                Some(Slot::Alias(target)) => current = *target,
                None => return Err(HiiError::NotFound),
            }
        }
        log::warn!("hii: duplicate cycle while resolving id {}", id);
        Err(HiiError::InvalidFormat)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
