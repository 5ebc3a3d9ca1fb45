//! Side table of values attached to owners

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::any::Any;

use crate::error::{HiiError, Result};

/// Stores one opaque value per owner key
///
/// Firmware backs this with protocol installation on handles; tests and
/// hosted builds use [`MemoryRegistry`].
pub trait CapabilityRegistry {
    /// Attach `value` to `key`; a key holds at most one value
    fn attach(&mut self, key: u64, value: Box<dyn Any + Send>) -> Result<()>;

    fn lookup(&self, key: u64) -> Result<&(dyn Any + Send)>;
}

#[derive(Default)]
pub struct MemoryRegistry {
    entries: BTreeMap<u64, Box<dyn Any + Send>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CapabilityRegistry for MemoryRegistry {
    fn attach(&mut self, key: u64, value: Box<dyn Any + Send>) -> Result<()> {
        if self.entries.contains_key(&key) {
            return Err(HiiError::InvalidInput);
        }
        self.entries.insert(key, value);
        Ok(())
    }

    fn lookup(&self, key: u64) -> Result<&(dyn Any + Send)> {
        self.entries.get(&key).map(|value| value.as_ref()).ok_or(HiiError::NotFound)
    }
}
