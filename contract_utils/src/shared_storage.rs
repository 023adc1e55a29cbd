use std::rc::Rc;

use anyhow::Result;

use crate::storage::{MemoryStorage, Storage};

/// A shared wrapper around [`MemoryStorage`].
///
/// Clones of it will reference the same underlying [`MemoryStorage`], so a test can keep a handle
/// on the store that a ledger owns and inspect the raw entries it writes.
#[derive(Debug, Clone, Default)]
pub struct SharedMemoryStorage {
    store: Rc<MemoryStorage>,
}

impl SharedMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out every entry of the shared store in key order
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.store.entries()
    }
}

// passes calls through to the underlying MemoryStorage
impl Storage for SharedMemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.store.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.store.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.store.delete(key)
    }

    fn for_each<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        self.store.for_each(f)
    }
}
