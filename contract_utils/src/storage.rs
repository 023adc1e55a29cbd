use std::cell::RefCell;
use std::collections::BTreeMap;

use anyhow::Result;

/// An abstract key-value store owned by a contract
///
/// Receivers are shared references so that stores can be handed around the way blockstores are;
/// implementations use interior mutability.
pub trait Storage {
    /// Gets the value stored at a key, if any
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Stores a value at a key, replacing any previous value
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes the value at a key. Removing an absent key is not an error
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Visits every stored entry
    fn for_each<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>;

    /// Checks if a value is stored at the key
    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

impl<S: Storage> Storage for &S {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (*self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        (*self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        (*self).delete(key)
    }

    fn for_each<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        (*self).for_each(f)
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        (*self).has(key)
    }
}

/// An ordered in-memory store
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: RefCell<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Copies out every entry in key order
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.borrow_mut().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        // snapshot first so that the callback may read from the store
        for (k, v) in self.entries() {
            f(&k, &v)?;
        }
        Ok(())
    }
}

/// A write buffer layered over another store
///
/// Reads see buffered writes first. Nothing reaches the underlying store until `commit` is called;
/// dropping the transaction discards every buffered write.
pub struct StorageTransaction<'s, S: Storage> {
    base: &'s S,
    // None marks a buffered delete
    writes: RefCell<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl<'s, S: Storage> StorageTransaction<'s, S> {
    pub fn new(base: &'s S) -> Self {
        Self { base, writes: Default::default() }
    }

    /// Applies every buffered write to the underlying store, in key order
    ///
    /// The previous value of every touched key is read before anything is written. If a write
    /// fails, the writes already applied are reverted before the error is returned, so the store
    /// never keeps part of a transaction unless reverting fails too.
    pub fn commit(self) -> Result<()> {
        let writes = self.writes.into_inner();
        log::trace!("committing {} buffered writes", writes.len());

        let mut previous = Vec::with_capacity(writes.len());
        for key in writes.keys() {
            previous.push((key, self.base.get(key)?));
        }

        for (applied, (key, value)) in writes.iter().enumerate() {
            if let Err(e) = write(self.base, key, value.as_deref()) {
                for (key, old) in previous[..applied].iter().rev() {
                    if let Err(revert) = write(self.base, key, old.as_deref()) {
                        let key = hex::encode(key);
                        log::error!("failed to revert {key} after a failed commit: {revert}");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

fn write<S: Storage>(store: &S, key: &[u8], value: Option<&[u8]>) -> Result<()> {
    match value {
        Some(value) => store.put(key, value),
        None => store.delete(key),
    }
}

impl<'s, S: Storage> Storage for StorageTransaction<'s, S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(buffered) = self.writes.borrow().get(key) {
            return Ok(buffered.clone());
        }
        self.base.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.writes.borrow_mut().insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.writes.borrow_mut().insert(key.to_vec(), None);
        Ok(())
    }

    fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        let writes = self.writes.borrow().clone();
        self.base.for_each(|k, v| {
            if writes.contains_key(k) {
                Ok(())
            } else {
                f(k, v)
            }
        })?;
        for (k, v) in writes.iter() {
            if let Some(v) = v {
                f(k, v)?;
            }
        }
        Ok(())
    }
}
