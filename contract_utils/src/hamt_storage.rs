use std::cell::RefCell;

use anyhow::Result;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::RawBytes;
use fvm_ipld_hamt::{BytesKey, Hamt};

use crate::storage::Storage;

/// This value has been chosen to keep the tree shallow for the small number of keys a token
/// ledger usually holds. Other workloads might find a different value to be more efficient.
pub const DEFAULT_HAMT_BIT_WIDTH: u32 = 3;

type EntryMap<BS> = Hamt<BS, RawBytes, BytesKey>;

/// A persistent key-value store backed by a HAMT over an IPLD blockstore
///
/// Writes are held in the in-memory tree until `flush` is called, which writes the changed nodes
/// to the blockstore and returns the new root. A store can be reopened from any flushed root.
pub struct HamtStorage<BS: Blockstore> {
    map: RefCell<EntryMap<BS>>,
    bit_width: u32,
}

impl<BS: Blockstore> HamtStorage<BS> {
    /// Creates an empty store
    pub fn new(bs: BS) -> Self {
        Self::new_with_bit_width(bs, DEFAULT_HAMT_BIT_WIDTH)
    }

    /// Creates an empty store, explicitly setting the bit width of the underlying Hamt
    ///
    /// Caller must ensure 1 <= bit_width <= 8.
    pub fn new_with_bit_width(bs: BS, bit_width: u32) -> Self {
        Self { map: RefCell::new(EntryMap::new_with_bit_width(bs, bit_width)), bit_width }
    }

    /// Reopens a store from a previously flushed root
    pub fn load(root: &Cid, bs: BS) -> Result<Self> {
        Self::load_with_bit_width(root, bs, DEFAULT_HAMT_BIT_WIDTH)
    }

    /// Reopens a store from a previously flushed root. The bit width must match the one the
    /// store was created with or the loaded tree will be corrupt
    pub fn load_with_bit_width(root: &Cid, bs: BS, bit_width: u32) -> Result<Self> {
        let map = EntryMap::load_with_bit_width(root, bs, bit_width)?;
        Ok(Self { map: RefCell::new(map), bit_width })
    }

    /// Persists pending changes to the blockstore, returning the root cid
    pub fn flush(&self) -> Result<Cid> {
        Ok(self.map.borrow_mut().flush()?)
    }

    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }
}

impl<BS: Blockstore> Storage for HamtStorage<BS> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let map = self.map.borrow();
        let value = map.get(&BytesKey::from(key.to_vec()))?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.map.borrow_mut().set(BytesKey::from(key.to_vec()), RawBytes::new(value.to_vec()))?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.map.borrow_mut().delete(&BytesKey::from(key.to_vec()))?;
        Ok(())
    }

    fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        self.map.borrow().for_each(|k, v| f(&k.0, v.bytes()))?;
        Ok(())
    }
}
