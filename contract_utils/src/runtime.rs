use anyhow::Result;

use crate::address::Address;
use crate::storage::{MemoryStorage, Storage};
use crate::syscalls::fake_syscalls::FakeSyscalls;
use crate::syscalls::{Notification, Syscalls};

/// ContractRuntime bundles the services a contract consumes from its host: the syscalls
/// (authorization and notifications) and the key-value store holding its state
#[derive(Clone, Debug, Default)]
pub struct ContractRuntime<S: Syscalls, ST: Storage> {
    pub syscalls: S,
    pub storage: ST,
}

impl<S: Syscalls, ST: Storage> ContractRuntime<S, ST> {
    pub fn new(syscalls: S, storage: ST) -> Self {
        Self { syscalls, storage }
    }

    /// Returns true if the controller of `address` authorized the current invocation
    pub fn check_witness(&self, address: &Address) -> bool {
        self.syscalls.check_witness(address)
    }

    /// Publishes a notification
    pub fn notify(&self, notification: Notification) {
        self.syscalls.notify(notification)
    }

    pub fn store(&self) -> &ST {
        &self.storage
    }
}

impl ContractRuntime<FakeSyscalls, MemoryStorage> {
    /// Creates a runtime with fake syscalls over an empty in-memory store
    pub fn new_test_runtime() -> Self {
        Self { syscalls: FakeSyscalls::default(), storage: MemoryStorage::default() }
    }
}

/// Convenience impl encapsulating the storage functionality
impl<S: Syscalls, ST: Storage> Storage for ContractRuntime<S, ST> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.storage.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.storage.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.storage.delete(key)
    }

    fn for_each<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        self.storage.for_each(f)
    }
}
