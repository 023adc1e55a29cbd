use fvm_ipld_encoding::RawBytes;

use crate::address::Address;

pub mod fake_syscalls;

/// An event published by a contract
///
/// Notifications are observational only: publishing one never fails and never affects contract
/// state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Notification {
    /// Event name, e.g. "transfer"
    pub name: String,
    /// CBOR-encoded event payload
    pub payload: RawBytes,
}

/// The Syscalls trait defines methods available to the contract from its execution environment.
pub trait Syscalls {
    /// Returns true if the current invocation was authorized by the controller of `address`
    fn check_witness(&self, address: &Address) -> bool;

    /// Publishes a notification to observers of the contract
    fn notify(&self, notification: Notification);
}
