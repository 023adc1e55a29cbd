//! Calling convention for OEP-4 token contracts.
//!
//! Hosts route an invocation by a method number derived from the exported method name, so the
//! names never have to travel with the message.

pub mod hash;

pub use hash::{Blake2bHasher, Hasher, IllegalNameErr, MethodNameErr, MethodResolver};

/// Computes the method number for a method name with the standard hasher
pub fn method_number(method_name: &str) -> Result<u64, MethodNameErr> {
    MethodResolver::new(Blake2bHasher {}).method_number(method_name)
}
