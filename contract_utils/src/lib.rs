pub mod address;
pub mod hamt_storage;
pub mod runtime;
pub mod shared_storage;
pub mod storage;
pub mod syscalls;

pub use address::Address;
