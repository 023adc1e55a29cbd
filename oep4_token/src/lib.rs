//! An OEP-4 (ERC-20 style) fungible token ledger
//!
//! The ledger keeps balances, allowances and the total supply in a store injected through
//! [`contract_utils::runtime::ContractRuntime`]. Every state-changing operation is atomic: its
//! writes are buffered and only committed, and its events only published, when the whole operation
//! succeeds.

pub mod method;
pub mod token;

pub use token::TokenError;
