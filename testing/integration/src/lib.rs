//! Helpers for driving a token through its dispatch interface the way a host would: every call is
//! encoded, routed by method number and decoded, with the witnesses of the signing addresses
//! attached.

use contract_utils::runtime::ContractRuntime;
use contract_utils::storage::Storage;
use contract_utils::syscalls::fake_syscalls::FakeSyscalls;
use contract_utils::Address;
use fvm_ipld_encoding::RawBytes;
use fvm_shared::econ::TokenAmount;
use num_traits::Zero;
use oep4_token::method::{decode_amount, decode_bool, invoke, DispatchError, Operation};
use oep4_token::token::config::TokenConfig;
use oep4_token::token::types::TokenEvent;
use oep4_token::token::Token;

pub type TestToken<ST> = Token<FakeSyscalls, ST>;

/// Builds an address from a one byte tag, handy for naming test accounts
pub const fn account(tag: u8) -> Address {
    Address::new([tag; 20])
}

/// Wraps a store in a token owned by `owner`, with `supply` to issue on init
pub fn new_token<ST: Storage>(storage: ST, owner: Address, supply: u64) -> TestToken<ST> {
    let config = TokenConfig {
        total_supply: TokenAmount::from_atto(supply),
        ..TokenConfig::with_owner(owner)
    };
    Token::new(ContractRuntime::new(FakeSyscalls::default(), storage), config)
}

/// Helper routines to simplify common operations on a test token
pub trait TokenHelper {
    /// Invokes an operation with the witnesses of `signers` attached, and only theirs
    fn call_as(&mut self, signers: &[Address], op: Operation) -> Result<RawBytes, DispatchError>;

    /// Invokes a state-changing operation, returning its boolean outcome
    ///
    /// Panics if the invocation fails outright.
    fn call_ok(&mut self, signers: &[Address], op: Operation) -> bool {
        let ret = self.call_as(signers, op).unwrap();
        decode_bool(&ret).unwrap()
    }

    /// Queries an amount (supply, balance or allowance)
    fn query_amount(&mut self, op: Operation) -> TokenAmount {
        let ret = self.call_as(&[], op).unwrap();
        decode_amount(&ret).unwrap()
    }

    fn balance(&mut self, address: &Address) -> TokenAmount {
        self.query_amount(Operation::BalanceOf(*address))
    }

    /// Asserts the balance of an address, in atto units
    fn assert_balance(&mut self, address: &Address, expected: u64) {
        assert_eq!(self.balance(address), TokenAmount::from_atto(expected), "balance of {address}");
    }

    /// Drains the events published so far
    fn take_events(&mut self) -> Vec<TokenEvent>;
}

impl<ST: Storage> TokenHelper for TestToken<ST> {
    fn call_as(&mut self, signers: &[Address], op: Operation) -> Result<RawBytes, DispatchError> {
        let syscalls = &self.runtime().syscalls;
        syscalls.clear_witnesses();
        for signer in signers {
            syscalls.authorize(signer);
        }

        let method = op.method().number().unwrap();
        let params = op.params()?;
        invoke(self, method, &params)
    }

    fn take_events(&mut self) -> Vec<TokenEvent> {
        self.runtime()
            .syscalls
            .take_notifications()
            .iter()
            .filter_map(|n| TokenEvent::from_notification(n).unwrap())
            .collect()
    }
}

/// Sums every balance held in the store, independently of the recorded supply
pub fn sum_of_balances<ST: Storage>(token: &TestToken<ST>) -> TokenAmount {
    let summary = token.check_invariants().unwrap();
    summary.balances.values().fold(TokenAmount::zero(), |acc, b| acc + b.clone())
}
