use std::ops::Neg;

use contract_utils::runtime::ContractRuntime;
use contract_utils::storage::{Storage, StorageTransaction};
use contract_utils::syscalls::Syscalls;
use contract_utils::Address;
pub use error::TokenError;
use fvm_shared::econ::TokenAmount;

use self::config::TokenConfig;
use self::state::{StateError as TokenStateError, StateSummary, TokenState};
use self::types::{
    ApprovalNotification, ApproveParams, ApproveReturn, GetAllowanceParams, InitReturn,
    OEP4Token, TokenEvent, TransferFromParams, TransferFromReturn, TransferMultiParams,
    TransferMultiReturn, TransferNotification, TransferParams, TransferReturn,
};

pub mod config;
mod error;
pub mod state;
pub mod types;

type Result<T> = std::result::Result<T, TokenError>;

/// Token state as seen from inside a transaction
type TransactionState<'rt, S, ST> = TokenState<StorageTransaction<'rt, ContractRuntime<S, ST>>>;

/// Library functions that implement the core OEP-4 standard
///
/// Holds injectable services to access/interface with the host. All balances, allowances and the
/// total supply live in the runtime's store; the token itself only carries its static config.
pub struct Token<S, ST>
where
    S: Syscalls,
    ST: Storage,
{
    /// Runtime services to interact with the execution environment
    runtime: ContractRuntime<S, ST>,
    /// Metadata and issuance parameters
    config: TokenConfig,
}

impl<S, ST> Token<S, ST>
where
    S: Syscalls,
    ST: Storage,
{
    /// Wraps a runtime whose store may already hold token state
    pub fn new(runtime: ContractRuntime<S, ST>, config: TokenConfig) -> Self {
        Self { runtime, config }
    }

    /// Get a reference to the underlying runtime
    pub fn runtime(&self) -> &ContractRuntime<S, ST> {
        &self.runtime
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// A read-only view of the committed state
    pub fn state(&self) -> TokenState<&ContractRuntime<S, ST>> {
        TokenState::new(&self.runtime)
    }

    /// Opens an atomic transaction on TokenState which allows a closure to make multiple
    /// modifications to the store.
    ///
    /// If the closure returns an error, the transaction is dropped atomically and no change is
    /// observed on token state. Events collected by the closure are published only once its writes
    /// have been committed.
    fn transaction<F, Res>(&self, f: F) -> Result<Res>
    where
        F: FnOnce(
            &TransactionState<'_, S, ST>,
            &ContractRuntime<S, ST>,
            &mut Vec<TokenEvent>,
        ) -> Result<Res>,
    {
        let state = TokenState::new(StorageTransaction::new(&self.runtime));
        let mut events = Vec::new();
        let res = f(&state, &self.runtime, &mut events)?;

        // nothing is committed unless every event encodes
        let notifications = events
            .iter()
            .map(TokenEvent::to_notification)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        state.into_store().commit().map_err(TokenStateError::Storage)?;

        for notification in notifications {
            self.runtime.notify(notification);
        }
        Ok(res)
    }

    /// Debits `from` and credits `to` within an open transaction, queueing the transfer event
    ///
    /// The caller must hold a witness for `from`.
    fn apply_transfer<T: Storage>(
        state: &TokenState<T>,
        runtime: &ContractRuntime<S, ST>,
        events: &mut Vec<TokenEvent>,
        transfer: &TransferParams,
    ) -> Result<()> {
        let TransferParams { from, to, amount } = transfer;
        validate_amount(amount, "transfer")?;
        if !runtime.check_witness(from) {
            return Err(TokenError::Unauthorized(*from));
        }

        state.change_balance_by(from, &amount.neg())?;
        state.change_balance_by(to, amount)?;

        events.push(TokenEvent::Transfer(TransferNotification {
            from: Some(*from),
            to: *to,
            amount: amount.clone(),
        }));
        Ok(())
    }
}

impl<S, ST> Token<S, ST>
where
    S: Syscalls,
    ST: Storage,
{
    /// Credits the configured owner with the configured total supply
    ///
    /// Fails with `AlreadyInitialized` if a supply was ever recorded, leaving state untouched. The
    /// issuance is published as a transfer without a sender.
    pub fn init(&mut self) -> Result<InitReturn> {
        let owner = self.config.owner;
        let supply = &self.config.total_supply;
        let res = self.transaction(|state, _, events| {
            if state.is_initialized()? {
                return Err(TokenError::AlreadyInitialized);
            }
            validate_address(&owner, "owner")?;
            validate_amount(supply, "total supply")?;

            state.set_balance(&owner, supply)?;
            state.set_supply(supply)?;

            events.push(TokenEvent::Transfer(TransferNotification {
                from: None,
                to: owner,
                amount: supply.clone(),
            }));
            Ok(InitReturn { owner, supply: supply.clone() })
        });

        if let Ok(ret) = &res {
            log::info!(
                "initialized {} with a supply of {:?} held by {}",
                self.config.symbol,
                ret.supply,
                ret.owner.to_base58()
            );
        }
        log_rejection("Init", res)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    /// Number of decimal places used when displaying amounts
    pub fn decimals(&self) -> u8 {
        self.config.decimals
    }

    /// Gets the total number of tokens in existence
    ///
    /// This equals the sum of `balance_of` called on all addresses, and is zero before `init`
    pub fn total_supply(&self) -> Result<TokenAmount> {
        Ok(self.state().get_supply()?)
    }

    /// Returns the balance associated with a particular address
    ///
    /// Accounts that have never received transfers implicitly have a zero-balance
    pub fn balance_of(&self, owner: &Address) -> Result<TokenAmount> {
        Ok(self.state().get_balance(owner)?)
    }

    /// Gets the allowance between owner and spender
    ///
    /// An allowance is the amount that the spender can transfer out of the owner's account via
    /// `transfer_from`.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Result<TokenAmount> {
        Ok(self.state().get_allowance_between(owner, spender)?)
    }

    /// Transfers an amount from one address to another
    ///
    /// - The caller must hold a witness for `from`
    /// - The requested value MUST be non-negative
    /// - The requested value MUST NOT exceed the balance of `from`
    ///
    /// Transferring to oneself succeeds without changing the balance.
    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: &TokenAmount,
    ) -> Result<TransferReturn> {
        let params = TransferParams::new(*from, *to, amount.clone());
        let res = self.transaction(|state, runtime, events| {
            Self::apply_transfer(state, runtime, events, &params)?;
            Ok(TransferReturn {
                from_balance: state.get_balance(from)?,
                to_balance: state.get_balance(to)?,
            })
        });
        log_rejection("Transfer", res)
    }

    /// Applies every transfer in order, as a single unit
    ///
    /// Each entry is checked exactly as `transfer` would check it, against the balances left by
    /// the entries before it. If any entry fails, none of the batch takes effect, no events are
    /// published and the error carries the index of the failing entry.
    pub fn transfer_multi(&mut self, transfers: &[TransferParams]) -> Result<()> {
        let res = self.transaction(|state, runtime, events| {
            for (index, transfer) in transfers.iter().enumerate() {
                Self::apply_transfer(state, runtime, events, transfer)
                    .map_err(|e| TokenError::BatchTransfer { index, source: Box::new(e) })?;
            }
            Ok(())
        });
        log_rejection("TransferMulti", res)
    }

    /// Sets the allowance of `spender` over the balance of `owner`, replacing any previous value
    ///
    /// - The caller must hold a witness for `owner`
    /// - The spender must be a non-zero address distinct from the owner
    /// - The amount MUST NOT exceed the owner's balance at the time of approval
    ///
    /// Returns the allowance that was replaced. Approving zero removes the allowance.
    pub fn approve(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: &TokenAmount,
    ) -> Result<TokenAmount> {
        let res = self.transaction(|state, runtime, events| {
            validate_amount(amount, "approval")?;
            if !runtime.check_witness(owner) {
                return Err(TokenError::Unauthorized(*owner));
            }
            validate_address(spender, "spender")?;
            if owner == spender {
                return Err(TokenError::SelfApproval(*owner));
            }

            let balance = state.get_balance(owner)?;
            if balance.lt(amount) {
                return Err(TokenStateError::InsufficientBalance {
                    owner: *owner,
                    balance,
                    delta: amount.neg(),
                }
                .into());
            }

            let old_allowance = state.set_allowance(owner, spender, amount)?;
            events.push(TokenEvent::Approval(ApprovalNotification {
                owner: *owner,
                spender: *spender,
                amount: amount.clone(),
            }));
            Ok(old_allowance)
        });
        log_rejection("Approve", res)
    }

    /// Transfers an amount out of `from` on the strength of an allowance granted to `spender`
    ///
    /// - The caller must hold a witness for `spender`; the witness of `from` is not required
    /// - `from` and `to` must be non-zero addresses
    /// - The requested value MUST NOT exceed the balance of `from` nor the allowance
    ///
    /// Moving tokens from an address to itself succeeds without touching any state.
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: &TokenAmount,
    ) -> Result<TransferFromReturn> {
        let res = self.transaction(|state, runtime, events| {
            validate_amount(amount, "transfer")?;
            if !runtime.check_witness(spender) {
                return Err(TokenError::Unauthorized(*spender));
            }
            validate_address(from, "from")?;
            validate_address(to, "to")?;

            if from == to {
                let balance = state.get_balance(from)?;
                return Ok(TransferFromReturn {
                    from_balance: balance.clone(),
                    to_balance: balance,
                    allowance: state.get_allowance_between(from, spender)?,
                });
            }

            let balance = state.get_balance(from)?;
            if balance.lt(amount) {
                return Err(TokenStateError::InsufficientBalance {
                    owner: *from,
                    balance,
                    delta: amount.neg(),
                }
                .into());
            }

            let allowance = state.attempt_use_allowance(spender, from, amount)?;
            let from_balance = state.change_balance_by(from, &amount.neg())?;
            let to_balance = state.change_balance_by(to, amount)?;

            events.push(TokenEvent::Transfer(TransferNotification {
                from: Some(*from),
                to: *to,
                amount: amount.clone(),
            }));
            Ok(TransferFromReturn { from_balance, to_balance, allowance })
        });
        log_rejection("TransferFrom", res)
    }

    /// Checks the state invariants, returning a summary of the ledger if they hold
    pub fn check_invariants(&self) -> Result<StateSummary> {
        Ok(self.state().check_invariants()?)
    }
}

impl<S, ST> OEP4Token for Token<S, ST>
where
    S: Syscalls,
    ST: Storage,
{
    type TokenError = TokenError;

    fn init(&mut self) -> Result<InitReturn> {
        Token::init(self)
    }

    fn name(&self) -> String {
        self.config.name.clone()
    }

    fn symbol(&self) -> String {
        self.config.symbol.clone()
    }

    fn decimals(&self) -> u8 {
        self.config.decimals
    }

    fn total_supply(&self) -> Result<TokenAmount> {
        Token::total_supply(self)
    }

    fn balance_of(&self, params: Address) -> Result<TokenAmount> {
        Token::balance_of(self, &params)
    }

    fn transfer(&mut self, params: TransferParams) -> Result<TransferReturn> {
        Token::transfer(self, &params.from, &params.to, &params.amount)
    }

    fn transfer_multi(&mut self, params: TransferMultiParams) -> Result<TransferMultiReturn> {
        Token::transfer_multi(self, &params)
    }

    fn approve(&mut self, params: ApproveParams) -> Result<ApproveReturn> {
        Token::approve(self, &params.owner, &params.spender, &params.amount)
    }

    fn allowance(&self, params: GetAllowanceParams) -> Result<TokenAmount> {
        Token::allowance(self, &params.owner, &params.spender)
    }

    fn transfer_from(&mut self, params: TransferFromParams) -> Result<TransferFromReturn> {
        Token::transfer_from(self, &params.spender, &params.from, &params.to, &params.amount)
    }
}

fn log_rejection<T>(operation: &str, res: Result<T>) -> Result<T> {
    if let Err(e) = &res {
        if e.is_rejection() {
            log::debug!("{operation} rejected: {e}");
        } else {
            log::error!("{operation} failed: {e}");
        }
    }
    res
}

/// Validates that a token amount is non-negative
///
/// Returns the argument, or an error.
pub fn validate_amount<'a>(a: &'a TokenAmount, name: &'static str) -> Result<&'a TokenAmount> {
    if a.is_negative() {
        return Err(TokenError::InvalidNegative { name, amount: a.clone() });
    }
    Ok(a)
}

/// Validates that an address can act as a counterparty, i.e. that it isn't the zero address
///
/// Returns the argument, or an error.
pub fn validate_address<'a>(a: &'a Address, name: &'static str) -> Result<&'a Address> {
    if a.is_zero() {
        return Err(TokenError::InvalidAddress { name, address: *a });
    }
    Ok(a)
}

#[cfg(test)]
mod test {
    use contract_utils::runtime::ContractRuntime;
    use contract_utils::storage::{MemoryStorage, Storage};
    use contract_utils::syscalls::fake_syscalls::FakeSyscalls;
    use contract_utils::Address;
    use fvm_shared::econ::TokenAmount;
    use fvm_shared::error::ExitCode;
    use num_traits::Zero;

    use super::config::TokenConfig;
    use super::state::{StateError, StateInvariantError, SUPPLY_KEY};
    use super::types::{ApprovalNotification, TokenEvent, TransferNotification, TransferParams};
    use super::{validate_address, validate_amount, Token, TokenError};

    const TREASURY: &Address = &Address::new([1; 20]);
    const ALICE: &Address = &Address::new([2; 20]);
    const BOB: &Address = &Address::new([3; 20]);
    const CAROL: &Address = &Address::new([4; 20]);

    fn new_token() -> Token<FakeSyscalls, MemoryStorage> {
        let config = TokenConfig {
            name: "Test Token".into(),
            symbol: "TT".into(),
            decimals: 0,
            owner: *TREASURY,
            total_supply: TokenAmount::from_atto(1_000_000),
        };
        Token::new(ContractRuntime::new_test_runtime(), config)
    }

    /// A token whose supply sits with the treasury, with `ALICE` funded from it
    fn funded_token(alice: u64) -> Token<FakeSyscalls, MemoryStorage> {
        let mut token = new_token();
        token.init().unwrap();
        token.runtime().syscalls.authorize(TREASURY);
        token.transfer(TREASURY, ALICE, &TokenAmount::from_atto(alice)).unwrap();
        token.runtime().syscalls.clear_witnesses();
        token.runtime().syscalls.take_notifications();
        token
    }

    fn published(token: &Token<FakeSyscalls, MemoryStorage>) -> Vec<TokenEvent> {
        token
            .runtime()
            .syscalls
            .take_notifications()
            .iter()
            .map(|n| TokenEvent::from_notification(n).unwrap().unwrap())
            .collect()
    }

    fn transfer_event(from: &Address, to: &Address, amount: u64) -> TokenEvent {
        TokenEvent::Transfer(TransferNotification {
            from: Some(*from),
            to: *to,
            amount: TokenAmount::from_atto(amount),
        })
    }

    #[test]
    fn it_initializes_once() {
        let mut token = new_token();
        assert_eq!(token.total_supply().unwrap(), TokenAmount::zero());

        let ret = token.init().unwrap();
        assert_eq!(ret.owner, *TREASURY);
        assert_eq!(ret.supply, TokenAmount::from_atto(1_000_000));
        assert_eq!(token.total_supply().unwrap(), TokenAmount::from_atto(1_000_000));
        assert_eq!(token.balance_of(TREASURY).unwrap(), TokenAmount::from_atto(1_000_000));
        assert_eq!(
            published(&token),
            vec![TokenEvent::Transfer(TransferNotification {
                from: None,
                to: *TREASURY,
                amount: TokenAmount::from_atto(1_000_000),
            })]
        );

        // a second init changes nothing and publishes nothing
        let before = token.runtime().storage.entries();
        let err = token.init().unwrap_err();
        assert!(matches!(err, TokenError::AlreadyInitialized));
        assert!(err.is_rejection());
        assert_eq!(token.runtime().storage.entries(), before);
        assert!(published(&token).is_empty());
        token.check_invariants().unwrap();
    }

    #[test]
    fn it_reports_metadata() {
        let token = new_token();
        assert_eq!(token.name(), "Test Token");
        assert_eq!(token.symbol(), "TT");
        assert_eq!(token.decimals(), 0);
    }

    #[test]
    fn it_provides_atomic_transactions() {
        let token = funded_token(100);

        // entire transaction succeeds
        token
            .transaction(|state, _, events| {
                state.change_balance_by(ALICE, &TokenAmount::from_atto(-10))?;
                state.change_balance_by(BOB, &TokenAmount::from_atto(10))?;
                events.push(transfer_event(ALICE, BOB, 10));
                Ok(())
            })
            .unwrap();
        assert_eq!(token.balance_of(BOB).unwrap(), TokenAmount::from_atto(10));
        assert_eq!(published(&token), vec![transfer_event(ALICE, BOB, 10)]);

        // entire transaction fails
        token
            .transaction(|state, _, events| {
                state.change_balance_by(ALICE, &TokenAmount::from_atto(-10))?;
                state.change_balance_by(BOB, &TokenAmount::from_atto(10))?;
                events.push(transfer_event(ALICE, BOB, 10));
                // this makes a balance negative and should revert the entire transaction
                state.change_balance_by(CAROL, &TokenAmount::from_atto(-1))?;
                Ok(())
            })
            .unwrap_err();
        // balances are unchanged and the queued event was dropped
        assert_eq!(token.balance_of(ALICE).unwrap(), TokenAmount::from_atto(90));
        assert_eq!(token.balance_of(BOB).unwrap(), TokenAmount::from_atto(10));
        assert!(published(&token).is_empty());
    }

    #[test]
    fn it_transfers() {
        let mut token = funded_token(100);
        token.runtime().syscalls.authorize(ALICE);

        let ret = token.transfer(ALICE, BOB, &TokenAmount::from_atto(60)).unwrap();
        assert_eq!(ret.from_balance, TokenAmount::from_atto(40));
        assert_eq!(ret.to_balance, TokenAmount::from_atto(60));
        assert_eq!(token.balance_of(ALICE).unwrap(), TokenAmount::from_atto(40));
        assert_eq!(token.balance_of(BOB).unwrap(), TokenAmount::from_atto(60));
        assert_eq!(published(&token), vec![transfer_event(ALICE, BOB, 60)]);

        // transferring the whole balance removes the entry
        token.transfer(ALICE, BOB, &TokenAmount::from_atto(40)).unwrap();
        assert_eq!(token.balance_of(ALICE).unwrap(), TokenAmount::zero());
        assert_eq!(token.state().count_balances().unwrap(), 2);
        token.check_invariants().unwrap();
    }

    #[test]
    fn it_transfers_to_self() {
        let mut token = funded_token(100);
        token.runtime().syscalls.authorize(ALICE);

        let ret = token.transfer(ALICE, ALICE, &TokenAmount::from_atto(60)).unwrap();
        assert_eq!(ret.from_balance, TokenAmount::from_atto(100));
        assert_eq!(ret.to_balance, TokenAmount::from_atto(100));
        assert_eq!(published(&token), vec![transfer_event(ALICE, ALICE, 60)]);
        token.check_invariants().unwrap();
    }

    #[test]
    fn it_transfers_zero_without_storing_empty_balances() {
        let mut token = funded_token(100);
        token.runtime().syscalls.authorize(ALICE);

        token.transfer(ALICE, CAROL, &TokenAmount::zero()).unwrap();
        assert_eq!(token.balance_of(CAROL).unwrap(), TokenAmount::zero());
        assert_eq!(token.state().count_balances().unwrap(), 2);
        assert_eq!(published(&token), vec![transfer_event(ALICE, CAROL, 0)]);
        token.check_invariants().unwrap();
    }

    #[test]
    fn it_rejects_invalid_transfers() {
        let mut token = funded_token(100);
        let before = token.runtime().storage.entries();

        // no witness for the sender
        let err = token.transfer(ALICE, BOB, &TokenAmount::from_atto(1)).unwrap_err();
        assert!(matches!(err, TokenError::Unauthorized(a) if a == *ALICE));

        // a witness for someone else doesn't help
        token.runtime().syscalls.authorize(BOB);
        token.transfer(ALICE, BOB, &TokenAmount::from_atto(1)).unwrap_err();

        token.runtime().syscalls.authorize(ALICE);
        // negative amounts
        let err = token.transfer(ALICE, BOB, &TokenAmount::from_atto(-1)).unwrap_err();
        assert!(matches!(err, TokenError::InvalidNegative { .. }));

        // more than the balance
        let err = token.transfer(ALICE, BOB, &TokenAmount::from_atto(101)).unwrap_err();
        match err {
            TokenError::TokenState(StateError::InsufficientBalance { owner, balance, delta }) => {
                assert_eq!(owner, *ALICE);
                assert_eq!(balance, TokenAmount::from_atto(100));
                assert_eq!(delta, TokenAmount::from_atto(-101));
            }
            e => panic!("unexpected error {e:?}"),
        }

        assert_eq!(token.runtime().storage.entries(), before);
        assert!(published(&token).is_empty());
    }

    #[test]
    fn it_transfers_batches_atomically() {
        let mut token = funded_token(100);
        token.runtime().syscalls.authorize(ALICE);
        token.runtime().syscalls.authorize(BOB);

        // later entries can spend what earlier entries credited
        token
            .transfer_multi(&[
                TransferParams::new(*ALICE, *BOB, TokenAmount::from_atto(50)),
                TransferParams::new(*BOB, *CAROL, TokenAmount::from_atto(30)),
            ])
            .unwrap();
        assert_eq!(token.balance_of(ALICE).unwrap(), TokenAmount::from_atto(50));
        assert_eq!(token.balance_of(BOB).unwrap(), TokenAmount::from_atto(20));
        assert_eq!(token.balance_of(CAROL).unwrap(), TokenAmount::from_atto(30));
        assert_eq!(
            published(&token),
            vec![transfer_event(ALICE, BOB, 50), transfer_event(BOB, CAROL, 30)]
        );

        // a failing entry reverts the ones before it
        let before = token.runtime().storage.entries();
        let err = token
            .transfer_multi(&[
                TransferParams::new(*ALICE, *BOB, TokenAmount::from_atto(10)),
                TransferParams::new(*BOB, *CAROL, TokenAmount::from_atto(10_000_000)),
            ])
            .unwrap_err();
        match &err {
            TokenError::BatchTransfer { index, source } => {
                assert_eq!(*index, 1);
                assert!(matches!(
                    source.as_ref(),
                    TokenError::TokenState(StateError::InsufficientBalance { .. })
                ));
            }
            e => panic!("unexpected error {e:?}"),
        }
        assert!(err.is_rejection());
        assert_eq!(token.runtime().storage.entries(), before);
        assert!(published(&token).is_empty());

        // so does an unauthorized entry
        token
            .transfer_multi(&[
                TransferParams::new(*ALICE, *BOB, TokenAmount::from_atto(10)),
                TransferParams::new(*CAROL, *ALICE, TokenAmount::from_atto(10)),
            ])
            .unwrap_err();
        assert_eq!(token.runtime().storage.entries(), before);

        // empty batches trivially succeed
        token.transfer_multi(&[]).unwrap();
        assert!(published(&token).is_empty());
        token.check_invariants().unwrap();
    }

    #[test]
    fn it_sets_allowances() {
        let mut token = funded_token(100);
        token.runtime().syscalls.authorize(ALICE);

        let old = token.approve(ALICE, BOB, &TokenAmount::from_atto(50)).unwrap();
        assert_eq!(old, TokenAmount::zero());
        assert_eq!(token.allowance(ALICE, BOB).unwrap(), TokenAmount::from_atto(50));
        // the reverse direction is unaffected
        assert_eq!(token.allowance(BOB, ALICE).unwrap(), TokenAmount::zero());
        assert_eq!(
            published(&token),
            vec![TokenEvent::Approval(ApprovalNotification {
                owner: *ALICE,
                spender: *BOB,
                amount: TokenAmount::from_atto(50),
            })]
        );

        // approvals overwrite rather than accumulate
        let old = token.approve(ALICE, BOB, &TokenAmount::from_atto(30)).unwrap();
        assert_eq!(old, TokenAmount::from_atto(50));
        assert_eq!(token.allowance(ALICE, BOB).unwrap(), TokenAmount::from_atto(30));

        // approving zero removes the entry
        token.approve(ALICE, BOB, &TokenAmount::zero()).unwrap();
        assert_eq!(token.allowance(ALICE, BOB).unwrap(), TokenAmount::zero());
        assert!(token.check_invariants().unwrap().allowances.is_empty());
    }

    #[test]
    fn it_rejects_invalid_approvals() {
        let mut token = funded_token(100);
        let before = token.runtime().storage.entries();

        let err = token.approve(ALICE, BOB, &TokenAmount::from_atto(10)).unwrap_err();
        assert!(matches!(err, TokenError::Unauthorized(_)));

        token.runtime().syscalls.authorize(ALICE);
        let err = token.approve(ALICE, BOB, &TokenAmount::from_atto(-10)).unwrap_err();
        assert!(matches!(err, TokenError::InvalidNegative { .. }));

        let err = token.approve(ALICE, &Address::ZERO, &TokenAmount::from_atto(10)).unwrap_err();
        assert!(matches!(err, TokenError::InvalidAddress { name: "spender", .. }));

        let err = token.approve(ALICE, ALICE, &TokenAmount::from_atto(10)).unwrap_err();
        assert!(matches!(err, TokenError::SelfApproval(_)));

        // approvals are capped by the balance at approval time
        let err = token.approve(ALICE, BOB, &TokenAmount::from_atto(101)).unwrap_err();
        assert!(matches!(err, TokenError::TokenState(StateError::InsufficientBalance { .. })));

        assert_eq!(token.runtime().storage.entries(), before);
        assert!(published(&token).is_empty());
    }

    #[test]
    fn it_allows_delegated_transfer() {
        let mut token = funded_token(100);
        token.runtime().syscalls.authorize(ALICE);
        token.approve(ALICE, BOB, &TokenAmount::from_atto(100)).unwrap();
        token.runtime().syscalls.clear_witnesses();
        published(&token);

        // only the spender's witness is required
        token.runtime().syscalls.authorize(BOB);
        let ret = token.transfer_from(BOB, ALICE, CAROL, &TokenAmount::from_atto(40)).unwrap();
        assert_eq!(ret.from_balance, TokenAmount::from_atto(60));
        assert_eq!(ret.to_balance, TokenAmount::from_atto(40));
        assert_eq!(ret.allowance, TokenAmount::from_atto(60));
        assert_eq!(token.allowance(ALICE, BOB).unwrap(), TokenAmount::from_atto(60));
        assert_eq!(token.balance_of(ALICE).unwrap(), TokenAmount::from_atto(60));
        assert_eq!(token.balance_of(CAROL).unwrap(), TokenAmount::from_atto(40));
        assert_eq!(published(&token), vec![transfer_event(ALICE, CAROL, 40)]);

        // using up the allowance removes it
        token.transfer_from(BOB, ALICE, CAROL, &TokenAmount::from_atto(60)).unwrap();
        assert!(token.check_invariants().unwrap().allowances.is_empty());
    }

    #[test]
    fn it_treats_delegated_self_transfer_as_noop() {
        let mut token = funded_token(100);
        token.runtime().syscalls.authorize(BOB);
        let before = token.runtime().storage.entries();

        // succeeds without an allowance or sufficient balance, and touches nothing
        let ret = token.transfer_from(BOB, ALICE, ALICE, &TokenAmount::from_atto(1_000)).unwrap();
        assert_eq!(ret.from_balance, TokenAmount::from_atto(100));
        assert_eq!(ret.allowance, TokenAmount::zero());
        assert_eq!(token.runtime().storage.entries(), before);
        assert!(published(&token).is_empty());
    }

    #[test]
    fn it_fails_delegated_transfer_when_insufficient() {
        let mut token = funded_token(100);
        token.runtime().syscalls.authorize(ALICE);
        token.approve(ALICE, BOB, &TokenAmount::from_atto(50)).unwrap();
        token.runtime().syscalls.authorize(BOB);
        published(&token);

        // beyond the allowance
        let err = token.transfer_from(BOB, ALICE, CAROL, &TokenAmount::from_atto(51)).unwrap_err();
        assert!(matches!(err, TokenError::TokenState(StateError::InsufficientAllowance { .. })));

        // beyond the balance, with the allowance left intact
        token.transfer(ALICE, CAROL, &TokenAmount::from_atto(80)).unwrap();
        published(&token);
        let err = token.transfer_from(BOB, ALICE, CAROL, &TokenAmount::from_atto(30)).unwrap_err();
        assert!(matches!(err, TokenError::TokenState(StateError::InsufficientBalance { .. })));
        assert_eq!(token.allowance(ALICE, BOB).unwrap(), TokenAmount::from_atto(50));

        // a spender without any allowance
        token.runtime().syscalls.authorize(CAROL);
        let err = token.transfer_from(CAROL, ALICE, BOB, &TokenAmount::from_atto(1)).unwrap_err();
        assert!(matches!(err, TokenError::TokenState(StateError::InsufficientAllowance { .. })));

        assert!(published(&token).is_empty());
        token.check_invariants().unwrap();
    }

    #[test]
    fn it_rejects_invalid_delegated_transfers() {
        let mut token = funded_token(100);
        token.runtime().syscalls.authorize(ALICE);
        token.approve(ALICE, BOB, &TokenAmount::from_atto(50)).unwrap();
        published(&token);

        // the owner's witness is not a substitute for the spender's
        let err = token.transfer_from(BOB, ALICE, CAROL, &TokenAmount::from_atto(1)).unwrap_err();
        assert!(matches!(err, TokenError::Unauthorized(a) if a == *BOB));

        token.runtime().syscalls.authorize(BOB);
        let err = token.transfer_from(BOB, ALICE, CAROL, &TokenAmount::from_atto(-1)).unwrap_err();
        assert!(matches!(err, TokenError::InvalidNegative { .. }));

        let err =
            token.transfer_from(BOB, ALICE, &Address::ZERO, &TokenAmount::from_atto(1)).unwrap_err();
        assert!(matches!(err, TokenError::InvalidAddress { name: "to", .. }));

        let err =
            token.transfer_from(BOB, &Address::ZERO, CAROL, &TokenAmount::from_atto(1)).unwrap_err();
        assert!(matches!(err, TokenError::InvalidAddress { name: "from", .. }));

        assert_eq!(token.allowance(ALICE, BOB).unwrap(), TokenAmount::from_atto(50));
        assert!(published(&token).is_empty());
    }

    #[test]
    fn it_marks_the_store_initialized_even_for_zero_supply() {
        let config = TokenConfig {
            total_supply: TokenAmount::zero(),
            ..TokenConfig::with_owner(*TREASURY)
        };
        let mut token = Token::new(ContractRuntime::new_test_runtime(), config);
        token.init().unwrap();
        assert!(token.runtime().storage.has(SUPPLY_KEY).unwrap());
        assert_eq!(token.state().count_balances().unwrap(), 0);
        assert!(matches!(token.init().unwrap_err(), TokenError::AlreadyInitialized));
    }

    #[test]
    fn it_refuses_to_issue_to_the_zero_address() {
        let config = TokenConfig::with_owner(Address::ZERO);
        let mut token = Token::new(ContractRuntime::new_test_runtime(), config);
        let err = token.init().unwrap_err();
        assert!(matches!(err, TokenError::InvalidAddress { name: "owner", .. }));
        assert!(err.is_rejection());
        assert!(token.runtime().storage.is_empty());
        assert!(published(&token).is_empty());
    }

    #[test]
    fn it_reports_broken_invariants() {
        let mut token = new_token();
        token.init().unwrap();
        // a balance credited behind the ledger's back
        token.state().set_balance(ALICE, &TokenAmount::from_atto(5)).unwrap();

        let err = token.check_invariants().unwrap_err();
        assert!(matches!(
            err,
            TokenError::StateInvariant(StateInvariantError::BalanceSupplyMismatch { .. })
        ));
        assert!(!err.is_rejection());
        assert_eq!(ExitCode::from(&err), ExitCode::USR_ILLEGAL_STATE);
    }

    #[test]
    fn it_validates_arguments() {
        validate_amount(&TokenAmount::zero(), "test").unwrap();
        validate_amount(&TokenAmount::from_atto(-1), "test").unwrap_err();
        validate_address(ALICE, "test").unwrap();
        validate_address(&Address::ZERO, "test").unwrap_err();
    }
}
