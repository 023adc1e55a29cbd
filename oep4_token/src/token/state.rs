use std::collections::BTreeMap;

use anyhow::bail;
use contract_utils::address::ADDRESS_LEN;
use contract_utils::storage::Storage;
use contract_utils::Address;
use fvm_shared::econ::TokenAmount;
use num_traits::Zero;
use thiserror::Error;

/// Key prefix of the balance namespace, followed by the 20 byte owner address
pub const BALANCE_PREFIX: u8 = 0x01;
/// Key prefix of the allowance namespace, followed by the owner and spender addresses
pub const ALLOWANCE_PREFIX: u8 = 0x02;
/// Key of the total supply record. Its presence marks the token as initialized
pub const SUPPLY_KEY: &[u8] = b"totalSupply";

#[derive(Error, Debug)]
pub enum StateError {
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
    #[error("underlying serialization error: {0}")]
    Serialization(String),
    #[error(
        "negative balance caused by decreasing {owner:?}'s balance of {balance:?} by {delta:?}"
    )]
    InsufficientBalance { owner: Address, balance: TokenAmount, delta: TokenAmount },
    #[error(
        "{spender:?} attempted to utilise {delta:?} of allowance {allowance:?} set by {owner:?}"
    )]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: TokenAmount,
        delta: TokenAmount,
    },
    #[error("total supply cannot be negative, cannot set it to {0:?}")]
    NegativeTotalSupply(TokenAmount),
    #[error("allowance cannot be negative, cannot set allowance between {owner:?} and {spender:?} to {amount:?}")]
    NegativeAllowance { amount: TokenAmount, owner: Address, spender: Address },
    #[error("balance cannot be negative, cannot set balance of {owner:?} to {amount:?}")]
    NegativeBalance { amount: TokenAmount, owner: Address },
}

#[derive(Error, Debug)]
pub enum StateInvariantError {
    #[error("total supply was negative: {0:?}")]
    SupplyNegative(TokenAmount),
    #[error("the account for {account:?} had a negative balance of {balance:?}")]
    BalanceNegative { account: Address, balance: TokenAmount },
    #[error("the total supply {supply:?} does not match the sum of all balances {balance_sum:?}")]
    BalanceSupplyMismatch { supply: TokenAmount, balance_sum: TokenAmount },
    #[error(
        "a negative allowance of {allowance:?} was specified between {owner:?} and {spender:?}"
    )]
    NegativeAllowance { owner: Address, spender: Address, allowance: TokenAmount },
    #[error("stored a zero balance which should have been removed for {0:?}")]
    ExplicitZeroBalance(Address),
    #[error(
        "stored a zero allowance which should have been removed between {owner:?} and {spender:?}"
    )]
    ExplicitZeroAllowance { owner: Address, spender: Address },
    #[error("stored an allowance for self {account:?} for {allowance:?}")]
    ExplicitSelfAllowance { account: Address, allowance: TokenAmount },
    #[error("invalid key {0:?} in the token namespaces")]
    InvalidKey(Vec<u8>),
    #[error("underlying state error {0}")]
    State(#[from] StateError),
}

type Result<T> = std::result::Result<T, StateError>;

/// A view over the key-value store holding the token ledger
///
/// Witnesses and address rules are not its concern. It only refuses amounts that would go
/// negative, and it never keeps an entry holding zero.
pub struct TokenState<S: Storage> {
    store: S,
}

impl<S: Storage> TokenState<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Get a reference to the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Whether a total supply has ever been recorded
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.store.has(SUPPLY_KEY)?)
    }

    /// Get the total supply, which is implicitly zero before initialization
    pub fn get_supply(&self) -> Result<TokenAmount> {
        self.read_amount(SUPPLY_KEY)
    }

    /// Record the total supply. Unlike balances, a zero supply is stored explicitly
    pub fn set_supply(&self, supply: &TokenAmount) -> Result<()> {
        if supply.is_negative() {
            return Err(StateError::NegativeTotalSupply(supply.clone()));
        }
        self.store.put(SUPPLY_KEY, &encode_amount(supply)?)?;
        Ok(())
    }

    /// Get the balance of an address from the currently stored state
    pub fn get_balance(&self, owner: &Address) -> Result<TokenAmount> {
        self.read_amount(&balance_key(owner))
    }

    /// Adds a signed delta to a balance, returning the balance after the change
    ///
    /// Debits that would overdraw the account fail with `InsufficientBalance`.
    pub fn change_balance_by(&self, owner: &Address, delta: &TokenAmount) -> Result<TokenAmount> {
        if delta.is_zero() {
            return self.get_balance(owner);
        }

        let balance = self.get_balance(owner)?;
        let new_balance = &balance + delta;

        if new_balance.is_negative() {
            return Err(StateError::InsufficientBalance {
                balance,
                delta: delta.clone(),
                owner: *owner,
            });
        }

        self.write_amount(&balance_key(owner), &new_balance)?;
        Ok(new_balance)
    }

    /// Overwrites a balance, returning the previous one
    pub fn set_balance(&self, owner: &Address, new_balance: &TokenAmount) -> Result<TokenAmount> {
        if new_balance.is_negative() {
            return Err(StateError::NegativeBalance {
                amount: new_balance.clone(),
                owner: *owner,
            });
        }

        let old_balance = self.get_balance(owner)?;
        self.write_amount(&balance_key(owner), new_balance)?;
        Ok(old_balance)
    }

    /// Number of addresses holding a non-zero balance. Walks the whole store
    pub fn count_balances(&self) -> Result<usize> {
        let mut count = 0;
        self.store.for_each(|key, _| {
            if decode_balance_key(key).is_some() {
                count += 1;
            }
            Ok(())
        })?;
        Ok(count)
    }

    /// Amount `spender` may still move out of `owner`'s balance, zero when never approved
    pub fn get_allowance_between(&self, owner: &Address, spender: &Address) -> Result<TokenAmount> {
        self.read_amount(&allowance_key(owner, spender))
    }

    /// Replaces an allowance, returning the one it replaced
    pub fn set_allowance(
        &self,
        owner: &Address,
        spender: &Address,
        amount: &TokenAmount,
    ) -> Result<TokenAmount> {
        if amount.is_negative() {
            return Err(StateError::NegativeAllowance {
                amount: amount.clone(),
                owner: *owner,
                spender: *spender,
            });
        }

        let key = allowance_key(owner, spender);
        let old_allowance = self.read_amount(&key)?;
        self.write_amount(&key, amount)?;
        Ok(old_allowance)
    }

    /// Deducts `amount` from the allowance `owner` granted `spender`, returning what is left
    ///
    /// An allowance smaller than `amount` is left as it is and reported as
    /// `InsufficientAllowance`. Spending zero never touches the store.
    pub fn attempt_use_allowance(
        &self,
        spender: &Address,
        owner: &Address,
        amount: &TokenAmount,
    ) -> Result<TokenAmount> {
        let current_allowance = self.get_allowance_between(owner, spender)?;

        if amount.is_zero() {
            return Ok(current_allowance);
        }

        if &current_allowance < amount {
            return Err(StateError::InsufficientAllowance {
                owner: *owner,
                spender: *spender,
                allowance: current_allowance,
                delta: amount.clone(),
            });
        }

        let new_allowance = &current_allowance - amount;
        self.write_amount(&allowance_key(owner, spender), &new_allowance)?;
        Ok(new_allowance)
    }

    /// Walks every ledger entry and verifies the ledger is consistent
    ///
    /// Supply, balances and allowances are non-negative. No zero entry and no self allowance is
    /// stored. Balances sum to the supply. Keys without a ledger prefix belong to someone else and
    /// are skipped. The returned summary lets callers check their own properties on top.
    pub fn check_invariants(&self) -> std::result::Result<StateSummary, StateInvariantError> {
        let total_supply = self.get_supply()?;
        if total_supply.is_negative() {
            return Err(StateInvariantError::SupplyNegative(total_supply));
        }

        let mut balances = BTreeMap::new();
        let mut allowances = BTreeMap::new();
        let mut balance_sum = TokenAmount::zero();
        let mut maybe_err: Option<StateInvariantError> = None;
        let res = self.store.for_each(|key, value| {
            let namespace = match key.first() {
                Some(&BALANCE_PREFIX) | Some(&ALLOWANCE_PREFIX) => key[0],
                _ => return Ok(()),
            };
            let amount = match decode_amount(value) {
                Ok(amount) => amount,
                Err(e) => {
                    maybe_err = Some(e.into());
                    bail!("invariant failed")
                }
            };

            if namespace == BALANCE_PREFIX {
                let owner = match decode_balance_key(key) {
                    None => {
                        maybe_err = Some(StateInvariantError::InvalidKey(key.to_vec()));
                        bail!("invariant failed")
                    }
                    Some(a) => a,
                };
                if amount.is_negative() {
                    maybe_err =
                        Some(StateInvariantError::BalanceNegative { account: owner, balance: amount });
                    bail!("invariant failed")
                }
                if amount.is_zero() {
                    maybe_err = Some(StateInvariantError::ExplicitZeroBalance(owner));
                    bail!("invariant failed")
                }
                balance_sum = balance_sum.clone() + amount.clone();
                balances.insert(owner, amount);
                return Ok(());
            }

            let (owner, spender) = match decode_allowance_key(key) {
                None => {
                    maybe_err = Some(StateInvariantError::InvalidKey(key.to_vec()));
                    bail!("invariant failed")
                }
                Some(pair) => pair,
            };
            if owner == spender {
                maybe_err = Some(StateInvariantError::ExplicitSelfAllowance {
                    account: owner,
                    allowance: amount,
                });
                bail!("invariant failed")
            }
            if amount.is_negative() {
                maybe_err = Some(StateInvariantError::NegativeAllowance {
                    owner,
                    spender,
                    allowance: amount,
                });
                bail!("invariant failed")
            }
            if amount.is_zero() {
                maybe_err = Some(StateInvariantError::ExplicitZeroAllowance { owner, spender });
                bail!("invariant failed")
            }
            allowances.insert((owner, spender), amount);
            Ok(())
        });

        if let Err(e) = res {
            return Err(match maybe_err {
                Some(invariant) => invariant,
                None => StateError::Storage(e).into(),
            });
        }

        if balance_sum != total_supply {
            return Err(StateInvariantError::BalanceSupplyMismatch {
                supply: total_supply,
                balance_sum,
            });
        }

        Ok(StateSummary { balances, allowances, total_supply })
    }

    fn read_amount(&self, key: &[u8]) -> Result<TokenAmount> {
        match self.store.get(key)? {
            Some(bytes) => decode_amount(&bytes),
            None => Ok(TokenAmount::zero()),
        }
    }

    // zero amounts are deleted rather than stored
    fn write_amount(&self, key: &[u8], amount: &TokenAmount) -> Result<()> {
        if amount.is_zero() {
            self.store.delete(key)?;
        } else {
            self.store.put(key, &encode_amount(amount)?)?;
        }
        Ok(())
    }
}

pub fn balance_key(owner: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + ADDRESS_LEN);
    key.push(BALANCE_PREFIX);
    key.extend_from_slice(owner.as_bytes());
    key
}

pub fn allowance_key(owner: &Address, spender: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 2 * ADDRESS_LEN);
    key.push(ALLOWANCE_PREFIX);
    key.extend_from_slice(owner.as_bytes());
    key.extend_from_slice(spender.as_bytes());
    key
}

pub fn decode_balance_key(key: &[u8]) -> Option<Address> {
    match key.split_first() {
        Some((&BALANCE_PREFIX, owner)) => Address::from_bytes(owner).ok(),
        _ => None,
    }
}

pub fn decode_allowance_key(key: &[u8]) -> Option<(Address, Address)> {
    match key.split_first() {
        Some((&ALLOWANCE_PREFIX, rest)) if rest.len() == 2 * ADDRESS_LEN => {
            let (owner, spender) = rest.split_at(ADDRESS_LEN);
            Some((Address::from_bytes(owner).ok()?, Address::from_bytes(spender).ok()?))
        }
        _ => None,
    }
}

fn encode_amount(amount: &TokenAmount) -> Result<Vec<u8>> {
    fvm_ipld_encoding::to_vec(amount).map_err(|e| StateError::Serialization(e.to_string()))
}

fn decode_amount(bytes: &[u8]) -> Result<TokenAmount> {
    fvm_ipld_encoding::from_slice(bytes).map_err(|e| StateError::Serialization(e.to_string()))
}

/// A summary of the current state to allow checking application specific invariants
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateSummary {
    pub balances: BTreeMap<Address, TokenAmount>,
    pub allowances: BTreeMap<(Address, Address), TokenAmount>,
    pub total_supply: TokenAmount,
}
