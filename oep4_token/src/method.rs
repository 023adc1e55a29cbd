//! Routing of raw invocations onto the token interface
//!
//! An invocation is a method number and DAG-CBOR encoded params. Params are decoded once into an
//! [`Operation`], executed against an [`OEP4Token`] and the result encoded back. State-changing
//! operations report the outcome as a boolean: the ledger refusing an operation is a `false`
//! result rather than an error, while failures of the store or of decoding abort the invocation.

use contract_utils::address::AddressError;
use contract_utils::Address;
use fvm_ipld_encoding::{BytesDe, RawBytes};
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use num_traits::Zero;
use oep4_dispatch::{method_number, MethodNameErr};
use thiserror::Error;

use crate::token::types::{
    ApproveParams, GetAllowanceParams, OEP4Token, TransferFromParams, TransferMultiParams,
    TransferParams,
};
use crate::token::TokenError;

/// The entry points of an OEP-4 token
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Init,
    Name,
    Symbol,
    Decimals,
    TotalSupply,
    BalanceOf,
    Transfer,
    TransferMulti,
    Approve,
    Allowance,
    TransferFrom,
}

impl Method {
    pub const ALL: [Method; 11] = [
        Method::Init,
        Method::Name,
        Method::Symbol,
        Method::Decimals,
        Method::TotalSupply,
        Method::BalanceOf,
        Method::Transfer,
        Method::TransferMulti,
        Method::Approve,
        Method::Allowance,
        Method::TransferFrom,
    ];

    /// The exported name of the method
    pub fn name(&self) -> &'static str {
        match self {
            Method::Init => "Init",
            Method::Name => "Name",
            Method::Symbol => "Symbol",
            Method::Decimals => "Decimals",
            Method::TotalSupply => "TotalSupply",
            Method::BalanceOf => "BalanceOf",
            Method::Transfer => "Transfer",
            Method::TransferMulti => "TransferMulti",
            Method::Approve => "Approve",
            Method::Allowance => "Allowance",
            Method::TransferFrom => "TransferFrom",
        }
    }

    /// The method number a host routes the method by
    pub fn number(&self) -> Result<u64, MethodNameErr> {
        method_number(self.name())
    }

    pub fn from_name(name: &str) -> Option<Method> {
        Method::ALL.into_iter().find(|m| m.name() == name)
    }

    pub fn from_number(number: u64) -> Option<Method> {
        Method::ALL.into_iter().find(|m| m.number() == Ok(number))
    }

    /// The result of an invocation the ledger refuses: zero for balance and allowance queries,
    /// `false` for everything else
    pub fn refusal(&self) -> Result<RawBytes, DispatchError> {
        let ret = match self {
            Method::BalanceOf | Method::Allowance => RawBytes::serialize(TokenAmount::zero())?,
            _ => RawBytes::serialize(false)?,
        };
        Ok(ret)
    }
}

/// Address arguments travel as plain byte strings and are length-checked after decoding, so that
/// a wrongly sized address is told apart from params of the wrong shape
type AddressArg = BytesDe;

fn address(arg: AddressArg) -> Result<Address, AddressError> {
    Address::from_bytes(&arg.0)
}

fn transfer_params(
    (from, to, amount): (AddressArg, AddressArg, TokenAmount),
) -> Result<TransferParams, AddressError> {
    Ok(TransferParams::new(address(from)?, address(to)?, amount))
}

/// A decoded invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Init,
    Name,
    Symbol,
    Decimals,
    TotalSupply,
    BalanceOf(Address),
    Transfer(TransferParams),
    TransferMulti(TransferMultiParams),
    Approve(ApproveParams),
    Allowance(GetAllowanceParams),
    TransferFrom(TransferFromParams),
}

impl Operation {
    /// Decodes the params of a method. Params of methods that take none are ignored
    ///
    /// Params of the wrong shape fail with `InvalidParams`. Well-formed params carrying an address
    /// that isn't 20 bytes long fail with `MalformedAddress`.
    pub fn decode(method: Method, params: &RawBytes) -> Result<Self, DispatchError> {
        let invalid =
            |source: fvm_ipld_encoding::Error| DispatchError::InvalidParams { method, source };
        let malformed = |source: AddressError| DispatchError::MalformedAddress { method, source };
        let op = match method {
            Method::Init => Operation::Init,
            Method::Name => Operation::Name,
            Method::Symbol => Operation::Symbol,
            Method::Decimals => Operation::Decimals,
            Method::TotalSupply => Operation::TotalSupply,
            Method::BalanceOf => {
                let owner = params.deserialize().map_err(invalid)?;
                Operation::BalanceOf(address(owner).map_err(malformed)?)
            }
            Method::Transfer => {
                let args = params.deserialize().map_err(invalid)?;
                Operation::Transfer(transfer_params(args).map_err(malformed)?)
            }
            Method::TransferMulti => {
                let entries: Vec<_> = params.deserialize().map_err(invalid)?;
                let transfers: Result<TransferMultiParams, _> =
                    entries.into_iter().map(transfer_params).collect();
                Operation::TransferMulti(transfers.map_err(malformed)?)
            }
            Method::Approve => {
                let (owner, spender, amount): (AddressArg, AddressArg, TokenAmount) =
                    params.deserialize().map_err(invalid)?;
                Operation::Approve(ApproveParams {
                    owner: address(owner).map_err(malformed)?,
                    spender: address(spender).map_err(malformed)?,
                    amount,
                })
            }
            Method::Allowance => {
                let (owner, spender): (AddressArg, AddressArg) =
                    params.deserialize().map_err(invalid)?;
                Operation::Allowance(GetAllowanceParams {
                    owner: address(owner).map_err(malformed)?,
                    spender: address(spender).map_err(malformed)?,
                })
            }
            Method::TransferFrom => {
                let (spender, from, to, amount): (AddressArg, AddressArg, AddressArg, TokenAmount) =
                    params.deserialize().map_err(invalid)?;
                Operation::TransferFrom(TransferFromParams {
                    spender: address(spender).map_err(malformed)?,
                    from: address(from).map_err(malformed)?,
                    to: address(to).map_err(malformed)?,
                    amount,
                })
            }
        };
        Ok(op)
    }

    pub fn method(&self) -> Method {
        match self {
            Operation::Init => Method::Init,
            Operation::Name => Method::Name,
            Operation::Symbol => Method::Symbol,
            Operation::Decimals => Method::Decimals,
            Operation::TotalSupply => Method::TotalSupply,
            Operation::BalanceOf(_) => Method::BalanceOf,
            Operation::Transfer(_) => Method::Transfer,
            Operation::TransferMulti(_) => Method::TransferMulti,
            Operation::Approve(_) => Method::Approve,
            Operation::Allowance(_) => Method::Allowance,
            Operation::TransferFrom(_) => Method::TransferFrom,
        }
    }

    /// Encodes the params of the operation, as a caller would send them
    pub fn params(&self) -> Result<RawBytes, DispatchError> {
        let params = match self {
            Operation::Init
            | Operation::Name
            | Operation::Symbol
            | Operation::Decimals
            | Operation::TotalSupply => RawBytes::default(),
            Operation::BalanceOf(p) => RawBytes::serialize(p)?,
            Operation::Transfer(p) => RawBytes::serialize(p)?,
            Operation::TransferMulti(p) => RawBytes::serialize(p)?,
            Operation::Approve(p) => RawBytes::serialize(p)?,
            Operation::Allowance(p) => RawBytes::serialize(p)?,
            Operation::TransferFrom(p) => RawBytes::serialize(p)?,
        };
        Ok(params)
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unknown method number {0}")]
    UnknownMethod(u64),
    #[error("unknown method name {0:?}")]
    UnknownMethodName(String),
    #[error("failed to decode params for {method:?}: {source}")]
    InvalidParams {
        method: Method,
        #[source]
        source: fvm_ipld_encoding::Error,
    },
    #[error("malformed address passed to {method:?}: {source}")]
    MalformedAddress {
        method: Method,
        #[source]
        source: AddressError,
    },
    #[error("ipld encoding error: {0}")]
    Serialization(#[from] fvm_ipld_encoding::Error),
    #[error("error in token: {0}")]
    Token(#[from] TokenError),
}

impl From<&DispatchError> for ExitCode {
    fn from(error: &DispatchError) -> Self {
        match error {
            DispatchError::UnknownMethod(_) | DispatchError::UnknownMethodName(_) => {
                ExitCode::USR_UNHANDLED_MESSAGE
            }
            DispatchError::InvalidParams { method: _, source: _ }
            | DispatchError::Serialization(_) => ExitCode::USR_SERIALIZATION,
            DispatchError::MalformedAddress { method: _, source: _ } => {
                ExitCode::USR_ILLEGAL_ARGUMENT
            }
            DispatchError::Token(e) => ExitCode::from(e),
        }
    }
}

/// Executes a decoded operation, returning the encoded result
pub fn execute<T>(token: &mut T, operation: Operation) -> Result<RawBytes, DispatchError>
where
    T: OEP4Token<TokenError = TokenError>,
{
    let ret = match operation {
        Operation::Init => RawBytes::serialize(succeeded(token.init())?)?,
        Operation::Name => RawBytes::serialize(token.name())?,
        Operation::Symbol => RawBytes::serialize(token.symbol())?,
        Operation::Decimals => RawBytes::serialize(token.decimals())?,
        Operation::TotalSupply => RawBytes::serialize(token.total_supply()?)?,
        Operation::BalanceOf(params) => RawBytes::serialize(token.balance_of(params)?)?,
        Operation::Transfer(params) => RawBytes::serialize(succeeded(token.transfer(params))?)?,
        Operation::TransferMulti(params) => {
            RawBytes::serialize(succeeded(token.transfer_multi(params))?)?
        }
        Operation::Approve(params) => RawBytes::serialize(succeeded(token.approve(params))?)?,
        Operation::Allowance(params) => RawBytes::serialize(token.allowance(params)?)?,
        Operation::TransferFrom(params) => {
            RawBytes::serialize(succeeded(token.transfer_from(params))?)?
        }
    };
    Ok(ret)
}

/// Decodes and executes an invocation routed by method number
pub fn invoke<T>(
    token: &mut T,
    method_num: u64,
    params: &RawBytes,
) -> Result<RawBytes, DispatchError>
where
    T: OEP4Token<TokenError = TokenError>,
{
    let method = Method::from_number(method_num).ok_or(DispatchError::UnknownMethod(method_num))?;
    dispatch(token, method, params)
}

/// Decodes and executes an invocation routed by method name
pub fn invoke_by_name<T>(
    token: &mut T,
    method_name: &str,
    params: &RawBytes,
) -> Result<RawBytes, DispatchError>
where
    T: OEP4Token<TokenError = TokenError>,
{
    let method = Method::from_name(method_name)
        .ok_or_else(|| DispatchError::UnknownMethodName(method_name.to_string()))?;
    dispatch(token, method, params)
}

/// Decodes and executes an invocation. A malformed address is refused like any other invalid
/// argument rather than aborting the invocation
fn dispatch<T>(token: &mut T, method: Method, params: &RawBytes) -> Result<RawBytes, DispatchError>
where
    T: OEP4Token<TokenError = TokenError>,
{
    match Operation::decode(method, params) {
        Ok(operation) => execute(token, operation),
        Err(e @ DispatchError::MalformedAddress { .. }) => {
            log::debug!("{} rejected: {e}", method.name());
            method.refusal()
        }
        Err(e) => Err(e),
    }
}

/// Folds a state-changing result into the boolean outcome, keeping only infrastructure failures
/// as errors
fn succeeded<R>(res: Result<R, TokenError>) -> Result<bool, DispatchError> {
    match res {
        Ok(_) => Ok(true),
        Err(e) if e.is_rejection() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Decodes the outcome of a state-changing method
pub fn decode_bool(ret: &RawBytes) -> Result<bool, DispatchError> {
    Ok(ret.deserialize()?)
}

/// Decodes the result of a supply, balance or allowance query
pub fn decode_amount(ret: &RawBytes) -> Result<TokenAmount, DispatchError> {
    Ok(ret.deserialize()?)
}
