use contract_utils::Address;
use fvm_ipld_encoding::Error as SerializationError;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use thiserror::Error;

use crate::token::state::StateError as TokenStateError;
use crate::token::state::StateInvariantError;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("error in underlying state {0}")]
    TokenState(#[from] TokenStateError),
    #[error("value {amount:?} for {name:?} must be non-negative")]
    InvalidNegative { name: &'static str, amount: TokenAmount },
    #[error("{name:?} address {address:?} is not a valid counterparty")]
    InvalidAddress { name: &'static str, address: Address },
    #[error("caller is not authorized to act for {0:?}")]
    Unauthorized(Address),
    #[error("{0:?} cannot approve itself as a spender")]
    SelfApproval(Address),
    #[error("token was already initialized")]
    AlreadyInitialized,
    #[error("transfer {index} of the batch failed: {source}")]
    BatchTransfer {
        /// Position of the failing entry in the batch
        index: usize,
        #[source]
        source: Box<TokenError>,
    },
    #[error("error during serialization {0}")]
    Serialization(#[from] SerializationError),
    #[error("error in state invariants {0}")]
    StateInvariant(#[from] StateInvariantError),
}

impl TokenError {
    /// Whether the error is the ledger refusing an operation, as opposed to a failure of the
    /// store or of encoding. Rejections leave the state untouched and are reported to callers as
    /// a `false` result
    pub fn is_rejection(&self) -> bool {
        match self {
            TokenError::InvalidNegative { .. }
            | TokenError::InvalidAddress { .. }
            | TokenError::Unauthorized(_)
            | TokenError::SelfApproval(_)
            | TokenError::AlreadyInitialized => true,
            TokenError::TokenState(state_error) => matches!(
                state_error,
                TokenStateError::InsufficientBalance { .. }
                    | TokenStateError::InsufficientAllowance { .. }
            ),
            TokenError::BatchTransfer { index: _, source } => source.is_rejection(),
            TokenError::Serialization(_) | TokenError::StateInvariant(_) => false,
        }
    }
}

impl From<&TokenError> for ExitCode {
    fn from(error: &TokenError) -> Self {
        match error {
            TokenError::Serialization(_) => ExitCode::USR_SERIALIZATION,
            TokenError::InvalidAddress { name: _, address: _ }
            | TokenError::SelfApproval(_)
            | TokenError::InvalidNegative { name: _, amount: _ } => ExitCode::USR_ILLEGAL_ARGUMENT,
            TokenError::Unauthorized(_) => ExitCode::USR_FORBIDDEN,
            TokenError::AlreadyInitialized => ExitCode::USR_ILLEGAL_STATE,
            TokenError::StateInvariant(_) => ExitCode::USR_ILLEGAL_STATE,
            // the batch fails the way its failing entry did
            TokenError::BatchTransfer { index: _, source } => ExitCode::from(source.as_ref()),
            TokenError::TokenState(state_error) => match state_error {
                TokenStateError::Storage(_) | TokenStateError::Serialization(_) => {
                    ExitCode::USR_SERIALIZATION
                }
                TokenStateError::NegativeBalance { amount: _, owner: _ }
                | TokenStateError::NegativeAllowance { amount: _, owner: _, spender: _ }
                | TokenStateError::NegativeTotalSupply(_) => ExitCode::USR_ILLEGAL_STATE,
                TokenStateError::InsufficientBalance { balance: _, delta: _, owner: _ }
                | TokenStateError::InsufficientAllowance {
                    owner: _,
                    spender: _,
                    allowance: _,
                    delta: _,
                } => ExitCode::USR_INSUFFICIENT_FUNDS,
            },
        }
    }
}
