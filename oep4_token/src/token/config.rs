use contract_utils::Address;
use fvm_shared::bigint::BigInt;
use fvm_shared::econ::TokenAmount;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_NAME: &str = "My Token";
pub const DEFAULT_SYMBOL: &str = "MT";
pub const DEFAULT_DECIMALS: u8 = 8;
/// Supply issued by default, in whole tokens
pub const DEFAULT_WHOLE_SUPPLY: u64 = 10_000_000_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse token config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("token {0} must not be empty")]
    Empty(&'static str),
    #[error("total supply cannot be negative, got {0:?}")]
    NegativeSupply(TokenAmount),
    #[error("the zero address cannot own the supply")]
    ZeroOwner,
}

/// Static token parameters, fixed for the lifetime of the token
///
/// Amounts are integers in the smallest unit; `decimals` only affects how they are displayed. In
/// JSON the supply is written as a decimal string so that values beyond 2^64 survive the round
/// trip and the owner as a base58 wallet address:
///
/// ```json
/// {
///     "name": "My Token",
///     "symbol": "MT",
///     "decimals": 8,
///     "owner": "AGjD4Mo25kzcStyh1stp7tXkUuMopD43NT",
///     "total_supply": "1000000000000000000"
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub owner: Address,
    #[serde(with = "amount_string")]
    pub total_supply: TokenAmount,
}

impl TokenConfig {
    /// The default token issued entirely to `owner`
    pub fn with_owner(owner: Address) -> Self {
        let unit = unit_for(DEFAULT_DECIMALS);
        Self {
            name: DEFAULT_NAME.to_string(),
            symbol: DEFAULT_SYMBOL.to_string(),
            decimals: DEFAULT_DECIMALS,
            owner,
            total_supply: TokenAmount::from_atto(BigInt::from(DEFAULT_WHOLE_SUPPLY) * unit),
        }
    }

    /// Parses and validates a JSON config
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Empty("name"));
        }
        if self.symbol.is_empty() {
            return Err(ConfigError::Empty("symbol"));
        }
        if self.total_supply.is_negative() {
            return Err(ConfigError::NegativeSupply(self.total_supply.clone()));
        }
        if self.owner.is_zero() {
            return Err(ConfigError::ZeroOwner);
        }
        Ok(())
    }

    /// Number of smallest units in one whole token
    pub fn unit(&self) -> TokenAmount {
        TokenAmount::from_atto(unit_for(self.decimals))
    }
}

fn unit_for(decimals: u8) -> BigInt {
    num_traits::pow(BigInt::from(10), decimals as usize)
}

mod amount_string {
    use std::str::FromStr;

    use fvm_shared::bigint::BigInt;
    use fvm_shared::econ::TokenAmount;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &TokenAmount, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&amount.atto().to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TokenAmount, D::Error> {
        let s = String::deserialize(d)?;
        let atto = BigInt::from_str(&s).map_err(D::Error::custom)?;
        Ok(TokenAmount::from_atto(atto))
    }
}
