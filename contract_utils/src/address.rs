use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length in bytes of an account or contract address
pub const ADDRESS_LEN: usize = 20;

/// Version byte prefixed to the script hash in the base58check form of an address
pub const ADDRESS_VERSION: u8 = 0x17;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must be {ADDRESS_LEN} bytes long but was {0}")]
    InvalidLength(usize),
    #[error("invalid base58 address: {0}")]
    Base58(String),
    #[error("unexpected address version {0:#04x}")]
    InvalidVersion(u8),
}

/// A fixed-length identifier for an account or contract (the script hash)
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// The all-zero address, never a valid counterparty for approvals or delegated transfers
    pub const ZERO: Address = Address([0; ADDRESS_LEN]);

    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds an address from a byte slice, failing unless it is exactly 20 bytes long
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        let bytes: [u8; ADDRESS_LEN] =
            bytes.try_into().map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Parses the base58check form used by wallets (e.g. `AGjD4Mo25kzcStyh1stp7tXkUuMopD43NT`)
    pub fn from_base58(s: &str) -> Result<Self, AddressError> {
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| AddressError::Base58(e.to_string()))?;
        match decoded.split_first() {
            Some((&ADDRESS_VERSION, payload)) => Self::from_bytes(payload),
            Some((&version, _)) => Err(AddressError::InvalidVersion(version)),
            None => Err(AddressError::InvalidLength(0)),
        }
    }

    /// Encodes the address in base58check form with the standard version byte
    pub fn to_base58(&self) -> String {
        let mut versioned = Vec::with_capacity(ADDRESS_LEN + 1);
        versioned.push(ADDRESS_VERSION);
        versioned.extend_from_slice(&self.0);
        bs58::encode(versioned).with_check().into_string()
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; ADDRESS_LEN]
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = AddressError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

/// Addresses serialize as raw bytes in binary encodings (CBOR) and as base58 strings in
/// human-readable ones (JSON)
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_base58())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

struct AddressVisitor;

impl<'de> Visitor<'de> for AddressVisitor {
    type Value = Address;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a {ADDRESS_LEN}-byte address or a base58 address string")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Address::from_bytes(v).map_err(E::custom)
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        self.visit_bytes(&v)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Address::from_base58(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(AddressVisitor)
        } else {
            deserializer.deserialize_bytes(AddressVisitor)
        }
    }
}
