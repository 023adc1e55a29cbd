use blake2b_simd::blake2b;
use thiserror::Error;

/// Longest exported name a contract may route by
pub const MAX_NAME_LEN: usize = 64;

/// Method number that never identifies a method
pub const RESERVED_NUMBER: u64 = 0;

/// Digest function backing method numbering
///
/// Digests are read in 4 byte windows, so anything shorter than 4 bytes yields no number at all.
pub trait Hasher {
    fn hash(&self, bytes: &[u8]) -> Vec<u8>;
}

/// The standard 64 byte blake2b digest
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake2bHasher {}

impl Hasher for Blake2bHasher {
    fn hash(&self, bytes: &[u8]) -> Vec<u8> {
        blake2b(bytes).as_bytes().to_vec()
    }
}

#[derive(Error, PartialEq, Eq, Debug)]
pub enum MethodNameErr {
    #[error("method name is empty")]
    EmptyString,
    #[error("illegal method name: {0}")]
    IllegalName(#[from] IllegalNameErr),
    #[error("every window of the digest is reserved, pick a different method name")]
    IndeterminableId,
}

#[derive(Error, PartialEq, Eq, Debug)]
pub enum IllegalNameErr {
    #[error("must start with an upper case letter")]
    NotCapitalStart,
    #[error("may only contain ASCII letters, digits and underscores")]
    IllegalCharacters,
    #[error("longer than {MAX_NAME_LEN} bytes")]
    TooLong,
}

/// Maps exported method names onto the numbers hosts route invocations by
#[derive(Default)]
pub struct MethodResolver<T: Hasher> {
    hasher: T,
}

impl<T: Hasher> MethodResolver<T> {
    pub fn new(hasher: T) -> Self {
        Self { hasher }
    }

    /// The number of a method is the first big-endian 4 byte window of the digest of its name
    /// that isn't [`RESERVED_NUMBER`]
    pub fn method_number(&self, method_name: &str) -> Result<u64, MethodNameErr> {
        validate_name(method_name)?;
        self.hasher
            .hash(method_name.as_bytes())
            .chunks_exact(4)
            .map(|w| u64::from(u32::from_be_bytes([w[0], w[1], w[2], w[3]])))
            .find(|number| *number != RESERVED_NUMBER)
            .ok_or(MethodNameErr::IndeterminableId)
    }
}

fn validate_name(name: &str) -> Result<(), MethodNameErr> {
    let first = name.chars().next().ok_or(MethodNameErr::EmptyString)?;
    if !first.is_ascii_uppercase() {
        return Err(IllegalNameErr::NotCapitalStart.into());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(IllegalNameErr::TooLong.into());
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(IllegalNameErr::IllegalCharacters.into());
    }
    Ok(())
}
